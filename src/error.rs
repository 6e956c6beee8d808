use anyhow::anyhow;

pub type Result<T> = std::result::Result<T, LibError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// An operation named a node or edge id that does not exist in the graph.
    InvalidReference,
    InvalidInput,
    NotFound,
    /// The session credential is missing, expired or rejected.
    Unauthorized,
    Forbidden,
    /// Transient transport failure; the caller decides whether to try again.
    Unavailable,
    Database,
    Unknown,
}

impl ErrorKind {
    /// Remote failures are surfaced to the user; local ones are plain rejections.
    pub const fn is_remote(self) -> bool {
        matches!(
            self,
            ErrorKind::NotFound
                | ErrorKind::Unauthorized
                | ErrorKind::Forbidden
                | ErrorKind::Unavailable
        )
    }

    /// Failures that say nothing about the request itself, so it may be sent again.
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Unavailable
                | ErrorKind::Unauthorized
                | ErrorKind::Database
                | ErrorKind::Unknown
        )
    }
}

#[derive(Debug)]
pub struct LibError {
    pub kind: ErrorKind,
    pub code: &'static str,
    pub public: &'static str,
    pub source: anyhow::Error,
}

impl LibError {
    pub fn invalid_reference(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::InvalidReference,
            code: "invalid_reference",
            public,
            source,
        }
    }

    pub fn invalid_reference_with_code(
        code: &'static str,
        public: &'static str,
        source: anyhow::Error,
    ) -> Self {
        Self {
            kind: ErrorKind::InvalidReference,
            code,
            public,
            source,
        }
    }

    pub fn invalid(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::InvalidInput,
            code: "invalid_input",
            public,
            source,
        }
    }

    pub fn invalid_with_code(
        code: &'static str,
        public: &'static str,
        source: anyhow::Error,
    ) -> Self {
        Self {
            kind: ErrorKind::InvalidInput,
            code,
            public,
            source,
        }
    }

    pub fn not_found(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::NotFound,
            code: "not_found",
            public,
            source,
        }
    }

    pub fn unauthorized(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::Unauthorized,
            code: "unauthorized",
            public,
            source,
        }
    }

    pub fn forbidden(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::Forbidden,
            code: "forbidden",
            public,
            source,
        }
    }

    pub fn unavailable(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::Unavailable,
            code: "unavailable",
            public,
            source,
        }
    }

    pub fn database(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::Database,
            code: "database_error",
            public,
            source,
        }
    }

    pub fn unknown(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::Unknown,
            code: "unknown_error",
            public,
            source,
        }
    }
}

impl std::fmt::Display for LibError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.public, self.code, self.source)
    }
}

impl std::error::Error for LibError {}

#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for LibError {
    fn from(value: sqlx::Error) -> Self {
        Self::from_sqlx("Database request failed", value)
    }
}

#[cfg(feature = "sqlx")]
impl LibError {
    /// Connection and pool failures are transient; everything else is a database error.
    pub fn from_sqlx(public: &'static str, err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::unavailable("The graph database is temporarily unavailable", anyhow!(err))
            }
            err => Self::database(public, anyhow!(err)),
        }
    }
}

#[cfg(feature = "client")]
impl From<reqwest::Error> for LibError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            Self::unknown("Unexpected response from the graph service", anyhow!(value))
        } else {
            Self::unavailable("Unable to reach the graph service", anyhow!(value))
        }
    }
}

use std::fmt;
use std::time::Duration;

use anyhow::anyhow;

use crate::error::{LibError, Result};

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub const ENV_API_URL: &str = "THOUGHT_GRAPH_API_URL";
pub const ENV_TOKEN: &str = "THOUGHT_GRAPH_TOKEN";
pub const ENV_TIMEOUT_MS: &str = "THOUGHT_GRAPH_TIMEOUT_MS";

/// Where the graph service lives and which session credential to present.
#[derive(Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub bearer_token: Option<String>,
    pub timeout: Duration,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            bearer_token: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_API_URL) {
            let url = url.trim().trim_end_matches('/').to_string();
            if url.is_empty() {
                return Err(LibError::invalid(
                    "Graph service URL is empty",
                    anyhow!("{} is set but empty", ENV_API_URL),
                ));
            }
            config.base_url = url;
        }

        config.bearer_token = lookup(ENV_TOKEN)
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty());

        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            let millis = raw.trim().parse::<u64>().map_err(|err| {
                LibError::invalid(
                    "Graph service timeout must be a whole number of milliseconds",
                    anyhow!("invalid {} '{}': {}", ENV_TIMEOUT_MS, raw, err),
                )
            })?;
            config.timeout = Duration::from_millis(millis);
        }

        Ok(config)
    }
}

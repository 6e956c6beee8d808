#[cfg(feature = "api")]
pub mod api;
#[cfg(feature = "client")]
pub mod client;
pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod editor;
pub mod error;
pub mod invariants;
pub mod models;
pub mod operations;
pub mod persistence;
pub mod service;
pub mod store;
pub mod sync;
pub mod taxonomy;

pub mod prelude {
    #[cfg(feature = "api")]
    pub use crate::api::{GraphApp, HasGraphService, ThoughtGraphApp};
    #[cfg(feature = "client")]
    pub use crate::client::HttpTransport;
    pub use crate::config::ClientConfig;
    #[cfg(feature = "sqlx")]
    pub use crate::db::{PgGraphStore, create_graph_tables};
    pub use crate::editor::{Connection, ConnectionDirection, GraphEditor, NodeRemoval};
    pub use crate::error::{ErrorKind, LibError, Result};
    pub use crate::invariants::{GraphInvariantViolation, ensure_graph_invariants};
    pub use crate::models::{
        CreateGraphPayload, EdgeId, EdgeRelation, GraphId, GraphSummary, ListGraphsQuery,
        NewThoughtEdge, NewThoughtNode, NodeId, NodeKind, NodePatch, Paged, Position,
        ThoughtEdge, ThoughtGraph, ThoughtNode, UpdateGraphPayload,
    };
    pub use crate::operations::{EditorCommand, EditorOutcome};
    pub use crate::persistence::{GraphSync, RefreshOutcome, SyncReport};
    pub use crate::service::GraphService;
    pub use crate::store::MemoryGraphStore;
    pub use crate::sync::{Completion, EntityKey, GraphMutation, SyncQueue};
    pub use crate::taxonomy::{KindIcon, KindPresentation};
}

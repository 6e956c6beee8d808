use std::env;
use std::net::SocketAddr;

use anyhow::{Context, bail};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use thought_graph::api::ThoughtGraphApp;
use thought_graph::service::GraphService;
use thought_graph::store::MemoryGraphStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let bind = env::var("THOUGHT_GRAPH_BIND").unwrap_or_else(|_| "127.0.0.1:8000".to_string());
    let bind_addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid THOUGHT_GRAPH_BIND '{}'", bind))?;

    let tokens = env::var("THOUGHT_GRAPH_API_TOKENS")
        .context("THOUGHT_GRAPH_API_TOKENS is required (comma separated bearer tokens)")?
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect::<Vec<_>>();
    if tokens.is_empty() {
        bail!("THOUGHT_GRAPH_API_TOKENS does not contain any token");
    }

    #[cfg(feature = "sqlx")]
    if let Ok(database_url) = env::var("DATABASE_URL") {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(&database_url)
            .await
            .context("failed to connect to postgres")?;
        thought_graph::db::create_graph_tables(&pool)
            .await
            .context("failed to run thought graph migrations")?;
        tracing::info!("using postgres graph store");
        let store = thought_graph::db::PgGraphStore::new(pool);
        return serve(ThoughtGraphApp::new(store, tokens), bind_addr).await;
    }

    tracing::info!("using in-memory graph store");
    serve(ThoughtGraphApp::new(MemoryGraphStore::new(), tokens), bind_addr).await
}

async fn serve<T>(app_state: ThoughtGraphApp<T>, bind_addr: SocketAddr) -> anyhow::Result<()>
where
    T: GraphService + 'static,
{
    let api = Router::new()
        .route("/healthz", get(health_handler))
        .merge(thought_graph::api::routes::<ThoughtGraphApp<T>>());

    let app = Router::new().nest("/api", api).with_state(app_state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind listener on {}", bind_addr))?;

    tracing::info!(address = %bind_addr, "thought graph server listening, api base path /api");

    axum::serve(listener, app)
        .await
        .context("thought graph server failed")
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "ok": true
    }))
}

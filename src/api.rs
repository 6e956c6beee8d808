use std::collections::HashSet;
use std::sync::Arc;

use anyhow::anyhow;
use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, Query, State, rejection::JsonRejection},
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
    routing::{delete, get, put},
};
use serde_json::json;

use crate::error::{ErrorKind, LibError};
use crate::models::{
    CreateGraphPayload, EdgeId, GraphId, ListGraphsQuery, NewThoughtEdge, NewThoughtNode, NodeId,
    NodePatch, UpdateGraphPayload,
};
use crate::service::GraphService;

#[derive(Debug)]
pub struct AppError(pub LibError);

impl From<LibError> for AppError {
    fn from(value: LibError) -> Self {
        Self(value)
    }
}

impl From<JsonRejection> for AppError {
    fn from(value: JsonRejection) -> Self {
        Self(LibError::invalid(
            "Request body is not valid JSON for this route",
            anyhow!(value.body_text()),
        ))
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidReference => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Database | ErrorKind::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.kind);
        if status.is_server_error() {
            tracing::error!(kind = ?self.0.kind, error = %self.0.source, "thought graph request failed");
        } else {
            tracing::warn!(kind = ?self.0.kind, code = self.0.code, error = %self.0.source, "thought graph request rejected");
        }

        let body = json!({
            "error": {
                "code": self.0.code,
                "message": self.0.public,
            }
        });
        (status, Json(body)).into_response()
    }
}

pub trait HasGraphService {
    type Service: GraphService + 'static;

    fn service(&self) -> Arc<Self::Service>;
}

pub trait GraphApp: HasGraphService {
    fn accepts_token(&self, token: &str) -> bool;
}

/// Application state serving any [`GraphService`] behind a fixed set of bearer tokens.
pub struct ThoughtGraphApp<T> {
    service: Arc<T>,
    tokens: Arc<HashSet<String>>,
}

impl<T> Clone for ThoughtGraphApp<T> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            tokens: Arc::clone(&self.tokens),
        }
    }
}

impl<T> ThoughtGraphApp<T> {
    pub fn new<I, K>(service: T, tokens: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            service: Arc::new(service),
            tokens: Arc::new(tokens.into_iter().map(Into::into).collect()),
        }
    }
}

impl<T: GraphService + 'static> HasGraphService for ThoughtGraphApp<T> {
    type Service = T;

    fn service(&self) -> Arc<T> {
        Arc::clone(&self.service)
    }
}

impl<T: GraphService + 'static> GraphApp for ThoughtGraphApp<T> {
    fn accepts_token(&self, token: &str) -> bool {
        self.tokens.contains(token)
    }
}

/// Bearer credential accepted by the application.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

/// Token of an `Authorization` value; the scheme name is case-insensitive.
fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

impl<S> FromRequestParts<S> for BearerToken
where
    S: GraphApp + Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token)
            .ok_or_else(|| {
                LibError::unauthorized(
                    "Authentication required",
                    anyhow!("missing bearer token"),
                )
            })?;

        if !state.accepts_token(token) {
            return Err(LibError::unauthorized(
                "Authentication required",
                anyhow!("bearer token not accepted"),
            )
            .into());
        }
        Ok(Self(token.to_string()))
    }
}

async fn list_graphs_handler<S>(
    State(app): State<S>,
    _token: BearerToken,
    Query(query): Query<ListGraphsQuery>,
) -> Result<impl IntoResponse, AppError>
where
    S: GraphApp + Clone + Send + Sync + 'static,
{
    let graphs = app.service().list_graphs(query).await?;
    Ok(Json(graphs))
}

async fn create_graph_handler<S>(
    State(app): State<S>,
    _token: BearerToken,
    payload: Result<Json<CreateGraphPayload>, JsonRejection>,
) -> Result<impl IntoResponse, AppError>
where
    S: GraphApp + Clone + Send + Sync + 'static,
{
    let Json(payload) = payload?;
    let graph = app.service().create_graph(payload).await?;
    tracing::info!(graph_id = %graph.id, "thought graph created");
    Ok((StatusCode::CREATED, Json(graph)))
}

async fn get_graph_handler<S>(
    State(app): State<S>,
    _token: BearerToken,
    Path(graph_id): Path<GraphId>,
) -> Result<impl IntoResponse, AppError>
where
    S: GraphApp + Clone + Send + Sync + 'static,
{
    let graph = app.service().fetch_graph(&graph_id).await?;
    Ok(Json(graph))
}

async fn update_graph_handler<S>(
    State(app): State<S>,
    _token: BearerToken,
    Path(graph_id): Path<GraphId>,
    payload: Result<Json<UpdateGraphPayload>, JsonRejection>,
) -> Result<impl IntoResponse, AppError>
where
    S: GraphApp + Clone + Send + Sync + 'static,
{
    let Json(payload) = payload?;
    let graph = app.service().update_graph(&graph_id, payload).await?;
    Ok(Json(graph))
}

async fn delete_graph_handler<S>(
    State(app): State<S>,
    _token: BearerToken,
    Path(graph_id): Path<GraphId>,
) -> Result<impl IntoResponse, AppError>
where
    S: GraphApp + Clone + Send + Sync + 'static,
{
    app.service().delete_graph(&graph_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_nodes_handler<S>(
    State(app): State<S>,
    _token: BearerToken,
    Path(graph_id): Path<GraphId>,
) -> Result<impl IntoResponse, AppError>
where
    S: GraphApp + Clone + Send + Sync + 'static,
{
    let nodes = app.service().list_nodes(&graph_id).await?;
    Ok(Json(nodes))
}

async fn create_node_handler<S>(
    State(app): State<S>,
    _token: BearerToken,
    Path(graph_id): Path<GraphId>,
    payload: Result<Json<NewThoughtNode>, JsonRejection>,
) -> Result<impl IntoResponse, AppError>
where
    S: GraphApp + Clone + Send + Sync + 'static,
{
    let Json(node) = payload?;
    let node = app.service().create_node(&graph_id, node).await?;
    Ok((StatusCode::CREATED, Json(node)))
}

async fn update_node_handler<S>(
    State(app): State<S>,
    _token: BearerToken,
    Path((graph_id, node_id)): Path<(GraphId, NodeId)>,
    payload: Result<Json<NodePatch>, JsonRejection>,
) -> Result<impl IntoResponse, AppError>
where
    S: GraphApp + Clone + Send + Sync + 'static,
{
    let Json(patch) = payload?;
    let node = app.service().update_node(&graph_id, &node_id, patch).await?;
    Ok(Json(node))
}

async fn delete_node_handler<S>(
    State(app): State<S>,
    _token: BearerToken,
    Path((graph_id, node_id)): Path<(GraphId, NodeId)>,
) -> Result<impl IntoResponse, AppError>
where
    S: GraphApp + Clone + Send + Sync + 'static,
{
    app.service().delete_node(&graph_id, &node_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_edges_handler<S>(
    State(app): State<S>,
    _token: BearerToken,
    Path(graph_id): Path<GraphId>,
) -> Result<impl IntoResponse, AppError>
where
    S: GraphApp + Clone + Send + Sync + 'static,
{
    let edges = app.service().list_edges(&graph_id).await?;
    Ok(Json(edges))
}

async fn create_edge_handler<S>(
    State(app): State<S>,
    _token: BearerToken,
    Path(graph_id): Path<GraphId>,
    payload: Result<Json<NewThoughtEdge>, JsonRejection>,
) -> Result<impl IntoResponse, AppError>
where
    S: GraphApp + Clone + Send + Sync + 'static,
{
    let Json(edge) = payload?;
    let edge = app.service().create_edge(&graph_id, edge).await?;
    Ok((StatusCode::CREATED, Json(edge)))
}

async fn delete_edge_handler<S>(
    State(app): State<S>,
    _token: BearerToken,
    Path((graph_id, edge_id)): Path<(GraphId, EdgeId)>,
) -> Result<impl IntoResponse, AppError>
where
    S: GraphApp + Clone + Send + Sync + 'static,
{
    app.service().delete_edge(&graph_id, &edge_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn routes<S>() -> Router<S>
where
    S: GraphApp + Clone + Send + Sync + 'static,
{
    tracing::info!("Registering route /thought-graphs [GET,POST]");
    tracing::info!("Registering route /thought-graphs/{{graph_id}} [GET,PUT,DELETE]");
    tracing::info!("Registering route /thought-graphs/{{graph_id}}/nodes [GET,POST]");
    tracing::info!("Registering route /thought-graphs/{{graph_id}}/nodes/{{node_id}} [PUT,DELETE]");
    tracing::info!("Registering route /thought-graphs/{{graph_id}}/edges [GET,POST]");
    tracing::info!("Registering route /thought-graphs/{{graph_id}}/edges/{{edge_id}} [DELETE]");

    Router::new()
        .route(
            "/thought-graphs",
            get(list_graphs_handler::<S>).post(create_graph_handler::<S>),
        )
        .route(
            "/thought-graphs/{graph_id}",
            get(get_graph_handler::<S>)
                .put(update_graph_handler::<S>)
                .delete(delete_graph_handler::<S>),
        )
        .route(
            "/thought-graphs/{graph_id}/nodes",
            get(list_nodes_handler::<S>).post(create_node_handler::<S>),
        )
        .route(
            "/thought-graphs/{graph_id}/nodes/{node_id}",
            put(update_node_handler::<S>).delete(delete_node_handler::<S>),
        )
        .route(
            "/thought-graphs/{graph_id}/edges",
            get(list_edges_handler::<S>).post(create_edge_handler::<S>),
        )
        .route(
            "/thought-graphs/{graph_id}/edges/{edge_id}",
            delete(delete_edge_handler::<S>),
        )
}

use anyhow::anyhow;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::config::ClientConfig;
use crate::error::{LibError, Result};
use crate::models::{
    CreateGraphPayload, EdgeId, GraphId, GraphSummary, ListGraphsQuery, NewThoughtEdge,
    NewThoughtNode, NodeId, NodePatch, Paged, ThoughtEdge, ThoughtGraph, ThoughtNode,
    UpdateGraphPayload,
};
use crate::service::GraphService;

const GRAPHS: &str = "thought-graphs";
const NODES: &str = "nodes";
const EDGES: &str = "edges";

/// Graph service reached over HTTP.
///
/// Every request carries the configured bearer credential. Failures are mapped to
/// [`crate::error::ErrorKind`] and returned as-is; nothing is retried here.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    config: ClientConfig,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

impl HttpTransport {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| {
                LibError::invalid("Invalid HTTP client configuration", anyhow!(err))
            })?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let invalid =
            |err: String| LibError::invalid("Invalid graph service URL", anyhow!(err));
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|err| invalid(format!("{}: {}", self.config.base_url, err)))?;
        url.path_segments_mut()
            .map_err(|_| invalid(format!("{} cannot be a base URL", self.config.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder> {
        let builder = self.client.request(method, self.url(segments)?);
        Ok(match &self.config.bearer_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = checked(builder.send().await?).await?;
        Ok(response.json::<T>().await?)
    }

    async fn send_empty(&self, builder: RequestBuilder) -> Result<()> {
        checked(builder.send().await?).await?;
        Ok(())
    }
}

async fn checked(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().clone();
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|envelope| envelope.error)
        .ok();
    tracing::error!(
        status = status.as_u16(),
        url = %url,
        code = detail.as_ref().map(|d| d.code.as_str()).unwrap_or(""),
        "graph service request failed"
    );
    Err(status_error(status, detail, body))
}

fn status_error(status: StatusCode, detail: Option<ErrorBody>, body: String) -> LibError {
    let source = match &detail {
        Some(detail) => anyhow!("{} {}: {}", status, detail.code, detail.message),
        None => anyhow!("{}: {}", status, body),
    };
    let code = detail.as_ref().and_then(|detail| known_code(&detail.code));

    match status {
        StatusCode::UNAUTHORIZED => {
            LibError::unauthorized("Your session has expired, please sign in again", source)
        }
        StatusCode::FORBIDDEN => {
            LibError::forbidden("You do not have permission to perform this action", source)
        }
        StatusCode::NOT_FOUND => {
            LibError::not_found("The requested graph resource does not exist", source)
        }
        StatusCode::UNPROCESSABLE_ENTITY => match code {
            Some(code) => LibError::invalid_reference_with_code(
                code,
                "The request referenced a missing node or edge",
                source,
            ),
            None => LibError::invalid_reference(
                "The request referenced a missing node or edge",
                source,
            ),
        },
        status if status.is_server_error() => {
            LibError::unavailable("The graph service is temporarily unavailable", source)
        }
        status if status.is_client_error() => match code {
            Some(code) => {
                LibError::invalid_with_code(code, "The graph service rejected the request", source)
            }
            None => LibError::invalid("The graph service rejected the request", source),
        },
        _ => LibError::unknown("The graph service failed to handle the request", source),
    }
}

/// Error codes the service is known to send, so they survive the trip as `&'static str`.
fn known_code(code: &str) -> Option<&'static str> {
    const KNOWN: &[&str] = &[
        "invalid_input",
        "invalid_reference",
        "duplicate_node_id",
        "duplicate_edge_id",
        "graph_duplicate_node_id",
        "graph_duplicate_edge_id",
        "graph_dangling_edge",
        "unknown_node_kind",
    ];
    KNOWN.iter().copied().find(|known| *known == code)
}

impl GraphService for HttpTransport {
    async fn list_graphs(&self, query: ListGraphsQuery) -> Result<Paged<GraphSummary>> {
        let builder = self.request(Method::GET, &[GRAPHS])?.query(&query);
        self.send_json(builder).await
    }

    async fn create_graph(&self, payload: CreateGraphPayload) -> Result<ThoughtGraph> {
        let builder = self.request(Method::POST, &[GRAPHS])?.json(&payload);
        self.send_json(builder).await
    }

    async fn fetch_graph(&self, graph_id: &GraphId) -> Result<ThoughtGraph> {
        let builder = self.request(Method::GET, &[GRAPHS, graph_id.as_str()])?;
        self.send_json(builder).await
    }

    async fn update_graph(
        &self,
        graph_id: &GraphId,
        payload: UpdateGraphPayload,
    ) -> Result<ThoughtGraph> {
        let builder = self
            .request(Method::PUT, &[GRAPHS, graph_id.as_str()])?
            .json(&payload);
        self.send_json(builder).await
    }

    async fn delete_graph(&self, graph_id: &GraphId) -> Result<()> {
        let builder = self.request(Method::DELETE, &[GRAPHS, graph_id.as_str()])?;
        self.send_empty(builder).await
    }

    async fn list_nodes(&self, graph_id: &GraphId) -> Result<Vec<ThoughtNode>> {
        let builder = self.request(Method::GET, &[GRAPHS, graph_id.as_str(), NODES])?;
        self.send_json(builder).await
    }

    async fn create_node(&self, graph_id: &GraphId, node: NewThoughtNode) -> Result<ThoughtNode> {
        let builder = self
            .request(Method::POST, &[GRAPHS, graph_id.as_str(), NODES])?
            .json(&node);
        self.send_json(builder).await
    }

    async fn update_node(
        &self,
        graph_id: &GraphId,
        node_id: &NodeId,
        patch: NodePatch,
    ) -> Result<ThoughtNode> {
        let builder = self
            .request(
                Method::PUT,
                &[GRAPHS, graph_id.as_str(), NODES, node_id.as_str()],
            )?
            .json(&patch);
        self.send_json(builder).await
    }

    async fn delete_node(&self, graph_id: &GraphId, node_id: &NodeId) -> Result<()> {
        let builder = self.request(
            Method::DELETE,
            &[GRAPHS, graph_id.as_str(), NODES, node_id.as_str()],
        )?;
        self.send_empty(builder).await
    }

    async fn list_edges(&self, graph_id: &GraphId) -> Result<Vec<ThoughtEdge>> {
        let builder = self.request(Method::GET, &[GRAPHS, graph_id.as_str(), EDGES])?;
        self.send_json(builder).await
    }

    async fn create_edge(&self, graph_id: &GraphId, edge: NewThoughtEdge) -> Result<ThoughtEdge> {
        let builder = self
            .request(Method::POST, &[GRAPHS, graph_id.as_str(), EDGES])?
            .json(&edge);
        self.send_json(builder).await
    }

    async fn delete_edge(&self, graph_id: &GraphId, edge_id: &EdgeId) -> Result<()> {
        let builder = self.request(
            Method::DELETE,
            &[GRAPHS, graph_id.as_str(), EDGES, edge_id.as_str()],
        )?;
        self.send_empty(builder).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn transport(base: &str) -> HttpTransport {
        HttpTransport::new(ClientConfig::new(base)).expect("client builds")
    }

    #[test]
    fn urls_are_built_from_encoded_segments() {
        let transport = transport("http://localhost:8000/api");
        let url = transport
            .url(&[GRAPHS, "g 1", NODES, "a/b"])
            .expect("valid url");
        assert_eq!(
            url.as_str(),
            "http://localhost:8000/api/thought-graphs/g%201/nodes/a%2Fb"
        );
    }

    #[test]
    fn trailing_slash_in_base_is_tolerated() {
        let transport = transport("http://localhost:8000/api/");
        let url = transport.url(&[GRAPHS]).expect("valid url");
        assert_eq!(url.as_str(), "http://localhost:8000/api/thought-graphs");
    }

    #[test]
    fn invalid_base_url_is_invalid_input() {
        let transport = transport("not a url");
        let err = transport.url(&[GRAPHS]).expect_err("bad base");
        assert_eq!(err.kind, ErrorKind::InvalidInput);
    }

    #[test]
    fn statuses_map_to_error_kinds() {
        let cases = [
            (StatusCode::UNAUTHORIZED, ErrorKind::Unauthorized),
            (StatusCode::FORBIDDEN, ErrorKind::Forbidden),
            (StatusCode::NOT_FOUND, ErrorKind::NotFound),
            (StatusCode::UNPROCESSABLE_ENTITY, ErrorKind::InvalidReference),
            (StatusCode::SERVICE_UNAVAILABLE, ErrorKind::Unavailable),
            (StatusCode::BAD_REQUEST, ErrorKind::InvalidInput),
            (StatusCode::INTERNAL_SERVER_ERROR, ErrorKind::Unavailable),
            (StatusCode::BAD_GATEWAY, ErrorKind::Unavailable),
            (StatusCode::PERMANENT_REDIRECT, ErrorKind::Unknown),
        ];
        for (status, kind) in cases {
            assert_eq!(status_error(status, None, String::new()).kind, kind);
        }
    }

    #[test]
    fn known_service_codes_are_preserved() {
        let err = status_error(
            StatusCode::BAD_REQUEST,
            Some(ErrorBody {
                code: "duplicate_node_id".to_string(),
                message: "Node ID already exists in graph".to_string(),
            }),
            String::new(),
        );
        assert_eq!(err.code, "duplicate_node_id");

        let err = status_error(
            StatusCode::BAD_REQUEST,
            Some(ErrorBody {
                code: "something_new".to_string(),
                message: "?".to_string(),
            }),
            String::new(),
        );
        assert_eq!(err.code, "invalid_input");
    }
}

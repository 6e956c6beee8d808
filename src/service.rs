use std::future::Future;

use crate::error::Result;
use crate::models::{
    CreateGraphPayload, EdgeId, GraphId, GraphSummary, ListGraphsQuery, NewThoughtEdge,
    NewThoughtNode, NodeId, NodePatch, Paged, ThoughtEdge, ThoughtGraph, ThoughtNode,
    UpdateGraphPayload,
};

/// CRUD contract of the graph service, scoped by graph id.
///
/// The editor side talks to it through the HTTP client; the stores
/// behind the HTTP routes implement it directly. Implementations report
/// `NotFound`, `Unauthorized` and `Unavailable` through [`crate::error::ErrorKind`]
/// and never retry on their own.
pub trait GraphService: Send + Sync {
    fn list_graphs(
        &self,
        query: ListGraphsQuery,
    ) -> impl Future<Output = Result<Paged<GraphSummary>>> + Send;

    fn create_graph(
        &self,
        payload: CreateGraphPayload,
    ) -> impl Future<Output = Result<ThoughtGraph>> + Send;

    fn fetch_graph(&self, graph_id: &GraphId) -> impl Future<Output = Result<ThoughtGraph>> + Send;

    fn update_graph(
        &self,
        graph_id: &GraphId,
        payload: UpdateGraphPayload,
    ) -> impl Future<Output = Result<ThoughtGraph>> + Send;

    fn delete_graph(&self, graph_id: &GraphId) -> impl Future<Output = Result<()>> + Send;

    fn list_nodes(
        &self,
        graph_id: &GraphId,
    ) -> impl Future<Output = Result<Vec<ThoughtNode>>> + Send;

    fn create_node(
        &self,
        graph_id: &GraphId,
        node: NewThoughtNode,
    ) -> impl Future<Output = Result<ThoughtNode>> + Send;

    fn update_node(
        &self,
        graph_id: &GraphId,
        node_id: &NodeId,
        patch: NodePatch,
    ) -> impl Future<Output = Result<ThoughtNode>> + Send;

    fn delete_node(
        &self,
        graph_id: &GraphId,
        node_id: &NodeId,
    ) -> impl Future<Output = Result<()>> + Send;

    fn list_edges(
        &self,
        graph_id: &GraphId,
    ) -> impl Future<Output = Result<Vec<ThoughtEdge>>> + Send;

    fn create_edge(
        &self,
        graph_id: &GraphId,
        edge: NewThoughtEdge,
    ) -> impl Future<Output = Result<ThoughtEdge>> + Send;

    fn delete_edge(
        &self,
        graph_id: &GraphId,
        edge_id: &EdgeId,
    ) -> impl Future<Output = Result<()>> + Send;
}

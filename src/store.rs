use std::collections::HashMap;

use anyhow::anyhow;
use chrono::{NaiveDateTime, Utc};
use tokio::sync::RwLock;

use crate::error::{LibError, Result};
use crate::models::{
    CreateGraphPayload, EdgeId, GraphId, GraphSummary, ListGraphsQuery, NewThoughtEdge,
    NewThoughtNode, NodeId, NodePatch, Paged, ThoughtEdge, ThoughtGraph, ThoughtNode,
    UpdateGraphPayload,
};
use crate::service::GraphService;

#[derive(Debug, Clone)]
struct StoredGraph {
    id: GraphId,
    title: String,
    description: Option<String>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
    nodes: Vec<ThoughtNode>,
    edges: Vec<ThoughtEdge>,
}

impl StoredGraph {
    fn snapshot(&self) -> ThoughtGraph {
        ThoughtGraph {
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
        }
    }

    fn summary(&self) -> GraphSummary {
        GraphSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            node_count: self.nodes.len() as i64,
            edge_count: self.edges.len() as i64,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now().naive_utc();
    }

    fn has_node(&self, node_id: &NodeId) -> bool {
        self.nodes.iter().any(|node| node.id == *node_id)
    }
}

/// Graph service kept entirely in process memory.
#[derive(Debug, Default)]
pub struct MemoryGraphStore {
    graphs: RwLock<HashMap<GraphId, StoredGraph>>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn graph_not_found(graph_id: &GraphId) -> LibError {
    LibError::not_found("Graph not found", anyhow!("graph {} not found", graph_id))
}

fn node_not_found(graph_id: &GraphId, node_id: &NodeId) -> LibError {
    LibError::not_found(
        "Node not found",
        anyhow!("node {} not found in graph {}", node_id, graph_id),
    )
}

impl GraphService for MemoryGraphStore {
    async fn list_graphs(&self, query: ListGraphsQuery) -> Result<Paged<GraphSummary>> {
        let (page, limit) = query.pagination();
        let graphs = self.graphs.read().await;
        let mut items = graphs.values().map(StoredGraph::summary).collect::<Vec<_>>();
        items.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        let total = items.len() as u64;
        let offset = (page.saturating_sub(1) as usize).saturating_mul(limit as usize);
        let items = items.into_iter().skip(offset).take(limit as usize).collect();
        Ok(Paged {
            page,
            limit,
            total,
            items,
        })
    }

    async fn create_graph(&self, payload: CreateGraphPayload) -> Result<ThoughtGraph> {
        let definition = payload.normalize()?;
        let now = Utc::now().naive_utc();
        let stored = StoredGraph {
            id: GraphId::generate(),
            title: definition.title,
            description: definition.description,
            created_at: now,
            updated_at: now,
            nodes: definition.nodes,
            edges: definition.edges,
        };
        let snapshot = stored.snapshot();
        self.graphs.write().await.insert(stored.id.clone(), stored);
        tracing::info!(graph_id = %snapshot.id, "created thought graph");
        Ok(snapshot)
    }

    async fn fetch_graph(&self, graph_id: &GraphId) -> Result<ThoughtGraph> {
        self.graphs
            .read()
            .await
            .get(graph_id)
            .map(StoredGraph::snapshot)
            .ok_or_else(|| graph_not_found(graph_id))
    }

    async fn update_graph(
        &self,
        graph_id: &GraphId,
        payload: UpdateGraphPayload,
    ) -> Result<ThoughtGraph> {
        let payload = payload.normalize()?;
        let mut graphs = self.graphs.write().await;
        let stored = graphs
            .get_mut(graph_id)
            .ok_or_else(|| graph_not_found(graph_id))?;
        if let Some(title) = payload.title {
            stored.title = title;
        }
        if let Some(description) = payload.description {
            stored.description = Some(description).filter(|value| !value.trim().is_empty());
        }
        stored.touch();
        Ok(stored.snapshot())
    }

    async fn delete_graph(&self, graph_id: &GraphId) -> Result<()> {
        self.graphs
            .write()
            .await
            .remove(graph_id)
            .map(|_| ())
            .ok_or_else(|| graph_not_found(graph_id))
    }

    async fn list_nodes(&self, graph_id: &GraphId) -> Result<Vec<ThoughtNode>> {
        self.graphs
            .read()
            .await
            .get(graph_id)
            .map(|stored| stored.nodes.clone())
            .ok_or_else(|| graph_not_found(graph_id))
    }

    async fn create_node(&self, graph_id: &GraphId, node: NewThoughtNode) -> Result<ThoughtNode> {
        let mut graphs = self.graphs.write().await;
        let stored = graphs
            .get_mut(graph_id)
            .ok_or_else(|| graph_not_found(graph_id))?;
        let node = node.into_node();
        if stored.has_node(&node.id) {
            return Err(LibError::invalid_with_code(
                "duplicate_node_id",
                "Node ID already exists in graph",
                anyhow!("duplicate node id {} in graph {}", node.id, graph_id),
            ));
        }
        stored.nodes.push(node.clone());
        stored.touch();
        Ok(node)
    }

    async fn update_node(
        &self,
        graph_id: &GraphId,
        node_id: &NodeId,
        patch: NodePatch,
    ) -> Result<ThoughtNode> {
        let mut graphs = self.graphs.write().await;
        let stored = graphs
            .get_mut(graph_id)
            .ok_or_else(|| graph_not_found(graph_id))?;
        let node = stored
            .nodes
            .iter_mut()
            .find(|node| node.id == *node_id)
            .ok_or_else(|| node_not_found(graph_id, node_id))?;
        node.apply(&patch);
        let updated = node.clone();
        stored.touch();
        Ok(updated)
    }

    async fn delete_node(&self, graph_id: &GraphId, node_id: &NodeId) -> Result<()> {
        let mut graphs = self.graphs.write().await;
        let stored = graphs
            .get_mut(graph_id)
            .ok_or_else(|| graph_not_found(graph_id))?;
        if !stored.has_node(node_id) {
            return Err(node_not_found(graph_id, node_id));
        }
        stored.nodes.retain(|node| node.id != *node_id);
        stored.edges.retain(|edge| !edge.touches(node_id));
        stored.touch();
        Ok(())
    }

    async fn list_edges(&self, graph_id: &GraphId) -> Result<Vec<ThoughtEdge>> {
        self.graphs
            .read()
            .await
            .get(graph_id)
            .map(|stored| stored.edges.clone())
            .ok_or_else(|| graph_not_found(graph_id))
    }

    async fn create_edge(&self, graph_id: &GraphId, edge: NewThoughtEdge) -> Result<ThoughtEdge> {
        let mut graphs = self.graphs.write().await;
        let stored = graphs
            .get_mut(graph_id)
            .ok_or_else(|| graph_not_found(graph_id))?;
        let edge = edge.into_edge();
        for node_id in [&edge.source, &edge.target] {
            if !stored.has_node(node_id) {
                return Err(LibError::invalid_reference(
                    "Edge endpoint node not found",
                    anyhow!("edge {} references missing node {}", edge.id, node_id),
                ));
            }
        }
        if stored.edges.iter().any(|existing| existing.id == edge.id) {
            return Err(LibError::invalid_with_code(
                "duplicate_edge_id",
                "Edge ID already exists in graph",
                anyhow!("duplicate edge id {} in graph {}", edge.id, graph_id),
            ));
        }
        stored.edges.push(edge.clone());
        stored.touch();
        Ok(edge)
    }

    async fn delete_edge(&self, graph_id: &GraphId, edge_id: &EdgeId) -> Result<()> {
        let mut graphs = self.graphs.write().await;
        let stored = graphs
            .get_mut(graph_id)
            .ok_or_else(|| graph_not_found(graph_id))?;
        let before = stored.edges.len();
        stored.edges.retain(|edge| edge.id != *edge_id);
        if stored.edges.len() == before {
            return Err(LibError::not_found(
                "Edge not found",
                anyhow!("edge {} not found in graph {}", edge_id, graph_id),
            ));
        }
        stored.touch();
        Ok(())
    }
}

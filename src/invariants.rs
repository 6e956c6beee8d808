use std::collections::HashSet;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::error::{LibError, Result};
use crate::models::{EdgeId, NodeId, ThoughtEdge, ThoughtNode, node_id_set};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphInvariantViolation {
    DuplicateNodeId {
        node_id: NodeId,
    },
    DuplicateEdgeId {
        edge_id: EdgeId,
    },
    DanglingEdge {
        edge_id: EdgeId,
        source: NodeId,
        target: NodeId,
        missing_node_id: NodeId,
    },
}

impl GraphInvariantViolation {
    pub const fn error_code(&self) -> &'static str {
        match self {
            GraphInvariantViolation::DuplicateNodeId { .. } => "graph_duplicate_node_id",
            GraphInvariantViolation::DuplicateEdgeId { .. } => "graph_duplicate_edge_id",
            GraphInvariantViolation::DanglingEdge { .. } => "graph_dangling_edge",
        }
    }

    pub const fn public_message(&self) -> &'static str {
        match self {
            GraphInvariantViolation::DuplicateNodeId { .. } => {
                "Node IDs must be unique within a graph"
            }
            GraphInvariantViolation::DuplicateEdgeId { .. } => {
                "Edge IDs must be unique within a graph"
            }
            GraphInvariantViolation::DanglingEdge { .. } => {
                "Edge references a node that does not exist"
            }
        }
    }
}

pub fn graph_invariant_violations(
    nodes: &[ThoughtNode],
    edges: &[ThoughtEdge],
) -> Vec<GraphInvariantViolation> {
    let mut violations = Vec::new();

    let mut seen_nodes = HashSet::with_capacity(nodes.len());
    for node in nodes {
        if !seen_nodes.insert(&node.id) {
            violations.push(GraphInvariantViolation::DuplicateNodeId {
                node_id: node.id.clone(),
            });
        }
    }

    let node_ids = node_id_set(nodes);
    let mut seen_edges = HashSet::with_capacity(edges.len());
    for edge in edges {
        if !seen_edges.insert(&edge.id) {
            violations.push(GraphInvariantViolation::DuplicateEdgeId {
                edge_id: edge.id.clone(),
            });
        }

        let missing = if !node_ids.contains(&edge.source) {
            Some(&edge.source)
        } else if !node_ids.contains(&edge.target) {
            Some(&edge.target)
        } else {
            None
        };
        if let Some(missing) = missing {
            violations.push(GraphInvariantViolation::DanglingEdge {
                edge_id: edge.id.clone(),
                source: edge.source.clone(),
                target: edge.target.clone(),
                missing_node_id: missing.clone(),
            });
        }
    }

    violations
}

pub fn ensure_graph_invariants(nodes: &[ThoughtNode], edges: &[ThoughtEdge]) -> Result<()> {
    let violations = graph_invariant_violations(nodes, edges);
    if let Some(first) = violations.first() {
        let source = anyhow!("graph invariant validation failed: {:?}", violations);
        return Err(match first {
            GraphInvariantViolation::DanglingEdge { .. } => LibError::invalid_reference_with_code(
                first.error_code(),
                first.public_message(),
                source,
            ),
            _ => LibError::invalid_with_code(first.error_code(), first.public_message(), source),
        });
    }

    Ok(())
}

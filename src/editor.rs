//! In-memory thought-graph editing engine.
//!
//! The editor owns the node and edge sets of one graph, the single selection and
//! the outbox of mutations still to be sent to the service. Every operation is
//! applied synchronously and either completes fully or leaves state untouched.

use std::collections::HashSet;

use anyhow::anyhow;
use serde::Serialize;

use crate::error::{LibError, Result};
use crate::invariants;
use crate::models::{
    EdgeId, GraphId, NodeId, NodeKind, NodePatch, Position, ThoughtEdge, ThoughtGraph,
    ThoughtNode,
};
use crate::sync::{GraphMutation, SyncQueue};

/// Offset applied to a duplicated node so it never sits exactly on the original.
pub const DUPLICATE_OFFSET: Position = Position::new(50.0, 50.0);
/// Where unlinked new nodes are placed.
pub const DEFAULT_NODE_POSITION: Position = Position::new(300.0, 200.0);
pub const CHILD_ROW_SPACING: f64 = 100.0;
pub const CHILD_COLUMN_SPACING: f64 = 150.0;
pub const DEFAULT_NODE_CONTENT: &str = "Click to edit content";

/// Numeric ids at or above this value are kept but do not advance the counter.
const MAX_SEEDED_NODE_ID: u64 = 1 << 53;

#[derive(Debug, Default)]
struct IdAllocator {
    next_node: u64,
    issued_nodes: HashSet<NodeId>,
    issued_edges: HashSet<EdgeId>,
}

impl IdAllocator {
    fn seeded(nodes: &[ThoughtNode], edges: &[ThoughtEdge]) -> Self {
        let mut ids = Self {
            next_node: 1,
            ..Self::default()
        };
        ids.observe(nodes, edges);
        ids
    }

    /// Remember ids coming from outside so they are never handed out again.
    fn observe(&mut self, nodes: &[ThoughtNode], edges: &[ThoughtEdge]) {
        for node in nodes {
            if let Ok(numeric) = node.id.as_str().parse::<u64>() {
                if numeric < MAX_SEEDED_NODE_ID {
                    self.next_node = self.next_node.max(numeric + 1);
                }
            }
            self.issued_nodes.insert(node.id.clone());
        }
        for edge in edges {
            self.issued_edges.insert(edge.id.clone());
        }
    }

    fn node_id(&mut self) -> NodeId {
        loop {
            let candidate = match self.next_node.checked_add(1) {
                Some(next) => {
                    let numeric = NodeId(self.next_node.to_string());
                    self.next_node = next;
                    numeric
                }
                // counter exhausted
                None => NodeId::generate(),
            };
            if self.issued_nodes.insert(candidate.clone()) {
                return candidate;
            }
        }
    }

    fn edge_id(&mut self, source: &NodeId, target: &NodeId) -> EdgeId {
        let base = format!("e{}-{}", source, target);
        let mut candidate = EdgeId(base.clone());
        let mut suffix = 2u64;
        while !self.issued_edges.insert(candidate.clone()) {
            candidate = EdgeId(format!("{}-{}", base, suffix));
            suffix += 1;
        }
        candidate
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRemoval {
    pub node: ThoughtNode,
    pub edges: Vec<ThoughtEdge>,
    pub was_selected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionDirection {
    /// The other node points at this one.
    Parent,
    /// This node points at the other one.
    Child,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Connection<'a> {
    pub edge: &'a ThoughtEdge,
    pub other: &'a ThoughtNode,
    pub direction: ConnectionDirection,
}

#[derive(Debug)]
pub struct GraphEditor {
    graph_id: GraphId,
    nodes: Vec<ThoughtNode>,
    edges: Vec<ThoughtEdge>,
    selection: Option<NodeId>,
    ids: IdAllocator,
    sync: SyncQueue,
}

impl GraphEditor {
    pub fn new(graph_id: GraphId) -> Self {
        Self {
            graph_id,
            nodes: Vec::new(),
            edges: Vec::new(),
            selection: None,
            ids: IdAllocator::seeded(&[], &[]),
            sync: SyncQueue::new(),
        }
    }

    /// Build an editor over existing contents. Nothing is queued for sync.
    pub fn from_parts(
        graph_id: GraphId,
        nodes: Vec<ThoughtNode>,
        edges: Vec<ThoughtEdge>,
    ) -> Result<Self> {
        invariants::ensure_graph_invariants(&nodes, &edges)?;
        let ids = IdAllocator::seeded(&nodes, &edges);
        Ok(Self {
            graph_id,
            nodes,
            edges,
            selection: None,
            ids,
            sync: SyncQueue::new(),
        })
    }

    pub fn from_snapshot(graph: ThoughtGraph) -> Result<Self> {
        Self::from_parts(graph.id, graph.nodes, graph.edges)
    }

    /// Swap in freshly fetched contents, keeping the selection when its node survives.
    pub fn replace_contents(
        &mut self,
        nodes: Vec<ThoughtNode>,
        edges: Vec<ThoughtEdge>,
    ) -> Result<()> {
        invariants::ensure_graph_invariants(&nodes, &edges)?;
        self.ids.observe(&nodes, &edges);
        self.nodes = nodes;
        self.edges = edges;
        if self
            .selection
            .as_ref()
            .is_some_and(|selected| self.node_index(selected).is_none())
        {
            self.selection = None;
        }
        Ok(())
    }

    pub fn graph_id(&self) -> &GraphId {
        &self.graph_id
    }

    pub fn nodes(&self) -> &[ThoughtNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[ThoughtEdge] {
        &self.edges
    }

    pub fn node(&self, node_id: &NodeId) -> Option<&ThoughtNode> {
        self.nodes.iter().find(|node| node.id == *node_id)
    }

    pub fn edge(&self, edge_id: &EdgeId) -> Option<&ThoughtEdge> {
        self.edges.iter().find(|edge| edge.id == *edge_id)
    }

    pub fn selection(&self) -> Option<&NodeId> {
        self.selection.as_ref()
    }

    pub fn selected_node(&self) -> Option<&ThoughtNode> {
        self.selection.as_ref().and_then(|id| self.node(id))
    }

    pub fn sync_queue(&self) -> &SyncQueue {
        &self.sync
    }

    pub fn sync_queue_mut(&mut self) -> &mut SyncQueue {
        &mut self.sync
    }

    /// Add a `child` node. With `link_to_selection` and a selected node, the new node
    /// is placed under it and linked from it.
    pub fn create_node(&mut self, link_to_selection: bool) -> ThoughtNode {
        let parent = if link_to_selection {
            self.selected_node().map(|node| {
                let siblings = self
                    .edges
                    .iter()
                    .filter(|edge| edge.source == node.id)
                    .count();
                (node.id.clone(), node.position, siblings)
            })
        } else {
            None
        };

        let id = self.ids.node_id();
        let position = match &parent {
            Some((_, origin, siblings)) => {
                origin.offset(CHILD_COLUMN_SPACING * *siblings as f64, CHILD_ROW_SPACING)
            }
            None => DEFAULT_NODE_POSITION,
        };
        let node = ThoughtNode {
            label: format!("Node {}", id),
            id,
            kind: NodeKind::default(),
            content: DEFAULT_NODE_CONTENT.to_string(),
            position,
        };

        tracing::debug!(graph_id = %self.graph_id, node_id = %node.id, "created node");
        self.nodes.push(node.clone());
        self.sync.record(GraphMutation::CreateNode { node: node.clone() });

        if let Some((parent_id, _, _)) = parent {
            self.insert_edge(parent_id, node.id.clone());
        }

        node
    }

    /// Add an edge. Parallel edges between the same pair are kept as separate edges.
    pub fn connect(&mut self, source: &NodeId, target: &NodeId) -> Result<ThoughtEdge> {
        for (end, node_id) in [("source", source), ("target", target)] {
            if self.node_index(node_id).is_none() {
                return Err(LibError::invalid_reference(
                    "Edge endpoint node not found",
                    anyhow!("missing {} node {} in graph {}", end, node_id, self.graph_id),
                ));
            }
        }

        Ok(self.insert_edge(source.clone(), target.clone()))
    }

    /// Returns whether the id resolved. Unknown ids leave the selection as it was.
    pub fn select_node(&mut self, node_id: &NodeId) -> bool {
        if self.node_index(node_id).is_none() {
            return false;
        }
        self.selection = Some(node_id.clone());
        true
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    pub fn update_node_attributes(
        &mut self,
        node_id: &NodeId,
        patch: NodePatch,
    ) -> Result<ThoughtNode> {
        let index = self.require_node(node_id)?;
        if patch.is_empty() {
            return Ok(self.nodes[index].clone());
        }

        self.nodes[index].apply(&patch);
        let updated = self.nodes[index].clone();
        tracing::debug!(graph_id = %self.graph_id, node_id = %node_id, "updated node");
        self.sync.record(GraphMutation::UpdateNode {
            node_id: node_id.clone(),
            patch,
        });
        Ok(updated)
    }

    /// Drag: only the position changes.
    pub fn move_node(&mut self, node_id: &NodeId, position: Position) -> Result<ThoughtNode> {
        self.update_node_attributes(node_id, NodePatch::position(position))
    }

    /// Copy kind, label and content into a new, unconnected node.
    pub fn duplicate_node(&mut self, node_id: &NodeId) -> Result<ThoughtNode> {
        let index = self.require_node(node_id)?;
        let original = &self.nodes[index];
        let copy = ThoughtNode {
            id: self.ids.node_id(),
            kind: original.kind,
            label: original.label.clone(),
            content: original.content.clone(),
            position: original
                .position
                .offset(DUPLICATE_OFFSET.x, DUPLICATE_OFFSET.y),
        };

        tracing::debug!(
            graph_id = %self.graph_id,
            node_id = %copy.id,
            original = %node_id,
            "duplicated node"
        );
        self.nodes.push(copy.clone());
        self.sync.record(GraphMutation::CreateNode { node: copy.clone() });
        Ok(copy)
    }

    /// Remove a node and every edge touching it. Unknown ids are ignored.
    pub fn delete_node(&mut self, node_id: &NodeId) -> Option<NodeRemoval> {
        let index = self.node_index(node_id)?;
        let node = self.nodes.remove(index);

        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.edges)
            .into_iter()
            .partition(|edge| edge.touches(node_id));
        self.edges = kept;

        let was_selected = self.selection.as_ref() == Some(node_id);
        if was_selected {
            self.selection = None;
        }

        for edge in &removed {
            self.sync.record(GraphMutation::DeleteEdge {
                edge_id: edge.id.clone(),
            });
        }
        self.sync.record(GraphMutation::DeleteNode {
            node_id: node_id.clone(),
        });

        tracing::debug!(
            graph_id = %self.graph_id,
            node_id = %node_id,
            removed_edges = removed.len(),
            "deleted node"
        );
        Some(NodeRemoval {
            node,
            edges: removed,
            was_selected,
        })
    }

    pub fn delete_edge(&mut self, edge_id: &EdgeId) -> Option<ThoughtEdge> {
        let index = self.edges.iter().position(|edge| edge.id == *edge_id)?;
        let edge = self.edges.remove(index);
        self.sync.record(GraphMutation::DeleteEdge {
            edge_id: edge_id.clone(),
        });
        tracing::debug!(graph_id = %self.graph_id, edge_id = %edge_id, "deleted edge");
        Some(edge)
    }

    pub fn duplicate_selected(&mut self) -> Option<ThoughtNode> {
        let selected = self.selection.clone()?;
        self.duplicate_node(&selected).ok()
    }

    pub fn delete_selected(&mut self) -> Option<NodeRemoval> {
        let selected = self.selection.clone()?;
        self.delete_node(&selected)
    }

    /// Edges touching `node_id`, each paired with the node at the other end.
    pub fn connections(&self, node_id: &NodeId) -> Vec<Connection<'_>> {
        self.edges
            .iter()
            .filter_map(|edge| {
                let (other_id, direction) = if edge.source == *node_id {
                    (&edge.target, ConnectionDirection::Child)
                } else if edge.target == *node_id {
                    (&edge.source, ConnectionDirection::Parent)
                } else {
                    return None;
                };
                let other = self.node(other_id)?;
                Some(Connection {
                    edge,
                    other,
                    direction,
                })
            })
            .collect()
    }

    fn insert_edge(&mut self, source: NodeId, target: NodeId) -> ThoughtEdge {
        let edge = ThoughtEdge::new(self.ids.edge_id(&source, &target), source, target);
        tracing::debug!(
            graph_id = %self.graph_id,
            edge_id = %edge.id,
            source = %edge.source,
            target = %edge.target,
            "connected nodes"
        );
        self.edges.push(edge.clone());
        self.sync.record(GraphMutation::CreateEdge { edge: edge.clone() });
        edge
    }

    fn node_index(&self, node_id: &NodeId) -> Option<usize> {
        self.nodes.iter().position(|node| node.id == *node_id)
    }

    fn require_node(&self, node_id: &NodeId) -> Result<usize> {
        self.node_index(node_id).ok_or_else(|| {
            LibError::invalid_reference(
                "Node not found",
                anyhow!("node {} not found in graph {}", node_id, self.graph_id),
            )
        })
    }
}

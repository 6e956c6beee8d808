use serde::{Deserialize, Serialize};

use crate::editor::GraphEditor;
use crate::error::Result;
use crate::models::{EdgeId, NodeId, NodePatch, Position, ThoughtEdge, ThoughtNode};

/// Editing actions as delivered by the canvas event loop.
///
/// Each command runs to completion before the next one is taken, so commands apply
/// in exactly the order they are executed.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum EditorCommand {
    CreateNode {
        #[serde(default = "link_to_selection_default")]
        link_to_selection: bool,
    },
    Connect {
        source: NodeId,
        target: NodeId,
    },
    SelectNode {
        node_id: NodeId,
    },
    ClearSelection,
    UpdateNode {
        node_id: NodeId,
        patch: NodePatch,
    },
    MoveNode {
        node_id: NodeId,
        position: Position,
    },
    DuplicateNode {
        node_id: NodeId,
    },
    DeleteNode {
        node_id: NodeId,
    },
    DeleteEdge {
        edge_id: EdgeId,
    },
    DuplicateSelected,
    DeleteSelected,
}

const fn link_to_selection_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum EditorOutcome {
    Node {
        node: ThoughtNode,
    },
    Edge {
        edge: ThoughtEdge,
    },
    Selection {
        node_id: Option<NodeId>,
    },
    NodeDeleted {
        node_id: NodeId,
        removed_edge_ids: Vec<EdgeId>,
    },
    EdgeDeleted {
        edge_id: EdgeId,
    },
    Unchanged,
}

impl GraphEditor {
    pub fn execute(&mut self, command: EditorCommand) -> Result<EditorOutcome> {
        match command {
            EditorCommand::CreateNode { link_to_selection } => {
                let node = self.create_node(link_to_selection);
                Ok(EditorOutcome::Node { node })
            }
            EditorCommand::Connect { source, target } => {
                let edge = self.connect(&source, &target)?;
                Ok(EditorOutcome::Edge { edge })
            }
            EditorCommand::SelectNode { node_id } => {
                if self.select_node(&node_id) {
                    Ok(EditorOutcome::Selection {
                        node_id: Some(node_id),
                    })
                } else {
                    Ok(EditorOutcome::Unchanged)
                }
            }
            EditorCommand::ClearSelection => {
                self.clear_selection();
                Ok(EditorOutcome::Selection { node_id: None })
            }
            EditorCommand::UpdateNode { node_id, patch } => {
                let node = self.update_node_attributes(&node_id, patch)?;
                Ok(EditorOutcome::Node { node })
            }
            EditorCommand::MoveNode { node_id, position } => {
                let node = self.move_node(&node_id, position)?;
                Ok(EditorOutcome::Node { node })
            }
            EditorCommand::DuplicateNode { node_id } => {
                let node = self.duplicate_node(&node_id)?;
                Ok(EditorOutcome::Node { node })
            }
            EditorCommand::DeleteNode { node_id } => Ok(self
                .delete_node(&node_id)
                .map_or(EditorOutcome::Unchanged, removal_outcome)),
            EditorCommand::DeleteEdge { edge_id } => Ok(self
                .delete_edge(&edge_id)
                .map_or(EditorOutcome::Unchanged, |edge| EditorOutcome::EdgeDeleted {
                    edge_id: edge.id,
                })),
            EditorCommand::DuplicateSelected => Ok(self
                .duplicate_selected()
                .map_or(EditorOutcome::Unchanged, |node| EditorOutcome::Node { node })),
            EditorCommand::DeleteSelected => Ok(self
                .delete_selected()
                .map_or(EditorOutcome::Unchanged, removal_outcome)),
        }
    }
}

fn removal_outcome(removal: crate::editor::NodeRemoval) -> EditorOutcome {
    EditorOutcome::NodeDeleted {
        node_id: removal.node.id,
        removed_edge_ids: removal.edges.into_iter().map(|edge| edge.id).collect(),
    }
}

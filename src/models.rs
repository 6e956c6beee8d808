use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LibError, Result};
use crate::invariants;

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(GraphId);
string_id!(NodeId);
string_id!(EdgeId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Main,
    Question,
    Idea,
    Note,
    #[default]
    Child,
}

impl NodeKind {
    /// Menu order used by the attribute editor.
    pub const ALL: [NodeKind; 5] = [
        NodeKind::Main,
        NodeKind::Child,
        NodeKind::Question,
        NodeKind::Idea,
        NodeKind::Note,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            NodeKind::Main => "main",
            NodeKind::Question => "question",
            NodeKind::Idea => "idea",
            NodeKind::Note => "note",
            NodeKind::Child => "child",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = LibError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "main" => Ok(NodeKind::Main),
            "question" => Ok(NodeKind::Question),
            "idea" => Ok(NodeKind::Idea),
            "note" => Ok(NodeKind::Note),
            "child" => Ok(NodeKind::Child),
            _ => Err(LibError::invalid_with_code(
                "unknown_node_kind",
                "Unknown node kind",
                anyhow!("unknown node kind '{}'", s),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThoughtNode {
    pub id: NodeId,
    #[serde(default)]
    pub kind: NodeKind,
    pub label: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub position: Position,
}

impl ThoughtNode {
    /// Merge a patch into the node. `id` is never touched.
    pub fn apply(&mut self, patch: &NodePatch) {
        if let Some(kind) = patch.kind {
            self.kind = kind;
        }
        if let Some(label) = &patch.label {
            self.label = label.clone();
        }
        if let Some(content) = &patch.content {
            self.content = content.clone();
        }
        if let Some(position) = patch.position {
            self.position = position;
        }
    }
}

/// How the source thought bears on the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EdgeRelation {
    Supports,
    Challenges,
    #[default]
    Relates,
}

impl EdgeRelation {
    pub const fn as_str(self) -> &'static str {
        match self {
            EdgeRelation::Supports => "supports",
            EdgeRelation::Challenges => "challenges",
            EdgeRelation::Relates => "relates",
        }
    }
}

impl fmt::Display for EdgeRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EdgeRelation {
    type Err = LibError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "supports" => Ok(EdgeRelation::Supports),
            "challenges" => Ok(EdgeRelation::Challenges),
            "relates" => Ok(EdgeRelation::Relates),
            _ => Err(LibError::invalid_with_code(
                "unknown_edge_relation",
                "Unknown edge relation",
                anyhow!("unknown edge relation '{}'", s),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThoughtEdge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default)]
    pub relation: EdgeRelation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl ThoughtEdge {
    /// Plain `relates` edge without a label.
    pub fn new(id: EdgeId, source: NodeId, target: NodeId) -> Self {
        Self {
            id,
            source,
            target,
            relation: EdgeRelation::default(),
            label: None,
        }
    }

    pub fn touches(&self, node_id: &NodeId) -> bool {
        self.source == *node_id || self.target == *node_id
    }
}

/// Partial node update. Absent fields are left as they are.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<NodeKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl NodePatch {
    pub fn kind(kind: NodeKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    pub fn label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::default()
        }
    }

    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn position(position: Position) -> Self {
        Self {
            position: Some(position),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.kind.is_none()
            && self.label.is_none()
            && self.content.is_none()
            && self.position.is_none()
    }

    /// Later fields win.
    pub fn merge(&mut self, newer: NodePatch) {
        if newer.kind.is_some() {
            self.kind = newer.kind;
        }
        if newer.label.is_some() {
            self.label = newer.label;
        }
        if newer.content.is_some() {
            self.content = newer.content;
        }
        if newer.position.is_some() {
            self.position = newer.position;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThoughtGraph {
    pub id: GraphId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub nodes: Vec<ThoughtNode>,
    pub edges: Vec<ThoughtEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSummary {
    pub id: GraphId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub node_count: i64,
    pub edge_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paged<T> {
    pub page: u32,
    pub limit: u32,
    /// Number of items across all pages.
    #[serde(default)]
    pub total: u64,
    pub items: Vec<T>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListGraphsQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl ListGraphsQuery {
    pub fn pagination(&self) -> (u32, u32) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(25).clamp(1, 200);
        (page, limit)
    }
}

/// Node as sent to the service. A missing id asks the service to assign one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewThoughtNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<NodeId>,
    #[serde(default)]
    pub kind: NodeKind,
    pub label: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub position: Position,
}

impl From<ThoughtNode> for NewThoughtNode {
    fn from(node: ThoughtNode) -> Self {
        Self {
            id: Some(node.id),
            kind: node.kind,
            label: node.label,
            content: node.content,
            position: node.position,
        }
    }
}

impl NewThoughtNode {
    pub fn into_node(self) -> ThoughtNode {
        ThoughtNode {
            id: self.id.unwrap_or_else(NodeId::generate),
            kind: self.kind,
            label: self.label,
            content: self.content,
            position: self.position,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewThoughtEdge {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EdgeId>,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default)]
    pub relation: EdgeRelation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl From<ThoughtEdge> for NewThoughtEdge {
    fn from(edge: ThoughtEdge) -> Self {
        Self {
            id: Some(edge.id),
            source: edge.source,
            target: edge.target,
            relation: edge.relation,
            label: edge.label,
        }
    }
}

impl NewThoughtEdge {
    pub fn between(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            id: None,
            source: source.into(),
            target: target.into(),
            relation: EdgeRelation::default(),
            label: None,
        }
    }

    pub fn into_edge(self) -> ThoughtEdge {
        ThoughtEdge {
            id: self.id.unwrap_or_else(EdgeId::generate),
            source: self.source,
            target: self.target,
            relation: self.relation,
            label: self
                .label
                .map(|label| label.trim().to_string())
                .filter(|label| !label.is_empty()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGraphPayload {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub nodes: Vec<NewThoughtNode>,
    #[serde(default)]
    pub edges: Vec<NewThoughtEdge>,
}

impl CreateGraphPayload {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn normalize(self) -> Result<GraphDefinition> {
        let title = normalize_title(self.title)?;
        let nodes = self
            .nodes
            .into_iter()
            .map(NewThoughtNode::into_node)
            .collect::<Vec<_>>();
        let edges = self
            .edges
            .into_iter()
            .map(NewThoughtEdge::into_edge)
            .collect::<Vec<_>>();
        invariants::ensure_graph_invariants(&nodes, &edges)?;

        Ok(GraphDefinition {
            title,
            description: normalize_description(self.description),
            nodes,
            edges,
        })
    }
}

/// Metadata update for a graph. Contents are edited through the node and edge routes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGraphPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl UpdateGraphPayload {
    pub fn normalize(self) -> Result<UpdateGraphPayload> {
        let title = self.title.map(normalize_title).transpose()?;
        Ok(UpdateGraphPayload {
            title,
            description: self.description,
        })
    }
}

#[derive(Debug, Clone)]
pub struct GraphDefinition {
    pub title: String,
    pub description: Option<String>,
    pub nodes: Vec<ThoughtNode>,
    pub edges: Vec<ThoughtEdge>,
}

fn normalize_title(title: String) -> Result<String> {
    let title = title.trim().to_string();
    if title.is_empty() {
        return Err(LibError::invalid(
            "Graph title is required",
            anyhow!("empty graph title"),
        ));
    }
    Ok(title)
}

fn normalize_description(description: Option<String>) -> Option<String> {
    description
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Ids referenced by a node set, for callers that need repeated membership checks.
pub fn node_id_set(nodes: &[ThoughtNode]) -> HashSet<&NodeId> {
    nodes.iter().map(|node| &node.id).collect()
}

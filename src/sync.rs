//! Outbox of local mutations waiting to be sent to the graph service.
//!
//! Every recorded mutation gets a sequence number, and the queue remembers the
//! newest sequence per entity. A completion for an older sequence means the
//! entity changed again locally while the call was in flight, so its result is
//! discarded instead of applied.

use std::collections::{HashMap, VecDeque};

use serde::Serialize;

use crate::models::{EdgeId, NodeId, NodePatch, ThoughtEdge, ThoughtNode};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "entity", content = "id", rename_all = "snake_case")]
pub enum EntityKey {
    Node(NodeId),
    Edge(EdgeId),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mutation", rename_all = "snake_case")]
pub enum GraphMutation {
    CreateNode { node: ThoughtNode },
    UpdateNode { node_id: NodeId, patch: NodePatch },
    DeleteNode { node_id: NodeId },
    CreateEdge { edge: ThoughtEdge },
    DeleteEdge { edge_id: EdgeId },
}

impl GraphMutation {
    pub fn entity(&self) -> EntityKey {
        match self {
            GraphMutation::CreateNode { node } => EntityKey::Node(node.id.clone()),
            GraphMutation::UpdateNode { node_id, .. } | GraphMutation::DeleteNode { node_id } => {
                EntityKey::Node(node_id.clone())
            }
            GraphMutation::CreateEdge { edge } => EntityKey::Edge(edge.id.clone()),
            GraphMutation::DeleteEdge { edge_id } => EntityKey::Edge(edge_id.clone()),
        }
    }

    pub const fn is_create(&self) -> bool {
        matches!(
            self,
            GraphMutation::CreateNode { .. } | GraphMutation::CreateEdge { .. }
        )
    }

    pub const fn is_delete(&self) -> bool {
        matches!(
            self,
            GraphMutation::DeleteNode { .. } | GraphMutation::DeleteEdge { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingMutation {
    pub seq: u64,
    pub mutation: GraphMutation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Acknowledged,
    /// A newer local mutation of the same entity exists; the result was ignored.
    Superseded,
}

#[derive(Debug, Default)]
pub struct SyncQueue {
    next_seq: u64,
    pending: VecDeque<PendingMutation>,
    in_flight: Option<(u64, EntityKey)>,
    latest: HashMap<EntityKey, u64>,
    acknowledged: HashMap<EntityKey, u64>,
}

impl SyncQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mutations recorded so far, including ones folded into earlier entries.
    pub fn revision(&self) -> u64 {
        self.next_seq
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Nothing pending and nothing in flight.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.in_flight.is_none()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn pending(&self) -> impl Iterator<Item = &PendingMutation> {
        self.pending.iter()
    }

    pub fn is_synced(&self, key: &EntityKey) -> bool {
        match self.latest.get(key) {
            Some(latest) => self.acknowledged.get(key) == Some(latest),
            None => true,
        }
    }

    pub fn record(&mut self, mutation: GraphMutation) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let key = mutation.entity();

        match mutation {
            GraphMutation::UpdateNode { node_id, patch } => {
                if let Some(entry) = self.pending_entry_for(&key) {
                    match &mut entry.mutation {
                        GraphMutation::CreateNode { node } => {
                            node.apply(&patch);
                            entry.seq = seq;
                            self.latest.insert(key, seq);
                            return;
                        }
                        GraphMutation::UpdateNode { patch: queued, .. } => {
                            queued.merge(patch);
                            entry.seq = seq;
                            self.latest.insert(key, seq);
                            return;
                        }
                        _ => {}
                    }
                }
                self.push(seq, key, GraphMutation::UpdateNode { node_id, patch });
            }
            mutation if mutation.is_delete() => {
                let unsent_create = self
                    .pending
                    .iter()
                    .any(|entry| entry.mutation.is_create() && entry.mutation.entity() == key);
                if unsent_create {
                    self.pending.retain(|entry| entry.mutation.entity() != key);
                    self.latest.remove(&key);
                    self.acknowledged.remove(&key);
                    return;
                }
                self.push(seq, key, mutation);
            }
            mutation => self.push(seq, key, mutation),
        }
    }

    /// Take the next mutation to send. Returns `None` while another one is in flight.
    pub fn begin_next(&mut self) -> Option<PendingMutation> {
        if self.in_flight.is_some() {
            return None;
        }
        let next = self.pending.pop_front()?;
        self.in_flight = Some((next.seq, next.mutation.entity()));
        Some(next)
    }

    pub fn complete(&mut self, sent: &PendingMutation) -> Completion {
        self.in_flight = None;
        let key = sent.mutation.entity();
        if self.latest.get(&key) != Some(&sent.seq) {
            return Completion::Superseded;
        }

        if sent.mutation.is_delete() {
            self.latest.remove(&key);
            self.acknowledged.remove(&key);
        } else {
            self.acknowledged.insert(key, sent.seq);
        }
        Completion::Acknowledged
    }

    /// Put a failed mutation back at the head of the queue.
    pub fn fail(&mut self, sent: PendingMutation) {
        self.in_flight = None;
        self.pending.push_front(sent);
    }

    /// Drop a mutation the service refused for good. The entity counts as settled
    /// unless it has changed again since.
    pub fn reject(&mut self, sent: &PendingMutation) {
        self.in_flight = None;
        let key = sent.mutation.entity();
        if self.latest.get(&key) == Some(&sent.seq) {
            self.latest.remove(&key);
            self.acknowledged.remove(&key);
        }
    }

    fn push(&mut self, seq: u64, key: EntityKey, mutation: GraphMutation) {
        self.latest.insert(key, seq);
        self.pending.push_back(PendingMutation { seq, mutation });
    }

    /// The most recent unsent entry for `key`, if nothing else for that entity follows it.
    fn pending_entry_for(&mut self, key: &EntityKey) -> Option<&mut PendingMutation> {
        self.pending
            .iter_mut()
            .rev()
            .find(|entry| entry.mutation.entity() == *key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NodeKind, Position};

    fn node(id: &str) -> ThoughtNode {
        ThoughtNode {
            id: NodeId::from(id),
            kind: NodeKind::Child,
            label: format!("Node {id}"),
            content: String::new(),
            position: Position::default(),
        }
    }

    fn edge(id: &str, source: &str, target: &str) -> ThoughtEdge {
        ThoughtEdge::new(EdgeId::from(id), NodeId::from(source), NodeId::from(target))
    }

    #[test]
    fn mutations_leave_in_recorded_order() {
        let mut queue = SyncQueue::new();
        queue.record(GraphMutation::CreateNode { node: node("1") });
        queue.record(GraphMutation::CreateNode { node: node("2") });
        queue.record(GraphMutation::CreateEdge {
            edge: edge("e1-2", "1", "2"),
        });

        let order = std::iter::from_fn(|| {
            let next = queue.begin_next()?;
            queue.complete(&next);
            Some(next.mutation.entity())
        })
        .collect::<Vec<_>>();

        assert_eq!(
            order,
            vec![
                EntityKey::Node(NodeId::from("1")),
                EntityKey::Node(NodeId::from("2")),
                EntityKey::Edge(EdgeId::from("e1-2")),
            ]
        );
        assert!(queue.is_idle());
    }

    #[test]
    fn only_one_mutation_is_in_flight() {
        let mut queue = SyncQueue::new();
        queue.record(GraphMutation::CreateNode { node: node("1") });
        queue.record(GraphMutation::CreateNode { node: node("2") });

        let first = queue.begin_next().expect("first mutation");
        assert!(queue.begin_next().is_none());
        assert_eq!(queue.complete(&first), Completion::Acknowledged);
        assert!(queue.begin_next().is_some());
    }

    #[test]
    fn update_before_send_folds_into_create() {
        let mut queue = SyncQueue::new();
        queue.record(GraphMutation::CreateNode { node: node("1") });
        queue.record(GraphMutation::UpdateNode {
            node_id: NodeId::from("1"),
            patch: NodePatch::label("renamed"),
        });

        assert_eq!(queue.len(), 1);
        let sent = queue.begin_next().expect("create");
        assert!(matches!(
            &sent.mutation,
            GraphMutation::CreateNode { node } if node.label == "renamed"
        ));
        assert_eq!(queue.complete(&sent), Completion::Acknowledged);
        assert!(queue.is_synced(&EntityKey::Node(NodeId::from("1"))));
    }

    #[test]
    fn consecutive_updates_merge() {
        let mut queue = SyncQueue::new();
        queue.record(GraphMutation::UpdateNode {
            node_id: NodeId::from("1"),
            patch: NodePatch::label("a"),
        });
        queue.record(GraphMutation::UpdateNode {
            node_id: NodeId::from("1"),
            patch: NodePatch::kind(NodeKind::Idea),
        });

        assert_eq!(queue.len(), 1);
        let sent = queue.begin_next().expect("update");
        assert!(matches!(
            &sent.mutation,
            GraphMutation::UpdateNode { patch, .. }
                if patch.label.as_deref() == Some("a") && patch.kind == Some(NodeKind::Idea)
        ));
    }

    #[test]
    fn delete_of_unsent_create_cancels_both() {
        let mut queue = SyncQueue::new();
        queue.record(GraphMutation::CreateNode { node: node("1") });
        queue.record(GraphMutation::UpdateNode {
            node_id: NodeId::from("1"),
            patch: NodePatch::content("text"),
        });
        queue.record(GraphMutation::DeleteNode {
            node_id: NodeId::from("1"),
        });

        assert!(queue.is_empty());
        assert!(queue.is_synced(&EntityKey::Node(NodeId::from("1"))));
        assert_eq!(queue.revision(), 3);
    }

    #[test]
    fn delete_after_create_was_sent_is_queued() {
        let mut queue = SyncQueue::new();
        queue.record(GraphMutation::CreateNode { node: node("1") });
        let create = queue.begin_next().expect("create");
        queue.record(GraphMutation::DeleteNode {
            node_id: NodeId::from("1"),
        });

        assert_eq!(queue.complete(&create), Completion::Superseded);
        let delete = queue.begin_next().expect("delete");
        assert!(delete.mutation.is_delete());
        assert_eq!(queue.complete(&delete), Completion::Acknowledged);
        assert!(queue.is_idle());
    }

    #[test]
    fn update_while_in_flight_supersedes_the_completion() {
        let mut queue = SyncQueue::new();
        queue.record(GraphMutation::UpdateNode {
            node_id: NodeId::from("1"),
            patch: NodePatch::label("old"),
        });
        let first = queue.begin_next().expect("first update");
        queue.record(GraphMutation::UpdateNode {
            node_id: NodeId::from("1"),
            patch: NodePatch::label("new"),
        });

        assert_eq!(queue.complete(&first), Completion::Superseded);
        assert!(!queue.is_synced(&EntityKey::Node(NodeId::from("1"))));

        let second = queue.begin_next().expect("second update");
        assert_eq!(queue.complete(&second), Completion::Acknowledged);
        assert!(queue.is_synced(&EntityKey::Node(NodeId::from("1"))));
    }

    #[test]
    fn failed_mutation_returns_to_the_head() {
        let mut queue = SyncQueue::new();
        queue.record(GraphMutation::CreateNode { node: node("1") });
        queue.record(GraphMutation::CreateNode { node: node("2") });

        let first = queue.begin_next().expect("first");
        queue.fail(first.clone());

        assert!(!queue.is_busy());
        assert_eq!(queue.begin_next(), Some(first));
    }

    #[test]
    fn rejected_mutation_is_dropped() {
        let mut queue = SyncQueue::new();
        queue.record(GraphMutation::CreateEdge {
            edge: edge("e1-2", "1", "2"),
        });
        queue.record(GraphMutation::CreateNode { node: node("3") });

        let rejected = queue.begin_next().expect("edge create");
        queue.reject(&rejected);

        assert!(queue.is_synced(&EntityKey::Edge(EdgeId::from("e1-2"))));
        let next = queue.begin_next().expect("node create");
        assert_eq!(next.mutation.entity(), EntityKey::Node(NodeId::from("3")));
    }
}

use tokio::sync::Mutex;

use crate::editor::GraphEditor;
use crate::error::{ErrorKind, Result};
use crate::models::{CreateGraphPayload, GraphId, NewThoughtEdge, NewThoughtNode};
use crate::service::GraphService;
use crate::sync::{Completion, GraphMutation, PendingMutation};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub acknowledged: usize,
    pub superseded: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied,
    /// Local edits happened around the fetch, so the fetched contents were dropped.
    Discarded,
}

/// Bridges a [`GraphEditor`] and a [`GraphService`].
///
/// Local edits are applied immediately and queued; `flush` replays the queue one
/// remote call at a time and never holds the editor lock across a call.
#[derive(Debug, Clone)]
pub struct GraphSync<S> {
    service: S,
}

impl<S: GraphService> GraphSync<S> {
    pub fn new(service: S) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub async fn create_graph(
        &self,
        title: &str,
        description: Option<&str>,
    ) -> Result<GraphEditor> {
        let mut payload = CreateGraphPayload::titled(title);
        payload.description = description.map(str::to_string);
        let graph = self.service.create_graph(payload).await?;
        tracing::info!(graph_id = %graph.id, title = %graph.title, "created thought graph");
        GraphEditor::from_snapshot(graph)
    }

    pub async fn open(&self, graph_id: &GraphId) -> Result<GraphEditor> {
        let graph = self.service.fetch_graph(graph_id).await?;
        tracing::info!(
            graph_id = %graph.id,
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            "opened thought graph"
        );
        GraphEditor::from_snapshot(graph)
    }

    /// Send every queued mutation in order.
    ///
    /// Stops at the first failure. Retryable failures (see `ErrorKind::is_retryable`)
    /// leave the mutation at the head of the queue for the next flush; anything else
    /// drops it. Local state is never rolled back. A flush that finds another one
    /// in progress returns an empty report.
    pub async fn flush(&self, editor: &Mutex<GraphEditor>) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        loop {
            let (graph_id, next) = {
                let mut editor = editor.lock().await;
                let graph_id = editor.graph_id().clone();
                match editor.sync_queue_mut().begin_next() {
                    Some(next) => (graph_id, next),
                    None => return Ok(report),
                }
            };

            let result = self.send(&graph_id, &next).await;

            let mut editor = editor.lock().await;
            let queue = editor.sync_queue_mut();
            match result {
                Ok(()) => match queue.complete(&next) {
                    Completion::Acknowledged => report.acknowledged += 1,
                    Completion::Superseded => {
                        tracing::warn!(
                            graph_id = %graph_id,
                            seq = next.seq,
                            entity = ?next.mutation.entity(),
                            "discarding superseded sync result"
                        );
                        report.superseded += 1;
                    }
                },
                Err(err) => {
                    if err.kind.is_retryable() {
                        tracing::warn!(
                            graph_id = %graph_id,
                            seq = next.seq,
                            error = %err,
                            "sync paused, mutation kept for the next save"
                        );
                        queue.fail(next);
                    } else {
                        tracing::error!(
                            graph_id = %graph_id,
                            seq = next.seq,
                            error = %err,
                            "graph service rejected mutation"
                        );
                        queue.reject(&next);
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Re-fetch the graph and replace local contents if nothing changed locally.
    pub async fn refresh(&self, editor: &Mutex<GraphEditor>) -> Result<RefreshOutcome> {
        let (graph_id, revision) = {
            let editor = editor.lock().await;
            if !editor.sync_queue().is_idle() {
                tracing::warn!(graph_id = %editor.graph_id(), "refresh skipped, unsaved changes");
                return Ok(RefreshOutcome::Discarded);
            }
            (editor.graph_id().clone(), editor.sync_queue().revision())
        };

        let graph = self.service.fetch_graph(&graph_id).await?;

        let mut editor = editor.lock().await;
        let queue = editor.sync_queue();
        if queue.revision() != revision || !queue.is_idle() {
            tracing::warn!(graph_id = %graph_id, "refresh discarded, graph changed during fetch");
            return Ok(RefreshOutcome::Discarded);
        }
        editor.replace_contents(graph.nodes, graph.edges)?;
        tracing::debug!(graph_id = %graph_id, "refreshed thought graph");
        Ok(RefreshOutcome::Applied)
    }

    async fn send(&self, graph_id: &GraphId, pending: &PendingMutation) -> Result<()> {
        tracing::debug!(graph_id = %graph_id, seq = pending.seq, "sending mutation");
        match &pending.mutation {
            GraphMutation::CreateNode { node } => self
                .service
                .create_node(graph_id, NewThoughtNode::from(node.clone()))
                .await
                .map(drop),
            GraphMutation::UpdateNode { node_id, patch } => self
                .service
                .update_node(graph_id, node_id, patch.clone())
                .await
                .map(drop),
            GraphMutation::DeleteNode { node_id } => {
                missing_is_deleted(self.service.delete_node(graph_id, node_id).await)
            }
            GraphMutation::CreateEdge { edge } => self
                .service
                .create_edge(graph_id, NewThoughtEdge::from(edge.clone()))
                .await
                .map(drop),
            GraphMutation::DeleteEdge { edge_id } => {
                missing_is_deleted(self.service.delete_edge(graph_id, edge_id).await)
            }
        }
    }
}

fn missing_is_deleted(result: Result<()>) -> Result<()> {
    match result {
        Err(err) if err.kind == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};

use anyhow::anyhow;
use tokio::sync::Mutex;

use thought_graph::editor::GraphEditor;
use thought_graph::error::{ErrorKind, LibError, Result};
use thought_graph::models::{
    CreateGraphPayload, EdgeId, GraphId, GraphSummary, ListGraphsQuery, NewThoughtEdge,
    NewThoughtNode, NodeId, NodePatch, Paged, ThoughtEdge, ThoughtGraph, ThoughtNode,
    UpdateGraphPayload,
};
use thought_graph::persistence::{GraphSync, RefreshOutcome, SyncReport};
use thought_graph::service::GraphService;
use thought_graph::store::MemoryGraphStore;

type Hook = Box<dyn FnOnce() + Send>;

/// In-memory service that fails on cue and can run a hook while a call is in flight.
#[derive(Default)]
struct FlakyService {
    inner: MemoryGraphStore,
    script: StdMutex<VecDeque<Option<ErrorKind>>>,
    calls: StdMutex<Vec<&'static str>>,
    during_call: StdMutex<Option<Hook>>,
}

impl FlakyService {
    fn script(&self, outcomes: &[Option<ErrorKind>]) {
        self.script.lock().unwrap().extend(outcomes.iter().copied());
    }

    fn on_next_call(&self, hook: impl FnOnce() + Send + 'static) {
        *self.during_call.lock().unwrap() = Some(Box::new(hook));
    }

    fn take_calls(&self) -> Vec<&'static str> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }

    /// Records the call, runs the pending hook, then yields so concurrent callers interleave.
    async fn before_call(&self, call: &'static str) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        let hook = self.during_call.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
        let scripted = self.script.lock().unwrap().pop_front().flatten();
        tokio::task::yield_now().await;
        match scripted {
            None => Ok(()),
            Some(ErrorKind::Unavailable) => Err(LibError::unavailable(
                "The graph service is temporarily unavailable",
                anyhow!("scripted outage during {}", call),
            )),
            Some(ErrorKind::Unauthorized) => Err(LibError::unauthorized(
                "Your session has expired, please sign in again",
                anyhow!("scripted expiry during {}", call),
            )),
            Some(ErrorKind::Database) => Err(LibError::database(
                "Database request failed",
                anyhow!("scripted database failure during {}", call),
            )),
            Some(kind) => Err(LibError::unknown(
                "Scripted failure",
                anyhow!("scripted {:?} during {}", kind, call),
            )),
        }
    }
}

impl GraphService for FlakyService {
    async fn list_graphs(&self, query: ListGraphsQuery) -> Result<Paged<GraphSummary>> {
        self.before_call("list_graphs").await?;
        self.inner.list_graphs(query).await
    }

    async fn create_graph(&self, payload: CreateGraphPayload) -> Result<ThoughtGraph> {
        self.before_call("create_graph").await?;
        self.inner.create_graph(payload).await
    }

    async fn fetch_graph(&self, graph_id: &GraphId) -> Result<ThoughtGraph> {
        self.before_call("fetch_graph").await?;
        self.inner.fetch_graph(graph_id).await
    }

    async fn update_graph(
        &self,
        graph_id: &GraphId,
        payload: UpdateGraphPayload,
    ) -> Result<ThoughtGraph> {
        self.before_call("update_graph").await?;
        self.inner.update_graph(graph_id, payload).await
    }

    async fn delete_graph(&self, graph_id: &GraphId) -> Result<()> {
        self.before_call("delete_graph").await?;
        self.inner.delete_graph(graph_id).await
    }

    async fn list_nodes(&self, graph_id: &GraphId) -> Result<Vec<ThoughtNode>> {
        self.before_call("list_nodes").await?;
        self.inner.list_nodes(graph_id).await
    }

    async fn create_node(&self, graph_id: &GraphId, node: NewThoughtNode) -> Result<ThoughtNode> {
        self.before_call("create_node").await?;
        self.inner.create_node(graph_id, node).await
    }

    async fn update_node(
        &self,
        graph_id: &GraphId,
        node_id: &NodeId,
        patch: NodePatch,
    ) -> Result<ThoughtNode> {
        self.before_call("update_node").await?;
        self.inner.update_node(graph_id, node_id, patch).await
    }

    async fn delete_node(&self, graph_id: &GraphId, node_id: &NodeId) -> Result<()> {
        self.before_call("delete_node").await?;
        self.inner.delete_node(graph_id, node_id).await
    }

    async fn list_edges(&self, graph_id: &GraphId) -> Result<Vec<ThoughtEdge>> {
        self.before_call("list_edges").await?;
        self.inner.list_edges(graph_id).await
    }

    async fn create_edge(&self, graph_id: &GraphId, edge: NewThoughtEdge) -> Result<ThoughtEdge> {
        self.before_call("create_edge").await?;
        self.inner.create_edge(graph_id, edge).await
    }

    async fn delete_edge(&self, graph_id: &GraphId, edge_id: &EdgeId) -> Result<()> {
        self.before_call("delete_edge").await?;
        self.inner.delete_edge(graph_id, edge_id).await
    }
}

async fn new_session() -> (GraphSync<FlakyService>, GraphId, Arc<Mutex<GraphEditor>>) {
    let sync = GraphSync::new(FlakyService::default());
    let editor = sync
        .create_graph("Project ideas", None)
        .await
        .expect("create graph");
    let graph_id = editor.graph_id().clone();
    sync.service().take_calls();
    (sync, graph_id, Arc::new(Mutex::new(editor)))
}

async fn remote(sync: &GraphSync<FlakyService>, graph_id: &GraphId) -> ThoughtGraph {
    sync.service()
        .inner
        .fetch_graph(graph_id)
        .await
        .expect("remote graph")
}

#[tokio::test]
async fn flush_replays_mutations_in_invocation_order() {
    let (sync, graph_id, editor) = new_session().await;
    {
        let mut editor = editor.lock().await;
        let root = editor.create_node(false);
        editor.select_node(&root.id);
        editor.create_node(true);
        editor.create_node(true);
    }

    let report = sync.flush(&editor).await.expect("flush");
    assert_eq!(
        report,
        SyncReport {
            acknowledged: 5,
            superseded: 0
        }
    );
    assert_eq!(
        sync.service().take_calls(),
        vec![
            "create_node",
            "create_node",
            "create_edge",
            "create_node",
            "create_edge"
        ]
    );

    let graph = remote(&sync, &graph_id).await;
    assert_eq!(graph.nodes.len(), 3);
    assert_eq!(graph.edges.len(), 2);
    assert!(editor.lock().await.sync_queue().is_idle());
}

#[tokio::test]
async fn unavailable_pauses_flush_and_resumes_from_failed_mutation() {
    let (sync, graph_id, editor) = new_session().await;
    {
        let mut editor = editor.lock().await;
        editor.create_node(false);
        editor.create_node(false);
        editor.create_node(false);
    }
    sync.service()
        .script(&[None, Some(ErrorKind::Unavailable)]);

    let err = sync.flush(&editor).await.expect_err("outage");
    assert_eq!(err.kind, ErrorKind::Unavailable);
    assert_eq!(remote(&sync, &graph_id).await.nodes.len(), 1);
    {
        let editor = editor.lock().await;
        assert_eq!(editor.nodes().len(), 3);
        assert_eq!(editor.sync_queue().len(), 2);
        assert!(!editor.sync_queue().is_busy());
    }

    let report = sync.flush(&editor).await.expect("resume");
    assert_eq!(report.acknowledged, 2);
    let ids = remote(&sync, &graph_id)
        .await
        .nodes
        .into_iter()
        .map(|node| node.id.0)
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["1", "2", "3"]);
}

#[tokio::test]
async fn unauthorized_keeps_local_state_and_queue() {
    let (sync, graph_id, editor) = new_session().await;
    editor.lock().await.create_node(false);
    sync.service().script(&[Some(ErrorKind::Unauthorized)]);

    let err = sync.flush(&editor).await.expect_err("expired session");
    assert_eq!(err.kind, ErrorKind::Unauthorized);
    assert!(remote(&sync, &graph_id).await.nodes.is_empty());

    let editor_guard = editor.lock().await;
    assert_eq!(editor_guard.nodes().len(), 1);
    assert_eq!(editor_guard.sync_queue().len(), 1);
}

#[tokio::test]
async fn server_side_failures_keep_the_mutation_queued() {
    let (sync, graph_id, editor) = new_session().await;
    editor.lock().await.create_node(false);
    sync.service()
        .script(&[Some(ErrorKind::Unknown), Some(ErrorKind::Database)]);

    for expected in [ErrorKind::Unknown, ErrorKind::Database] {
        let err = sync.flush(&editor).await.expect_err("server failure");
        assert_eq!(err.kind, expected);
        assert!(remote(&sync, &graph_id).await.nodes.is_empty());
        let editor = editor.lock().await;
        assert_eq!(editor.sync_queue().len(), 1);
        assert!(!editor.sync_queue().is_busy());
    }

    let report = sync.flush(&editor).await.expect("retry");
    assert_eq!(report.acknowledged, 1);
    assert_eq!(remote(&sync, &graph_id).await.nodes.len(), 1);
    assert_eq!(
        sync.service().take_calls(),
        vec!["create_node", "create_node", "create_node"]
    );
}

#[tokio::test]
async fn completion_overtaken_by_local_edit_is_superseded() {
    let (sync, graph_id, editor) = new_session().await;
    let node_id = editor.lock().await.create_node(false).id;
    sync.flush(&editor).await.expect("initial flush");

    editor
        .lock()
        .await
        .update_node_attributes(&node_id, NodePatch::label("first"))
        .expect("first rename");

    let racing_editor = Arc::clone(&editor);
    let racing_id = node_id.clone();
    sync.service().on_next_call(move || {
        let mut editor = racing_editor
            .try_lock()
            .expect("flush must not hold the editor during a remote call");
        editor
            .update_node_attributes(&racing_id, NodePatch::label("second"))
            .expect("second rename");
    });

    let report = sync.flush(&editor).await.expect("flush");
    assert_eq!(
        report,
        SyncReport {
            acknowledged: 1,
            superseded: 1
        }
    );
    let graph = remote(&sync, &graph_id).await;
    assert_eq!(graph.nodes[0].label, "second");
}

#[tokio::test]
async fn concurrent_flush_finds_queue_busy_and_sends_nothing() {
    let (sync, graph_id, editor) = new_session().await;
    {
        let mut editor = editor.lock().await;
        editor.create_node(false);
        editor.create_node(false);
        editor.create_node(false);
    }

    let observed_busy = Arc::new(StdMutex::new(None));
    let racing_editor = Arc::clone(&editor);
    let busy = Arc::clone(&observed_busy);
    sync.service().on_next_call(move || {
        let editor = racing_editor
            .try_lock()
            .expect("flush must not hold the editor during a remote call");
        *busy.lock().unwrap() = Some(editor.sync_queue().is_busy());
    });

    let (first, second) = tokio::join!(sync.flush(&editor), sync.flush(&editor));
    let first = first.expect("first flush");
    let second = second.expect("second flush");

    assert_eq!(*observed_busy.lock().unwrap(), Some(true));
    assert_eq!(
        first,
        SyncReport {
            acknowledged: 3,
            superseded: 0
        }
    );
    assert_eq!(second, SyncReport::default());
    assert_eq!(
        sync.service().take_calls(),
        vec!["create_node", "create_node", "create_node"]
    );
    assert_eq!(remote(&sync, &graph_id).await.nodes.len(), 3);
    assert!(editor.lock().await.sync_queue().is_idle());
}

#[tokio::test]
async fn create_then_delete_before_save_sends_nothing() {
    let (sync, _graph_id, editor) = new_session().await;
    {
        let mut editor = editor.lock().await;
        let node = editor.create_node(false);
        editor.delete_node(&node.id);
    }

    let report = sync.flush(&editor).await.expect("flush");
    assert_eq!(report, SyncReport::default());
    assert!(sync.service().take_calls().is_empty());
}

#[tokio::test]
async fn remote_delete_of_missing_node_counts_as_done() {
    let (sync, graph_id, editor) = new_session().await;
    let node_id = editor.lock().await.create_node(false).id;
    sync.flush(&editor).await.expect("flush create");

    sync.service()
        .inner
        .delete_node(&graph_id, &node_id)
        .await
        .expect("removed elsewhere");
    editor.lock().await.delete_node(&node_id);

    let report = sync.flush(&editor).await.expect("flush delete");
    assert_eq!(report.acknowledged, 1);
    assert!(editor.lock().await.sync_queue().is_idle());
}

#[tokio::test]
async fn rejected_mutation_is_dropped_without_rollback() {
    let (sync, graph_id, editor) = new_session().await;
    let (first, second) = {
        let mut editor = editor.lock().await;
        (editor.create_node(false).id, editor.create_node(false).id)
    };
    sync.flush(&editor).await.expect("flush creates");

    sync.service()
        .inner
        .delete_node(&graph_id, &second)
        .await
        .expect("removed elsewhere");
    editor
        .lock()
        .await
        .connect(&first, &second)
        .expect("local connect");

    let err = sync.flush(&editor).await.expect_err("missing endpoint");
    assert_eq!(err.kind, ErrorKind::InvalidReference);

    let editor = editor.lock().await;
    assert_eq!(editor.edges().len(), 1);
    assert!(editor.sync_queue().is_idle());
}

#[tokio::test]
async fn refresh_is_discarded_when_an_edit_races_the_fetch() {
    let (sync, _graph_id, editor) = new_session().await;

    let racing_editor = Arc::clone(&editor);
    sync.service().on_next_call(move || {
        racing_editor
            .try_lock()
            .expect("refresh must not hold the editor during the fetch")
            .create_node(false);
    });

    let outcome = sync.refresh(&editor).await.expect("refresh");
    assert_eq!(outcome, RefreshOutcome::Discarded);
    assert_eq!(editor.lock().await.nodes().len(), 1);
}

#[tokio::test]
async fn open_surfaces_missing_graph() {
    let sync = GraphSync::new(FlakyService::default());
    let err = sync
        .open(&GraphId::from("does-not-exist"))
        .await
        .expect_err("missing graph");
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#![cfg(all(feature = "client", feature = "api"))]

use axum::Router;
use tokio::sync::Mutex;

use thought_graph::api::{ThoughtGraphApp, routes};
use thought_graph::client::HttpTransport;
use thought_graph::config::ClientConfig;
use thought_graph::error::ErrorKind;
use thought_graph::models::{
    CreateGraphPayload, EdgeId, EdgeRelation, GraphId, ListGraphsQuery, NewThoughtEdge, NewThoughtNode, NodeId,
    NodeKind, NodePatch, Position, UpdateGraphPayload,
};
use thought_graph::persistence::GraphSync;
use thought_graph::service::GraphService;
use thought_graph::store::MemoryGraphStore;

const TOKEN: &str = "test-token";

async fn spawn_server() -> String {
    let app_state = ThoughtGraphApp::new(MemoryGraphStore::new(), [TOKEN]);
    let app = Router::new()
        .nest("/api", routes::<ThoughtGraphApp<MemoryGraphStore>>())
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server runs");
    });
    format!("http://{addr}/api")
}

fn client(base_url: &str, token: Option<&str>) -> HttpTransport {
    let mut config = ClientConfig::new(base_url);
    if let Some(token) = token {
        config = config.with_bearer_token(token);
    }
    HttpTransport::new(config).expect("client builds")
}

fn new_node(id: &str, kind: NodeKind) -> NewThoughtNode {
    NewThoughtNode {
        id: Some(NodeId::from(id)),
        kind,
        label: format!("Node {id}"),
        content: String::new(),
        position: Position::new(300.0, 200.0),
    }
}

#[tokio::test]
async fn graph_crud_round_trips_over_http() {
    let base_url = spawn_server().await;
    let client = client(&base_url, Some(TOKEN));

    let mut payload = CreateGraphPayload::titled("  Launch plan ");
    payload.nodes = vec![new_node("1", NodeKind::Main), new_node("2", NodeKind::Child)];
    payload.edges = vec![NewThoughtEdge {
        id: Some(EdgeId::from("e1-2")),
        relation: EdgeRelation::Supports,
        label: Some("because".to_string()),
        ..NewThoughtEdge::between("1", "2")
    }];
    let created = client.create_graph(payload).await.expect("create graph");
    assert_eq!(created.title, "Launch plan");
    assert_eq!(created.nodes.len(), 2);

    let graph_id = created.id.clone();
    let fetched = client.fetch_graph(&graph_id).await.expect("fetch graph");
    assert_eq!(fetched.edges[0].id.as_str(), "e1-2");
    assert_eq!(fetched.edges[0].relation, EdgeRelation::Supports);
    assert_eq!(fetched.edges[0].label.as_deref(), Some("because"));

    let node = client
        .create_node(&graph_id, new_node("3", NodeKind::Idea))
        .await
        .expect("create node");
    assert_eq!(node.id.as_str(), "3");

    let updated = client
        .update_node(&graph_id, &node.id, NodePatch::label("Ship it"))
        .await
        .expect("update node");
    assert_eq!(updated.label, "Ship it");
    assert_eq!(updated.kind, NodeKind::Idea);

    client
        .create_edge(
            &graph_id,
            NewThoughtEdge {
                id: Some(EdgeId::from("e1-3")),
                ..NewThoughtEdge::between("1", "3")
            },
        )
        .await
        .expect("create edge");

    client
        .delete_node(&graph_id, &NodeId::from("1"))
        .await
        .expect("delete node");
    assert!(client.list_edges(&graph_id).await.expect("edges").is_empty());
    assert_eq!(client.list_nodes(&graph_id).await.expect("nodes").len(), 2);

    let renamed = client
        .update_graph(
            &graph_id,
            UpdateGraphPayload {
                title: Some("Launch plan v2".to_string()),
                description: None,
            },
        )
        .await
        .expect("update graph");
    assert_eq!(renamed.title, "Launch plan v2");

    let listed = client
        .list_graphs(ListGraphsQuery::default())
        .await
        .expect("list graphs");
    assert_eq!(listed.items.len(), 1);
    assert_eq!(listed.total, 1);
    assert_eq!(listed.items[0].node_count, 2);

    client.delete_graph(&graph_id).await.expect("delete graph");
    let err = client
        .fetch_graph(&graph_id)
        .await
        .expect_err("graph is gone");
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn missing_or_unknown_token_is_unauthorized() {
    let base_url = spawn_server().await;

    for token in [None, Some("not-the-token")] {
        let err = client(&base_url, token)
            .list_graphs(ListGraphsQuery::default())
            .await
            .expect_err("rejected");
        assert_eq!(err.kind, ErrorKind::Unauthorized);
    }
}

#[tokio::test]
async fn bearer_scheme_is_case_insensitive() {
    let base_url = spawn_server().await;
    let http = reqwest::Client::new();

    for (header, expected) in [
        (format!("bearer {TOKEN}"), reqwest::StatusCode::OK),
        (format!("BEARER {TOKEN}"), reqwest::StatusCode::OK),
        (format!("Basic {TOKEN}"), reqwest::StatusCode::UNAUTHORIZED),
    ] {
        let response = http
            .get(format!("{base_url}/thought-graphs"))
            .header(reqwest::header::AUTHORIZATION, header.as_str())
            .send()
            .await
            .expect("request sent");
        assert_eq!(response.status(), expected, "{header}");
    }
}

#[tokio::test]
async fn service_rejections_keep_their_kind_and_code() {
    let base_url = spawn_server().await;
    let client = client(&base_url, Some(TOKEN));
    let graph = client
        .create_graph(CreateGraphPayload::titled("Errors"))
        .await
        .expect("create graph");

    client
        .create_node(&graph.id, new_node("1", NodeKind::Main))
        .await
        .expect("first node");
    let duplicate = client
        .create_node(&graph.id, new_node("1", NodeKind::Main))
        .await
        .expect_err("duplicate id");
    assert_eq!(duplicate.kind, ErrorKind::InvalidInput);
    assert_eq!(duplicate.code, "duplicate_node_id");

    let dangling = client
        .create_edge(&graph.id, NewThoughtEdge::between("1", "404"))
        .await
        .expect_err("missing endpoint");
    assert_eq!(dangling.kind, ErrorKind::InvalidReference);

    let untitled = client
        .create_graph(CreateGraphPayload::titled("   "))
        .await
        .expect_err("blank title");
    assert_eq!(untitled.kind, ErrorKind::InvalidInput);

    let missing = client
        .fetch_graph(&GraphId::from("nope"))
        .await
        .expect_err("missing graph");
    assert_eq!(missing.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn editor_session_saves_through_http_client() {
    let base_url = spawn_server().await;
    let sync = GraphSync::new(client(&base_url, Some(TOKEN)));

    let editor = sync
        .create_graph("Remote session", Some("synced over http"))
        .await
        .expect("create graph");
    let graph_id = editor.graph_id().clone();
    let editor = Mutex::new(editor);
    {
        let mut editor = editor.lock().await;
        let root = editor.create_node(false);
        editor
            .update_node_attributes(&root.id, NodePatch::kind(NodeKind::Main))
            .expect("main kind");
        editor.select_node(&root.id);
        let child = editor.create_node(true);
        editor.duplicate_node(&child.id).expect("duplicate");
    }
    sync.flush(&editor).await.expect("flush");

    let reopened = sync.open(&graph_id).await.expect("reopen");
    assert_eq!(reopened.nodes().len(), 3);
    assert_eq!(reopened.edges().len(), 1);
    assert_eq!(
        reopened.node(&NodeId::from("1")).map(|node| node.kind),
        Some(NodeKind::Main)
    );
}

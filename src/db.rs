use std::str::FromStr;

use anyhow::anyhow;
use once_cell::sync::Lazy;
use sqlx::migrate::{MigrateError, Migrator};
use sqlx::{FromRow, PgPool};

use crate::error::{LibError, Result};
use crate::models::{
    CreateGraphPayload, EdgeId, EdgeRelation, GraphDefinition, GraphId, GraphSummary, ListGraphsQuery,
    NewThoughtEdge, NewThoughtNode, NodeId, NodeKind, NodePatch, Paged, Position, ThoughtEdge,
    ThoughtGraph, ThoughtNode, UpdateGraphPayload,
};
use crate::service::GraphService;

pub static MIGRATOR: Lazy<Migrator> = Lazy::new(|| {
    let mut migrator = sqlx::migrate!("./migrations");
    migrator.set_ignore_missing(true);
    migrator
});

pub async fn create_graph_tables(pool: &PgPool) -> std::result::Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

#[derive(Debug, Clone, FromRow)]
struct GraphRow {
    id: String,
    title: String,
    description: Option<String>,
    created_at: chrono::NaiveDateTime,
    updated_at: chrono::NaiveDateTime,
}

#[derive(Debug, Clone, FromRow)]
struct GraphSummaryRow {
    id: String,
    title: String,
    description: Option<String>,
    created_at: chrono::NaiveDateTime,
    updated_at: chrono::NaiveDateTime,
    node_count: i64,
    edge_count: i64,
}

#[derive(Debug, Clone, FromRow)]
struct NodeRow {
    id: String,
    kind: String,
    label: String,
    content: String,
    pos_x: f64,
    pos_y: f64,
}

#[derive(Debug, Clone, FromRow)]
struct EdgeRow {
    id: String,
    source_id: String,
    target_id: String,
    relation: String,
    label: Option<String>,
}

impl From<GraphSummaryRow> for GraphSummary {
    fn from(value: GraphSummaryRow) -> Self {
        Self {
            id: GraphId(value.id),
            title: value.title,
            description: value.description,
            created_at: value.created_at,
            updated_at: value.updated_at,
            node_count: value.node_count,
            edge_count: value.edge_count,
        }
    }
}

impl TryFrom<NodeRow> for ThoughtNode {
    type Error = LibError;

    fn try_from(value: NodeRow) -> Result<Self> {
        Ok(Self {
            id: NodeId(value.id),
            kind: NodeKind::from_str(&value.kind)?,
            label: value.label,
            content: value.content,
            position: Position::new(value.pos_x, value.pos_y),
        })
    }
}

impl TryFrom<EdgeRow> for ThoughtEdge {
    type Error = LibError;

    fn try_from(value: EdgeRow) -> Result<Self> {
        Ok(Self {
            id: EdgeId(value.id),
            source: NodeId(value.source_id),
            target: NodeId(value.target_id),
            relation: EdgeRelation::from_str(&value.relation)?,
            label: value.label,
        })
    }
}

fn hydrate_graph(row: GraphRow, nodes: Vec<NodeRow>, edges: Vec<EdgeRow>) -> Result<ThoughtGraph> {
    Ok(ThoughtGraph {
        id: GraphId(row.id),
        title: row.title,
        description: row.description,
        created_at: row.created_at,
        updated_at: row.updated_at,
        nodes: nodes
            .into_iter()
            .map(ThoughtNode::try_from)
            .collect::<Result<Vec<_>>>()?,
        edges: edges
            .into_iter()
            .map(ThoughtEdge::try_from)
            .collect::<Result<Vec<_>>>()?,
    })
}

fn db_err(public: &'static str, err: sqlx::Error) -> LibError {
    LibError::from_sqlx(public, err)
}

/// Map constraint violations on insert to the same errors the in-memory store reports.
fn insert_err(
    public: &'static str,
    duplicate_code: &'static str,
    duplicate_public: &'static str,
    err: sqlx::Error,
) -> LibError {
    let code = err
        .as_database_error()
        .and_then(|db| db.code())
        .map(|code| code.into_owned());
    match code.as_deref() {
        Some(UNIQUE_VIOLATION) => {
            LibError::invalid_with_code(duplicate_code, duplicate_public, anyhow!(err))
        }
        Some(FOREIGN_KEY_VIOLATION) => {
            LibError::invalid_reference("Edge endpoint node not found", anyhow!(err))
        }
        _ => db_err(public, err),
    }
}

fn graph_not_found(graph_id: &GraphId) -> LibError {
    LibError::not_found("Graph not found", anyhow!("graph {} not found", graph_id))
}

/// Graph service backed by Postgres tables in the `thought_graph` schema.
#[derive(Debug, Clone)]
pub struct PgGraphStore {
    pool: PgPool,
}

impl PgGraphStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn ensure_graph(&self, graph_id: &GraphId) -> Result<()> {
        let exists: (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS(
                SELECT 1
                FROM thought_graph.graphs
                WHERE id = $1
            )
            "#,
        )
        .bind(graph_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|err| db_err("Failed to query graph", err))?;

        if exists.0 {
            Ok(())
        } else {
            Err(graph_not_found(graph_id))
        }
    }

    async fn touch_graph(&self, graph_id: &GraphId) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE thought_graph.graphs
            SET updated_at = CURRENT_TIMESTAMP
            WHERE id = $1
            "#,
        )
        .bind(graph_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|err| db_err("Failed to update graph timestamp", err))?;
        Ok(())
    }

    async fn load_nodes(&self, graph_id: &GraphId) -> Result<Vec<NodeRow>> {
        sqlx::query_as::<_, NodeRow>(
            r#"
            SELECT id, kind, label, content, pos_x, pos_y
            FROM thought_graph.nodes
            WHERE graph_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(graph_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|err| db_err("Failed to query graph nodes", err))
    }

    async fn load_edges(&self, graph_id: &GraphId) -> Result<Vec<EdgeRow>> {
        sqlx::query_as::<_, EdgeRow>(
            r#"
            SELECT id, source_id, target_id, relation, label
            FROM thought_graph.edges
            WHERE graph_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(graph_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|err| db_err("Failed to query graph edges", err))
    }
}

async fn write_graph_contents(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    graph_id: &GraphId,
    definition: &GraphDefinition,
) -> Result<()> {
    for node in &definition.nodes {
        sqlx::query(
            r#"
            INSERT INTO thought_graph.nodes (graph_id, id, kind, label, content, pos_x, pos_y)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(graph_id.as_str())
        .bind(node.id.as_str())
        .bind(node.kind.as_str())
        .bind(&node.label)
        .bind(&node.content)
        .bind(node.position.x)
        .bind(node.position.y)
        .execute(&mut **tx)
        .await
        .map_err(|err| db_err("Failed to write graph nodes", err))?;
    }

    for edge in &definition.edges {
        sqlx::query(
            r#"
            INSERT INTO thought_graph.edges (graph_id, id, source_id, target_id, relation, label)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(graph_id.as_str())
        .bind(edge.id.as_str())
        .bind(edge.source.as_str())
        .bind(edge.target.as_str())
        .bind(edge.relation.as_str())
        .bind(edge.label.as_deref())
        .execute(&mut **tx)
        .await
        .map_err(|err| db_err("Failed to write graph edges", err))?;
    }

    Ok(())
}

impl GraphService for PgGraphStore {
    async fn list_graphs(&self, query: ListGraphsQuery) -> Result<Paged<GraphSummary>> {
        let (page, limit) = query.pagination();
        let offset = (page.saturating_sub(1) as i64).saturating_mul(limit as i64);

        let rows = sqlx::query_as::<_, GraphSummaryRow>(
            r#"
            SELECT
                g.id,
                g.title,
                g.description,
                g.created_at,
                g.updated_at,
                COALESCE(n.node_count, 0) AS node_count,
                COALESCE(e.edge_count, 0) AS edge_count
            FROM thought_graph.graphs g
            LEFT JOIN (
                SELECT graph_id, COUNT(*)::bigint AS node_count
                FROM thought_graph.nodes
                GROUP BY graph_id
            ) n
            ON n.graph_id = g.id
            LEFT JOIN (
                SELECT graph_id, COUNT(*)::bigint AS edge_count
                FROM thought_graph.edges
                GROUP BY graph_id
            ) e
            ON e.graph_id = g.id
            ORDER BY g.updated_at DESC, g.id DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|err| db_err("Failed to list graphs", err))?;

        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*)::bigint FROM thought_graph.graphs")
            .fetch_one(&self.pool)
            .await
            .map_err(|err| db_err("Failed to count graphs", err))?;

        Ok(Paged {
            page,
            limit,
            total: u64::try_from(total).unwrap_or_default(),
            items: rows.into_iter().map(GraphSummary::from).collect(),
        })
    }

    async fn create_graph(&self, payload: CreateGraphPayload) -> Result<ThoughtGraph> {
        let definition = payload.normalize()?;
        let graph_id = GraphId::generate();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| db_err("Failed to start transaction", err))?;

        sqlx::query(
            r#"
            INSERT INTO thought_graph.graphs (id, title, description)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(graph_id.as_str())
        .bind(&definition.title)
        .bind(&definition.description)
        .execute(&mut *tx)
        .await
        .map_err(|err| db_err("Failed to create graph", err))?;

        write_graph_contents(&mut tx, &graph_id, &definition).await?;

        tx.commit()
            .await
            .map_err(|err| db_err("Failed to commit transaction", err))?;

        tracing::info!(graph_id = %graph_id, "created thought graph");
        self.fetch_graph(&graph_id).await
    }

    async fn fetch_graph(&self, graph_id: &GraphId) -> Result<ThoughtGraph> {
        let row = sqlx::query_as::<_, GraphRow>(
            r#"
            SELECT id, title, description, created_at, updated_at
            FROM thought_graph.graphs
            WHERE id = $1
            "#,
        )
        .bind(graph_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| db_err("Failed to query graph", err))?
        .ok_or_else(|| graph_not_found(graph_id))?;

        let nodes = self.load_nodes(graph_id).await?;
        let edges = self.load_edges(graph_id).await?;
        hydrate_graph(row, nodes, edges)
    }

    async fn update_graph(
        &self,
        graph_id: &GraphId,
        payload: UpdateGraphPayload,
    ) -> Result<ThoughtGraph> {
        let payload = payload.normalize()?;
        let description = payload
            .description
            .map(|value| value.trim().to_string());

        let result = sqlx::query(
            r#"
            UPDATE thought_graph.graphs
            SET title = COALESCE($1, title),
                description = CASE
                    WHEN $2::text IS NULL THEN description
                    ELSE NULLIF($2, '')
                END,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $3
            "#,
        )
        .bind(&payload.title)
        .bind(&description)
        .bind(graph_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|err| db_err("Failed to update graph", err))?;

        if result.rows_affected() == 0 {
            return Err(graph_not_found(graph_id));
        }
        self.fetch_graph(graph_id).await
    }

    async fn delete_graph(&self, graph_id: &GraphId) -> Result<()> {
        let result = sqlx::query(
            r#"
            DELETE FROM thought_graph.graphs
            WHERE id = $1
            "#,
        )
        .bind(graph_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|err| db_err("Failed to delete graph", err))?;

        if result.rows_affected() == 0 {
            return Err(graph_not_found(graph_id));
        }
        Ok(())
    }

    async fn list_nodes(&self, graph_id: &GraphId) -> Result<Vec<ThoughtNode>> {
        self.ensure_graph(graph_id).await?;
        self.load_nodes(graph_id)
            .await?
            .into_iter()
            .map(ThoughtNode::try_from)
            .collect()
    }

    async fn create_node(&self, graph_id: &GraphId, node: NewThoughtNode) -> Result<ThoughtNode> {
        self.ensure_graph(graph_id).await?;
        let node = node.into_node();

        sqlx::query(
            r#"
            INSERT INTO thought_graph.nodes (graph_id, id, kind, label, content, pos_x, pos_y)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(graph_id.as_str())
        .bind(node.id.as_str())
        .bind(node.kind.as_str())
        .bind(&node.label)
        .bind(&node.content)
        .bind(node.position.x)
        .bind(node.position.y)
        .execute(&self.pool)
        .await
        .map_err(|err| {
            insert_err(
                "Failed to create node",
                "duplicate_node_id",
                "Node ID already exists in graph",
                err,
            )
        })?;

        self.touch_graph(graph_id).await?;
        Ok(node)
    }

    async fn update_node(
        &self,
        graph_id: &GraphId,
        node_id: &NodeId,
        patch: NodePatch,
    ) -> Result<ThoughtNode> {
        self.ensure_graph(graph_id).await?;

        let row = sqlx::query_as::<_, NodeRow>(
            r#"
            UPDATE thought_graph.nodes
            SET kind = COALESCE($3, kind),
                label = COALESCE($4, label),
                content = COALESCE($5, content),
                pos_x = COALESCE($6, pos_x),
                pos_y = COALESCE($7, pos_y)
            WHERE graph_id = $1
              AND id = $2
            RETURNING id, kind, label, content, pos_x, pos_y
            "#,
        )
        .bind(graph_id.as_str())
        .bind(node_id.as_str())
        .bind(patch.kind.map(NodeKind::as_str))
        .bind(patch.label.as_deref())
        .bind(patch.content.as_deref())
        .bind(patch.position.map(|position| position.x))
        .bind(patch.position.map(|position| position.y))
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| db_err("Failed to update node", err))?
        .ok_or_else(|| {
            LibError::not_found(
                "Node not found",
                anyhow!("node {} not found in graph {}", node_id, graph_id),
            )
        })?;

        self.touch_graph(graph_id).await?;
        ThoughtNode::try_from(row)
    }

    async fn delete_node(&self, graph_id: &GraphId, node_id: &NodeId) -> Result<()> {
        self.ensure_graph(graph_id).await?;

        let result = sqlx::query(
            r#"
            DELETE FROM thought_graph.nodes
            WHERE graph_id = $1
              AND id = $2
            "#,
        )
        .bind(graph_id.as_str())
        .bind(node_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|err| db_err("Failed to delete node", err))?;

        if result.rows_affected() == 0 {
            return Err(LibError::not_found(
                "Node not found",
                anyhow!("node {} not found in graph {}", node_id, graph_id),
            ));
        }
        self.touch_graph(graph_id).await
    }

    async fn list_edges(&self, graph_id: &GraphId) -> Result<Vec<ThoughtEdge>> {
        self.ensure_graph(graph_id).await?;
        self.load_edges(graph_id)
            .await?
            .into_iter()
            .map(ThoughtEdge::try_from)
            .collect()
    }

    async fn create_edge(&self, graph_id: &GraphId, edge: NewThoughtEdge) -> Result<ThoughtEdge> {
        self.ensure_graph(graph_id).await?;
        let edge = edge.into_edge();

        sqlx::query(
            r#"
            INSERT INTO thought_graph.edges (graph_id, id, source_id, target_id, relation, label)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(graph_id.as_str())
        .bind(edge.id.as_str())
        .bind(edge.source.as_str())
        .bind(edge.target.as_str())
        .bind(edge.relation.as_str())
        .bind(edge.label.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|err| {
            insert_err(
                "Failed to create edge",
                "duplicate_edge_id",
                "Edge ID already exists in graph",
                err,
            )
        })?;

        self.touch_graph(graph_id).await?;
        Ok(edge)
    }

    async fn delete_edge(&self, graph_id: &GraphId, edge_id: &EdgeId) -> Result<()> {
        self.ensure_graph(graph_id).await?;

        let result = sqlx::query(
            r#"
            DELETE FROM thought_graph.edges
            WHERE graph_id = $1
              AND id = $2
            "#,
        )
        .bind(graph_id.as_str())
        .bind(edge_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|err| db_err("Failed to delete edge", err))?;

        if result.rows_affected() == 0 {
            return Err(LibError::not_found(
                "Edge not found",
                anyhow!("edge {} not found in graph {}", edge_id, graph_id),
            ));
        }
        self.touch_graph(graph_id).await
    }
}

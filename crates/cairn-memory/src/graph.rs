//! Relationship graph: memory and task nodes joined by typed, weighted edges.
//!
//! Backed by its own SQLite database. The graph is optional: when the
//! database cannot be opened at construction, every operation becomes a no-op
//! returning empty, `false` or `None`, and that is logged once.
//!
//! Edges are directed on write. Traversal follows them in both directions and
//! never leaves the start node's project.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, ToSql, params};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use cairn_types::{ContextItem, ContextSource, ProjectScope, Timestamp, new_id, now};

use crate::backend::{BackendResult, BackendUnavailable, KeywordSource};
use crate::error::{MemoryError, Result};
use crate::store::{format_ts, like_pattern, parse_ts};
use crate::validation::validate_text;

const BACKEND: &str = "relationship_graph";

const SCHEMA_VERSION: i32 = 1;

/// Deepest traversal allowed by [`RelationshipGraph::get_related_memories`].
pub const MAX_TRAVERSAL_DEPTH: usize = 5;

/// Memories created within a day at or above which a reminder is raised.
const HIGH_ACTIVITY_THRESHOLD: usize = 10;

/// Incoming `DEPENDS_ON` edges at or above which a node is flagged.
const DEPENDENCY_HUB_THRESHOLD: usize = 3;

/// Newest nodes returned in a [`ProjectContext`].
const RECENT_LIMIT: usize = 20;

const NODE_COLUMNS: &str = "n.id, n.node_type, n.content, n.metadata, n.project_path, n.created_at";

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// A memory or task in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub content: String,
    pub metadata: Map<String, Value>,
    pub created_at: Timestamp,
    pub project_path: String,
}

impl From<GraphNode> for ContextItem {
    fn from(node: GraphNode) -> Self {
        Self {
            id: node.id,
            item_type: node.node_type,
            text: node.content,
            project_path: node.project_path,
            created_at: Some(node.created_at),
            source: ContextSource::RelationshipGraph,
            score: None,
        }
    }
}

/// Edge label. Unknown labels round-trip through [`RelationshipType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RelationshipType {
    RelatedTo,
    DependsOn,
    Blocks,
    PartOf,
    Follows,
    Implements,
    References,
    Supersedes,
    Other(String),
}

impl RelationshipType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::RelatedTo => "RELATED_TO",
            Self::DependsOn => "DEPENDS_ON",
            Self::Blocks => "BLOCKS",
            Self::PartOf => "PART_OF",
            Self::Follows => "FOLLOWS",
            Self::Implements => "IMPLEMENTS",
            Self::References => "REFERENCES",
            Self::Supersedes => "SUPERSEDES",
            Self::Other(label) => label,
        }
    }
}

impl From<&str> for RelationshipType {
    fn from(label: &str) -> Self {
        let normalized = label.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "RELATED_TO" => Self::RelatedTo,
            "DEPENDS_ON" => Self::DependsOn,
            "BLOCKS" => Self::Blocks,
            "PART_OF" => Self::PartOf,
            "FOLLOWS" => Self::Follows,
            "IMPLEMENTS" => Self::Implements,
            "REFERENCES" => Self::References,
            "SUPERSEDES" => Self::Supersedes,
            _ => Self::Other(normalized),
        }
    }
}

impl From<String> for RelationshipType {
    fn from(label: String) -> Self {
        Self::from(label.as_str())
    }
}

impl From<RelationshipType> for String {
    fn from(rel: RelationshipType) -> Self {
        rel.as_str().to_string()
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of a project's recent graph activity.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProjectContext {
    /// Node count per node type.
    pub memory_types: BTreeMap<String, usize>,
    /// Edge count per relationship type.
    pub relationship_types: BTreeMap<String, usize>,
    /// Newest nodes first.
    pub recent_memories: Vec<GraphNode>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Relationship Graph
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct RelationshipGraph {
    conn: Option<Arc<Mutex<Connection>>>,
    default_project: String,
}

impl fmt::Debug for RelationshipGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationshipGraph")
            .field("available", &self.is_available())
            .field("default_project", &self.default_project)
            .finish()
    }
}

impl RelationshipGraph {
    /// Open the graph at `path`. Never fails: an unusable location yields a
    /// graph whose operations are all no-ops.
    pub fn open(path: &Path, default_project: impl Into<String>) -> Self {
        let default_project = default_project.into();
        match open_connection(path) {
            Ok(conn) => {
                info!(path = %path.display(), "relationship graph opened");
                Self {
                    conn: Some(Arc::new(Mutex::new(conn))),
                    default_project,
                }
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "relationship graph unavailable, continuing without it"
                );
                Self::disabled(default_project)
            }
        }
    }

    pub fn open_in_memory(default_project: impl Into<String>) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        create_schema(&conn)?;
        Ok(Self {
            conn: Some(Arc::new(Mutex::new(conn))),
            default_project: default_project.into(),
        })
    }

    pub fn disabled(default_project: impl Into<String>) -> Self {
        Self {
            conn: None,
            default_project: default_project.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.conn.is_some()
    }

    pub fn default_project(&self) -> &str {
        &self.default_project
    }

    fn project_or_default<'a>(&'a self, project_path: Option<&'a str>) -> &'a str {
        project_path.unwrap_or(&self.default_project)
    }

    /// Run `f` against the connection; `fallback` when unavailable or on error.
    fn run<T>(&self, operation: &'static str, fallback: T, f: impl FnOnce(&Connection) -> Result<T>) -> T {
        match self.try_run(f) {
            Ok(value) => value,
            Err(e) => {
                if self.is_available() {
                    warn!(operation, error = %e, "relationship graph call failed");
                }
                fallback
            }
        }
    }

    fn try_run<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> BackendResult<T> {
        let conn = self
            .conn
            .as_ref()
            .ok_or_else(|| BackendUnavailable::new(BACKEND, "not connected"))?;
        let conn = conn.lock();
        f(&conn).map_err(|e| BackendUnavailable::new(BACKEND, e))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a memory node with a fresh id.
    pub fn add_memory(
        &self,
        content: &str,
        memory_type: &str,
        metadata: Option<Map<String, Value>>,
        project_path: Option<&str>,
    ) -> Option<String> {
        self.add_node(&new_id().to_string(), memory_type, content, metadata, project_path)
    }

    /// Insert or update a node with a caller-chosen id.
    ///
    /// An existing node keeps its project and creation time; a node id that
    /// belongs to another project is left untouched and `None` returned.
    pub fn add_node(
        &self,
        id: &str,
        node_type: &str,
        content: &str,
        metadata: Option<Map<String, Value>>,
        project_path: Option<&str>,
    ) -> Option<String> {
        if let Err(e) = validate_text("node content", content)
            .and_then(|()| validate_text("node type", node_type))
            .and_then(|()| validate_text("node id", id))
        {
            warn!(error = %e, "rejected graph node");
            return None;
        }
        let project = self.project_or_default(project_path);
        let metadata = Value::Object(metadata.unwrap_or_default()).to_string();

        self.run("add_node", None, |conn| {
            let changed = conn.execute(
                "INSERT INTO graph_nodes (id, node_type, content, metadata, project_path, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                 ON CONFLICT(id) DO UPDATE SET \
                     node_type = excluded.node_type, \
                     content = excluded.content, \
                     metadata = excluded.metadata \
                 WHERE graph_nodes.project_path = excluded.project_path",
                params![id, node_type, content, metadata, project, format_ts(&now())],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            debug!(node_id = id, node_type, "Upserted graph node");
            Ok(Some(id.to_string()))
        })
    }

    /// Add or update a directed edge. Both nodes must exist.
    ///
    /// A numeric `weight` property sets the edge weight (default 1.0).
    pub fn add_relationship(
        &self,
        from_id: &str,
        to_id: &str,
        relationship: RelationshipType,
        properties: Option<Map<String, Value>>,
    ) -> bool {
        let properties = properties.unwrap_or_default();
        let weight = properties
            .get("weight")
            .and_then(Value::as_f64)
            .unwrap_or(1.0);
        let properties = Value::Object(properties).to_string();

        self.run("add_relationship", false, |conn| {
            let changed = conn.execute(
                "INSERT INTO graph_edges (from_id, to_id, rel_type, weight, properties, created_at) \
                 SELECT ?1, ?2, ?3, ?4, ?5, ?6 \
                 WHERE EXISTS (SELECT 1 FROM graph_nodes WHERE id = ?1) \
                   AND EXISTS (SELECT 1 FROM graph_nodes WHERE id = ?2) \
                 ON CONFLICT(from_id, to_id, rel_type) DO UPDATE SET \
                     weight = excluded.weight, \
                     properties = excluded.properties",
                params![
                    from_id,
                    to_id,
                    relationship.as_str(),
                    weight,
                    properties,
                    format_ts(&now())
                ],
            )?;
            debug!(from_id, to_id, rel = %relationship, added = changed > 0, "Relationship write");
            Ok(changed > 0)
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    pub fn get_node(&self, id: &str) -> Option<GraphNode> {
        self.run("get_node", None, |conn| get_node(conn, id))
    }

    /// Substring search over node content, newest first.
    ///
    /// `project_path` defaults to the graph's project.
    pub fn search_memories(
        &self,
        query: &str,
        types: Option<&[String]>,
        project_path: Option<&str>,
        limit: usize,
    ) -> Vec<GraphNode> {
        let scope = ProjectScope::project(self.project_or_default(project_path));
        self.run("search_memories", Vec::new(), |conn| {
            search_nodes(conn, query, types, &scope, limit)
        })
    }

    /// Nodes reachable from `id` within `depth` hops, nearest first.
    ///
    /// Edges are followed in both directions, optionally only those of
    /// `relationship_types`. The start node is excluded and each node appears
    /// once. `depth` is capped at [`MAX_TRAVERSAL_DEPTH`].
    pub fn get_related_memories(
        &self,
        id: &str,
        relationship_types: Option<&[RelationshipType]>,
        depth: usize,
    ) -> Vec<GraphNode> {
        let depth = depth.min(MAX_TRAVERSAL_DEPTH);
        if depth == 0 {
            return Vec::new();
        }
        self.run("get_related_memories", Vec::new(), |conn| {
            let Some(start) = get_node(conn, id)? else {
                return Ok(Vec::new());
            };
            traverse(conn, &start, relationship_types, depth)
        })
    }

    /// Histograms and newest nodes for `project_path` over the last `hours_back` hours.
    pub fn get_project_context(&self, project_path: &str, hours_back: u32) -> ProjectContext {
        let cutoff = format_ts(&(now() - Duration::hours(i64::from(hours_back))));
        self.run("get_project_context", ProjectContext::default(), |conn| {
            let memory_types = histogram(
                conn,
                "SELECT node_type, COUNT(*) FROM graph_nodes \
                 WHERE project_path = ?1 AND created_at >= ?2 GROUP BY node_type",
                params![project_path, cutoff],
            )?;
            let relationship_types = histogram(
                conn,
                "SELECT e.rel_type, COUNT(*) FROM graph_edges e \
                 JOIN graph_nodes n ON n.id = e.from_id \
                 WHERE n.project_path = ?1 AND e.created_at >= ?2 GROUP BY e.rel_type",
                params![project_path, cutoff],
            )?;
            let recent_memories = query_nodes(
                conn,
                &format!(
                    "SELECT {NODE_COLUMNS} FROM graph_nodes n \
                     WHERE n.project_path = ?1 AND n.created_at >= ?2 \
                     ORDER BY n.created_at DESC, n.rowid DESC LIMIT {RECENT_LIMIT}"
                ),
                params![project_path, cutoff],
            )?;
            Ok(ProjectContext {
                memory_types,
                relationship_types,
                recent_memories,
            })
        })
    }

    /// Short advisory notes derived from the project's graph shape.
    pub fn get_agent_reminders(&self, project_path: &str) -> Vec<String> {
        let day_ago = format_ts(&(now() - Duration::hours(24)));
        self.run("get_agent_reminders", Vec::new(), |conn| {
            let mut reminders = Vec::new();

            let recent: i64 = conn.query_row(
                "SELECT COUNT(*) FROM graph_nodes WHERE project_path = ?1 AND created_at >= ?2",
                params![project_path, day_ago],
                |row| row.get(0),
            )?;
            if recent as usize >= HIGH_ACTIVITY_THRESHOLD {
                reminders.push(format!(
                    "High activity: {recent} memories recorded in the last 24 hours. \
                     Review recent decisions for consistency."
                ));
            }

            for (content, dependents) in incoming_counts(conn, project_path, &RelationshipType::DependsOn)? {
                if dependents >= DEPENDENCY_HUB_THRESHOLD {
                    reminders.push(format!(
                        "'{}' has {dependents} dependents; changes to it affect them all.",
                        snippet(&content)
                    ));
                }
            }

            for (content, blockers) in incoming_counts(conn, project_path, &RelationshipType::Blocks)? {
                reminders.push(format!(
                    "'{}' is blocked by {blockers} item(s).",
                    snippet(&content)
                ));
            }

            Ok(reminders)
        })
    }

    /// Nodes stored for `project_path`.
    pub fn node_count(&self, project_path: &str) -> usize {
        self.run("node_count", 0, |conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM graph_nodes WHERE project_path = ?1",
                params![project_path],
                |row| row.get(0),
            )?;
            Ok(n as usize)
        })
    }

    /// Delete every node of `project_path` and every edge touching one.
    /// Returns the number of nodes removed; zero when unavailable.
    pub fn clear_project(&self, project_path: &str) -> usize {
        self.run("clear_project", 0, |conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "DELETE FROM graph_edges \
                 WHERE from_id IN (SELECT id FROM graph_nodes WHERE project_path = ?1) \
                    OR to_id IN (SELECT id FROM graph_nodes WHERE project_path = ?1)",
                params![project_path],
            )?;
            let removed = tx.execute(
                "DELETE FROM graph_nodes WHERE project_path = ?1",
                params![project_path],
            )?;
            tx.commit()?;
            info!(project = project_path, removed, "Cleared graph nodes");
            Ok(removed)
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// KeywordSource
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl KeywordSource for RelationshipGraph {
    fn source_name(&self) -> &'static str {
        BACKEND
    }

    async fn keyword_search(
        &self,
        query: &str,
        limit: usize,
        types: Option<&[String]>,
        scope: &ProjectScope,
    ) -> BackendResult<Vec<ContextItem>> {
        if !self.is_available() {
            return Err(BackendUnavailable::new(BACKEND, "not connected"));
        }
        let graph = self.clone();
        let query = query.to_string();
        let types = types.map(<[String]>::to_vec);
        let scope = scope.clone();

        let nodes = tokio::task::spawn_blocking(move || {
            graph.try_run(|conn| search_nodes(conn, &query, types.as_deref(), &scope, limit))
        })
        .await
        .map_err(|e| BackendUnavailable::new(BACKEND, e))??;

        Ok(nodes.into_iter().map(ContextItem::from).collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Schema
// ─────────────────────────────────────────────────────────────────────────────

fn open_connection(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| {
            MemoryError::InvalidData(format!("cannot create {}: {e}", parent.display()))
        })?;
    }
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    create_schema(&conn)?;
    Ok(conn)
}

fn create_schema(conn: &Connection) -> Result<()> {
    let current_version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .unwrap_or(0);
    if current_version >= SCHEMA_VERSION {
        return Ok(());
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS graph_nodes (
            id TEXT PRIMARY KEY,
            node_type TEXT NOT NULL,
            content TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            project_path TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_graph_nodes_project
            ON graph_nodes(project_path, created_at);

        CREATE TABLE IF NOT EXISTS graph_edges (
            from_id TEXT NOT NULL,
            to_id TEXT NOT NULL,
            rel_type TEXT NOT NULL,
            weight REAL NOT NULL DEFAULT 1.0,
            properties TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            PRIMARY KEY (from_id, to_id, rel_type)
        );

        CREATE INDEX IF NOT EXISTS idx_graph_edges_to
            ON graph_edges(to_id, rel_type);
        "#,
    )
    .map_err(|e| MemoryError::Migration(e.to_string()))?;

    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    debug!("Graph schema created (version {})", SCHEMA_VERSION);
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Queries
// ─────────────────────────────────────────────────────────────────────────────

fn get_node(conn: &Connection, id: &str) -> Result<Option<GraphNode>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {NODE_COLUMNS} FROM graph_nodes n WHERE n.id = ?1"
    ))?;
    stmt.query_row(params![id], |row| Ok(row_to_node(row)))
        .optional()?
        .transpose()
}

fn search_nodes(
    conn: &Connection,
    query: &str,
    types: Option<&[String]>,
    scope: &ProjectScope,
    limit: usize,
) -> Result<Vec<GraphNode>> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    let pattern = like_pattern(query);
    let key = scope.key();
    let mut filter = String::from("n.content LIKE ?1 ESCAPE '\\'");
    let mut values: Vec<&dyn ToSql> = vec![&pattern as &dyn ToSql];

    if let Some(key) = &key {
        values.push(key as &dyn ToSql);
        filter.push_str(&format!(" AND n.project_path = ?{}", values.len()));
    }
    if let Some(types) = types.filter(|t| !t.is_empty()) {
        let start = values.len() + 1;
        let placeholders: Vec<String> = (start..start + types.len()).map(|i| format!("?{i}")).collect();
        filter.push_str(&format!(" AND n.node_type IN ({})", placeholders.join(", ")));
        values.extend(types.iter().map(|t| t as &dyn ToSql));
    }

    query_nodes(
        conn,
        &format!(
            "SELECT {NODE_COLUMNS} FROM graph_nodes n WHERE {filter} \
             ORDER BY n.created_at DESC, n.rowid DESC LIMIT {limit}"
        ),
        &values,
    )
}

/// Breadth-first walk over edges in both directions, within the start's project.
fn traverse(
    conn: &Connection,
    start: &GraphNode,
    relationship_types: Option<&[RelationshipType]>,
    depth: usize,
) -> Result<Vec<GraphNode>> {
    let labels: Vec<String> = relationship_types
        .unwrap_or_default()
        .iter()
        .map(|r| r.as_str().to_string())
        .collect();
    let mut sql = format!(
        "SELECT {NODE_COLUMNS} FROM graph_edges e \
         JOIN graph_nodes n ON n.id = CASE WHEN e.from_id = ?1 THEN e.to_id ELSE e.from_id END \
         WHERE (e.from_id = ?1 OR e.to_id = ?1) AND n.project_path = ?2"
    );
    if !labels.is_empty() {
        let placeholders: Vec<String> = (3..3 + labels.len()).map(|i| format!("?{i}")).collect();
        sql.push_str(&format!(" AND e.rel_type IN ({})", placeholders.join(", ")));
    }
    sql.push_str(" ORDER BY e.weight DESC, e.created_at ASC, e.rowid ASC");
    let mut stmt = conn.prepare(&sql)?;

    let mut seen: HashSet<String> = HashSet::from([start.id.clone()]);
    let mut frontier = vec![start.id.clone()];
    let mut related = Vec::new();

    for _ in 0..depth {
        let mut next = Vec::new();
        for id in &frontier {
            let mut values: Vec<&dyn ToSql> = vec![id as &dyn ToSql, &start.project_path as &dyn ToSql];
            values.extend(labels.iter().map(|l| l as &dyn ToSql));

            let mut rows = stmt.query(values.as_slice())?;
            while let Some(row) = rows.next()? {
                let node = row_to_node(row)?;
                if seen.insert(node.id.clone()) {
                    next.push(node.id.clone());
                    related.push(node);
                }
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }

    debug!(start = %start.id, depth, found = related.len(), "Graph traversal");
    Ok(related)
}

/// Content and incoming edge count of nodes targeted by `relationship` edges.
fn incoming_counts(
    conn: &Connection,
    project_path: &str,
    relationship: &RelationshipType,
) -> Result<Vec<(String, usize)>> {
    let mut stmt = conn.prepare(
        "SELECT n.content, COUNT(*) AS c FROM graph_edges e \
         JOIN graph_nodes n ON n.id = e.to_id \
         WHERE n.project_path = ?1 AND e.rel_type = ?2 \
         GROUP BY n.id ORDER BY c DESC, n.created_at ASC",
    )?;
    let rows = stmt.query_map(params![project_path, relationship.as_str()], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn histogram(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> Result<BTreeMap<String, usize>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
    })?;
    Ok(rows.collect::<rusqlite::Result<BTreeMap<_, _>>>()?)
}

fn query_nodes(conn: &Connection, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<GraphNode>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut nodes = Vec::new();
    while let Some(row) = rows.next()? {
        nodes.push(row_to_node(row)?);
    }
    Ok(nodes)
}

fn row_to_node(row: &Row<'_>) -> Result<GraphNode> {
    let metadata: String = row.get(3)?;
    let created_at: String = row.get(5)?;
    Ok(GraphNode {
        id: row.get(0)?,
        node_type: row.get(1)?,
        content: row.get(2)?,
        metadata: serde_json::from_str(&metadata).unwrap_or_default(),
        project_path: row.get(4)?,
        created_at: parse_ts(&created_at)?,
    })
}

fn snippet(content: &str) -> String {
    const MAX_CHARS: usize = 60;
    if content.chars().count() <= MAX_CHARS {
        return content.to_string();
    }
    let mut cut: String = content.chars().take(MAX_CHARS).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALPHA: &str = "/work/alpha";

    fn graph() -> RelationshipGraph {
        RelationshipGraph::open_in_memory(ALPHA).unwrap()
    }

    fn node(graph: &RelationshipGraph, content: &str) -> String {
        graph.add_memory(content, "note", None, None).unwrap()
    }

    fn contents(nodes: &[GraphNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.content.as_str()).collect()
    }

    #[test]
    fn test_add_and_search() {
        let graph = graph();
        node(&graph, "design the schema");
        graph
            .add_memory("schema review done", "task_completion", None, None)
            .unwrap();
        graph
            .add_memory("schema elsewhere", "note", None, Some("/work/beta"))
            .unwrap();

        let hits = graph.search_memories("schema", None, None, 10);
        assert_eq!(contents(&hits), vec!["schema review done", "design the schema"]);

        let notes = vec!["note".to_string()];
        let hits = graph.search_memories("schema", Some(notes.as_slice()), None, 10);
        assert_eq!(contents(&hits), vec!["design the schema"]);

        let beta = graph.search_memories("schema", None, Some("/work/beta"), 10);
        assert_eq!(contents(&beta), vec!["schema elsewhere"]);
        assert!(graph.search_memories("schema", None, None, 0).is_empty());
    }

    #[test]
    fn test_add_node_keeps_caller_id_and_project() {
        let graph = graph();
        let id = new_id().to_string();
        assert_eq!(graph.add_node(&id, "note", "v1", None, None), Some(id.clone()));
        assert_eq!(graph.add_node(&id, "note", "v2", None, None), Some(id.clone()));
        assert_eq!(graph.get_node(&id).unwrap().content, "v2");

        // Same id from another project must not move or overwrite the node.
        assert_eq!(graph.add_node(&id, "note", "hijack", None, Some("/work/beta")), None);
        let stored = graph.get_node(&id).unwrap();
        assert_eq!(stored.content, "v2");
        assert_eq!(stored.project_path, ALPHA);
    }

    #[test]
    fn test_relationship_requires_both_nodes() {
        let graph = graph();
        let a = node(&graph, "a");
        let b = node(&graph, "b");

        assert!(graph.add_relationship(&a, &b, RelationshipType::DependsOn, None));
        assert!(!graph.add_relationship(&a, "missing", RelationshipType::DependsOn, None));
        assert!(!graph.add_relationship("missing", &b, RelationshipType::Blocks, None));
    }

    #[test]
    fn test_related_is_undirected_deduplicated_and_bounded() {
        let graph = graph();
        let a = node(&graph, "a");
        let b = node(&graph, "b");
        let c = node(&graph, "c");
        let d = node(&graph, "d");
        graph.add_relationship(&a, &b, RelationshipType::RelatedTo, None);
        graph.add_relationship(&c, &b, RelationshipType::RelatedTo, None);
        graph.add_relationship(&c, &a, RelationshipType::RelatedTo, None);
        graph.add_relationship(&c, &d, RelationshipType::RelatedTo, None);

        let one_hop = graph.get_related_memories(&a, None, 1);
        let mut names = contents(&one_hop);
        names.sort();
        assert_eq!(names, vec!["b", "c"]);

        let two_hops = graph.get_related_memories(&a, None, 2);
        assert_eq!(two_hops.len(), 3);
        assert!(two_hops.iter().all(|n| n.id != a));
        assert_eq!(two_hops.last().map(|n| n.content.as_str()), Some("d"));

        assert!(graph.get_related_memories(&a, None, 0).is_empty());
        assert!(graph.get_related_memories("missing", None, 2).is_empty());
    }

    #[test]
    fn test_related_filters_relationship_types_and_projects() {
        let graph = graph();
        let a = node(&graph, "a");
        let dep = node(&graph, "dependency");
        let note = node(&graph, "loosely related");
        let foreign = graph
            .add_memory("other project", "note", None, Some("/work/beta"))
            .unwrap();
        graph.add_relationship(&a, &dep, RelationshipType::DependsOn, None);
        graph.add_relationship(&a, &note, RelationshipType::RelatedTo, None);
        graph.add_relationship(&a, &foreign, RelationshipType::DependsOn, None);

        let deps = graph.get_related_memories(&a, Some(&[RelationshipType::DependsOn]), 3);
        assert_eq!(contents(&deps), vec!["dependency"]);
    }

    #[test]
    fn test_heavier_edges_come_first() {
        let graph = graph();
        let a = node(&graph, "a");
        let light = node(&graph, "light");
        let heavy = node(&graph, "heavy");
        let mut props = Map::new();
        props.insert("weight".into(), Value::from(5.0));
        graph.add_relationship(&a, &light, RelationshipType::RelatedTo, None);
        graph.add_relationship(&a, &heavy, RelationshipType::RelatedTo, Some(props));

        let related = graph.get_related_memories(&a, None, 1);
        assert_eq!(contents(&related), vec!["heavy", "light"]);
    }

    #[test]
    fn test_project_context_histograms() {
        let graph = graph();
        let a = node(&graph, "a");
        let b = graph.add_memory("b", "task_plan", None, None).unwrap();
        node(&graph, "c");
        graph
            .add_memory("elsewhere", "note", None, Some("/work/beta"))
            .unwrap();
        graph.add_relationship(&a, &b, RelationshipType::PartOf, None);

        let ctx = graph.get_project_context(ALPHA, 24);
        assert_eq!(ctx.memory_types.get("note"), Some(&2));
        assert_eq!(ctx.memory_types.get("task_plan"), Some(&1));
        assert_eq!(ctx.relationship_types.get("PART_OF"), Some(&1));
        assert_eq!(ctx.recent_memories.len(), 3);
        assert_eq!(ctx.recent_memories[0].content, "c");
    }

    #[test]
    fn test_reminders() {
        let graph = graph();
        assert!(graph.get_agent_reminders(ALPHA).is_empty());

        let hub = node(&graph, "shared config loader");
        for i in 0..DEPENDENCY_HUB_THRESHOLD {
            let dependent = node(&graph, &format!("feature {i}"));
            graph.add_relationship(&dependent, &hub, RelationshipType::DependsOn, None);
        }
        let blocker = node(&graph, "flaky CI");
        let blocked = node(&graph, "release");
        graph.add_relationship(&blocker, &blocked, RelationshipType::Blocks, None);
        for i in 0..HIGH_ACTIVITY_THRESHOLD {
            node(&graph, &format!("burst {i}"));
        }

        let reminders = graph.get_agent_reminders(ALPHA);
        assert_eq!(reminders.len(), 3);
        assert!(reminders[0].starts_with("High activity"));
        assert!(reminders[1].contains("shared config loader"));
        assert!(reminders[2].contains("'release' is blocked by 1"));
        assert!(graph.get_agent_reminders("/work/beta").is_empty());
    }

    #[test]
    fn test_disabled_graph_is_noop() {
        let graph = RelationshipGraph::disabled(ALPHA);
        assert!(!graph.is_available());
        assert!(graph.add_memory("x", "note", None, None).is_none());
        assert!(!graph.add_relationship("a", "b", RelationshipType::RelatedTo, None));
        assert!(graph.search_memories("x", None, None, 5).is_empty());
        assert!(graph.get_related_memories("a", None, 2).is_empty());
        assert_eq!(graph.get_project_context(ALPHA, 24), ProjectContext::default());
        assert!(graph.get_agent_reminders(ALPHA).is_empty());
    }

    #[test]
    fn test_unusable_path_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, "x").unwrap();

        let graph = RelationshipGraph::open(&file.join("graph.db"), ALPHA);
        assert!(!graph.is_available());
        assert!(graph.add_memory("x", "note", None, None).is_none());
    }

    #[test]
    fn test_open_on_disk_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.db");
        let id = RelationshipGraph::open(&path, ALPHA)
            .add_memory("persisted", "note", None, None)
            .unwrap();

        let reopened = RelationshipGraph::open(&path, ALPHA);
        assert_eq!(reopened.get_node(&id).unwrap().content, "persisted");
    }

    #[tokio::test]
    async fn test_keyword_source_scopes() {
        let graph = graph();
        let id = node(&graph, "cache invalidation");
        graph
            .add_memory("cache elsewhere", "note", None, Some("/work/beta"))
            .unwrap();

        let items = graph
            .keyword_search("cache", 5, None, &ProjectScope::project(ALPHA))
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, id);
        assert_eq!(items[0].source, ContextSource::RelationshipGraph);

        let global = graph
            .keyword_search("cache", 5, None, &ProjectScope::Global)
            .await
            .unwrap();
        assert_eq!(global.len(), 2);

        let disabled = RelationshipGraph::disabled(ALPHA);
        assert!(
            disabled
                .keyword_search("cache", 5, None, &ProjectScope::Global)
                .await
                .is_err()
        );
    }

    #[test]
    fn test_relationship_labels_round_trip() {
        assert_eq!(RelationshipType::from("depends-on"), RelationshipType::DependsOn);
        assert_eq!(
            RelationshipType::from("mentions"),
            RelationshipType::Other("MENTIONS".into())
        );
        let json = serde_json::to_string(&RelationshipType::Blocks).unwrap();
        assert_eq!(json, "\"BLOCKS\"");
    }

    #[test]
    fn test_clear_project_removes_nodes_and_edges() {
        let graph = graph();
        let a = node(&graph, "alpha schema");
        let b = node(&graph, "alpha api");
        let other = graph
            .add_memory("beta api", "note", None, Some("/work/beta"))
            .unwrap();
        assert!(graph.add_relationship(&b, &a, RelationshipType::DependsOn, None));

        assert_eq!(graph.clear_project(ALPHA), 2);
        assert_eq!(graph.node_count(ALPHA), 0);
        assert!(graph.search_memories("alpha", None, None, 10).is_empty());
        assert!(graph.get_project_context(ALPHA, 24).relationship_types.is_empty());
        assert!(graph.get_node(&other).is_some());
        assert_eq!(graph.clear_project(ALPHA), 0);

        assert_eq!(RelationshipGraph::disabled(ALPHA).clear_project(ALPHA), 0);
    }
}

//! Embedded vector backend: sqlite-vec in a local database file.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::{EmbeddingPoint, ScoredPoint, VectorIndex};
use crate::backend::{BackendResult, BackendUnavailable};
use crate::error::{MemoryError, Result};
use crate::vector;

const BACKEND: &str = "sqlite_vec";

#[derive(Clone)]
pub struct SqliteVecIndex {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteVecIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteVecIndex").finish_non_exhaustive()
    }
}

impl SqliteVecIndex {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                MemoryError::InvalidData(format!(
                    "cannot create {}: {e}",
                    parent.display()
                ))
            })?;
        }
        vector::init_vector_extension();
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::initialize(conn, Some(path))
    }

    pub fn open_in_memory() -> Result<Self> {
        vector::init_vector_extension();
        Self::initialize(Connection::open_in_memory()?, None)
    }

    fn initialize(conn: Connection, path: Option<&Path>) -> Result<Self> {
        let version = vector::check_vector_extension(&conn)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS semantic_points (
                point_id TEXT PRIMARY KEY,
                project_path TEXT NOT NULL,
                text TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );
            "#,
        )?;
        info!(
            path = %path.map(|p| p.display().to_string()).unwrap_or_else(|| ":memory:".into()),
            sqlite_vec = %version,
            "Opened local semantic index"
        );
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Number of stored points.
    pub fn len(&self) -> usize {
        vector::count_embeddings(&self.conn.lock()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn blocking<T, F>(&self, f: F) -> BackendResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || f(&*conn.lock()))
            .await
            .map_err(|e| BackendUnavailable::new(BACKEND, e))?
            .map_err(|e| BackendUnavailable::new(BACKEND, e))
    }
}

#[async_trait]
impl VectorIndex for SqliteVecIndex {
    fn kind(&self) -> &'static str {
        BACKEND
    }

    async fn ensure_collection(&self, dimensions: usize) -> BackendResult<()> {
        self.blocking(move |conn| vector::create_vector_table(conn, dimensions))
            .await
    }

    async fn upsert(&self, point: EmbeddingPoint) -> BackendResult<()> {
        self.blocking(move |conn| {
            let metadata = serde_json::to_string(&point.metadata)?;
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT OR REPLACE INTO semantic_points (point_id, project_path, text, metadata) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![point.id, point.project_path, point.text, metadata],
            )?;
            vector::store_embedding(&tx, &point.id, &point.project_path, &point.vector)?;
            tx.commit()?;
            debug!(point_id = %point.id, "Stored local semantic point");
            Ok(())
        })
        .await
    }

    async fn search(
        &self,
        vector: Vec<f32>,
        limit: usize,
        project_path: Option<&str>,
    ) -> BackendResult<Vec<ScoredPoint>> {
        let project = project_path.map(str::to_string);
        self.blocking(move |conn| {
            let hits = vector::search_similar(conn, &vector, limit, project.as_deref())?;
            let mut stmt = conn.prepare(
                "SELECT text, project_path, metadata FROM semantic_points WHERE point_id = ?1",
            )?;

            let mut points = Vec::with_capacity(hits.len());
            for hit in hits {
                let row: Option<(String, String, String)> = stmt
                    .query_row(params![hit.point_id], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                    })
                    .optional()?;
                let Some((text, project_path, metadata)) = row else {
                    continue;
                };
                let metadata: Map<String, Value> =
                    serde_json::from_str(&metadata).unwrap_or_default();
                points.push(ScoredPoint {
                    score: hit.cosine(),
                    id: hit.point_id,
                    text,
                    project_path,
                    metadata,
                });
            }
            Ok(points)
        })
        .await
    }

    async fn delete_project(&self, project_path: &str) -> BackendResult<()> {
        let project = project_path.to_string();
        self.blocking(move |conn| {
            let tx = conn.unchecked_transaction()?;
            let ids: Vec<String> = {
                let mut stmt =
                    tx.prepare("SELECT point_id FROM semantic_points WHERE project_path = ?1")?;
                let ids = stmt
                    .query_map(params![project], |row| row.get(0))?
                    .collect::<rusqlite::Result<_>>()?;
                ids
            };
            for id in &ids {
                vector::delete_embedding(&tx, id)?;
            }
            tx.execute(
                "DELETE FROM semantic_points WHERE project_path = ?1",
                params![project],
            )?;
            tx.commit()?;
            debug!(project = %project, removed = ids.len(), "Deleted local semantic points");
            Ok(())
        })
        .await
    }
}

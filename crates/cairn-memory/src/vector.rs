//! Vector storage and similarity search using sqlite-vec.
//!
//! Embeddings live in a `vec0` virtual table keyed by point id, with the
//! owning project as a metadata column so KNN queries can filter on it.

use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};
use zerocopy::IntoBytes;

use crate::error::{MemoryError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Extension
// ─────────────────────────────────────────────────────────────────────────────

/// Register sqlite-vec for every connection opened afterwards in this process.
pub fn init_vector_extension() {
    use rusqlite::ffi::sqlite3_auto_extension;
    use sqlite_vec::sqlite3_vec_init;

    unsafe {
        #[allow(clippy::missing_transmute_annotations)]
        sqlite3_auto_extension(Some(std::mem::transmute(sqlite3_vec_init as *const ())));
    }
}

/// sqlite-vec version, or an error when the extension is not loaded.
pub fn check_vector_extension(conn: &Connection) -> Result<String> {
    let version: String = conn.query_row("SELECT vec_version()", [], |row| row.get(0))?;
    Ok(version)
}

// ─────────────────────────────────────────────────────────────────────────────
// Table management
// ─────────────────────────────────────────────────────────────────────────────

/// Create the embeddings table for `dims`-sized vectors.
///
/// Idempotent for the same size. A table created with another size is an
/// error: mixing dimensions would make every later query fail.
pub fn create_vector_table(conn: &Connection, dims: usize) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS vector_meta (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
    )?;

    if let Some(existing) = stored_dimensions(conn)? {
        if existing != dims {
            return Err(MemoryError::InvalidData(format!(
                "vector table holds {existing}-dimensional embeddings, embedder produces {dims}"
            )));
        }
        return Ok(());
    }

    conn.execute_batch(&format!(
        r#"
        CREATE VIRTUAL TABLE IF NOT EXISTS point_embeddings USING vec0(
            point_id TEXT PRIMARY KEY,
            project_path TEXT,
            embedding float[{dims}]
        )
        "#
    ))?;
    conn.execute(
        "INSERT OR REPLACE INTO vector_meta (key, value) VALUES ('dimensions', ?1)",
        params![dims.to_string()],
    )?;

    info!("Created point_embeddings table with {} dimensions", dims);
    Ok(())
}

/// Dimensions the embeddings table was created with, if it exists.
pub fn stored_dimensions(conn: &Connection) -> Result<Option<usize>> {
    let has_meta: bool = conn
        .prepare("SELECT value FROM vector_meta LIMIT 0")
        .is_ok();
    if !has_meta {
        return Ok(None);
    }
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM vector_meta WHERE key = 'dimensions'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value.and_then(|v| v.parse().ok()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Points
// ─────────────────────────────────────────────────────────────────────────────

/// Store the embedding for a point, replacing any previous one.
pub fn store_embedding(
    conn: &Connection,
    point_id: &str,
    project_path: &str,
    embedding: &[f32],
) -> Result<()> {
    // vec0 doesn't support INSERT OR REPLACE, so delete first if exists
    conn.execute(
        "DELETE FROM point_embeddings WHERE point_id = ?1",
        params![point_id],
    )?;
    conn.execute(
        "INSERT INTO point_embeddings (point_id, project_path, embedding) VALUES (?1, ?2, ?3)",
        params![point_id, project_path, embedding.as_bytes()],
    )?;

    debug!(point_id, "Stored embedding");
    Ok(())
}

/// Remove a point's embedding. Missing points and a missing table are fine.
pub fn delete_embedding(conn: &Connection, point_id: &str) -> Result<()> {
    if stored_dimensions(conn)?.is_none() {
        return Ok(());
    }
    conn.execute(
        "DELETE FROM point_embeddings WHERE point_id = ?1",
        params![point_id],
    )?;
    Ok(())
}

/// Result of a similarity search.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityResult {
    pub point_id: String,
    /// L2 distance from the query vector (lower = more similar).
    pub distance: f32,
}

impl SimilarityResult {
    /// Cosine similarity, valid when both vectors are unit length.
    pub fn cosine(&self) -> f32 {
        1.0 - (self.distance * self.distance) / 2.0
    }
}

/// Top-`limit` nearest points, optionally confined to one project.
pub fn search_similar(
    conn: &Connection,
    query_embedding: &[f32],
    limit: usize,
    project_path: Option<&str>,
) -> Result<Vec<SimilarityResult>> {
    if limit == 0 {
        return Ok(Vec::new());
    }

    let mut results = Vec::new();
    let mut push = |row: &rusqlite::Row<'_>| -> rusqlite::Result<()> {
        results.push(SimilarityResult {
            point_id: row.get(0)?,
            distance: row.get(1)?,
        });
        Ok(())
    };

    match project_path {
        Some(project) => {
            let mut stmt = conn.prepare(
                r#"
                SELECT point_id, distance
                FROM point_embeddings
                WHERE embedding MATCH ?1 AND k = ?2 AND project_path = ?3
                ORDER BY distance
                "#,
            )?;
            let mut rows = stmt.query(params![query_embedding.as_bytes(), limit as i64, project])?;
            while let Some(row) = rows.next()? {
                push(row)?;
            }
        }
        None => {
            let mut stmt = conn.prepare(
                r#"
                SELECT point_id, distance
                FROM point_embeddings
                WHERE embedding MATCH ?1 AND k = ?2
                ORDER BY distance
                "#,
            )?;
            let mut rows = stmt.query(params![query_embedding.as_bytes(), limit as i64])?;
            while let Some(row) = rows.next()? {
                push(row)?;
            }
        }
    }

    debug!(found = results.len(), limit, "Similarity search");
    Ok(results)
}

/// Number of stored embeddings; zero when the table does not exist yet.
pub fn count_embeddings(conn: &Connection) -> Result<usize> {
    if stored_dimensions(conn)?.is_none() {
        return Ok(0);
    }
    let count: i64 =
        conn.query_row("SELECT COUNT(*) FROM point_embeddings", [], |row| row.get(0))?;
    Ok(count as usize)
}

//! Memory entry operations and keyword search.

use async_trait::async_trait;
use rusqlite::{Connection, Row, ToSql, params};
use tracing::debug;

use cairn_types::{ContextItem, Id, MemoryEntry, ProjectScope};

use crate::backend::{BackendResult, BackendUnavailable, KeywordSource};
use crate::error::Result;
use crate::validation::validate_memory;

use super::{RecordStore, format_ts, like_pattern, parse_ts};

const ENTRY_COLUMNS: &str = "id, project_path, memory_type, text, created_at";

/// Newest first; rowid breaks ties between entries written in the same microsecond.
const NEWEST_FIRST: &str = "ORDER BY created_at DESC, rowid DESC";

impl RecordStore {
    /// Append a memory entry to this project.
    pub fn add_memory(&self, text: &str, memory_type: &str) -> Result<Id> {
        validate_memory(text, memory_type)?;
        let entry = MemoryEntry::new(memory_type, text, self.project());
        self.insert_entry(&entry)?;
        Ok(entry.id)
    }

    /// Insert a fully-formed entry. The entry's project must match this handle.
    pub(crate) fn insert_entry(&self, entry: &MemoryEntry) -> Result<()> {
        debug_assert_eq!(entry.project_path, self.project());
        self.write(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO memory_entries ({ENTRY_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)"
                ),
                params![
                    entry.id.to_string(),
                    entry.project_path,
                    entry.memory_type,
                    entry.text,
                    format_ts(&entry.created_at),
                ],
            )?;
            Ok(())
        })?;

        debug!(memory_id = %entry.id, memory_type = %entry.memory_type, "Inserted memory");
        Ok(())
    }

    pub fn get_memory(&self, id: Id) -> Option<MemoryEntry> {
        self.read("get_memory", |conn| {
            let mut entries = query_entries(
                conn,
                "project_path = ?1 AND id = ?2",
                params![self.project(), id.to_string()],
                None,
            )?;
            Ok(entries.pop())
        })
    }

    /// Entries of one type, newest first.
    pub fn get_memory_by_type(&self, memory_type: &str) -> Vec<MemoryEntry> {
        self.read("get_memory_by_type", |conn| {
            query_entries(
                conn,
                "project_path = ?1 AND memory_type = ?2",
                params![self.project(), memory_type],
                None,
            )
        })
    }

    /// The most recent entry of a type.
    pub fn get_latest_memory(&self, memory_type: &str) -> Option<MemoryEntry> {
        self.read("get_latest_memory", |conn| {
            let mut entries = query_entries(
                conn,
                "project_path = ?1 AND memory_type = ?2",
                params![self.project(), memory_type],
                Some(1),
            )?;
            Ok(entries.pop())
        })
    }

    /// Every entry in this project, newest first.
    pub fn get_all_memories(&self) -> Vec<MemoryEntry> {
        self.read("get_all_memories", |conn| {
            query_entries(conn, "project_path = ?1", params![self.project()], None)
        })
    }

    /// Substring search over entry text, newest first.
    ///
    /// `%`, `_` and `\` in `query` match literally. `scope` decides whether the
    /// search is confined to one project or spans all of them.
    pub fn search_memories(
        &self,
        query: &str,
        limit: usize,
        types: Option<&[String]>,
        scope: &ProjectScope,
    ) -> Vec<MemoryEntry> {
        if limit == 0 {
            return Vec::new();
        }
        self.read("search_memories", |conn| {
            let pattern = like_pattern(query);
            let key = scope.key();
            let mut filter = String::from("text LIKE ?1 ESCAPE '\\'");
            let mut values: Vec<&dyn ToSql> = vec![&pattern as &dyn ToSql];

            if let Some(key) = &key {
                values.push(key as &dyn ToSql);
                filter.push_str(&format!(" AND project_path = ?{}", values.len()));
            }
            if let Some(types) = types.filter(|t| !t.is_empty()) {
                let start = values.len() + 1;
                let placeholders: Vec<String> =
                    (start..start + types.len()).map(|i| format!("?{i}")).collect();
                filter.push_str(&format!(" AND memory_type IN ({})", placeholders.join(", ")));
                values.extend(types.iter().map(|t| t as &dyn ToSql));
            }

            query_entries(conn, &filter, &values, Some(limit))
        })
    }
}

fn query_entries(
    conn: &Connection,
    filter: &str,
    params: &[&dyn ToSql],
    limit: Option<usize>,
) -> Result<Vec<MemoryEntry>> {
    let limit_clause = limit.map(|n| format!(" LIMIT {n}")).unwrap_or_default();
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENTRY_COLUMNS} FROM memory_entries WHERE {filter} {NEWEST_FIRST}{limit_clause}"
    ))?;
    let mut rows = stmt.query(params)?;

    let mut entries = Vec::new();
    while let Some(row) = rows.next()? {
        entries.push(row_to_entry(row)?);
    }
    Ok(entries)
}

fn row_to_entry(row: &Row<'_>) -> Result<MemoryEntry> {
    let id: String = row.get(0)?;
    let created_at: String = row.get(4)?;
    Ok(MemoryEntry {
        id: Id::parse_str(&id)?,
        project_path: row.get(1)?,
        memory_type: row.get(2)?,
        text: row.get(3)?,
        created_at: parse_ts(&created_at)?,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// KeywordSource
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl KeywordSource for RecordStore {
    fn source_name(&self) -> &'static str {
        "record_store"
    }

    async fn keyword_search(
        &self,
        query: &str,
        limit: usize,
        types: Option<&[String]>,
        scope: &ProjectScope,
    ) -> BackendResult<Vec<ContextItem>> {
        let store = self.clone();
        let query = query.to_string();
        let types = types.map(<[String]>::to_vec);
        let scope = scope.clone();

        let entries = tokio::task::spawn_blocking(move || {
            store.search_memories(&query, limit, types.as_deref(), &scope)
        })
        .await
        .map_err(|e| BackendUnavailable::new("record_store", e))?;

        Ok(entries.into_iter().map(ContextItem::from).collect())
    }
}

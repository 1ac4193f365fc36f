//! Record store: the authoritative SQLite store for tasks, memory entries and
//! discussion turns.
//!
//! A [`RecordStore`] is bound to one project key. Every statement it issues
//! filters on `project_path = ?`, so two handles for different projects can
//! share a connection without seeing each other's rows.
//!
//! # Failure policy
//!
//! - Opening the database is fatal on failure.
//! - Reads never fail: a database error is logged and an empty result returned.
//! - Writes return `Result`; multi-row writes run in one transaction and roll
//!   back on error.

mod discussion_ops;
mod memory_ops;
mod project_ops;
mod task_ops;

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, params};
use tracing::{debug, info, warn};

use cairn_types::Timestamp;

use crate::error::{MemoryError, Result};
use crate::validation::validate_project;

// ─────────────────────────────────────────────────────────────────────────────
// Schema Version
// ─────────────────────────────────────────────────────────────────────────────

/// Current schema version for migrations.
const SCHEMA_VERSION: i32 = 1;

// ─────────────────────────────────────────────────────────────────────────────
// Record Store
// ─────────────────────────────────────────────────────────────────────────────

/// Project-scoped handle on the record store.
///
/// Cloning is cheap and shares the underlying connection.
#[derive(Clone)]
pub struct RecordStore {
    pub(crate) conn: Arc<Mutex<Connection>>,
    project: String,
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("project", &self.project)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Initialization
// ─────────────────────────────────────────────────────────────────────────────

impl RecordStore {
    /// Open or create the store at `path`, bound to `project`.
    pub fn open(path: impl AsRef<Path>, project: impl Into<String>) -> Result<Self> {
        let path = path.as_ref();
        let project = project.into();
        validate_project(&project)?;

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| MemoryError::StoreUnavailable {
                location: path.display().to_string(),
                remediation: format!("Cannot create directory {}: {e}", parent.display()),
            })?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )?;
        initialize(&conn)?;

        info!(path = %path.display(), project = %project, "record store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            project,
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn open_in_memory(project: impl Into<String>) -> Result<Self> {
        let project = project.into();
        validate_project(&project)?;
        let conn = Connection::open_in_memory()?;
        initialize(&conn)?;

        debug!(project = %project, "in-memory record store created");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            project,
        })
    }

    /// A handle on the same database bound to another project.
    pub fn for_project(&self, project: impl Into<String>) -> Result<Self> {
        let project = project.into();
        validate_project(&project)?;
        Ok(Self {
            conn: Arc::clone(&self.conn),
            project,
        })
    }

    /// The project key every operation is scoped to.
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Schema version recorded in the database.
    pub fn schema_version(&self) -> i32 {
        self.read_or("schema_version", 0, |conn| {
            Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
        })
    }
}

fn initialize(conn: &Connection) -> Result<()> {
    // In-memory databases report "memory" for journal_mode; that is fine.
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    create_schema(conn)
}

fn create_schema(conn: &Connection) -> Result<()> {
    let current_version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .unwrap_or(0);

    if current_version >= SCHEMA_VERSION {
        debug!("Schema up to date (version {})", current_version);
        return Ok(());
    }

    info!(
        "Migrating schema from version {} to {}",
        current_version, SCHEMA_VERSION
    );

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            project_path TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL,
            complexity TEXT,
            dependencies TEXT NOT NULL DEFAULT '[]',
            parent_id TEXT,
            created_at TEXT NOT NULL,
            completed_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_tasks_project
            ON tasks(project_path, created_at);

        CREATE INDEX IF NOT EXISTS idx_tasks_parent
            ON tasks(parent_id);

        CREATE TABLE IF NOT EXISTS memory_entries (
            id TEXT PRIMARY KEY,
            project_path TEXT NOT NULL,
            memory_type TEXT NOT NULL,
            text TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_memory_project_type
            ON memory_entries(project_path, memory_type, created_at);

        CREATE TABLE IF NOT EXISTS discussion_turns (
            id TEXT PRIMARY KEY,
            project_path TEXT NOT NULL,
            turn_index INTEGER NOT NULL,
            role TEXT NOT NULL,
            message TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(project_path, turn_index)
        );

        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
    )
    .map_err(|e| MemoryError::Migration(e.to_string()))?;

    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

    info!("Schema created (version {})", SCHEMA_VERSION);
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Access helpers
// ─────────────────────────────────────────────────────────────────────────────

impl RecordStore {
    /// Run a read; on error log it and return `fallback`.
    pub(crate) fn read_or<T>(
        &self,
        operation: &'static str,
        fallback: T,
        f: impl FnOnce(&Connection) -> Result<T>,
    ) -> T {
        let conn = self.conn.lock();
        match f(&conn) {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    operation,
                    project = %self.project,
                    error = %e,
                    "record store read failed, returning empty result"
                );
                fallback
            }
        }
    }

    /// Run a read that falls back to `T::default()`.
    pub(crate) fn read<T: Default>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&Connection) -> Result<T>,
    ) -> T {
        self.read_or(operation, T::default(), f)
    }

    /// Run a single-statement write.
    pub(crate) fn write<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Execute a function within a transaction.
    ///
    /// If the closure returns an error, all changes are rolled back.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Get a metadata value.
    pub fn get_meta(&self, key: &str) -> Option<String> {
        self.read("get_meta", |conn| {
            let mut stmt = conn.prepare("SELECT value FROM meta WHERE key = ?1")?;
            let mut rows = stmt.query(params![key])?;
            match rows.next()? {
                Some(row) => Ok(Some(row.get(0)?)),
                None => Ok(None),
            }
        })
    }

    /// Set a metadata value.
    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.write(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
                params![key, value],
            )?;
            Ok(())
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Fixed-width RFC 3339 so lexical order matches time order.
pub(crate) fn format_ts(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(value: &str) -> Result<Timestamp> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| MemoryError::InvalidData(format!("bad timestamp '{value}': {e}")))
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern.
pub(crate) fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_store() -> RecordStore {
        RecordStore::open_in_memory("/work/alpha").unwrap()
    }

    #[test]
    fn test_open_in_memory() {
        let store = create_test_store();
        assert_eq!(store.project(), "/work/alpha");
        assert_eq!(store.schema_version(), SCHEMA_VERSION);
    }

    #[test]
    fn test_rejects_empty_project() {
        assert!(matches!(
            RecordStore::open_in_memory(""),
            Err(MemoryError::InvalidData(_))
        ));
        let store = create_test_store();
        assert!(store.for_project("  ").is_err());
    }

    #[test]
    fn test_open_on_disk_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cairn.db");
        let store = RecordStore::open(&path, "p").unwrap();
        store.set_meta("k", "v").unwrap();
        drop(store);

        let reopened = RecordStore::open(&path, "p").unwrap();
        assert_eq!(reopened.get_meta("k").as_deref(), Some("v"));
        assert_eq!(reopened.schema_version(), SCHEMA_VERSION);
    }

    #[test]
    fn test_meta_operations() {
        let store = create_test_store();
        assert!(store.get_meta("test_key").is_none());

        store.set_meta("test_key", "test_value").unwrap();
        assert_eq!(store.get_meta("test_key").as_deref(), Some("test_value"));

        store.set_meta("test_key", "new_value").unwrap();
        assert_eq!(store.get_meta("test_key").as_deref(), Some("new_value"));
    }

    #[test]
    fn test_with_transaction_rolls_back() {
        let store = create_test_store();

        let result: Result<()> = store.with_transaction(|conn| {
            conn.execute(
                "INSERT INTO meta (key, value) VALUES (?1, ?2)",
                params!["tx_key", "tx_value"],
            )?;
            Err(MemoryError::InvalidData("abort".into()))
        });

        assert!(result.is_err());
        assert!(store.get_meta("tx_key").is_none());
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("100%"), "%100\\%%");
        assert_eq!(like_pattern("a_b"), "%a\\_b%");
        assert_eq!(like_pattern("c:\\dir"), "%c:\\\\dir%");
    }

    #[test]
    fn test_timestamps_are_fixed_width() {
        let a = format_ts(&"2024-01-01T00:00:00Z".parse().unwrap());
        let b = format_ts(&"2024-01-01T00:00:00.5Z".parse().unwrap());
        assert_eq!(a.len(), b.len());
        assert!(a < b);
        assert_eq!(parse_ts(&b).unwrap(), "2024-01-01T00:00:00.5Z".parse::<Timestamp>().unwrap());
    }
}

//! Shared record types for the Cairn memory engine.
//!
//! Every record kind carries the `project_path` it belongs to. The authoritative
//! store, the semantic index and the relationship graph all speak in these
//! types, and the context selector merges them into [`ContextItem`]s.

pub mod context;
pub mod discussion;
pub mod memory;
pub mod project;
pub mod task;

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use context::{ContextItem, ContextSource};
pub use discussion::{DiscussionTurn, NewTurn};
pub use memory::{MemoryEntry, ProjectStats, memory_types};
pub use project::{IsolationLevel, ParseIsolationError, ProjectIdentity, ProjectScope};
pub use task::{NewTask, ParseStatusError, Task, TaskStatus};

/// Identifier used by every record kind.
pub type Id = Uuid;

/// UTC timestamp used by every record kind.
pub type Timestamp = DateTime<Utc>;

/// Generate a fresh record identifier.
pub fn new_id() -> Id {
    Uuid::new_v4()
}

/// Current time.
pub fn now() -> Timestamp {
    Utc::now()
}

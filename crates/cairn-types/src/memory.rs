//! Free-form memory entries.

use serde::{Deserialize, Serialize};

use crate::{Id, Timestamp, new_id, now};

/// Well-known memory type tags written by upstream workflows.
///
/// The store accepts any non-empty tag; these are the ones the engine itself
/// reads back.
pub mod memory_types {
    pub const USER_PROMPT: &str = "user_prompt";
    pub const CLARIFIED_PROMPT: &str = "clarified_prompt";
    pub const TASK_COMPLETION: &str = "task_completion";
    /// Serialized task plan, latest-wins.
    pub const TASK_PLAN: &str = "task_plan";
}

/// An immutable memory entry.
///
/// Entries are never updated. A newer entry of the same type supersedes older
/// ones for "latest of type" reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: Id,
    #[serde(rename = "type")]
    pub memory_type: String,
    pub text: String,
    pub project_path: String,
    pub created_at: Timestamp,
}

impl MemoryEntry {
    /// Create a new entry stamped with a fresh id and the current time.
    pub fn new(
        memory_type: impl Into<String>,
        text: impl Into<String>,
        project_path: impl Into<String>,
    ) -> Self {
        Self {
            id: new_id(),
            memory_type: memory_type.into(),
            text: text.into(),
            project_path: project_path.into(),
            created_at: now(),
        }
    }
}

/// Per-project record counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectStats {
    pub tasks: usize,
    pub memories: usize,
    pub discussions: usize,
}

impl ProjectStats {
    /// True when the project holds no records of any kind.
    pub fn is_empty(&self) -> bool {
        self.tasks == 0 && self.memories == 0 && self.discussions == 0
    }
}

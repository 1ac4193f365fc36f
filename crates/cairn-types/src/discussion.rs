//! Discussion turns recorded during clarification conversations.

use serde::{Deserialize, Serialize};

use crate::Id;

/// One turn of a project's discussion.
///
/// `turn_index` is zero-based and contiguous within a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscussionTurn {
    pub id: Id,
    pub role: String,
    pub message: String,
    pub turn_index: u32,
    pub project_path: String,
}

/// A turn as supplied by callers; the store assigns id, index and project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTurn {
    pub role: String,
    pub message: String,
}

impl NewTurn {
    pub fn new(role: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            message: message.into(),
        }
    }
}

impl From<&DiscussionTurn> for NewTurn {
    fn from(turn: &DiscussionTurn) -> Self {
        Self::new(turn.role.clone(), turn.message.clone())
    }
}

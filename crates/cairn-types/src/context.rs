//! Items returned by context selection.

use serde::{Deserialize, Serialize};

use crate::{MemoryEntry, Timestamp};

/// Which backend produced a context item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextSource {
    RecordStore,
    SemanticIndex,
    RelationshipGraph,
}

impl ContextSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RecordStore => "record_store",
            Self::SemanticIndex => "semantic_index",
            Self::RelationshipGraph => "relationship_graph",
        }
    }
}

/// A memory-like item ready to be injected into a prompt.
///
/// `id` is the identity used for deduplication; the semantic index and the
/// relationship graph reuse record ids so the same memory collapses to one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextItem {
    pub id: String,
    #[serde(rename = "type")]
    pub item_type: String,
    pub text: String,
    pub project_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
    pub source: ContextSource,
    /// Similarity score for vector hits, higher is closer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl From<MemoryEntry> for ContextItem {
    fn from(entry: MemoryEntry) -> Self {
        Self {
            id: entry.id.to_string(),
            item_type: entry.memory_type,
            text: entry.text,
            project_path: entry.project_path,
            created_at: Some(entry.created_at),
            source: ContextSource::RecordStore,
            score: None,
        }
    }
}

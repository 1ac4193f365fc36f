//! Memory storage and context retrieval for Cairn.
//!
//! Three backends hold an agent's project memory, and one selector reads
//! across them:
//!
//! - **Record store** ([`RecordStore`]): the authoritative SQLite store for
//!   tasks, memory entries and discussion turns. Required.
//! - **Semantic index** ([`SemanticIndex`]): embeddings and nearest-neighbour
//!   recall through Qdrant or an embedded sqlite-vec file. Optional.
//! - **Relationship graph** ([`RelationshipGraph`]): memory nodes and typed,
//!   weighted edges. Optional.
//! - **Context selector** ([`ContextSelector`]): fans a query out to every
//!   reachable backend and returns a bounded, deduplicated list.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │  MemoryEngine                                                        │
//! │                                                                      │
//! │   remember ──► RecordStore ──(same id, best effort)──► SemanticIndex │
//! │                     │                              └──► Relationship │
//! │                     │                                   Graph        │
//! │   context  ──► ContextSelector ──► similarity pass  (SemanticIndex)  │
//! │                                └─► keyword passes   (store, graph)   │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every record carries a `project_path` and every read filters on it,
//! unless the project's isolation level is `none`.
//!
//! # Usage
//!
//! ```no_run
//! use cairn_memory::{MemoryEngine, RelationshipType};
//! use cairn_types::ProjectIdentity;
//!
//! # async fn demo() -> cairn_memory::Result<()> {
//! let engine = MemoryEngine::in_memory(ProjectIdentity::unmarked("/work/app"))?;
//!
//! let prompt = engine.remember("Build a login page", "user_prompt").await?;
//! let plan = engine.remember("Use the existing session middleware", "task_plan").await?;
//! engine.link(plan, prompt, RelationshipType::Implements);
//!
//! for item in engine.context("login session", Some(5), None).await {
//!     println!("[{}] {}", item.item_type, item.text);
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod context;
pub mod engine;
pub mod error;
pub mod graph;
pub mod semantic;
pub mod store;
pub mod validation;
pub mod vector;

pub use backend::{
    BackendResult, BackendUnavailable, KeywordSource, Lazy, LazyState, SimilaritySource,
};
pub use context::{ContextSelector, MIN_TOKEN_LEN, query_tokens};
pub use engine::{EngineStatus, MemoryEngine, RebuildReport};
pub use error::{MemoryError, Result};
pub use graph::{GraphNode, MAX_TRAVERSAL_DEPTH, ProjectContext, RelationshipGraph, RelationshipType};
pub use semantic::{
    EmbeddingPoint, QdrantIndex, ScoredPoint, SemanticIndex, SemanticStatus, SqliteVecIndex,
    VectorIndex,
};
pub use store::RecordStore;
pub use validation::ValidationError;

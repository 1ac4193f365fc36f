//! Text embedding providers for Cairn.
//!
//! The semantic index only needs one thing from a model: a dense vector for a
//! piece of text. This crate provides the [`Embedder`] trait behind which the
//! providers sit, and a factory that builds one from provider-agnostic settings.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Embedder trait                         │
//! │  - embed() -> Vec<f32>                  │
//! │  - embed_batch() -> Vec<Vec<f32>>       │
//! └─────────────────────────────────────────┘
//!                    │
//!          ┌─────────┴─────────┐
//!          ▼                   ▼
//!     ┌────────┐        ┌──────────────┐
//!     │  Mock  │        │ OpenAI-style │
//!     └────────┘        └──────────────┘
//! ```

pub mod embeddings;
pub mod error;

pub use error::{LlmError, Result};

pub use embeddings::{
    Embedder, EmbedderSpec, MockEmbedder, OpenAiEmbedder, OpenAiEmbedderConfig, SharedEmbedder,
    build_embedder, cosine_similarity, normalize,
};

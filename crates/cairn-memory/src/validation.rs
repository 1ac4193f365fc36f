//! Input validation at the API boundary.
//!
//! Every write path checks its arguments here before a backend is touched, so
//! a bad call never leaves a partial row or a stray vector behind.

use uuid::Uuid;

use crate::error::{MemoryError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Validation Error
// ─────────────────────────────────────────────────────────────────────────────

/// Specific validation failures for caller-supplied data.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// Text content is empty or whitespace.
    #[error("{field} is empty")]
    Empty { field: &'static str },

    /// Text content contains NUL bytes, which usually means binary data.
    #[error("{field} contains NUL bytes")]
    NulBytes { field: &'static str },

    /// Identifier is not a UUID.
    #[error("{field} is not a valid UUID: {value}")]
    InvalidId { field: &'static str, value: String },

    /// Embedding dimension mismatch.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Embedding contains NaN or infinite values.
    #[error("embedding contains {count} invalid values (NaN or Inf)")]
    InvalidEmbeddingValues { count: usize },

    /// Traversal depth outside the accepted range.
    #[error("depth {depth} is out of range [1, {max}]")]
    DepthOutOfRange { depth: usize, max: usize },
}

impl From<ValidationError> for MemoryError {
    fn from(err: ValidationError) -> Self {
        MemoryError::InvalidData(err.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Text
// ─────────────────────────────────────────────────────────────────────────────

/// Reject empty, whitespace-only or NUL-containing text.
pub fn validate_text(field: &'static str, value: &str) -> std::result::Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Empty { field });
    }
    if value.contains('\0') {
        return Err(ValidationError::NulBytes { field });
    }
    Ok(())
}

/// Memory text and its type tag.
pub fn validate_memory(text: &str, memory_type: &str) -> Result<()> {
    validate_text("memory text", text)?;
    validate_text("memory type", memory_type)?;
    Ok(())
}

pub fn validate_task_title(title: &str) -> Result<()> {
    validate_text("task title", title).map_err(MemoryError::from)
}

/// A discussion turn needs a role; an empty message is allowed.
pub fn validate_turn(role: &str, message: &str) -> Result<()> {
    validate_text("turn role", role)?;
    if message.contains('\0') {
        return Err(ValidationError::NulBytes {
            field: "turn message",
        }
        .into());
    }
    Ok(())
}

/// Project keys scope every row; an empty one would merge unrelated projects.
pub fn validate_project(project: &str) -> Result<()> {
    validate_text("project path", project).map_err(MemoryError::from)
}

/// Parse a caller-supplied id string.
pub fn parse_id(field: &'static str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value.trim()).map_err(|_| {
        ValidationError::InvalidId {
            field,
            value: value.to_string(),
        }
        .into()
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Embeddings
// ─────────────────────────────────────────────────────────────────────────────

/// Check dimension and reject NaN or Inf values.
pub fn validate_embedding(
    embedding: &[f32],
    expected_dim: usize,
) -> std::result::Result<(), ValidationError> {
    if embedding.len() != expected_dim {
        return Err(ValidationError::DimensionMismatch {
            expected: expected_dim,
            actual: embedding.len(),
        });
    }

    let invalid_count = embedding
        .iter()
        .filter(|v| v.is_nan() || v.is_infinite())
        .count();
    if invalid_count > 0 {
        return Err(ValidationError::InvalidEmbeddingValues {
            count: invalid_count,
        });
    }

    Ok(())
}

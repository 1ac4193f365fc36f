//! Error types for the memory crate.

use thiserror::Error;

/// Errors that can occur in the memory crate.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Database connection or operation failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Requested resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Schema migration failed.
    #[error("Migration error: {0}")]
    Migration(String),

    /// Invalid UUID format.
    #[error("Invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    /// Invalid data or state, rejected before touching a backend.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// The authoritative record store cannot be opened. Fatal at startup.
    #[error("Record store unavailable at {location}. {remediation}")]
    StoreUnavailable {
        location: String,
        remediation: String,
    },

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] cairn_config::ConfigError),

    /// Embedding provider failed.
    #[error("Embedding error: {0}")]
    Embedding(#[from] cairn_llm::LlmError),
}

/// Result type alias for memory operations.
pub type Result<T> = std::result::Result<T, MemoryError>;

//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [store]                  # authoritative record store (required)
//! database = "~/.local/share/cairn/memory.db"
//!
//! [semantic]               # optional similarity index
//! backend = "qdrant"
//! host = "localhost"
//! port = 6333
//!
//! [graph]                  # optional relationship graph
//! path = "~/.local/share/cairn/graph.db"
//!
//! [embedding]
//! provider = "openai"
//!
//! [context]
//! max_memories = 10
//! backend_timeout_secs = 20
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial files can be loaded and merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CairnConfig {
    /// Authoritative record store.
    pub store: Option<StoreConfig>,

    /// Semantic (vector) index.
    pub semantic: Option<SemanticConfig>,

    /// Relationship graph.
    pub graph: Option<GraphConfig>,

    /// Embedding provider.
    pub embedding: Option<EmbeddingConfig>,

    /// Context selection defaults.
    pub context: Option<ContextConfig>,
}

impl CairnConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: CairnConfig) {
        if other.store.is_some() {
            self.store = other.store;
        }
        if other.semantic.is_some() {
            self.semantic = other.semantic;
        }
        if other.graph.is_some() {
            self.graph = other.graph;
        }
        if other.embedding.is_some() {
            self.embedding = other.embedding;
        }
        if other.context.is_some() {
            self.context = other.context;
        }
    }

    /// The record store connection string, or a remediation error naming the
    /// file the operator should edit.
    pub fn require_store(&self, config_path: &Path) -> Result<&StoreConfig> {
        self.store
            .as_ref()
            .filter(|s| !s.database.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingStore {
                config_path: config_path.display().to_string(),
            })
    }

    pub fn semantic_or_default(&self) -> SemanticConfig {
        self.semantic.clone().unwrap_or_default()
    }

    pub fn graph_or_default(&self) -> GraphConfig {
        self.graph.clone().unwrap_or_default()
    }

    pub fn embedding_or_default(&self) -> EmbeddingConfig {
        self.embedding.clone().unwrap_or_default()
    }

    pub fn context_or_default(&self) -> ContextConfig {
        self.context.clone().unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Record Store
// ─────────────────────────────────────────────────────────────────────────────

/// Record store connection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Connection string: a filesystem path, `sqlite://<path>`, or `:memory:`.
    pub database: String,
}

impl StoreConfig {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
        }
    }

    /// Resolve the connection string to a database location.
    ///
    /// Strips an optional `sqlite://` scheme and expands a leading `~`.
    pub fn database_path(&self) -> PathBuf {
        let raw = self.database.trim();
        let raw = raw.strip_prefix("sqlite://").unwrap_or(raw);
        expand_home(raw)
    }

    pub fn is_in_memory(&self) -> bool {
        self.database.trim() == ":memory:"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Semantic Index
// ─────────────────────────────────────────────────────────────────────────────

/// Semantic index backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticBackend {
    /// Qdrant over HTTP at `host:port`.
    #[default]
    Qdrant,
    /// Embedded sqlite-vec file at `path`.
    Local,
}

/// Semantic index connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticConfig {
    pub enabled: bool,
    pub backend: SemanticBackend,
    pub host: String,
    pub port: u16,
    pub collection: String,
    /// Location of the embedded index (local backend only).
    pub path: Option<PathBuf>,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: SemanticBackend::Qdrant,
            host: "localhost".to_string(),
            port: 6333,
            collection: "cairn_memories".to_string(),
            path: None,
        }
    }
}

impl SemanticConfig {
    /// Base URL of the Qdrant HTTP API.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Effective location of the embedded index.
    pub fn effective_path(&self) -> PathBuf {
        self.path
            .as_deref()
            .map(|p| expand_home(&p.to_string_lossy()))
            .unwrap_or_else(|| crate::data_dir().join("semantic.db"))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Relationship Graph
// ─────────────────────────────────────────────────────────────────────────────

/// Relationship graph connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub enabled: bool,
    /// Graph database location. Defaults to `<data dir>/graph.db`.
    pub path: Option<PathBuf>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

impl GraphConfig {
    pub fn effective_path(&self) -> PathBuf {
        self.path
            .as_deref()
            .map(|p| expand_home(&p.to_string_lossy()))
            .unwrap_or_else(|| crate::data_dir().join("graph.db"))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Embedding
// ─────────────────────────────────────────────────────────────────────────────

/// Embedding provider configuration.
///
/// ```toml
/// [embedding]
/// provider = "openai"
/// dimensions = 1536
///
/// [embedding.openai]
/// model = "text-embedding-3-small"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    /// Output embedding dimensions. Default depends on provider.
    pub dimensions: Option<usize>,
    pub openai: Option<EmbeddingOpenAiConfig>,
}

impl EmbeddingConfig {
    /// Effective dimensions for the configured provider.
    pub fn effective_dimensions(&self) -> usize {
        if let Some(d) = self.dimensions {
            return d;
        }
        match self.provider {
            EmbeddingProvider::OpenAi => self
                .openai
                .as_ref()
                .and_then(|c| c.dimensions)
                .unwrap_or(1536),
            EmbeddingProvider::Mock => 384,
        }
    }

    /// API key from config, falling back to `OPENAI_API_KEY`.
    pub fn openai_api_key(&self) -> Option<String> {
        self.openai
            .as_ref()
            .and_then(|c| c.api_key.clone())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|k| !k.is_empty())
    }
}

/// Supported embedding providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// OpenAI-compatible embeddings API.
    OpenAi,
    /// Deterministic hash embedder (offline, testing).
    #[default]
    Mock,
}

impl EmbeddingProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Mock => "mock",
        }
    }
}

/// OpenAI embedding provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingOpenAiConfig {
    pub model: String,
    pub dimensions: Option<usize>,
    /// Custom base URL (for proxies and compatible servers).
    pub base_url: Option<String>,
    /// API key (prefer the environment variable).
    pub api_key: Option<String>,
}

impl Default for EmbeddingOpenAiConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            dimensions: None,
            base_url: None,
            api_key: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Context Selection
// ─────────────────────────────────────────────────────────────────────────────

/// Defaults for context selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub max_memories: usize,
    /// Upper bound on any single backend call.
    pub backend_timeout_secs: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_memories: 10,
            backend_timeout_secs: 20,
        }
    }
}

impl ContextConfig {
    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs.max(1))
    }
}

/// Expand a leading `~` to the home directory.
pub(crate) fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    if raw == "~"
        && let Some(home) = dirs::home_dir()
    {
        return home;
    }
    PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = CairnConfig::from_toml(
            r#"
[store]
database = "sqlite:///var/lib/cairn/memory.db"

[semantic]
backend = "local"
path = "/var/lib/cairn/semantic.db"

[graph]
enabled = false

[embedding]
provider = "openai"

[embedding.openai]
model = "text-embedding-3-large"
dimensions = 256

[context]
max_memories = 25
"#,
        )
        .unwrap();

        let store = config.store.as_ref().unwrap();
        assert_eq!(store.database_path(), PathBuf::from("/var/lib/cairn/memory.db"));
        let semantic = config.semantic_or_default();
        assert_eq!(semantic.backend, SemanticBackend::Local);
        assert_eq!(semantic.port, 6333);
        assert!(!config.graph_or_default().enabled);
        assert_eq!(config.embedding_or_default().effective_dimensions(), 256);
        let context = config.context_or_default();
        assert_eq!(context.max_memories, 25);
        assert_eq!(context.backend_timeout(), Duration::from_secs(20));
    }

    #[test]
    fn test_defaults_when_sections_missing() {
        let config = CairnConfig::from_toml("").unwrap();
        let semantic = config.semantic_or_default();
        assert!(semantic.enabled);
        assert_eq!(semantic.base_url(), "http://localhost:6333");
        assert_eq!(semantic.collection, "cairn_memories");
        assert!(config.graph_or_default().enabled);
        assert_eq!(config.embedding_or_default().provider, EmbeddingProvider::Mock);
        assert_eq!(config.embedding_or_default().effective_dimensions(), 384);
    }

    #[test]
    fn test_require_store_missing_names_config_file() {
        let config = CairnConfig::new();
        let err = config
            .require_store(Path::new("/home/u/.config/cairn/config.toml"))
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("[store]"));
        assert!(msg.contains("/home/u/.config/cairn/config.toml"));
    }

    #[test]
    fn test_require_store_rejects_blank_database() {
        let config = CairnConfig {
            store: Some(StoreConfig::new("   ")),
            ..Default::default()
        };
        assert!(config.require_store(Path::new("config.toml")).is_err());
    }

    #[test]
    fn test_merge_prefers_other() {
        let mut base = CairnConfig {
            store: Some(StoreConfig::new("/a.db")),
            context: Some(ContextConfig::default()),
            ..Default::default()
        };
        base.merge(CairnConfig {
            store: Some(StoreConfig::new("/b.db")),
            ..Default::default()
        });
        assert_eq!(base.store.unwrap().database, "/b.db");
        assert!(base.context.is_some());
    }

    #[test]
    fn test_in_memory_store() {
        assert!(StoreConfig::new(":memory:").is_in_memory());
        assert!(!StoreConfig::new("/tmp/x.db").is_in_memory());
    }

    #[test]
    fn test_round_trip_toml() {
        let config = CairnConfig {
            store: Some(StoreConfig::new("/data/memory.db")),
            ..Default::default()
        };
        let text = config.to_toml().unwrap();
        let parsed = CairnConfig::from_toml(&text).unwrap();
        assert_eq!(parsed.store.unwrap().database, "/data/memory.db");
    }
}

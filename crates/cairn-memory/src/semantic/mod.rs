//! Semantic index: content embeddings and nearest-neighbour recall.
//!
//! The index is optional. Writes never raise and reads return empty results
//! when the embedder or the vector backend cannot be reached. Both are built
//! lazily, at most once, through [`Lazy`].
//!
//! Two vector backends implement [`VectorIndex`]:
//! - [`QdrantIndex`]: a Qdrant server over HTTP
//! - [`SqliteVecIndex`]: an embedded sqlite-vec database file

mod local;
mod qdrant;

pub use local::SqliteVecIndex;
pub use qdrant::QdrantIndex;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use cairn_config::{EmbeddingConfig, EmbeddingProvider, SemanticBackend, SemanticConfig};
use cairn_llm::{EmbedderSpec, SharedEmbedder, build_embedder};
use cairn_types::{ContextItem, ContextSource, ProjectScope, Timestamp};

use crate::backend::{BackendResult, BackendUnavailable, Lazy, LazyState, SimilaritySource};
use crate::validation::{validate_embedding, validate_text};

const BACKEND: &str = "semantic_index";

/// Payload key holding the id of the record a point mirrors.
pub const RECORD_ID_KEY: &str = "record_id";

// ─────────────────────────────────────────────────────────────────────────────
// Points
// ─────────────────────────────────────────────────────────────────────────────

/// One embedded piece of content. Created once per add and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub text: String,
    pub project_path: String,
    pub metadata: Map<String, Value>,
}

/// A search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: String,
    pub text: String,
    pub project_path: String,
    pub metadata: Map<String, Value>,
    /// Cosine similarity, higher is closer.
    pub score: f32,
}

impl ScoredPoint {
    fn into_context_item(self) -> ContextItem {
        let id = self
            .metadata
            .get(RECORD_ID_KEY)
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or(self.id);
        let item_type = self
            .metadata
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("memory")
            .to_string();
        let created_at = self
            .metadata
            .get("created_at")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<Timestamp>().ok());

        ContextItem {
            id,
            item_type,
            text: self.text,
            project_path: self.project_path,
            created_at,
            source: ContextSource::SemanticIndex,
            score: Some(self.score),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Vector backend seam
// ─────────────────────────────────────────────────────────────────────────────

/// Storage and KNN search for embedding points.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn kind(&self) -> &'static str;

    /// Create the collection if missing. Must be idempotent.
    async fn ensure_collection(&self, dimensions: usize) -> BackendResult<()>;

    async fn upsert(&self, point: EmbeddingPoint) -> BackendResult<()>;

    /// Nearest points to `vector`, closest first. `None` searches all projects.
    async fn search(
        &self,
        vector: Vec<f32>,
        limit: usize,
        project_path: Option<&str>,
    ) -> BackendResult<Vec<ScoredPoint>>;

    /// Remove every point of `project_path`. A missing collection holds none.
    async fn delete_project(&self, project_path: &str) -> BackendResult<()>;
}

pub type SharedVectorIndex = Arc<dyn VectorIndex>;

// ─────────────────────────────────────────────────────────────────────────────
// Semantic Index
// ─────────────────────────────────────────────────────────────────────────────

/// Reachability of the semantic index's parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemanticStatus {
    pub embedder: LazyState,
    pub index: LazyState,
    pub collection_ready: bool,
}

pub struct SemanticIndex {
    embedder: Lazy<SharedEmbedder>,
    index: Lazy<SharedVectorIndex>,
    collection_ready: AtomicBool,
    default_project: String,
}

impl std::fmt::Debug for SemanticIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticIndex")
            .field("embedder", &self.embedder.state())
            .field("index", &self.index.state())
            .field("default_project", &self.default_project)
            .finish_non_exhaustive()
    }
}

impl SemanticIndex {
    pub fn new(
        embedder: Lazy<SharedEmbedder>,
        index: Lazy<SharedVectorIndex>,
        default_project: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            index,
            collection_ready: AtomicBool::new(false),
            default_project: default_project.into(),
        }
    }

    /// An index over already-constructed parts.
    pub fn with_backends(
        embedder: SharedEmbedder,
        index: SharedVectorIndex,
        default_project: impl Into<String>,
    ) -> Self {
        Self::new(
            Lazy::ready("embedder", embedder),
            Lazy::ready(BACKEND, index),
            default_project,
        )
    }

    /// An index whose every operation is a no-op.
    pub fn disabled(default_project: impl Into<String>) -> Self {
        Self::new(
            Lazy::disabled("embedder"),
            Lazy::disabled(BACKEND),
            default_project,
        )
    }

    /// Build from config. Nothing connects until first use.
    pub fn from_config(
        semantic: &SemanticConfig,
        embedding: &EmbeddingConfig,
        default_project: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        if !semantic.enabled {
            return Self::disabled(default_project);
        }

        let spec = EmbedderSpec {
            provider: embedding.provider.as_str().to_string(),
            openai_api_key: embedding.openai_api_key(),
            openai_model: embedding.openai.as_ref().map(|c| c.model.clone()),
            openai_base_url: embedding.openai.as_ref().and_then(|c| c.base_url.clone()),
            dimensions: match embedding.provider {
                EmbeddingProvider::Mock => Some(embedding.effective_dimensions()),
                EmbeddingProvider::OpenAi => embedding
                    .dimensions
                    .or_else(|| embedding.openai.as_ref().and_then(|c| c.dimensions)),
            },
        };
        let embedder = Lazy::new("embedder", move || {
            let spec = spec.clone();
            async move { build_embedder(&spec).map_err(|e| BackendUnavailable::new("embedder", e)) }
        })
        .with_init_timeout(timeout);

        let index = match semantic.backend {
            SemanticBackend::Qdrant => {
                let base_url = semantic.base_url();
                let collection = semantic.collection.clone();
                Lazy::new(BACKEND, move || {
                    let base_url = base_url.clone();
                    let collection = collection.clone();
                    async move {
                        let index = QdrantIndex::connect(&base_url, &collection, timeout).await?;
                        Ok(Arc::new(index) as SharedVectorIndex)
                    }
                })
            }
            SemanticBackend::Local => {
                let path = semantic.effective_path();
                Lazy::new(BACKEND, move || {
                    let path = path.clone();
                    async move {
                        let index = tokio::task::spawn_blocking(move || SqliteVecIndex::open(&path))
                            .await
                            .map_err(|e| BackendUnavailable::new(BACKEND, e))?
                            .map_err(|e| BackendUnavailable::new(BACKEND, e))?;
                        Ok(Arc::new(index) as SharedVectorIndex)
                    }
                })
            }
        };

        Self::new(embedder, index.with_init_timeout(timeout), default_project)
    }

    pub fn default_project(&self) -> &str {
        &self.default_project
    }

    pub fn status(&self) -> SemanticStatus {
        SemanticStatus {
            embedder: self.embedder.state(),
            index: self.index.state(),
            collection_ready: self.collection_ready.load(Ordering::Acquire),
        }
    }

    /// Connect both parts now instead of on first use.
    pub async fn warm_up(&self) -> bool {
        self.embedder.get().await.is_ok() && self.index.get().await.is_ok()
    }

    /// Embed `text` and store it. Never raises; returns whether it was stored.
    ///
    /// `metadata["project_path"]` overrides the default project. An `id` or
    /// `record_id` string in the metadata becomes the point id, so the point
    /// deduplicates against the record it mirrors.
    pub async fn add_to_memory(&self, text: &str, metadata: Map<String, Value>) -> bool {
        match self.index_text(text, metadata).await {
            Ok(id) => {
                debug!(point_id = %id, "Indexed memory");
                true
            }
            Err(e) => {
                warn!(error = %e, "semantic index write skipped");
                false
            }
        }
    }

    async fn index_text(&self, text: &str, mut metadata: Map<String, Value>) -> BackendResult<String> {
        validate_text("memory text", text).map_err(|e| BackendUnavailable::new(BACKEND, e))?;

        let embedder = self.embedder.get().await?;
        let index = self.index.get().await?;

        let vector = embedder
            .embed(text)
            .await
            .map_err(|e| BackendUnavailable::new("embedder", e))?;
        validate_embedding(&vector, embedder.dimensions())
            .map_err(|e| BackendUnavailable::new("embedder", e))?;

        self.ensure_collection(index.as_ref(), embedder.dimensions())
            .await?;

        let project_path = metadata
            .get("project_path")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| self.default_project.clone());
        let caller_id = metadata
            .get(RECORD_ID_KEY)
            .or_else(|| metadata.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let id = point_id(caller_id.as_deref());

        metadata.remove("id");
        metadata.insert(
            RECORD_ID_KEY.into(),
            Value::String(caller_id.unwrap_or_else(|| id.clone())),
        );
        metadata.insert("project_path".into(), Value::String(project_path.clone()));

        index
            .upsert(EmbeddingPoint {
                id: id.clone(),
                vector,
                text: text.to_string(),
                project_path,
                metadata,
            })
            .await?;
        Ok(id)
    }

    /// Drop every point of `project_path`. Never raises; returns whether the
    /// index confirmed the deletion.
    pub async fn clear_project(&self, project_path: &str) -> bool {
        let index = match self.index.get().await {
            Ok(index) => index,
            Err(e) => {
                debug!(error = %e, "semantic index clear skipped");
                return false;
            }
        };
        match index.delete_project(project_path).await {
            Ok(()) => {
                info!(project = project_path, "Cleared semantic points");
                true
            }
            Err(e) => {
                warn!(project = project_path, error = %e, "semantic index clear failed");
                false
            }
        }
    }

    /// Create the collection until one attempt succeeds; skip afterwards.
    async fn ensure_collection(&self, index: &dyn VectorIndex, dims: usize) -> BackendResult<()> {
        if self.collection_ready.load(Ordering::Acquire) {
            return Ok(());
        }
        index.ensure_collection(dims).await?;
        self.collection_ready.store(true, Ordering::Release);
        Ok(())
    }

    /// Texts most similar to `query`, closest first; empty on any failure.
    ///
    /// `project_path` defaults to this index's project.
    pub async fn search_memory(
        &self,
        query: &str,
        limit: usize,
        project_path: Option<&str>,
    ) -> Vec<String> {
        let scope = ProjectScope::project(project_path.unwrap_or(&self.default_project));
        match self.search(query, limit, &scope).await {
            Ok(items) => items.into_iter().map(|item| item.text).collect(),
            Err(e) => {
                debug!(error = %e, "semantic search unavailable");
                Vec::new()
            }
        }
    }

    /// Nearest neighbours as context items.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        scope: &ProjectScope,
    ) -> BackendResult<Vec<ContextItem>> {
        if limit == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let embedder = self.embedder.get().await?;
        let index = self.index.get().await?;

        let vector = embedder
            .embed(query)
            .await
            .map_err(|e| BackendUnavailable::new("embedder", e))?;
        self.ensure_collection(index.as_ref(), embedder.dimensions())
            .await?;
        let points = index.search(vector, limit, scope.key()).await?;

        Ok(points
            .into_iter()
            .filter(|p| scope.admits(&p.project_path))
            .map(ScoredPoint::into_context_item)
            .collect())
    }
}

/// Point id for a caller-supplied record id. Backends need UUIDs, so other
/// strings map to a stable name-based UUID; no id gets a random one.
fn point_id(record_id: Option<&str>) -> String {
    match record_id {
        Some(s) => uuid::Uuid::parse_str(s)
            .unwrap_or_else(|_| uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, s.as_bytes())),
        None => uuid::Uuid::new_v4(),
    }
    .to_string()
}

#[async_trait]
impl SimilaritySource for SemanticIndex {
    fn source_name(&self) -> &'static str {
        BACKEND
    }

    async fn similarity_search(
        &self,
        query: &str,
        limit: usize,
        scope: &ProjectScope,
    ) -> BackendResult<Vec<ContextItem>> {
        self.search(query, limit, scope).await
    }
}

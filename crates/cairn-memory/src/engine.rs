//! The engine facade: one project's record store, semantic index,
//! relationship graph and context selector wired together.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use cairn_config::CairnConfig;
use cairn_types::{
    ContextItem, Id, MemoryEntry, ProjectIdentity, ProjectStats, TaskStatus, memory_types,
};

use crate::context::ContextSelector;
use crate::error::{MemoryError, Result};
use crate::graph::{RelationshipGraph, RelationshipType};
use crate::semantic::{SemanticIndex, SemanticStatus};
use crate::store::{RecordStore, format_ts};

/// Reachability and volume of every backend for one project.
#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub identity: ProjectIdentity,
    pub records: ProjectStats,
    pub semantic: SemanticStatus,
    pub graph_available: bool,
    pub graph_nodes: usize,
}

/// Outcome of [`MemoryEngine::rebuild_indexes`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildReport {
    pub memories: usize,
    pub embedded: usize,
    pub mirrored: usize,
}

pub struct MemoryEngine {
    identity: ProjectIdentity,
    store: RecordStore,
    semantic: Arc<SemanticIndex>,
    graph: RelationshipGraph,
    selector: ContextSelector,
    max_memories: usize,
}

impl std::fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEngine")
            .field("project", &self.identity.key)
            .field("isolation", &self.identity.isolation)
            .field("selector", &self.selector)
            .finish_non_exhaustive()
    }
}

impl MemoryEngine {
    /// Wire already-constructed backends for `identity`.
    pub fn new(
        identity: ProjectIdentity,
        store: RecordStore,
        semantic: SemanticIndex,
        graph: RelationshipGraph,
    ) -> Self {
        let semantic = Arc::new(semantic);
        let selector = ContextSelector::new()
            .with_keyword_source(Arc::new(store.clone()))
            .with_keyword_source(Arc::new(graph.clone()))
            .with_similarity_source(semantic.clone());
        Self {
            identity,
            store,
            semantic,
            graph,
            selector,
            max_memories: cairn_config::ContextConfig::default().max_memories,
        }
    }

    /// Build every backend from configuration.
    ///
    /// Only the record store is required. When it cannot be opened the error
    /// carries remediation text naming `config_path`.
    pub fn from_config(
        config: &CairnConfig,
        config_path: &Path,
        identity: ProjectIdentity,
    ) -> Result<Self> {
        let store_config = config.require_store(config_path)?;
        let context = config.context_or_default();

        let store = if store_config.is_in_memory() {
            RecordStore::open_in_memory(identity.key.clone())?
        } else {
            let path = store_config.database_path();
            RecordStore::open(&path, identity.key.clone()).map_err(|e| match e {
                MemoryError::StoreUnavailable { .. } => e,
                other => MemoryError::StoreUnavailable {
                    location: path.display().to_string(),
                    remediation: format!(
                        "{other}. Check `[store] database` in {}.",
                        config_path.display()
                    ),
                },
            })?
        };

        let semantic = SemanticIndex::from_config(
            &config.semantic_or_default(),
            &config.embedding_or_default(),
            identity.key.clone(),
            context.backend_timeout(),
        );

        let graph_config = config.graph_or_default();
        let graph = if graph_config.enabled {
            RelationshipGraph::open(&graph_config.effective_path(), identity.key.clone())
        } else {
            RelationshipGraph::disabled(identity.key.clone())
        };

        info!(
            project = %identity.key,
            isolation = %identity.isolation,
            "memory engine ready"
        );

        Ok(Self::new(identity, store, semantic, graph)
            .with_backend_timeout(context.backend_timeout())
            .with_max_memories(context.max_memories))
    }

    /// Engine with an in-memory store and no optional backends.
    pub fn in_memory(identity: ProjectIdentity) -> Result<Self> {
        let store = RecordStore::open_in_memory(identity.key.clone())?;
        let semantic = SemanticIndex::disabled(identity.key.clone());
        let graph = RelationshipGraph::disabled(identity.key.clone());
        Ok(Self::new(identity, store, semantic, graph))
    }

    /// Per-call bound for every optional backend, on reads and mirror writes.
    pub fn with_backend_timeout(mut self, timeout: Duration) -> Self {
        self.selector = self.selector.with_timeout(timeout);
        self
    }

    pub fn with_max_memories(mut self, max: usize) -> Self {
        self.max_memories = max;
        self
    }

    pub fn identity(&self) -> &ProjectIdentity {
        &self.identity
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn semantic(&self) -> &SemanticIndex {
        &self.semantic
    }

    pub fn graph(&self) -> &RelationshipGraph {
        &self.graph
    }

    pub fn selector(&self) -> &ContextSelector {
        &self.selector
    }

    /// Record a memory, then mirror it into the semantic index and the graph
    /// under the same id. Mirroring is best-effort.
    pub async fn remember(&self, text: &str, memory_type: &str) -> Result<Id> {
        let id = self.store.add_memory(text, memory_type)?;
        let Some(entry) = self.store.get_memory(id) else {
            return Ok(id);
        };

        let (embedded, mirrored) = self.mirror(&entry).await;
        debug!(memory_id = %id, embedded, mirrored, "Remembered");
        Ok(id)
    }

    /// Copy a stored memory into the semantic index and the graph under its
    /// record id. Each copy is bounded by the backend timeout.
    async fn mirror(&self, entry: &MemoryEntry) -> (bool, bool) {
        let limit = self.selector.timeout();

        let embedded = tokio::time::timeout(
            limit,
            self.semantic
                .add_to_memory(&entry.text, point_metadata(entry)),
        )
        .await
        .unwrap_or_else(|_| {
            warn!(memory_id = %entry.id, ?limit, "semantic index write timed out");
            false
        });

        let graph = self.graph.clone();
        let node = entry.clone();
        let write = tokio::task::spawn_blocking(move || {
            graph
                .add_node(
                    &node.id.to_string(),
                    &node.memory_type,
                    &node.text,
                    None,
                    Some(&node.project_path),
                )
                .is_some()
        });
        let mirrored = match tokio::time::timeout(limit, write).await {
            Ok(Ok(mirrored)) => mirrored,
            Ok(Err(e)) => {
                warn!(memory_id = %entry.id, error = %e, "graph mirror failed");
                false
            }
            Err(_) => {
                warn!(memory_id = %entry.id, ?limit, "graph mirror timed out");
                false
            }
        };

        (embedded, mirrored)
    }

    /// Relate two remembered memories in the graph.
    pub fn link(&self, from: Id, to: Id, relationship: RelationshipType) -> bool {
        self.graph
            .add_relationship(&from.to_string(), &to.to_string(), relationship, None)
    }

    /// Mark a task completed and remember its completion.
    pub async fn complete_task(&self, id: Id) -> Result<bool> {
        if !self.store.update_task_status(id, TaskStatus::Completed)? {
            return Ok(false);
        }
        if let Some(task) = self.store.get_task(id) {
            self.remember(&task.title, memory_types::TASK_COMPLETION)
                .await?;
        }
        Ok(true)
    }

    /// Relevant memories for `query` under this project's isolation level.
    ///
    /// `max` defaults to the configured budget. Never fails.
    pub async fn context(
        &self,
        query: &str,
        max: Option<usize>,
        types: Option<&[String]>,
    ) -> Vec<ContextItem> {
        self.selector
            .select_context(
                query,
                max.unwrap_or(self.max_memories),
                types,
                &self.identity.scope(),
            )
            .await
    }

    /// Re-embed and re-mirror every memory of this project from the record store.
    pub async fn rebuild_indexes(&self) -> RebuildReport {
        let memories = self.store.get_all_memories();
        let mut report = RebuildReport {
            memories: memories.len(),
            ..RebuildReport::default()
        };

        for entry in memories {
            let (embedded, mirrored) = self.mirror(&entry).await;
            report.embedded += usize::from(embedded);
            report.mirrored += usize::from(mirrored);
        }

        info!(
            memories = report.memories,
            embedded = report.embedded,
            mirrored = report.mirrored,
            "Rebuilt indexes"
        );
        report
    }

    /// Erase this project's tasks, memories and discussion turns, then their
    /// mirrors in the graph and the semantic index.
    ///
    /// The returned counts are the record store's. Mirror cleanup is
    /// best-effort and bounded by the backend timeout.
    pub async fn clear(&self) -> Result<ProjectStats> {
        let removed = self.store.clear_project_data()?;
        let project = self.identity.key.as_str();
        let limit = self.selector.timeout();

        let nodes = self.graph.clear_project(project);
        let points = tokio::time::timeout(limit, self.semantic.clear_project(project))
            .await
            .unwrap_or(false);

        info!(
            project,
            tasks = removed.tasks,
            memories = removed.memories,
            discussions = removed.discussions,
            graph_nodes = nodes,
            semantic_cleared = points,
            "Cleared project"
        );
        Ok(removed)
    }

    pub async fn status(&self) -> EngineStatus {
        self.semantic.warm_up().await;
        EngineStatus {
            identity: self.identity.clone(),
            records: self.store.get_project_stats(),
            semantic: self.semantic.status(),
            graph_available: self.graph.is_available(),
            graph_nodes: self.graph.node_count(&self.identity.key),
        }
    }
}

/// Payload carried by a memory's semantic point. The record id lets keyword
/// and vector hits deduplicate.
fn point_metadata(entry: &MemoryEntry) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("id".into(), Value::String(entry.id.to_string()));
    metadata.insert("type".into(), Value::String(entry.memory_type.clone()));
    metadata.insert("created_at".into(), Value::String(format_ts(&entry.created_at)));
    metadata.insert("project_path".into(), Value::String(entry.project_path.clone()));
    metadata
}

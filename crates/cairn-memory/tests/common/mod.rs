//! Shared fixtures for memory engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use cairn_llm::MockEmbedder;
use cairn_memory::{
    BackendResult, KeywordSource, MemoryEngine, RecordStore, RelationshipGraph, SemanticIndex,
    SimilaritySource, SqliteVecIndex,
};
use cairn_types::{ContextItem, IsolationLevel, ProjectIdentity, ProjectScope};

pub const ALPHA: &str = "/work/alpha";
pub const BETA: &str = "/work/beta";

/// Engine with every backend live and in memory.
pub fn full_engine(project: &str) -> anyhow::Result<MemoryEngine> {
    let store = RecordStore::open_in_memory(project)?;
    let graph = RelationshipGraph::open_in_memory(project)?;
    let index = Arc::new(SqliteVecIndex::open_in_memory()?);
    Ok(engine_over(ProjectIdentity::unmarked(project), store, graph, index))
}

/// Two project engines sharing one store, one graph and one vector index.
pub fn two_projects() -> anyhow::Result<(MemoryEngine, MemoryEngine)> {
    two_projects_with(IsolationLevel::Strict)
}

/// Like [`two_projects`], with `alpha_isolation` applied to the alpha engine.
pub fn two_projects_with(
    alpha_isolation: IsolationLevel,
) -> anyhow::Result<(MemoryEngine, MemoryEngine)> {
    let store = RecordStore::open_in_memory(ALPHA)?;
    let graph = RelationshipGraph::open_in_memory(ALPHA)?;
    let index = Arc::new(SqliteVecIndex::open_in_memory()?);

    let alpha_identity = ProjectIdentity {
        isolation: alpha_isolation,
        ..ProjectIdentity::unmarked(ALPHA)
    };
    let alpha = engine_over(alpha_identity, store.clone(), graph.clone(), index.clone());
    let beta = engine_over(
        ProjectIdentity::unmarked(BETA),
        store.for_project(BETA)?,
        graph,
        index,
    );
    Ok((alpha, beta))
}

fn engine_over(
    identity: ProjectIdentity,
    store: RecordStore,
    graph: RelationshipGraph,
    index: Arc<SqliteVecIndex>,
) -> MemoryEngine {
    let semantic =
        SemanticIndex::with_backends(Arc::new(MockEmbedder::new(64)), index, identity.key.clone());
    MemoryEngine::new(identity, store, semantic, graph)
}

/// Keyword and similarity source that only counts calls.
#[derive(Default)]
pub struct CountingSource {
    pub calls: AtomicUsize,
}

impl CountingSource {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeywordSource for CountingSource {
    fn source_name(&self) -> &'static str {
        "counting"
    }

    async fn keyword_search(
        &self,
        _query: &str,
        _limit: usize,
        _types: Option<&[String]>,
        _scope: &ProjectScope,
    ) -> BackendResult<Vec<ContextItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

#[async_trait]
impl SimilaritySource for CountingSource {
    fn source_name(&self) -> &'static str {
        "counting"
    }

    async fn similarity_search(
        &self,
        _query: &str,
        _limit: usize,
        _scope: &ProjectScope,
    ) -> BackendResult<Vec<ContextItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

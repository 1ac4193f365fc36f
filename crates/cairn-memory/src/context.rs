//! Context selection: fan a free-text query out to every reachable backend
//! and merge the answers into one bounded, deduplicated list.
//!
//! Ordering of the merged list:
//! 1. nearest-neighbour hits from the similarity source, closest first
//! 2. keyword hits, in query-token order, record store before graph
//!
//! The first occurrence of an id wins. A backend that fails or exceeds the
//! per-call timeout contributes nothing.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, warn};

use cairn_types::{ContextItem, ProjectScope};

use crate::backend::{BackendResult, KeywordSource, SimilaritySource};

/// Tokens shorter than this are not searched on their own.
pub const MIN_TOKEN_LEN: usize = 3;

pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(20);

type SlotFuture<'a> = Pin<Box<dyn Future<Output = (usize, Vec<ContextItem>)> + Send + 'a>>;

#[derive(Clone)]
pub struct ContextSelector {
    keyword_sources: Vec<Arc<dyn KeywordSource>>,
    similarity: Option<Arc<dyn SimilaritySource>>,
    timeout: Duration,
}

impl std::fmt::Debug for ContextSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keyword: Vec<_> = self.keyword_sources.iter().map(|s| s.source_name()).collect();
        f.debug_struct("ContextSelector")
            .field("keyword_sources", &keyword)
            .field("similarity", &self.similarity.as_ref().map(|s| s.source_name()))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for ContextSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextSelector {
    pub fn new() -> Self {
        Self {
            keyword_sources: Vec::new(),
            similarity: None,
            timeout: DEFAULT_BACKEND_TIMEOUT,
        }
    }

    /// Add a keyword source. Sources are merged in the order they are added.
    pub fn with_keyword_source(mut self, source: Arc<dyn KeywordSource>) -> Self {
        self.keyword_sources.push(source);
        self
    }

    pub fn with_similarity_source(mut self, source: Arc<dyn SimilaritySource>) -> Self {
        self.similarity = Some(source);
        self
    }

    /// Upper bound on any single backend call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// At most `max` items relevant to `query`. Never fails.
    ///
    /// `types` restricts results to those memory types. `scope` decides
    /// whether items from other projects may appear.
    pub async fn select_context(
        &self,
        query: &str,
        max: usize,
        types: Option<&[String]>,
        scope: &ProjectScope,
    ) -> Vec<ContextItem> {
        if max == 0 {
            return Vec::new();
        }

        let tokens = query_tokens(query);
        let per_token = (max / tokens.len()).max(1);
        let types = types.filter(|t| !t.is_empty());

        let mut pending: FuturesUnordered<SlotFuture<'_>> = FuturesUnordered::new();

        // Slot 0 is reserved for the similarity pass so it always merges first.
        if let Some(source) = &self.similarity {
            pending.push(Box::pin(async move {
                let items = self
                    .bounded(source.source_name(), source.similarity_search(query, max, scope))
                    .await;
                (0, filter_types(items, types))
            }));
        }

        let sources = self.keyword_sources.len();
        for (t, token) in tokens.iter().enumerate() {
            for (s, source) in self.keyword_sources.iter().enumerate() {
                let slot = 1 + t * sources + s;
                pending.push(Box::pin(async move {
                    let items = self
                        .bounded(
                            source.source_name(),
                            source.keyword_search(token, per_token, types, scope),
                        )
                        .await;
                    (slot, items)
                }));
            }
        }

        let mut slots: Vec<Option<Vec<ContextItem>>> = vec![None; 1 + tokens.len() * sources];
        let mut distinct = HashSet::new();
        let mut similarity_done = self.similarity.is_none();

        while let Some((slot, items)) = pending.next().await {
            similarity_done |= slot == 0;
            distinct.extend(
                items
                    .iter()
                    .filter(|item| scope.admits(&item.project_path))
                    .map(|item| item.id.clone()),
            );
            slots[slot] = Some(items);

            if similarity_done && distinct.len() >= max && !pending.is_empty() {
                debug!(
                    abandoned = pending.len(),
                    "enough context gathered, abandoning pending sub-queries"
                );
                break;
            }
        }
        drop(pending);

        let merged = merge(slots.into_iter().flatten().flatten(), max, scope);
        debug!(
            tokens = tokens.len(),
            per_token,
            returned = merged.len(),
            max,
            "Selected context"
        );
        merged
    }

    /// Await a backend call under the timeout, collapsing failure to empty.
    async fn bounded<F>(&self, backend: &'static str, call: F) -> Vec<ContextItem>
    where
        F: Future<Output = BackendResult<Vec<ContextItem>>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(items)) => items,
            Ok(Err(e)) => {
                debug!(backend, error = %e, "context source unavailable");
                Vec::new()
            }
            Err(_) => {
                warn!(backend, timeout = ?self.timeout, "context source timed out");
                Vec::new()
            }
        }
    }
}

/// Whitespace tokens of at least [`MIN_TOKEN_LEN`] characters, or the whole
/// query when none qualify.
pub fn query_tokens(query: &str) -> Vec<String> {
    let tokens: Vec<String> = query
        .split_whitespace()
        .filter(|t| t.chars().count() >= MIN_TOKEN_LEN)
        .map(str::to_string)
        .collect();
    if tokens.is_empty() {
        vec![query.to_string()]
    } else {
        tokens
    }
}

fn filter_types(items: Vec<ContextItem>, types: Option<&[String]>) -> Vec<ContextItem> {
    match types {
        Some(types) => items
            .into_iter()
            .filter(|item| types.contains(&item.item_type))
            .collect(),
        None => items,
    }
}

/// Deduplicate by id keeping the first occurrence, drop out-of-scope items,
/// truncate to `max`.
fn merge(
    items: impl IntoIterator<Item = ContextItem>,
    max: usize,
    scope: &ProjectScope,
) -> Vec<ContextItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| scope.admits(&item.project_path))
        .filter(|item| seen.insert(item.id.clone()))
        .take(max)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendUnavailable;
    use async_trait::async_trait;
    use cairn_types::ContextSource;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    const ALPHA: &str = "/work/alpha";

    fn item(id: &str, project: &str, source: ContextSource) -> ContextItem {
        ContextItem {
            id: id.to_string(),
            item_type: "note".to_string(),
            text: format!("text of {id}"),
            project_path: project.to_string(),
            created_at: None,
            source,
            score: None,
        }
    }

    /// Scripted source recording every call it receives.
    struct FakeSource {
        name: &'static str,
        items: Vec<ContextItem>,
        fail: bool,
        delay: Option<Duration>,
        calls: AtomicUsize,
        finished: AtomicBool,
        seen: Mutex<Vec<(String, usize)>>,
    }

    impl FakeSource {
        fn new(name: &'static str, items: Vec<ContextItem>) -> Self {
            Self {
                name,
                items,
                fail: false,
                delay: None,
                calls: AtomicUsize::new(0),
                finished: AtomicBool::new(false),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing(name: &'static str) -> Self {
            Self {
                fail: true,
                ..Self::new(name, Vec::new())
            }
        }

        fn slow(name: &'static str, items: Vec<ContextItem>, delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::new(name, items)
            }
        }

        async fn answer(&self, query: &str, limit: usize) -> BackendResult<Vec<ContextItem>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().push((query.to_string(), limit));
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.finished.store(true, Ordering::SeqCst);
            if self.fail {
                return Err(BackendUnavailable::new(self.name, "down"));
            }
            Ok(self.items.iter().take(limit).cloned().collect())
        }
    }

    #[async_trait]
    impl KeywordSource for FakeSource {
        fn source_name(&self) -> &'static str {
            self.name
        }

        async fn keyword_search(
            &self,
            query: &str,
            limit: usize,
            _types: Option<&[String]>,
            _scope: &ProjectScope,
        ) -> BackendResult<Vec<ContextItem>> {
            self.answer(query, limit).await
        }
    }

    #[async_trait]
    impl SimilaritySource for FakeSource {
        fn source_name(&self) -> &'static str {
            self.name
        }

        async fn similarity_search(
            &self,
            query: &str,
            limit: usize,
            _scope: &ProjectScope,
        ) -> BackendResult<Vec<ContextItem>> {
            self.answer(query, limit).await
        }
    }

    fn ids(items: &[ContextItem]) -> Vec<&str> {
        items.iter().map(|i| i.id.as_str()).collect()
    }

    #[test]
    fn test_query_tokens() {
        assert_eq!(query_tokens("fix the db layer"), vec!["fix", "the", "layer"]);
        assert_eq!(query_tokens("go to db"), vec!["go to db"]);
        assert_eq!(query_tokens(""), vec![""]);
    }

    #[tokio::test]
    async fn test_zero_budget_issues_no_call() {
        let record = Arc::new(FakeSource::new("record", vec![item("a", ALPHA, ContextSource::RecordStore)]));
        let vector = Arc::new(FakeSource::new("vector", Vec::new()));
        let selector = ContextSelector::new()
            .with_keyword_source(record.clone())
            .with_similarity_source(vector.clone());

        let items = selector
            .select_context("anything", 0, None, &ProjectScope::project(ALPHA))
            .await;
        assert!(items.is_empty());
        assert_eq!(record.calls.load(Ordering::SeqCst), 0);
        assert_eq!(vector.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_per_token_limit_and_short_query_fallback() {
        let record = Arc::new(FakeSource::new("record", Vec::new()));
        let selector = ContextSelector::new().with_keyword_source(record.clone());
        let scope = ProjectScope::project(ALPHA);

        selector
            .select_context("alpha beta gamma on", 7, None, &scope)
            .await;
        let mut seen = record.seen.lock().clone();
        seen.sort();
        assert_eq!(
            seen,
            vec![
                ("alpha".to_string(), 2),
                ("beta".to_string(), 2),
                ("gamma".to_string(), 2)
            ]
        );

        record.seen.lock().clear();
        selector.select_context("a b", 1, None, &scope).await;
        assert_eq!(*record.seen.lock(), vec![("a b".to_string(), 1)]);
    }

    #[tokio::test]
    async fn test_vector_first_then_dedup_and_truncate() {
        let record = Arc::new(FakeSource::new(
            "record",
            vec![
                item("r1", ALPHA, ContextSource::RecordStore),
                item("shared", ALPHA, ContextSource::RecordStore),
            ],
        ));
        let graph = Arc::new(FakeSource::new("graph", vec![item("g1", ALPHA, ContextSource::RelationshipGraph)]));
        let vector = Arc::new(FakeSource::new(
            "vector",
            vec![item("shared", ALPHA, ContextSource::SemanticIndex)],
        ));
        let selector = ContextSelector::new()
            .with_keyword_source(record)
            .with_keyword_source(graph)
            .with_similarity_source(vector);

        let items = selector
            .select_context("login", 10, None, &ProjectScope::project(ALPHA))
            .await;
        assert_eq!(ids(&items), vec!["shared", "r1", "g1"]);
        assert_eq!(items[0].source, ContextSource::SemanticIndex);

        let truncated = selector
            .select_context("login", 2, None, &ProjectScope::project(ALPHA))
            .await;
        assert_eq!(truncated.len(), 2);
    }

    #[tokio::test]
    async fn test_foreign_project_items_are_dropped() {
        let record = Arc::new(FakeSource::new(
            "record",
            vec![
                item("mine", ALPHA, ContextSource::RecordStore),
                item("theirs", "/work/beta", ContextSource::RecordStore),
            ],
        ));
        let selector = ContextSelector::new().with_keyword_source(record);

        let scoped = selector
            .select_context("query", 10, None, &ProjectScope::project(ALPHA))
            .await;
        assert_eq!(ids(&scoped), vec!["mine"]);

        let global = selector
            .select_context("query", 10, None, &ProjectScope::Global)
            .await;
        assert_eq!(global.len(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_backends_degrade_to_empty() {
        let record = Arc::new(FakeSource::new("record", vec![item("r1", ALPHA, ContextSource::RecordStore)]));
        let selector = ContextSelector::new()
            .with_keyword_source(record)
            .with_keyword_source(Arc::new(FakeSource::failing("graph")))
            .with_similarity_source(Arc::new(FakeSource::failing("vector")));

        let items = selector
            .select_context("query", 5, None, &ProjectScope::project(ALPHA))
            .await;
        assert_eq!(ids(&items), vec!["r1"]);

        let nothing = ContextSelector::new()
            .with_keyword_source(Arc::new(FakeSource::failing("graph")))
            .with_similarity_source(Arc::new(FakeSource::failing("vector")))
            .select_context("query", 5, None, &ProjectScope::project(ALPHA))
            .await;
        assert!(nothing.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_backend_times_out() {
        let record = Arc::new(FakeSource::new("record", vec![item("fast", ALPHA, ContextSource::RecordStore)]));
        let slow = Arc::new(FakeSource::slow(
            "graph",
            vec![item("slow", ALPHA, ContextSource::RelationshipGraph)],
            Duration::from_secs(60),
        ));
        let selector = ContextSelector::new()
            .with_keyword_source(record)
            .with_keyword_source(slow.clone())
            .with_timeout(Duration::from_secs(5));

        let items = selector
            .select_context("query", 5, None, &ProjectScope::project(ALPHA))
            .await;
        assert_eq!(ids(&items), vec!["fast"]);
        assert!(!slow.finished.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandons_pending_once_budget_met() {
        let vector = Arc::new(FakeSource::new(
            "vector",
            vec![
                item("v1", ALPHA, ContextSource::SemanticIndex),
                item("v2", ALPHA, ContextSource::SemanticIndex),
            ],
        ));
        let slow = Arc::new(FakeSource::slow(
            "record",
            vec![item("late", ALPHA, ContextSource::RecordStore)],
            Duration::from_secs(10),
        ));
        let selector = ContextSelector::new()
            .with_keyword_source(slow.clone())
            .with_similarity_source(vector);

        let items = selector
            .select_context("query", 2, None, &ProjectScope::project(ALPHA))
            .await;
        assert_eq!(ids(&items), vec!["v1", "v2"]);
        assert!(!slow.finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_type_filter_applies_to_vector_hits() {
        let mut plan = item("plan", ALPHA, ContextSource::SemanticIndex);
        plan.item_type = "task_plan".to_string();
        let vector = Arc::new(FakeSource::new(
            "vector",
            vec![plan, item("note", ALPHA, ContextSource::SemanticIndex)],
        ));
        let selector = ContextSelector::new().with_similarity_source(vector);

        let types = vec!["task_plan".to_string()];
        let items = selector
            .select_context("query", 5, Some(types.as_slice()), &ProjectScope::project(ALPHA))
            .await;
        assert_eq!(ids(&items), vec!["plan"]);
    }
}

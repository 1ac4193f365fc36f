//! Seams between the context selector and the optional backends.
//!
//! The semantic index and the relationship graph may be missing at any time.
//! Their failures are typed as [`BackendUnavailable`] so callers can decide
//! to degrade instead of abort, and their connections are built at most once
//! through [`Lazy`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cairn_types::{ContextItem, ProjectScope};
use tokio::sync::{Notify, OnceCell};
use tracing::{info, warn};

// ─────────────────────────────────────────────────────────────────────────────
// Degraded-backend error
// ─────────────────────────────────────────────────────────────────────────────

/// A non-authoritative backend could not serve a call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{backend} unavailable: {reason}")]
pub struct BackendUnavailable {
    pub backend: &'static str,
    pub reason: String,
}

impl BackendUnavailable {
    pub fn new(backend: &'static str, reason: impl ToString) -> Self {
        Self {
            backend,
            reason: reason.to_string(),
        }
    }
}

/// Result type for calls into optional backends.
pub type BackendResult<T> = std::result::Result<T, BackendUnavailable>;

// ─────────────────────────────────────────────────────────────────────────────
// One-time initialization
// ─────────────────────────────────────────────────────────────────────────────

type InitFuture<T> = Pin<Box<dyn Future<Output = BackendResult<T>> + Send>>;
type InitFn<T> = Box<dyn Fn() -> InitFuture<T> + Send + Sync>;

/// Observable state of a [`Lazy`] backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LazyState {
    Uninitialized,
    Ready,
    Unavailable,
}

impl LazyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "not yet connected",
            Self::Ready => "ready",
            Self::Unavailable => "unavailable",
        }
    }
}

/// A backend handle constructed on first use and shared afterwards.
///
/// The loader runs at most once, even under concurrent first calls. It runs
/// in its own task, so a caller that times out or is dropped does not cancel
/// it and later callers see its outcome. A failed or timed-out load is
/// cached: later calls return [`BackendUnavailable`] without retrying, and
/// the failure is logged once.
pub struct Lazy<T> {
    name: &'static str,
    cell: Arc<OnceCell<Option<T>>>,
    settled: Arc<Notify>,
    started: AtomicBool,
    init: InitFn<T>,
    init_timeout: Option<Duration>,
}

impl<T: Send + Sync + 'static> Lazy<T> {
    pub fn new<F, Fut>(name: &'static str, init: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BackendResult<T>> + Send + 'static,
    {
        Self {
            name,
            cell: Arc::new(OnceCell::new()),
            settled: Arc::new(Notify::new()),
            started: AtomicBool::new(false),
            init: Box::new(move || Box::pin(init())),
            init_timeout: None,
        }
    }

    /// Already-constructed value.
    pub fn ready(name: &'static str, value: T) -> Self {
        Self::settled(name, Some(value))
    }

    /// Permanently unavailable, e.g. disabled in config.
    pub fn disabled(name: &'static str) -> Self {
        Self::settled(name, None)
    }

    fn settled(name: &'static str, slot: Option<T>) -> Self {
        Self {
            name,
            cell: Arc::new(OnceCell::new_with(Some(slot))),
            settled: Arc::new(Notify::new()),
            started: AtomicBool::new(true),
            init: Box::new(move || {
                Box::pin(async move { Err(BackendUnavailable::new(name, "already settled")) })
            }),
            init_timeout: None,
        }
    }

    /// Give the loader a deadline. A load that overruns it is cached as
    /// unavailable.
    pub fn with_init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout = Some(timeout);
        self
    }

    /// Get the value, starting the loader on first call.
    pub async fn get(&self) -> BackendResult<&T> {
        loop {
            let settled = self.settled.notified();
            if let Some(slot) = self.cell.get() {
                return slot
                    .as_ref()
                    .ok_or_else(|| BackendUnavailable::new(self.name, "initialization failed"));
            }
            if !self.started.swap(true, Ordering::AcqRel) {
                self.spawn_loader();
            }
            settled.await;
        }
    }

    fn spawn_loader(&self) {
        let name = self.name;
        let cell = Arc::clone(&self.cell);
        let notify = Arc::clone(&self.settled);
        let load = tokio::spawn((self.init)());
        let deadline = self.init_timeout;

        tokio::spawn(async move {
            let joined = match deadline {
                Some(limit) => match tokio::time::timeout(limit, load).await {
                    Ok(joined) => joined,
                    Err(_) => Ok(Err(BackendUnavailable::new(
                        name,
                        format!("initialization timed out after {limit:?}"),
                    ))),
                },
                None => load.await,
            };
            let outcome =
                joined.unwrap_or_else(|e| Err(BackendUnavailable::new(name, e)));
            let slot = match outcome {
                Ok(value) => {
                    info!(backend = name, "backend initialized");
                    Some(value)
                }
                Err(e) => {
                    warn!(
                        backend = name,
                        error = %e,
                        "backend unavailable, continuing without it"
                    );
                    None
                }
            };
            let _ = cell.set(slot);
            notify.notify_waiters();
        });
    }

    pub fn state(&self) -> LazyState {
        match self.cell.get() {
            None => LazyState::Uninitialized,
            Some(Some(_)) => LazyState::Ready,
            Some(None) => LazyState::Unavailable,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> std::fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lazy")
            .field("name", &self.name)
            .field("initialized", &self.cell.initialized())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Context sources
// ─────────────────────────────────────────────────────────────────────────────

/// A backend that answers substring/keyword queries.
#[async_trait]
pub trait KeywordSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    /// Items whose text contains `query`, newest first.
    ///
    /// `types` restricts results to the given memory types when present.
    async fn keyword_search(
        &self,
        query: &str,
        limit: usize,
        types: Option<&[String]>,
        scope: &ProjectScope,
    ) -> BackendResult<Vec<ContextItem>>;
}

/// A backend that answers nearest-neighbour queries.
#[async_trait]
pub trait SimilaritySource: Send + Sync {
    fn source_name(&self) -> &'static str;

    /// Items most similar to `query`, closest first.
    async fn similarity_search(
        &self,
        query: &str,
        limit: usize,
        scope: &ProjectScope,
    ) -> BackendResult<Vec<ContextItem>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_lazy_initializes_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let lazy = Lazy::new("test", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(42u32)
            }
        });

        assert_eq!(lazy.state(), LazyState::Uninitialized);
        let (a, b) = tokio::join!(lazy.get(), lazy.get());
        assert_eq!(*a.unwrap(), 42);
        assert_eq!(*b.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(lazy.state(), LazyState::Ready);
    }

    #[tokio::test]
    async fn test_lazy_caches_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let lazy: Lazy<u32> = Lazy::new("flaky", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(BackendUnavailable::new("flaky", "connection refused"))
            }
        });

        assert!(lazy.get().await.is_err());
        let err = lazy.get().await.unwrap_err();
        assert_eq!(err.backend, "flaky");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(lazy.state(), LazyState::Unavailable);
    }

    #[tokio::test]
    async fn test_lazy_ready_and_disabled() {
        let ready = Lazy::ready("r", "value");
        assert_eq!(ready.state(), LazyState::Ready);
        assert_eq!(*ready.get().await.unwrap(), "value");

        let disabled: Lazy<u8> = Lazy::disabled("d");
        assert_eq!(disabled.state(), LazyState::Unavailable);
        assert!(disabled.get().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_loader_survives_caller_timeouts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let lazy: Lazy<u32> = Lazy::new("slow", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(7)
            }
        });

        for _ in 0..3 {
            let waited = tokio::time::timeout(Duration::from_secs(5), lazy.get()).await;
            assert!(waited.is_err());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(lazy.get().await.copied(), Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(lazy.state(), LazyState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_timeout_is_cached_as_unavailable() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let lazy: Lazy<u32> = Lazy::new("hung", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(1)
            }
        })
        .with_init_timeout(Duration::from_secs(10));

        for _ in 0..3 {
            let _ = tokio::time::timeout(Duration::from_secs(5), lazy.get()).await;
        }
        assert_eq!(lazy.state(), LazyState::Unavailable);

        let started = tokio::time::Instant::now();
        assert!(lazy.get().await.is_err());
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

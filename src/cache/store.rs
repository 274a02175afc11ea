// Read-through response cache.
// Serves fresh entries from memory, coalesces concurrent misses into one upstream fetch.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::config::CacheSettings;
use crate::error::{IndexerError, Result};
use crate::network::NetworkConfig;

use super::Upstream;
use super::entry::{CacheEntry, CacheKey, DEFAULT_STALE_TIME};

type SharedFetch = Shared<BoxFuture<'static, Result<Arc<Value>>>>;

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    /// The single outstanding upstream call per key.
    in_flight: HashMap<CacheKey, SharedFetch>,
    /// Bumped by `clear`; fetches from an older generation never write back.
    generation: u64,
}

impl CacheState {
    fn insert(&mut self, key: CacheKey, entry: CacheEntry, max_entries: Option<usize>) {
        self.entries.insert(key.clone(), entry);

        let Some(max) = max_entries else {
            return;
        };
        while self.entries.len() > max {
            let oldest = self
                .entries
                .iter()
                .filter(|(k, _)| **k != key)
                .min_by_key(|(_, e)| e.fetched_at)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(evicted) => {
                    self.entries.remove(&evicted);
                    debug!(key = %evicted, "evicted oldest cache entry");
                }
                None => break,
            }
        }
    }
}

fn lock(state: &Mutex<CacheState>) -> MutexGuard<'_, CacheState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Memoizing, request-coalescing cache in front of an [`Upstream`].
///
/// Construct one per application session and share it by reference or clone;
/// clones share the same state.
pub struct ResponseCache<U> {
    upstream: Arc<U>,
    state: Arc<Mutex<CacheState>>,
    default_stale_time: Duration,
    max_entries: Option<usize>,
}

impl<U> Clone for ResponseCache<U> {
    fn clone(&self) -> Self {
        Self {
            upstream: Arc::clone(&self.upstream),
            state: Arc::clone(&self.state),
            default_stale_time: self.default_stale_time,
            max_entries: self.max_entries,
        }
    }
}

impl<U: Upstream> ResponseCache<U> {
    /// Unbounded cache with the default 5 minute staleness window.
    pub fn new(upstream: U) -> Self {
        Self {
            upstream: Arc::new(upstream),
            state: Arc::new(Mutex::new(CacheState::default())),
            default_stale_time: DEFAULT_STALE_TIME,
            max_entries: None,
        }
    }

    pub fn from_settings(upstream: U, settings: &CacheSettings) -> Self {
        let cache = Self::new(upstream).with_default_stale_time(settings.stale_time());
        match settings.max_entries {
            Some(max) => cache.with_max_entries(max),
            None => cache,
        }
    }

    /// Window applied when a caller passes no stale time.
    pub fn with_default_stale_time(mut self, stale_time: Duration) -> Self {
        self.default_stale_time = stale_time;
        self
    }

    /// Bound the entry count; the oldest fetched entry is evicted first.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    pub fn upstream(&self) -> &U {
        &self.upstream
    }

    /// Return the freshest known payload for `endpoint` under `scope`.
    ///
    /// A fresh entry is returned without touching the network. Otherwise the
    /// caller joins the outstanding fetch for the key, or starts one. Failed
    /// fetches are never cached.
    pub async fn fetch_cached(
        &self,
        scope: &NetworkConfig,
        endpoint: &str,
        stale_time: Option<Duration>,
    ) -> Result<Arc<Value>> {
        if endpoint.is_empty() {
            return Err(IndexerError::InvalidConfig("empty endpoint".to_string()));
        }

        let stale_time = stale_time.unwrap_or(self.default_stale_time);
        let key = CacheKey::new(scope, endpoint);

        // Check and mark in one critical section; nothing here awaits.
        let fetch = {
            let mut state = lock(&self.state);

            if let Some(entry) = state.entries.get(&key) {
                if entry.is_fresh(stale_time) {
                    debug!(key = %key, age_ms = entry.age().as_millis() as u64, "cache hit");
                    return Ok(Arc::clone(&entry.value));
                }
            }

            match state.in_flight.get(&key) {
                Some(fetch) => {
                    debug!(key = %key, "joining in-flight request");
                    fetch.clone()
                }
                None => {
                    debug!(key = %key, "cache miss");
                    self.start_fetch(&mut state, key, scope.clone())
                }
            }
        };

        fetch.await
    }

    /// Like [`fetch_cached`](Self::fetch_cached), deserializing the payload.
    pub async fn fetch_typed<T: DeserializeOwned>(
        &self,
        scope: &NetworkConfig,
        endpoint: &str,
        stale_time: Option<Duration>,
    ) -> Result<T> {
        let value = self.fetch_cached(scope, endpoint, stale_time).await?;
        Ok(T::deserialize(&*value)?)
    }

    /// Spawn the upstream call and register it as the key's in-flight fetch.
    ///
    /// Runs on its own task so that callers dropping out do not cancel it.
    fn start_fetch(
        &self,
        state: &mut CacheState,
        key: CacheKey,
        scope: NetworkConfig,
    ) -> SharedFetch {
        let generation = state.generation;
        let upstream = Arc::clone(&self.upstream);
        let shared_state = Arc::clone(&self.state);
        let max_entries = self.max_entries;
        let task_key = key.clone();

        let handle = tokio::spawn(async move {
            let result = AssertUnwindSafe(upstream.fetch(&scope, task_key.endpoint()))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(IndexerError::Task("upstream fetch panicked".into())))
                .map(Arc::new);

            {
                let mut state = lock(&shared_state);
                if state.generation == generation {
                    if let Ok(value) = &result {
                        state.insert(
                            task_key.clone(),
                            CacheEntry::new(Arc::clone(value)),
                            max_entries,
                        );
                    }
                    state.in_flight.remove(&task_key);
                }
            }

            if let Err(e) = &result {
                error!(key = %task_key, error = %e, "upstream fetch failed");
            }
            result
        });

        let fetch = async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => Err(IndexerError::Task(e.to_string())),
            }
        }
        .boxed()
        .shared();

        state.in_flight.insert(key, fetch.clone());
        fetch
    }

    /// Drop every entry and in-flight marker.
    ///
    /// Fetches already running still resolve for their callers but are not
    /// written back.
    pub fn clear(&self) {
        let mut state = lock(&self.state);
        let entries = state.entries.len();
        state.entries.clear();
        state.in_flight.clear();
        state.generation += 1;
        info!(entries, "response cache cleared");
    }

    /// Number of cached entries, fresh or stale.
    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of outstanding upstream fetches.
    pub fn in_flight(&self) -> usize {
        lock(&self.state).in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use futures::future::join_all;
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::network::Network;

    /// Upstream that counts calls, optionally sleeping and failing the first N.
    struct FakeUpstream {
        calls: AtomicUsize,
        delay: Duration,
        failures: AtomicUsize,
    }

    impl FakeUpstream {
        fn new(delay: Duration) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay,
                failures: AtomicUsize::new(0),
            }
        }

        fn failing_first(delay: Duration, failures: usize) -> Self {
            let upstream = Self::new(delay);
            upstream.failures.store(failures, Ordering::SeqCst);
            upstream
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Upstream for FakeUpstream {
        async fn fetch(&self, scope: &NetworkConfig, endpoint: &str) -> Result<Value> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(IndexerError::Status {
                    status: 500,
                    message: "boom".into(),
                });
            }
            Ok(json!({
                "endpoint": endpoint,
                "network": scope.network.name(),
                "call": call,
            }))
        }
    }

    fn preprod() -> NetworkConfig {
        NetworkConfig::new(Network::Preprod, "key").with_policy_id("P123")
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_fetch() {
        let cache = ResponseCache::new(FakeUpstream::new(Duration::from_millis(200)));
        let scope = preprod();

        let results = join_all(
            (0..5).map(|_| cache.fetch_cached(&scope, "/assets/policy/P123", None)),
        )
        .await;

        assert_eq!(cache.upstream().calls(), 1);
        let first = results[0].as_ref().unwrap();
        for result in &results {
            assert_eq!(result.as_ref().unwrap(), first);
        }

        // A later caller inside the window is served from memory.
        tokio::time::advance(Duration::from_secs(1)).await;
        let again = cache
            .fetch_cached(&scope, "/assets/policy/P123", None)
            .await
            .unwrap();
        assert_eq!(&again, first);
        assert_eq!(cache.upstream().calls(), 1);
        assert_eq!(cache.in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_tasks_share_one_fetch() {
        let cache = ResponseCache::new(FakeUpstream::new(Duration::from_millis(100)));
        let scope = preprod();

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let cache = cache.clone();
                let scope = scope.clone();
                tokio::spawn(async move {
                    cache
                        .fetch_cached(&scope, "/assets/policy/P123", None)
                        .await
                })
            })
            .collect();

        let mut values = Vec::new();
        for handle in handles {
            values.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(cache.upstream().calls(), 1);
        assert!(values.iter().all(|v| v == &values[0]));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_failure() {
        let cache = ResponseCache::new(FakeUpstream::failing_first(Duration::from_millis(50), 1));
        let scope = preprod();

        let results = join_all((0..3).map(|_| cache.fetch_cached(&scope, "/txs/abc", None))).await;

        assert_eq!(cache.upstream().calls(), 1);
        for result in results {
            assert!(matches!(result, Err(IndexerError::Status { status: 500, .. })));
        }
        assert!(cache.is_empty());
        assert_eq!(cache.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_freshness_window_respected() {
        let cache = ResponseCache::new(FakeUpstream::new(Duration::ZERO));
        let scope = preprod();
        let window = Duration::from_secs(60);

        cache.fetch_cached(&scope, "/assets/a1", Some(window)).await.unwrap();

        tokio::time::advance(window - Duration::from_millis(1)).await;
        cache.fetch_cached(&scope, "/assets/a1", Some(window)).await.unwrap();
        assert_eq!(cache.upstream().calls(), 1);

        tokio::time::advance(Duration::from_millis(2)).await;
        let refreshed = cache.fetch_cached(&scope, "/assets/a1", Some(window)).await.unwrap();
        assert_eq!(cache.upstream().calls(), 2);
        assert_eq!(refreshed["call"], 2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_stale_time_always_refetches() {
        let cache = ResponseCache::new(FakeUpstream::new(Duration::ZERO));
        let scope = preprod();

        for _ in 0..3 {
            cache
                .fetch_cached(&scope, "/assets/a1", Some(Duration::ZERO))
                .await
                .unwrap();
        }
        assert_eq!(cache.upstream().calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scopes_are_isolated() {
        let cache = ResponseCache::new(FakeUpstream::new(Duration::ZERO));
        let preprod = preprod();
        let mainnet = NetworkConfig::new(Network::Mainnet, "key").with_policy_id("P123");

        let a = cache.fetch_cached(&preprod, "/assets/a1", None).await.unwrap();
        let b = cache.fetch_cached(&mainnet, "/assets/a1", None).await.unwrap();

        assert_eq!(cache.upstream().calls(), 2);
        assert_eq!(cache.len(), 2);
        assert_eq!(a["network"], "preprod");
        assert_eq!(b["network"], "mainnet");

        // Switching back finds the original entry intact.
        let a_again = cache.fetch_cached(&preprod, "/assets/a1", None).await.unwrap();
        assert_eq!(a_again, a);
        assert_eq!(cache.upstream().calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_does_not_poison_cache() {
        let cache = ResponseCache::new(FakeUpstream::failing_first(Duration::ZERO, 1));
        let scope = preprod();

        let first = cache.fetch_cached(&scope, "/assets/a1", None).await;
        assert!(first.is_err());
        assert!(cache.is_empty());
        assert_eq!(cache.in_flight(), 0);

        let second = cache.fetch_cached(&scope, "/assets/a1", None).await.unwrap();
        assert_eq!(second["call"], 2);
        assert_eq!(cache.upstream().calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_forces_refetch() {
        let cache = ResponseCache::new(FakeUpstream::new(Duration::ZERO));
        let scope = preprod();

        cache.fetch_cached(&scope, "/assets/a1", None).await.unwrap();
        cache.fetch_cached(&scope, "/assets/a2", None).await.unwrap();
        cache.clear();
        assert!(cache.is_empty());

        cache.fetch_cached(&scope, "/assets/a1", None).await.unwrap();
        assert_eq!(cache.upstream().calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_during_fetch_discards_result() {
        let cache = ResponseCache::new(FakeUpstream::new(Duration::from_millis(100)));
        let scope = preprod();

        let pending = tokio::spawn({
            let cache = cache.clone();
            let scope = scope.clone();
            async move { cache.fetch_cached(&scope, "/assets/a1", None).await }
        });
        tokio::task::yield_now().await;
        assert_eq!(cache.in_flight(), 1);

        cache.clear();
        assert_eq!(cache.in_flight(), 0);

        // The original caller still gets its value.
        let value = pending.await.unwrap().unwrap();
        assert_eq!(value["call"], 1);
        assert!(cache.is_empty());

        cache.fetch_cached(&scope, "/assets/a1", None).await.unwrap();
        assert_eq!(cache.upstream().calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_caller_still_populates_cache() {
        let cache = ResponseCache::new(FakeUpstream::new(Duration::from_millis(200)));
        let scope = preprod();

        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            cache.fetch_cached(&scope, "/assets/a1", None),
        )
        .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.in_flight(), 0);

        cache.fetch_cached(&scope, "/assets/a1", None).await.unwrap();
        assert_eq!(cache.upstream().calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_entries_evicts_oldest() {
        let cache = ResponseCache::new(FakeUpstream::new(Duration::ZERO)).with_max_entries(2);
        let scope = preprod();

        for endpoint in ["/assets/a1", "/assets/a2", "/assets/a3"] {
            cache.fetch_cached(&scope, endpoint, None).await.unwrap();
            tokio::time::advance(Duration::from_secs(1)).await;
        }
        assert_eq!(cache.len(), 2);

        // a3 and a2 survive, a1 was evicted.
        cache.fetch_cached(&scope, "/assets/a3", None).await.unwrap();
        cache.fetch_cached(&scope, "/assets/a2", None).await.unwrap();
        assert_eq!(cache.upstream().calls(), 3);
        cache.fetch_cached(&scope, "/assets/a1", None).await.unwrap();
        assert_eq!(cache.upstream().calls(), 4);
    }

    #[tokio::test]
    async fn test_empty_endpoint_rejected() {
        let cache = ResponseCache::new(FakeUpstream::new(Duration::ZERO));
        let result = cache.fetch_cached(&preprod(), "", None).await;
        assert!(matches!(result, Err(IndexerError::InvalidConfig(_))));
        assert_eq!(cache.upstream().calls(), 0);
    }

    #[tokio::test]
    async fn test_fetch_typed() {
        #[derive(Debug, Deserialize)]
        struct Echo {
            endpoint: String,
            call: u32,
        }

        let cache = ResponseCache::new(FakeUpstream::new(Duration::ZERO));
        let echo: Echo = cache
            .fetch_typed(&preprod(), "/txs/abc", None)
            .await
            .unwrap();
        assert_eq!(echo.endpoint, "/txs/abc");
        assert_eq!(echo.call, 1);
    }
}

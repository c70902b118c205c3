//! Per-routing-key proxy queues
//!
//! The manager owns one [`ScoredHeap`] per routing key. A heap is built from
//! the backing store the first time its key is asked for and rebuilt on every
//! explicit refresh.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use super::{ProxyStore, ScoredHeap, DEFAULT_FAILURE_WEIGHT};
use crate::error::{IkaError, Result};
use crate::models::{Proxy, ProxyOutcome};

/// Selection manager configuration
#[derive(Debug, Clone)]
pub struct SelectionConfig {
    /// Exponent applied to a proxy's failure count when scoring
    pub failure_weight: u32,
    /// Upper bound on a single proxy list fetch
    pub fetch_timeout: Duration,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            failure_weight: DEFAULT_FAILURE_WEIGHT,
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

/// Heap plus the number of times it has been built
struct Queue {
    heap: ScoredHeap,
    generation: u64,
}

impl Queue {
    fn rebuild(&mut self, proxies: Vec<Proxy>) {
        self.heap.rebuild(proxies);
        self.generation += 1;
    }

    fn is_built(&self) -> bool {
        self.generation > 0
    }
}

/// Heap for one routing key
struct KeyedHeap {
    queue: Mutex<Queue>,
    /// Set once the heap has been built from the store
    ready: OnceCell<()>,
}

impl KeyedHeap {
    fn new(failure_weight: u32) -> Self {
        Self {
            queue: Mutex::new(Queue {
                heap: ScoredHeap::new(failure_weight),
                generation: 0,
            }),
            ready: OnceCell::new(),
        }
    }
}

/// Owns the proxy queues of every routing key seen so far
///
/// Keys are never evicted; a key stays materialized for the lifetime of the
/// manager.
pub struct SelectionManager {
    store: Arc<dyn ProxyStore>,
    config: SelectionConfig,
    heaps: DashMap<String, Arc<KeyedHeap>>,
}

impl SelectionManager {
    pub fn new(store: Arc<dyn ProxyStore>, config: SelectionConfig) -> Self {
        Self {
            store,
            config,
            heaps: DashMap::new(),
        }
    }

    pub fn config(&self) -> &SelectionConfig {
        &self.config
    }

    /// Hand out the best proxy for `key`, building its queue on first use
    ///
    /// Concurrent first calls for the same key share a single store fetch. A
    /// refresh that lands while that fetch is in flight wins over it.
    #[instrument(skip(self))]
    pub async fn select(&self, key: &str) -> Result<Proxy> {
        let slot = self.slot(key);
        let queue = &slot.queue;

        slot.ready
            .get_or_try_init(|| async move {
                if queue.lock().is_built() {
                    return Ok(());
                }

                debug!(key, "Materializing proxy queue");
                let fetched = self.fetch(key).await;

                let mut queue = queue.lock();
                if queue.is_built() {
                    debug!(key, "Queue rebuilt by a refresh during lazy fetch, keeping it");
                    return Ok(());
                }
                let proxies = fetched?;
                let count = proxies.len();
                queue.rebuild(proxies);
                info!(key, proxies = count, "Proxy queue materialized");
                Ok::<(), IkaError>(())
            })
            .await?;

        let proxy = queue.lock().heap.pop();
        match proxy {
            Some(proxy) => {
                debug!(key, addr = %proxy.addr, "Selected proxy");
                Ok(proxy)
            }
            None => Err(IkaError::EmptyQueue {
                key: key.to_string(),
            }),
        }
    }

    /// Apply caller feedback for a proxy handed out under `key`
    ///
    /// Successes, keys without a queue and addresses outside the current
    /// snapshot are ignored.
    pub fn record_outcome(&self, key: &str, outcome: &ProxyOutcome) -> Result<()> {
        if outcome.is_success() {
            return Ok(());
        }

        let Some(slot) = self.ready(key) else {
            debug!(key, addr = %outcome.addr, "No queue for routing key, ignoring outcome");
            return Ok(());
        };

        if slot.queue.lock().heap.record_failure(&outcome.addr) {
            debug!(key, addr = %outcome.addr, error = %outcome.error, "Recorded proxy failure");
        } else {
            debug!(key, addr = %outcome.addr, "Outcome for unknown proxy ignored");
        }
        Ok(())
    }

    /// Rebuild the queue for `key` from a freshly fetched proxy list
    ///
    /// All accumulated failures and recency for the key are discarded. The
    /// list is fetched before the heap is locked.
    #[instrument(skip(self))]
    pub async fn refresh(&self, key: &str) -> Result<()> {
        let proxies = self.fetch(key).await?;
        let count = proxies.len();

        let slot = self.slot(key);
        slot.queue.lock().rebuild(proxies);
        // Fails if already set or a lazy build is in flight; that build keeps this list
        let _ = slot.ready.set(());

        info!(key, proxies = count, "Proxy queue rebuilt");
        Ok(())
    }

    /// Routing keys with a materialized queue
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .heaps
            .iter()
            .filter(|entry| entry.value().ready.initialized())
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of proxies queued under `key`, if its queue is materialized
    pub fn queue_len(&self, key: &str) -> Option<usize> {
        let slot = self.ready(key)?;
        let len = slot.queue.lock().heap.len();
        Some(len)
    }

    /// Failure count of `addr` in the queue for `key`
    pub fn failures(&self, key: &str, addr: &str) -> Option<u32> {
        let slot = self.ready(key)?;
        let failures = slot.queue.lock().heap.failures(addr);
        failures
    }

    /// Drop every queue
    pub fn clear(&self) {
        let count = self.heaps.len();
        self.heaps.clear();
        debug!(queues = count, "Cleared proxy queues");
    }

    fn existing(&self, key: &str) -> Option<Arc<KeyedHeap>> {
        self.heaps.get(key).map(|slot| slot.clone())
    }

    /// Slot for `key` whose queue has been built
    fn ready(&self, key: &str) -> Option<Arc<KeyedHeap>> {
        self.existing(key).filter(|slot| slot.ready.initialized())
    }

    fn slot(&self, key: &str) -> Arc<KeyedHeap> {
        if let Some(slot) = self.existing(key) {
            return slot;
        }

        self.heaps
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(KeyedHeap::new(self.config.failure_weight)))
            .clone()
    }

    async fn fetch(&self, key: &str) -> Result<Vec<Proxy>> {
        let timeout = self.config.fetch_timeout;
        match tokio::time::timeout(timeout, self.store.fetch_proxy_list(key)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(key, timeout = ?timeout, "Proxy list fetch timed out");
                Err(IkaError::ProxyListUnavailable(format!(
                    "fetch for {} timed out after {:?}",
                    key, timeout
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::testing::{proxies, MemoryStore};

    const KEY: &str = "proxy:queue:test";

    fn manager(store: Arc<MemoryStore>) -> SelectionManager {
        SelectionManager::new(store, SelectionConfig::default())
    }

    #[tokio::test]
    async fn test_select_materializes_lazily() {
        let store = Arc::new(MemoryStore::new().with_list(KEY, proxies(&["a", "b", "c"])));
        let manager = manager(store.clone());

        assert!(manager.is_empty());
        assert_eq!(store.fetches(), 0);

        assert_eq!(manager.select(KEY).await.unwrap().addr, "a");
        assert_eq!(store.fetches(), 1);
        assert_eq!(manager.keys(), vec![KEY.to_string()]);

        manager.select(KEY).await.unwrap();
        manager.select(KEY).await.unwrap();
        assert_eq!(store.fetches(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_selects_fetch_once() {
        let store = Arc::new(
            MemoryStore::new()
                .with_list(KEY, proxies(&["a", "b", "c", "d"]))
                .with_delay(Duration::from_millis(50)),
        );
        let manager = Arc::new(manager(store.clone()));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.select(KEY).await })
            })
            .collect();

        for task in futures::future::join_all(tasks).await {
            assert!(task.unwrap().is_ok());
        }
        assert_eq!(store.fetches(), 1);
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test]
    async fn test_select_propagates_store_error_and_retries() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(store.clone());

        let err = manager.select(KEY).await.unwrap_err();
        assert!(matches!(err, IkaError::ProxyListUnavailable(_)));
        assert!(manager.is_empty());

        store.set_list(KEY, proxies(&["a"]));
        assert_eq!(manager.select(KEY).await.unwrap().addr, "a");
        assert_eq!(store.fetches(), 2);
    }

    #[tokio::test]
    async fn test_select_empty_list_names_key() {
        let store = Arc::new(MemoryStore::new().with_list(KEY, Vec::new()));
        let manager = manager(store);

        match manager.select(KEY).await {
            Err(IkaError::EmptyQueue { key }) => assert_eq!(key, KEY),
            other => panic!("expected EmptyQueue, got {:?}", other),
        }
        assert_eq!(manager.keys(), vec![KEY.to_string()]);
    }

    #[tokio::test]
    async fn test_select_times_out_slow_store() {
        let store = Arc::new(
            MemoryStore::new()
                .with_list(KEY, proxies(&["a"]))
                .with_delay(Duration::from_millis(500)),
        );
        let manager = SelectionManager::new(
            store,
            SelectionConfig {
                fetch_timeout: Duration::from_millis(20),
                ..Default::default()
            },
        );

        let err = manager.select(KEY).await.unwrap_err();
        assert!(matches!(err, IkaError::ProxyListUnavailable(_)));
    }

    #[tokio::test]
    async fn test_failure_outcome_reorders_queue() {
        let store = Arc::new(MemoryStore::new().with_list(KEY, proxies(&["a", "b", "c"])));
        let manager = manager(store);

        assert_eq!(manager.select(KEY).await.unwrap().addr, "a");
        manager
            .record_outcome(KEY, &ProxyOutcome::failure("b", "connection reset"))
            .unwrap();
        assert_eq!(manager.failures(KEY, "b"), Some(1));

        assert_eq!(manager.select(KEY).await.unwrap().addr, "c");
    }

    #[tokio::test]
    async fn test_ignored_outcomes() {
        let store = Arc::new(MemoryStore::new().with_list(KEY, proxies(&["a", "b"])));
        let manager = manager(store.clone());

        // No queue yet: nothing to penalize and no fetch
        manager
            .record_outcome(KEY, &ProxyOutcome::failure("a", "timeout"))
            .unwrap();
        assert_eq!(store.fetches(), 0);
        assert!(manager.is_empty());

        manager.select(KEY).await.unwrap();
        manager
            .record_outcome(KEY, &ProxyOutcome::success("b"))
            .unwrap();
        assert_eq!(manager.failures(KEY, "b"), Some(0));

        manager
            .record_outcome(KEY, &ProxyOutcome::failure("9.9.9.9", "timeout"))
            .unwrap();
        assert_eq!(manager.failures(KEY, "9.9.9.9"), None);
        assert_eq!(manager.queue_len(KEY), Some(2));
    }

    #[tokio::test]
    async fn test_refresh_discards_failures() {
        let store = Arc::new(MemoryStore::new().with_list(KEY, proxies(&["a", "b"])));
        let manager = manager(store.clone());

        manager.select(KEY).await.unwrap();
        manager
            .record_outcome(KEY, &ProxyOutcome::failure("a", "timeout"))
            .unwrap();
        assert_eq!(manager.failures(KEY, "a"), Some(1));

        manager.refresh(KEY).await.unwrap();
        assert_eq!(manager.failures(KEY, "a"), Some(0));
        assert_eq!(store.fetches(), 2);
        assert_eq!(manager.select(KEY).await.unwrap().addr, "a");
    }

    #[tokio::test]
    async fn test_refresh_materializes_new_key() {
        let store = Arc::new(MemoryStore::new().with_list(KEY, proxies(&["a", "b"])));
        let manager = manager(store.clone());

        manager.refresh(KEY).await.unwrap();
        assert_eq!(manager.keys(), vec![KEY.to_string()]);
        assert_eq!(manager.queue_len(KEY), Some(2));

        manager.select(KEY).await.unwrap();
        assert_eq!(store.fetches(), 1);
    }

    #[tokio::test]
    async fn test_refresh_error_keeps_queue() {
        let store = Arc::new(MemoryStore::new().with_list(KEY, proxies(&["a", "b"])));
        let manager = manager(store.clone());

        manager.select(KEY).await.unwrap();
        manager
            .record_outcome(KEY, &ProxyOutcome::failure("b", "timeout"))
            .unwrap();

        store.set_failing(true);
        let err = manager.refresh(KEY).await.unwrap_err();
        assert!(matches!(err, IkaError::ProxyListUnavailable(_)));

        assert_eq!(manager.queue_len(KEY), Some(2));
        assert_eq!(manager.failures(KEY, "b"), Some(1));
    }

    #[tokio::test]
    async fn test_refresh_unknown_key_creates_nothing_on_error() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(store);

        assert!(manager.refresh(KEY).await.is_err());
        assert!(manager.is_empty());
        assert_eq!(manager.queue_len(KEY), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_refresh_during_lazy_build_wins() {
        let store = Arc::new(MemoryStore::new().with_list(KEY, proxies(&["new1", "new2"])));
        store.stage(proxies(&["old1", "old2"]), Duration::from_millis(200));
        let manager = Arc::new(manager(store.clone()));

        let lazy = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.select(KEY).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;

        manager.refresh(KEY).await.unwrap();
        assert_eq!(manager.queue_len(KEY), None);

        assert_eq!(lazy.await.unwrap().unwrap().addr, "new1");
        assert_eq!(manager.select(KEY).await.unwrap().addr, "new2");
        assert_eq!(manager.keys(), vec![KEY.to_string()]);
        assert_eq!(store.fetches(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_refresh_during_failed_lazy_build_keeps_refreshed_list() {
        let store = Arc::new(MemoryStore::new().with_list(KEY, proxies(&["a", "b"])));
        let manager = Arc::new(SelectionManager::new(
            store.clone(),
            SelectionConfig {
                fetch_timeout: Duration::from_millis(100),
                ..Default::default()
            },
        ));
        store.stage(proxies(&["stale"]), Duration::from_millis(500));

        let lazy = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.select(KEY).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        manager.refresh(KEY).await.unwrap();

        // The lazy fetch times out, but the refreshed list is already in place
        assert_eq!(lazy.await.unwrap().unwrap().addr, "a");
        assert_eq!(manager.queue_len(KEY), Some(2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_outcome_during_lazy_build_is_ignored() {
        let store = Arc::new(MemoryStore::new());
        store.stage(proxies(&["a", "b"]), Duration::from_millis(150));
        let manager = Arc::new(manager(store.clone()));

        let lazy = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.select(KEY).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;

        manager
            .record_outcome(KEY, &ProxyOutcome::failure("b", "timeout"))
            .unwrap();
        assert_eq!(manager.failures(KEY, "b"), None);
        assert!(manager.keys().is_empty());

        assert_eq!(lazy.await.unwrap().unwrap().addr, "a");
        assert_eq!(manager.failures(KEY, "b"), Some(0));
        assert_eq!(manager.select(KEY).await.unwrap().addr, "b");
        assert_eq!(store.fetches(), 1);
    }

    #[tokio::test]
    async fn test_failed_lazy_build_reports_no_queue() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(store);

        assert!(manager.select(KEY).await.is_err());
        assert_eq!(manager.queue_len(KEY), None);
        assert_eq!(manager.failures(KEY, "a"), None);
        assert!(manager.keys().is_empty());
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let store = Arc::new(
            MemoryStore::new()
                .with_list("proxy:queue:eu", proxies(&["eu1", "eu2"]))
                .with_list("proxy:queue:us", proxies(&["us1", "us2"])),
        );
        let manager = manager(store);

        assert_eq!(manager.select("proxy:queue:eu").await.unwrap().addr, "eu1");
        assert_eq!(manager.select("proxy:queue:us").await.unwrap().addr, "us1");
        manager
            .record_outcome("proxy:queue:eu", &ProxyOutcome::failure("us2", "timeout"))
            .unwrap();
        assert_eq!(manager.failures("proxy:queue:us", "us2"), Some(0));

        assert_eq!(
            manager.keys(),
            vec!["proxy:queue:eu".to_string(), "proxy:queue:us".to_string()]
        );

        manager.clear();
        assert!(manager.is_empty());
    }
}

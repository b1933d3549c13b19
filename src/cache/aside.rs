use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::{BoxFuture, FutureExt, Shared};

use crate::cache::keys::fingerprint;
use crate::cache::operations::CacheStore;
use crate::models::EventRequest;
use crate::upstream::{EventCatalog, UpstreamError};

type PendingFetch = Shared<BoxFuture<'static, Result<Bytes, UpstreamError>>>;

type InFlight = Arc<Mutex<HashMap<String, PendingFetch>>>;

/// 响应来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Cache,
    Upstream,
    /// 与同一指纹的并发请求共享了一次上游请求
    Coalesced,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub key: String,
    pub body: Bytes,
    pub source: Source,
}

/// 旁路缓存：先查缓存，未命中时请求上游并写回
///
/// 同一指纹的并发未命中只会触发一次上游请求。上游请求在独立任务中执行，
/// 调用方被取消不会中断它，也不会让后来者重复请求。
pub struct CacheAside {
    store: Arc<dyn CacheStore>,
    upstream: Arc<dyn EventCatalog>,
    ttl: Duration,
    fetch_timeout: Duration,
    in_flight: InFlight,
}

impl CacheAside {
    pub fn new(
        store: Arc<dyn CacheStore>,
        upstream: Arc<dyn EventCatalog>,
        ttl: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            store,
            upstream,
            ttl,
            fetch_timeout,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn get(&self, request: EventRequest) -> Result<Fetched, UpstreamError> {
        let key = fingerprint(&request);

        match self.store.get(&key).await {
            Ok(Some(body)) => {
                tracing::debug!("Get earthquake data from cache: {}", key);
                return Ok(Fetched {
                    key,
                    body,
                    source: Source::Cache,
                });
            }
            Ok(None) => tracing::debug!("Cache miss: {}", key),
            // 读失败按未命中处理
            Err(e) => tracing::warn!("Cache read failed for {}, treating as miss: {}", key, e),
        }

        let (pending, source) = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            match in_flight.get(&key) {
                Some(pending) => (pending.clone(), Source::Coalesced),
                None => {
                    // 持锁期间登记，任务结束时的移除一定发生在登记之后
                    let pending = self.spawn_fetch(key.clone(), request);
                    in_flight.insert(key.clone(), pending.clone());
                    (pending, Source::Upstream)
                }
            }
        };

        if source == Source::Coalesced {
            tracing::debug!("Waiting on in-flight fetch: {}", key);
        }
        let body = pending.await?;
        Ok(Fetched { key, body, source })
    }

    fn spawn_fetch(&self, key: String, request: EventRequest) -> PendingFetch {
        let store = Arc::clone(&self.store);
        let upstream = Arc::clone(&self.upstream);
        let in_flight = Arc::clone(&self.in_flight);
        let ttl = self.ttl;
        let fetch_timeout = self.fetch_timeout;

        let task = tokio::spawn(async move {
            let result =
                fetch_and_store(&*store, &*upstream, &key, &request, ttl, fetch_timeout).await;
            // 登记期间不会有同一指纹的新登记，这里移除的一定是本次的记录
            in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&key);
            result
        });

        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(UpstreamError::Request(format!("fetch task failed: {}", e))),
            }
        }
        .boxed()
        .shared()
    }
}

async fn fetch_and_store(
    store: &dyn CacheStore,
    upstream: &dyn EventCatalog,
    key: &str,
    request: &EventRequest,
    ttl: Duration,
    fetch_timeout: Duration,
) -> Result<Bytes, UpstreamError> {
    tracing::info!("Fetching fresh earthquake data: {}", key);
    let body = match tokio::time::timeout(fetch_timeout, upstream.fetch(request)).await {
        Ok(Ok(body)) => body,
        Ok(Err(e)) => {
            tracing::error!("Error fetching earthquake data for {}: {}", key, e);
            return Err(e);
        }
        Err(_) => {
            tracing::error!("Upstream fetch timed out for {}", key);
            return Err(UpstreamError::Timeout);
        }
    };

    // 写缓存失败不影响本次响应
    match store.set_with_expiry(key, body.clone(), ttl).await {
        Ok(()) => tracing::debug!("Set earthquake data to cache: {}", key),
        Err(e) => tracing::warn!("Cache write failed for {}: {}", key, e),
    }

    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::cache::operations::MemoryCacheStore;
    use crate::error::StoreError;
    use crate::models::EventFilter;

    struct CountingCatalog {
        calls: AtomicUsize,
        delay: Duration,
        fail: bool,
    }

    impl CountingCatalog {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
                fail: true,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EventCatalog for CountingCatalog {
        async fn fetch(&self, request: &EventRequest) -> Result<Bytes, UpstreamError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(UpstreamError::Status(503));
            }
            Ok(Bytes::from(format!("{{\"call\":{},\"ids\":{:?}}}", n, ids(request))))
        }
    }

    fn ids(request: &EventRequest) -> Vec<String> {
        match request {
            EventRequest::Event(id) => vec![id.clone()],
            EventRequest::Search(_) => Vec::new(),
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl CacheStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<Bytes>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn set_with_expiry(
            &self,
            _key: &str,
            _value: Bytes,
            _ttl: Duration,
        ) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    const TTL: Duration = Duration::from_secs(600);
    const TIMEOUT: Duration = Duration::from_secs(10);

    fn min_magnitude(value: &str) -> EventRequest {
        EventRequest::Search(EventFilter {
            min_magnitude: Some(value.into()),
            ..Default::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn second_request_is_served_from_cache() {
        let store = Arc::new(MemoryCacheStore::new());
        let catalog = CountingCatalog::new(Duration::ZERO);
        let aside = CacheAside::new(store.clone(), catalog.clone(), TTL, TIMEOUT);

        let first = aside.get(min_magnitude("5.0")).await.unwrap();
        let second = aside.get(min_magnitude("5.0")).await.unwrap();

        assert_eq!(first.source, Source::Upstream);
        assert_eq!(second.source, Source::Cache);
        assert_eq!(first.body, second.body);
        assert_eq!(first.key, second.key);
        assert_eq!(catalog.calls(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_goes_back_upstream() {
        let store = Arc::new(MemoryCacheStore::new());
        let catalog = CountingCatalog::new(Duration::ZERO);
        let aside = CacheAside::new(store, catalog.clone(), TTL, TIMEOUT);

        aside.get(EventRequest::Event("us7000abcd".into())).await.unwrap();
        tokio::time::advance(TTL - Duration::from_secs(1)).await;
        let cached = aside.get(EventRequest::Event("us7000abcd".into())).await.unwrap();
        assert_eq!(cached.source, Source::Cache);

        tokio::time::advance(Duration::from_secs(1)).await;
        let refreshed = aside.get(EventRequest::Event("us7000abcd".into())).await.unwrap();
        assert_eq!(refreshed.source, Source::Upstream);
        assert_eq!(catalog.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_misses_share_one_fetch() {
        let store = Arc::new(MemoryCacheStore::new());
        let catalog = CountingCatalog::new(Duration::from_secs(2));
        let aside = Arc::new(CacheAside::new(store, catalog.clone(), TTL, TIMEOUT));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let aside = Arc::clone(&aside);
                tokio::spawn(async move { aside.get(min_magnitude("6.0")).await })
            })
            .collect();

        let mut sources = Vec::new();
        let mut bodies = Vec::new();
        for handle in handles {
            let fetched = handle.await.unwrap().unwrap();
            sources.push(fetched.source);
            bodies.push(fetched.body);
        }

        assert_eq!(catalog.calls(), 1);
        assert_eq!(sources.iter().filter(|s| **s == Source::Upstream).count(), 1);
        assert_eq!(sources.iter().filter(|s| **s == Source::Coalesced).count(), 4);
        assert!(bodies.windows(2).all(|w| w[0] == w[1]));
        assert!(aside.in_flight.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_leader_does_not_strand_the_fetch() {
        let store = Arc::new(MemoryCacheStore::new());
        let catalog = CountingCatalog::new(Duration::from_secs(2));
        let aside = Arc::new(CacheAside::new(store, catalog.clone(), TTL, TIMEOUT));

        let leader = {
            let aside = Arc::clone(&aside);
            tokio::spawn(async move { aside.get(min_magnitude("6.5")).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let follower = {
            let aside = Arc::clone(&aside);
            tokio::spawn(async move { aside.get(min_magnitude("6.5")).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        leader.abort();
        tokio::time::sleep(Duration::from_millis(10)).await;

        // 发起者取消后到达的请求仍然复用在途请求
        let late = aside.get(min_magnitude("6.5")).await.unwrap();
        assert_eq!(late.source, Source::Coalesced);

        let fetched = follower.await.unwrap().unwrap();
        assert_eq!(fetched.source, Source::Coalesced);
        assert_eq!(late.body, fetched.body);
        assert_eq!(catalog.calls(), 1);
        assert!(aside.in_flight.lock().unwrap().is_empty());

        let cached = aside.get(min_magnitude("6.5")).await.unwrap();
        assert_eq!(cached.source, Source::Cache);
        assert_eq!(catalog.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_completes_after_its_only_caller_is_cancelled() {
        let store = Arc::new(MemoryCacheStore::new());
        let catalog = CountingCatalog::new(Duration::from_secs(2));
        let aside = Arc::new(CacheAside::new(store.clone(), catalog.clone(), TTL, TIMEOUT));

        let leader = {
            let aside = Arc::clone(&aside);
            tokio::spawn(async move { aside.get(EventRequest::Event("us7000abcd".into())).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        leader.abort();

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(aside.in_flight.lock().unwrap().is_empty());
        assert_eq!(store.len(), 1);

        let cached = aside.get(EventRequest::Event("us7000abcd".into())).await.unwrap();
        assert_eq!(cached.source, Source::Cache);
        assert_eq!(catalog.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_fetch_clears_its_in_flight_entry() {
        let store = Arc::new(MemoryCacheStore::new());
        let catalog = CountingCatalog::failing();
        let aside = CacheAside::new(store, catalog, TTL, TIMEOUT);

        aside.get(min_magnitude("5.0")).await.unwrap_err();
        assert!(aside.in_flight.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn upstream_failure_is_not_cached() {
        let store = Arc::new(MemoryCacheStore::new());
        let catalog = CountingCatalog::failing();
        let aside = CacheAside::new(store.clone(), catalog.clone(), TTL, TIMEOUT);

        let err = aside.get(min_magnitude("5.0")).await.unwrap_err();
        assert_eq!(err, UpstreamError::Status(503));
        assert!(store.is_empty());

        aside.get(min_magnitude("5.0")).await.unwrap_err();
        assert_eq!(catalog.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_upstream_times_out() {
        let store = Arc::new(MemoryCacheStore::new());
        let catalog = CountingCatalog::new(Duration::from_secs(60));
        let aside = CacheAside::new(store.clone(), catalog, TTL, TIMEOUT);

        let err = aside.get(min_magnitude("5.0")).await.unwrap_err();
        assert_eq!(err, UpstreamError::Timeout);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn broken_store_still_returns_upstream_body() {
        let catalog = CountingCatalog::new(Duration::ZERO);
        let aside = CacheAside::new(Arc::new(BrokenStore), catalog.clone(), TTL, TIMEOUT);

        let first = aside.get(EventRequest::Event("us7000abcd".into())).await.unwrap();
        let second = aside.get(EventRequest::Event("us7000abcd".into())).await.unwrap();
        assert_eq!(first.source, Source::Upstream);
        assert_eq!(second.source, Source::Upstream);
        assert_eq!(first.key, "earthquake_us7000abcd");
        assert_eq!(catalog.calls(), 2);
    }
}

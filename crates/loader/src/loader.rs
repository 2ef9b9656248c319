//! Request coalescing on top of the persistent cache.

use crate::entry::CacheEntry;
use crate::error::{ErrorKind, Result};
use crate::payload::Payload;
use crate::persistent::PersistentCache;
use crate::request::{Fingerprint, Request};
use crate::transport::TransportHandle;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

type SharedFetch<T> = Shared<BoxFuture<'static, std::result::Result<T, ErrorKind>>>;

enum Status<T> {
    /// A resolution task is running; `id` tells it apart from any later task
    /// started for the same fingerprint after an invalidation.
    InProgress { id: u64, fetch: SharedFetch<T> },
    Fetched(CacheEntry<T>),
}

/// Loads resources through a [`Transport`](crate::Transport), sharing one
/// in-flight request between every concurrent caller asking for the same
/// [`Fingerprint`].
///
/// Lookups consult the in-memory map first, then the [`PersistentCache`],
/// then the network. Successful results are kept for `lifetime`; failures are
/// handed to every waiting caller and then forgotten, so the next call tries
/// again.
///
/// The fetch itself runs as a spawned task: a caller that stops waiting does
/// not cancel it for the others.
pub struct ResourceLoader<T: Payload> {
    inner: Arc<Inner<T>>,
}
impl<T: Payload> Clone for ResourceLoader<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

struct Inner<T> {
    label: String,
    transport: TransportHandle,
    cache: PersistentCache,
    lifetime: Duration,
    sequence: AtomicU64,
    statuses: Mutex<HashMap<Fingerprint, Status<T>>>,
}

impl<T: Payload> ResourceLoader<T> {
    pub fn new(label: impl Into<String>, transport: TransportHandle, cache: PersistentCache, lifetime: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                label: label.into(),
                transport,
                cache,
                lifetime,
                sequence: AtomicU64::new(0),
                statuses: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn lifetime(&self) -> Duration {
        self.inner.lifetime
    }

    /// Resolve a request, joining an in-flight fetch when there is one.
    #[tracing::instrument(level = "debug", skip_all, fields(loader = %self.inner.label, url = %request.url()))]
    pub async fn fetch(&self, request: &Request) -> Result<T> {
        let fingerprint = request.fingerprint();
        let fetch = {
            let mut statuses = self.inner.statuses.lock().await;
            match statuses.get(&fingerprint) {
                Some(Status::Fetched(entry)) if !entry.is_expired_at(self.inner.cache.now()) => {
                    debug!("Memory cache hit");
                    return Ok(entry.content().clone());
                },
                Some(Status::InProgress { fetch, .. }) => {
                    debug!("Joining in-flight fetch");
                    fetch.clone()
                },
                _ => {
                    let id = self.inner.sequence.fetch_add(1, Ordering::Relaxed);
                    let fetch = Inner::spawn(&self.inner, id, fingerprint.clone(), request.clone());
                    statuses.insert(fingerprint, Status::InProgress { id, fetch: fetch.clone() });
                    fetch
                },
            }
        };
        fetch.await.map_err(exn::Exn::from)
    }

    /// Drop expired results from memory, returning how many were removed.
    ///
    /// Expired results are otherwise only replaced when the same request is
    /// fetched again. In-flight fetches are left alone.
    pub async fn evict_expired(&self) -> usize {
        let now = self.inner.cache.now();
        let mut statuses = self.inner.statuses.lock().await;
        let before = statuses.len();
        statuses.retain(|_, status| !matches!(status, Status::Fetched(entry) if entry.is_expired_at(now)));
        let evicted = before - statuses.len();
        if evicted > 0 {
            debug!(loader = %self.inner.label, evicted, "Evicted expired results from memory");
        }
        evicted
    }

    /// Forget a resource in memory and on disk. A fetch already in flight
    /// still completes for its waiters but is not remembered.
    pub async fn invalidate(&self, request: &Request) -> Result<()> {
        let fingerprint = request.fingerprint();
        self.inner.statuses.lock().await.remove(&fingerprint);
        self.inner.cache.remove(&fingerprint).await?;
        Ok(())
    }
}

impl<T: Payload> Inner<T> {
    fn spawn(this: &Arc<Self>, id: u64, fingerprint: Fingerprint, request: Request) -> SharedFetch<T> {
        let task = tokio::spawn(Arc::clone(this).resolve(id, fingerprint.clone(), request));
        let this = Arc::clone(this);
        async move {
            match task.await {
                Ok(result) => result,
                Err(err) => {
                    warn!(loader = %this.label, %fingerprint, error = %err, "Fetch task did not finish");
                    this.settle(id, &fingerprint, None).await;
                    Err(ErrorKind::Aborted)
                },
            }
        }
        .boxed()
        .shared()
    }

    async fn resolve(self: Arc<Self>, id: u64, fingerprint: Fingerprint, request: Request) -> std::result::Result<T, ErrorKind> {
        match self.load(&fingerprint, &request).await {
            Ok(entry) => {
                let content = entry.content().clone();
                self.settle(id, &fingerprint, Some(entry)).await;
                Ok(content)
            },
            Err(err) => {
                warn!(loader = %self.label, %fingerprint, error = ?err, "Fetch failed");
                self.settle(id, &fingerprint, None).await;
                Err((*err).clone())
            },
        }
    }

    async fn load(&self, fingerprint: &Fingerprint, request: &Request) -> Result<CacheEntry<T>> {
        match self.cache.get::<T>(fingerprint).await {
            Ok(Some(entry)) => {
                debug!(%fingerprint, "Hydrated from persistent cache");
                return Ok(entry);
            },
            Ok(None) => {},
            Err(err) => warn!(%fingerprint, error = ?err, "Persistent cache unreadable; fetching from network"),
        }
        let bytes = self.transport.send(request).await?;
        let entry = CacheEntry::new(T::decode(bytes)?, self.cache.now(), self.lifetime);
        if let Err(err) = self.cache.put(fingerprint, &entry).await {
            warn!(%fingerprint, error = ?err, "Could not persist cache entry");
        }
        Ok(entry)
    }

    /// Replace our in-progress marker with the outcome, unless the marker
    /// was invalidated or superseded in the meantime.
    async fn settle(&self, id: u64, fingerprint: &Fingerprint, entry: Option<CacheEntry<T>>) {
        let mut statuses = self.statuses.lock().await;
        if !matches!(statuses.get(fingerprint), Some(Status::InProgress { id: current, .. }) if *current == id) {
            return;
        }
        match entry {
            Some(entry) => statuses.insert(fingerprint.clone(), Status::Fetched(entry)),
            None => statuses.remove(fingerprint),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::payload::{Blob, Json};
    use crate::transport::Transport;
    use async_trait::async_trait;
    use futures::future::join_all;
    use marquee_storage::backend::MockBackend;
    use serde::{Deserialize, Serialize};
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use time::UtcDateTime;
    use tokio::sync::Semaphore;

    const URL: &str = "https://image.example.com/t/p/w500/poster.jpg";
    const LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

    type Response = std::result::Result<&'static str, ErrorKind>;

    /// Replays canned responses, optionally holding every request until
    /// released.
    struct ScriptedTransport {
        calls: AtomicUsize,
        responses: std::sync::Mutex<VecDeque<Response>>,
        gate: Option<Semaphore>,
    }
    impl ScriptedTransport {
        fn new(responses: impl IntoIterator<Item = Response>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                responses: std::sync::Mutex::new(responses.into_iter().collect()),
                gate: None,
            }
        }

        fn gated(mut self) -> Self {
            self.gate = Some(Semaphore::new(0));
            self
        }

        fn release(&self) {
            if let Some(gate) = &self.gate {
                gate.add_permits(1_000);
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }
    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, _request: &Request) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }
            let next = self.responses.lock().unwrap().pop_front().unwrap_or(Err(ErrorKind::Status(404)));
            next.map(|body| body.as_bytes().to_vec()).map_err(exn::Exn::from)
        }
    }

    struct Harness<T: Payload> {
        loader: ResourceLoader<T>,
        transport: Arc<ScriptedTransport>,
        backend: Arc<MockBackend>,
        clock: Arc<ManualClock>,
    }

    fn harness<T: Payload>(transport: ScriptedTransport) -> Harness<T> {
        let transport = Arc::new(transport);
        let backend = Arc::new(MockBackend::default());
        let clock = Arc::new(ManualClock::new(UtcDateTime::from_unix_timestamp(1_700_000_000).unwrap()));
        let cache = PersistentCache::new(backend.clone()).with_clock(clock.clone());
        let loader = ResourceLoader::new("test", transport.clone(), cache, LIFETIME);
        Harness { loader, transport, backend, clock }
    }

    fn blob(content: &str) -> Blob {
        Blob::from(content.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_concurrent_fetches_share_one_request() {
        let h = harness::<Blob>(ScriptedTransport::new([Ok("poster")]).gated());
        let request = Request::get(URL).unwrap();
        let (results, ()) = tokio::join!(join_all((0..8).map(|_| h.loader.fetch(&request))), async {
            h.transport.release()
        });
        assert_eq!(h.transport.calls(), 1);
        for result in results {
            assert_eq!(result.unwrap(), blob("poster"));
        }
    }

    #[tokio::test]
    async fn test_distinct_requests_are_not_coalesced() {
        let h = harness::<Blob>(ScriptedTransport::new([Ok("a"), Ok("b")]));
        let first = Request::get(URL).unwrap();
        let second = Request::get("https://image.example.com/t/p/w500/backdrop.jpg").unwrap();
        let (a, b) = tokio::join!(h.loader.fetch(&first), h.loader.fetch(&second));
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(h.transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_failure_is_shared_then_forgotten() {
        let h = harness::<Blob>(ScriptedTransport::new([Err(ErrorKind::Status(503)), Ok("poster")]).gated());
        let request = Request::get(URL).unwrap();
        let (results, ()) = tokio::join!(join_all((0..4).map(|_| h.loader.fetch(&request))), async {
            h.transport.release()
        });
        assert_eq!(h.transport.calls(), 1);
        for result in results {
            assert_eq!(*result.unwrap_err(), ErrorKind::Status(503));
        }

        assert_eq!(h.loader.fetch(&request).await.unwrap(), blob("poster"));
        assert_eq!(h.transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_fresh_entry_served_from_memory() {
        let h = harness::<Blob>(ScriptedTransport::new([Ok("poster")]));
        let request = Request::get(URL).unwrap();
        h.loader.fetch(&request).await.unwrap();
        h.clock.advance(LIFETIME);
        assert_eq!(h.loader.fetch(&request).await.unwrap(), blob("poster"));
        assert_eq!(h.transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_fetched_again() {
        let h = harness::<Blob>(ScriptedTransport::new([Ok("old"), Ok("new")]));
        let request = Request::get(URL).unwrap();
        assert_eq!(h.loader.fetch(&request).await.unwrap(), blob("old"));
        h.clock.advance(LIFETIME + Duration::from_millis(1));
        assert_eq!(h.loader.fetch(&request).await.unwrap(), blob("new"));
        assert_eq!(h.transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_hydrates_from_persistent_cache() {
        let h = harness::<Blob>(ScriptedTransport::new(Vec::<Response>::new()));
        let request = Request::get(URL).unwrap();
        let cache = PersistentCache::new(h.backend.clone()).with_clock(h.clock.clone());
        let entry = CacheEntry::new(blob("from disk"), h.clock.now(), LIFETIME);
        cache.put(&request.fingerprint(), &entry).await.unwrap();

        assert_eq!(h.loader.fetch(&request).await.unwrap(), blob("from disk"));
        assert_eq!(h.transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_successful_fetch_is_persisted() {
        let h = harness::<Blob>(ScriptedTransport::new([Ok("poster")]));
        let request = Request::get(URL).unwrap();
        h.loader.fetch(&request).await.unwrap();

        let cache = PersistentCache::new(h.backend.clone()).with_clock(h.clock.clone());
        let stored = cache.get::<Blob>(&request.fingerprint()).await.unwrap().unwrap();
        assert_eq!(stored.content(), &blob("poster"));
        assert_eq!(stored.lifetime(), LIFETIME);
    }

    #[tokio::test]
    async fn test_cache_write_failure_is_not_fatal() {
        let h = harness::<Blob>(ScriptedTransport::new([Ok("poster")]));
        h.backend.fail_writes(true);
        let request = Request::get(URL).unwrap();
        assert_eq!(h.loader.fetch(&request).await.unwrap(), blob("poster"));
        assert!(h.backend.is_empty().await);
        // Still remembered in memory.
        h.loader.fetch(&request).await.unwrap();
        assert_eq!(h.transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_cache_read_failure_falls_back_to_network() {
        let h = harness::<Blob>(ScriptedTransport::new([Ok("network")]));
        let request = Request::get(URL).unwrap();
        let cache = PersistentCache::new(h.backend.clone()).with_clock(h.clock.clone());
        cache.put(&request.fingerprint(), &CacheEntry::new(blob("disk"), h.clock.now(), LIFETIME)).await.unwrap();
        h.backend.fail_reads(true);

        assert_eq!(h.loader.fetch(&request).await.unwrap(), blob("network"));
        assert_eq!(h.transport.calls(), 1);
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Movie {
        id: u64,
        title: String,
    }

    #[tokio::test]
    async fn test_decode_failure_is_not_cached() {
        let h = harness::<Json<Movie>>(ScriptedTransport::new([Ok("<html>"), Ok(r#"{"id": 954, "title": "Mission: Impossible"}"#)]));
        let request = Request::get("https://api.example.com/3/movie/954").unwrap();
        let err = h.loader.fetch(&request).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Decode(_)));
        assert!(h.backend.is_empty().await);

        let movie = h.loader.fetch(&request).await.unwrap();
        assert_eq!(movie.0.id, 954);
        assert_eq!(h.transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_invalidate() {
        let h = harness::<Blob>(ScriptedTransport::new([Ok("old"), Ok("new")]));
        let request = Request::get(URL).unwrap();
        h.loader.fetch(&request).await.unwrap();
        h.loader.invalidate(&request).await.unwrap();
        assert!(h.backend.is_empty().await);
        assert_eq!(h.loader.fetch(&request).await.unwrap(), blob("new"));
        assert_eq!(h.transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_timeout_is_not_cached() {
        let h = harness::<Blob>(ScriptedTransport::new([Err(ErrorKind::Timeout), Ok("poster")]));
        let request = Request::get(URL).unwrap();
        let err = h.loader.fetch(&request).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Timeout);
        assert!(err.is_retryable());
        assert_eq!(h.loader.fetch(&request).await.unwrap(), blob("poster"));
        assert_eq!(h.transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_evict_expired_from_memory() {
        let h = harness::<Blob>(ScriptedTransport::new([Ok("old"), Ok("fresh")]));
        let old = Request::get(URL).unwrap();
        let fresh = Request::get("https://image.example.com/t/p/w500/backdrop.jpg").unwrap();
        h.loader.fetch(&old).await.unwrap();
        h.clock.advance(Duration::from_secs(60 * 60));
        h.loader.fetch(&fresh).await.unwrap();

        assert_eq!(h.loader.evict_expired().await, 0);
        h.clock.advance(LIFETIME - Duration::from_secs(30 * 60));
        assert_eq!(h.loader.evict_expired().await, 1);
        assert_eq!(h.loader.inner.statuses.lock().await.len(), 1);
        // The surviving entry is still served without the network.
        assert_eq!(h.loader.fetch(&fresh).await.unwrap(), blob("fresh"));
        assert_eq!(h.transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_abandoned_caller_does_not_cancel_fetch() {
        let h = harness::<Blob>(ScriptedTransport::new([Ok("poster")]).gated());
        let request = Request::get(URL).unwrap();
        {
            let mut first = std::pin::pin!(h.loader.fetch(&request));
            assert!(futures::poll!(&mut first).is_pending());
        }
        h.transport.release();
        assert_eq!(h.loader.fetch(&request).await.unwrap(), blob("poster"));
        assert_eq!(h.transport.calls(), 1);
    }
}

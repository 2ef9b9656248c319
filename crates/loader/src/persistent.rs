//! Durable cache of [`CacheEntry`] values, one storage object per request.

use crate::clock::{ClockHandle, SystemClock};
use crate::entry::CacheEntry;
use crate::error::{ErrorKind, Result};
use crate::request::Fingerprint;
use exn::ResultExt;
use futures::TryStreamExt;
use marquee_storage::BackendHandle;
use marquee_storage::error::ErrorKind as StorageErrorKind;
use serde::Serialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use std::sync::Arc;
use time::UtcDateTime;
use tracing::{debug, warn};

/// Stores entries through a [`StorageBackend`](marquee_storage::StorageBackend),
/// keyed by [`Fingerprint::storage_key`].
///
/// Expired entries are evicted lazily when read. Entries that cannot be
/// parsed are deleted and reported as [`ErrorKind::Cache`].
#[derive(Clone)]
pub struct PersistentCache {
    backend: BackendHandle,
    clock: ClockHandle,
}
impl PersistentCache {
    pub fn new(backend: BackendHandle) -> Self {
        Self { backend, clock: Arc::new(SystemClock) }
    }

    pub fn with_clock(mut self, clock: ClockHandle) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> UtcDateTime {
        self.clock.now()
    }

    /// Atomically write an entry, replacing whatever was stored before.
    pub async fn put<T: Serialize>(&self, fingerprint: &Fingerprint, entry: &CacheEntry<T>) -> Result<()> {
        let bytes = entry.to_bytes()?;
        self.backend
            .write(&fingerprint.storage_key(), &bytes)
            .await
            .or_raise(|| ErrorKind::Cache)
    }

    /// Fetch a fresh entry. Missing and expired entries are `None`; expired
    /// ones are deleted on the way.
    #[tracing::instrument(level = "debug", skip(self), fields(backend = self.backend.name()))]
    pub async fn get<T: DeserializeOwned>(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry<T>>> {
        let key = fingerprint.storage_key();
        let bytes = match self.backend.read(&key).await {
            Ok(bytes) => bytes,
            Err(err) if matches!(&*err, StorageErrorKind::NotFound(_)) => return Ok(None),
            Err(err) => return Err(err).or_raise(|| ErrorKind::Cache),
        };
        let entry = match CacheEntry::<T>::from_bytes(&bytes) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(key, "Deleting unreadable cache entry");
                self.discard(&key).await;
                return Err(err);
            },
        };
        if entry.is_expired_at(self.now()) {
            debug!(key, "Cache entry expired");
            self.discard(&key).await;
            return Ok(None);
        }
        Ok(Some(entry))
    }

    /// Delete the entry for a fingerprint. Returns `false` if there was none.
    pub async fn remove(&self, fingerprint: &Fingerprint) -> Result<bool> {
        self.delete_key(&fingerprint.storage_key()).await
    }

    /// Delete every expired or unreadable entry, returning how many were
    /// removed.
    pub async fn evict_expired(&self) -> Result<usize> {
        let now = self.now();
        let files = self.backend.list(None).await.or_raise(|| ErrorKind::Cache)?;
        let mut evicted = 0;
        for file in files {
            let bytes = match self.backend.read(&file.key).await {
                Ok(bytes) => bytes,
                // Removed concurrently.
                Err(err) if matches!(&*err, StorageErrorKind::NotFound(_)) => continue,
                Err(err) => return Err(err).or_raise(|| ErrorKind::Cache),
            };
            let stale = CacheEntry::<IgnoredAny>::from_bytes(&bytes).map_or(true, |entry| entry.is_expired_at(now));
            if stale && self.delete_key(&file.key).await? {
                evicted += 1;
            }
        }
        debug!(evicted, "Evicted stale cache entries");
        Ok(evicted)
    }

    /// Delete every entry, returning how many were removed.
    pub async fn clear(&self) -> Result<usize> {
        let mut files = self.backend.list_stream(None);
        let mut removed = 0;
        while let Some(file) = files.try_next().await.or_raise(|| ErrorKind::Cache)? {
            if self.delete_key(&file.key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn delete_key(&self, key: &str) -> Result<bool> {
        match self.backend.delete(key).await {
            Ok(()) => Ok(true),
            Err(err) if matches!(&*err, StorageErrorKind::NotFound(_)) => Ok(false),
            Err(err) => Err(err).or_raise(|| ErrorKind::Cache),
        }
    }

    async fn discard(&self, key: &str) {
        if let Err(err) = self.delete_key(key).await {
            warn!(key, error = ?err, "Could not delete cache entry");
        }
    }
}

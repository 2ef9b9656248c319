//! Storage backend trait and implementations.
//!
//! This module defines the `StorageBackend` trait, a unified interface over a
//! flat namespace of keyed objects. The local filesystem backend is what the
//! resource cache uses in production; the mock backend keeps everything in
//! memory for tests.

mod local;
#[cfg(any(test, feature = "mock"))]
mod mock;

pub use self::local::LocalBackend;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockBackend;
use crate::FileInfo;
use crate::error::Result;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::pin::Pin;

pub type FileInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<FileInfo>> + Send + 'a>>;

/// Unified interface for storage backends.
///
/// All operations are asynchronous and take `&self`, so a backend can be
/// shared behind a [`BackendHandle`](crate::BackendHandle). It's a glorified
/// key/value store where the values happen to be files.
///
/// # Keys
/// Every key is validated with [`validate_key`](crate::validate_key) before
/// use. Implementations must enforce this validation.
///
/// # Examples
///
/// ```
/// use marquee_storage::{backend::StorageBackend, error::Result};
///
/// async fn cached_bytes(backend: &dyn StorageBackend) -> Result<u64> {
///     let files = backend.list(None).await?;
///     Ok(files.iter().map(|file| file.size).sum())
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the backend, used for logging only.
    fn name(&self) -> &str;

    /// List all objects whose key starts with an optional prefix.
    ///
    /// Default implementation collects the results from
    /// [`list_stream()`](Self::list_stream) into a [`Vec`].
    async fn list(&self, prefix: Option<&str>) -> Result<Vec<FileInfo>> {
        self.list_stream(prefix).try_collect().await
    }

    /// Stream object metadata for all keys starting with an optional prefix.
    ///
    /// Objects that are mid-write are never listed.
    ///
    /// # Examples
    ///
    /// ```
    /// use futures::TryStreamExt;
    /// # use marquee_storage::{backend::StorageBackend, error::Result};
    /// # async fn example(backend: &dyn StorageBackend) -> Result<()> {
    /// let mut stream = backend.list_stream(Some("GET"));
    /// while let Some(info) = stream.try_next().await? {
    ///     println!("{}: {} bytes", info.key, info.size);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    fn list_stream<'a>(&'a self, prefix: Option<&'a str>) -> FileInfoStream<'a>;

    /// Read the complete contents of an object.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if nothing is
    /// stored under the key.
    async fn read(&self, key: &str) -> Result<Vec<u8>>;

    /// Write an object, replacing any existing object under the same key.
    ///
    /// The replacement is atomic: a concurrent reader sees either the old
    /// contents or the new contents, never a partial write.
    ///
    /// ```no_run
    /// # use marquee_storage::{backend::StorageBackend, error::Result};
    /// # async fn example(backend: &dyn StorageBackend) -> Result<()> {
    /// backend.write("entry.json", br#"{"content":null}"#).await?;
    /// # Ok(())
    /// # }
    /// ```
    async fn write(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Delete an object.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if nothing is
    /// stored under the key.
    async fn delete(&self, key: &str) -> Result<()>;
}

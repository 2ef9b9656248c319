//! Local filesystem storage backend.
//!
//! Objects are stored as files directly inside a configured root directory
//! and accessed with `tokio::fs`. Writes go to a hidden temporary file first
//! and are then renamed over the destination.

use crate::backend::FileInfoStream;
use crate::error::{ErrorKind, Result};
use crate::{FileInfo, StorageBackend, validate_key};
use async_stream::stream;
use async_trait::async_trait;
use std::fs::create_dir_all as sync_create_dir;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs::{self, DirEntry};

/// Distinguishes temporary files of concurrent writes to the same key.
static WRITE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Local filesystem storage backend.
///
/// # Examples
///
/// ```no_run
/// use marquee_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = LocalBackend::new("resources", "/path/to/cache")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct LocalBackend {
    name: String,
    /// Directory holding one file per key
    root: PathBuf,
}
impl LocalBackend {
    /// Create a new local filesystem backend, creating the root directory if
    /// it doesn't exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute, or exists but is not a
    /// directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::BackendError(format!("root `{}` is not absolute", root.display())));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::BackendError(format!("root `{}` is not a directory", root.display())));
            }
        } else {
            // Use non-async here; it'll only happen once on startup and it's
            // not worth the hassle of making the constructor async.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, &root.display().to_string()))?;
        }
        Ok(Self { name: name.into(), root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn absolute_path(&self, key: &str) -> Result<PathBuf> {
        Ok(self.root.join(validate_key(key)?))
    }

    fn temporary_path(&self, key: &str) -> PathBuf {
        let sequence = WRITE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        self.root.join(format!(".{key}.{}-{sequence}.tmp", std::process::id()))
    }

    fn map_io_error(e: std::io::Error, key: &str) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(key.to_string()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(key.to_string()),
            _ => ErrorKind::Io(e),
        }
    }

    /// Returns `None` for anything that isn't a regular file with a valid key
    /// (temporary write files, stray directories, broken symlinks).
    async fn process_entry(entry: DirEntry, prefix: Option<&str>) -> Result<Option<FileInfo>> {
        let Some(key) = entry.file_name().to_str().map(str::to_string) else {
            return Ok(None);
        };
        if validate_key(&key).is_err() || prefix.is_some_and(|prefix| !key.starts_with(prefix)) {
            return Ok(None);
        }
        let metadata = entry.metadata().await.map_err(|e| Self::map_io_error(e, &key))?;
        if !metadata.is_file() {
            return Ok(None);
        }
        let modified = metadata.modified().map_err(ErrorKind::Io)?;
        Ok(Some(FileInfo::new(key, metadata.len(), modified)))
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a str>) -> FileInfoStream<'a> {
        Box::pin(stream! {
            let mut entries = match fs::read_dir(&self.root).await {
                Ok(entries) => entries,
                // Root removed from under us: nothing stored.
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => return,
                Err(err) => {
                    yield Err(exn::Exn::from(ErrorKind::Io(err)));
                    return;
                }
            };
            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(err) => { yield Err(exn::Exn::from(ErrorKind::Io(err))); continue; },
                };
                match Self::process_entry(entry, prefix).await {
                    Ok(Some(info)) => yield Ok(info),
                    Ok(None) => {},
                    Err(e) => yield Err(e),
                }
            }
        })
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.absolute_path(key)?;
        Ok(fs::read(&path).await.map_err(|e| Self::map_io_error(e, key))?)
    }

    #[tracing::instrument(level = "trace", skip(self, data), fields(backend = %self.name, size = data.len()))]
    async fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.absolute_path(key)?;
        let temporary = self.temporary_path(key);
        if let Err(e) = fs::write(&temporary, data).await {
            exn::bail!(Self::map_io_error(e, key));
        }
        if let Err(e) = fs::rename(&temporary, &path).await {
            // Don't leave half-finished writes lying around.
            _ = fs::remove_file(&temporary).await;
            exn::bail!(Self::map_io_error(e, key));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.absolute_path(key)?;
        Ok(fs::remove_file(&path).await.map_err(|e| Self::map_io_error(e, key))?)
    }
}

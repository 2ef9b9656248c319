//! In-memory storage backend for testing.

use super::FileInfoStream;
use crate::error::{ErrorKind, Result};
use crate::{FileInfo, StorageBackend, validate_key};
use async_stream::stream;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use time::UtcDateTime;
use tokio::sync::RwLock;

/// In-memory storage backend for testing.
///
/// Objects are stored in a `HashMap` behind a [`RwLock`], so all trait methods
/// can operate on `&self` without external synchronisation. Reads and writes
/// can be switched to fail on demand, to exercise error paths of callers.
///
/// # Examples
///
/// ```
/// use marquee_storage::backend::{MockBackend, StorageBackend};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_files([("entry.json", b"{}")]);
/// assert_eq!(backend.read("entry.json").await?, b"{}");
///
/// backend.fail_writes(true);
/// assert!(backend.write("other.json", b"{}").await.is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MockBackend {
    name: String,
    storage: RwLock<HashMap<String, (UtcDateTime, Vec<u8>)>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MockBackend {
    /// Create a mock backend pre-populated with objects.
    ///
    /// Panics if any key fails validation. If test setup is wrong, then the
    /// test should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<String>, impl Into<Vec<u8>>)>) -> Self {
        let mut map = HashMap::new();
        let now = UtcDateTime::now();
        for (key, data) in files {
            let key = key.into();
            // The panic here is DELIBERATE. MockBackend is intended to be
            // used in tests; panics are expected. There is no error result.
            if validate_key(&key).is_err() {
                panic!("MockBackend::with_files: invalid key {key:?}");
            }
            map.insert(key, (now, data.into()));
        }
        Self {
            name: "mock".to_string(),
            storage: RwLock::new(map),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Change the name of the mock backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Make every subsequent `read` fail with an I/O error (or stop doing so).
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `write` and `delete` fail with an I/O error (or
    /// stop doing so).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.storage.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.storage.read().await.is_empty()
    }

    fn injected(flag: &AtomicBool, operation: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            let err = std::io::Error::other(format!("injected {operation} failure"));
            exn::bail!(ErrorKind::Io(err));
        }
        Ok(())
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let files: [(&str, &str); 0] = [];
        Self::with_files(files)
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a str>) -> FileInfoStream<'a> {
        Box::pin(stream! {
            // Snapshot matching entries under the read lock, then drop it
            // before yielding to avoid holding the lock across yield points.
            let entries: Vec<FileInfo> = {
                let guard = self.storage.read().await;
                guard
                    .iter()
                    .filter(|(key, _)| prefix.is_none_or(|prefix| key.starts_with(prefix)))
                    .map(|(key, (inserted, data))| FileInfo::new(key.clone(), data.len() as u64, *inserted))
                    .collect()
            };
            for info in entries {
                yield Ok(info);
            }
        })
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        let key = validate_key(key)?;
        Self::injected(&self.fail_reads, "read")?;
        let guard = self.storage.read().await;
        let (_inserted, data) = guard.get(key).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(key.to_string())))?;
        Ok(data.clone())
    }

    async fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        let key = validate_key(key)?;
        Self::injected(&self.fail_writes, "write")?;
        self.storage.write().await.insert(key.to_string(), (UtcDateTime::now(), data.to_vec()));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let key = validate_key(key)?;
        Self::injected(&self.fail_writes, "delete")?;
        self.storage
            .write()
            .await
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(key.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_and_read() {
        let backend = MockBackend::default();
        backend.write("test", b"hello").await.unwrap();
        assert_eq!(backend.read("test").await.unwrap(), b"hello");
        assert_eq!(backend.len().await, 1);
    }

    #[tokio::test]
    async fn test_with_files() {
        let backend = MockBackend::with_files([("one", Vec::from(*b"1")), ("two", Vec::from(*b"2"))]).with_name("test");
        assert_eq!(backend.name(), "test");
        assert_eq!(backend.read("one").await.unwrap(), b"1");
        assert_eq!(backend.read("two").await.unwrap(), b"2");
        assert!(matches!(&*backend.read("three").await.unwrap_err(), ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_read_not_found() {
        let backend = MockBackend::default();
        let err = backend.read("missing").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete() {
        let backend = MockBackend::default();
        backend.write("entry", b"data").await.unwrap();
        backend.delete("entry").await.unwrap();
        assert!(backend.is_empty().await);
        let err = backend.delete("entry").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_with_prefix() {
        let backend = MockBackend::with_files([
            ("GET-a", Vec::from(*b"a")),
            ("GET-b", Vec::from(*b"b")),
            ("POST-c", Vec::from(*b"c")),
        ]);
        assert_eq!(backend.list(None).await.unwrap().len(), 3);
        let mut keys: Vec<_> = backend.list(Some("GET")).await.unwrap().into_iter().map(|f| f.key).collect();
        keys.sort();
        assert_eq!(keys, vec!["GET-a".to_string(), "GET-b".to_string()]);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let backend = MockBackend::with_files([("entry", Vec::from(*b"data"))]);
        backend.fail_reads(true);
        assert!(matches!(&*backend.read("entry").await.unwrap_err(), ErrorKind::Io(_)));
        backend.fail_reads(false);
        assert_eq!(backend.read("entry").await.unwrap(), b"data");

        backend.fail_writes(true);
        assert!(backend.write("other", b"data").await.is_err());
        assert!(backend.delete("entry").await.is_err());
        backend.fail_writes(false);
        assert!(backend.write("other", b"data").await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_key_rejected() {
        let backend = MockBackend::default();
        assert!(backend.read("../etc/passwd").await.is_err());
        assert!(backend.write("a/b", b"bad").await.is_err());
    }

    #[test]
    #[should_panic(expected = "invalid key")]
    fn test_with_files_panics_on_bad_key() {
        MockBackend::with_files([("../escape", Vec::from(*b"bad"))]);
    }
}

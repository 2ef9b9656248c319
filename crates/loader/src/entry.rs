//! The cache entry envelope.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::UtcDateTime;

/// Content plus the moment it was produced and how long it stays valid.
///
/// An entry is fresh while `now <= created_at + lifetime`. If that sum is not
/// representable the entry never expires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry<T> {
    content: T,
    created_at: UtcDateTime,
    lifetime: Duration,
}

/// On-disk representation: millisecond integers keep the file format
/// independent of any date formatting.
#[derive(Serialize, Deserialize)]
struct EntryFile<T> {
    content: T,
    created_at_ms: i64,
    lifetime_ms: u64,
}

impl<T> CacheEntry<T> {
    pub fn new(content: T, created_at: UtcDateTime, lifetime: Duration) -> Self {
        Self { content, created_at, lifetime }
    }

    pub fn content(&self) -> &T {
        &self.content
    }

    pub fn into_content(self) -> T {
        self.content
    }

    pub fn created_at(&self) -> UtcDateTime {
        self.created_at
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// `None` when the expiry instant overflows.
    pub fn expires_at(&self) -> Option<UtcDateTime> {
        let lifetime = time::Duration::try_from(self.lifetime).ok()?;
        self.created_at.checked_add(lifetime)
    }

    pub fn is_expired_at(&self, now: UtcDateTime) -> bool {
        self.expires_at().is_some_and(|expires_at| now > expires_at)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(UtcDateTime::now())
    }
}

impl<T: Serialize> CacheEntry<T> {
    /// Serialize to the JSON document stored by the persistent cache.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let created_at_ms = i64::try_from(self.created_at.unix_timestamp_nanos() / 1_000_000)
            .or_raise(|| ErrorKind::Cache)?;
        let lifetime_ms = u64::try_from(self.lifetime.as_millis()).unwrap_or(u64::MAX);
        let file = EntryFile { content: &self.content, created_at_ms, lifetime_ms };
        serde_json::to_vec(&file).or_raise(|| ErrorKind::Cache)
    }
}

impl<T: DeserializeOwned> CacheEntry<T> {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let file: EntryFile<T> = serde_json::from_slice(bytes).or_raise(|| ErrorKind::Cache)?;
        let created_at = UtcDateTime::from_unix_timestamp_nanos(i128::from(file.created_at_ms) * 1_000_000)
            .or_raise(|| ErrorKind::Cache)?;
        Ok(Self {
            content: file.content,
            created_at,
            lifetime: Duration::from_millis(file.lifetime_ms),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn start() -> UtcDateTime {
        UtcDateTime::from_unix_timestamp(1_700_000_000).unwrap()
    }

    #[rstest]
    #[case(Duration::ZERO, false)]
    #[case(Duration::from_secs(59), false)]
    #[case(Duration::from_secs(60), false)]
    #[case(Duration::from_millis(60_001), true)]
    fn test_expiry_boundary(#[case] elapsed: Duration, #[case] expired: bool) {
        let entry = CacheEntry::new("content", start(), Duration::from_secs(60));
        assert_eq!(entry.is_expired_at(start() + elapsed), expired);
    }

    #[test]
    fn test_overflowing_lifetime_never_expires() {
        let entry = CacheEntry::new("content", start(), Duration::MAX);
        assert_eq!(entry.expires_at(), None);
        assert!(!entry.is_expired_at(UtcDateTime::MAX));
    }

    #[test]
    fn test_wire_format() {
        let entry = CacheEntry::new("poster".to_string(), start(), Duration::from_secs(3600));
        let json: serde_json::Value = serde_json::from_slice(&entry.to_bytes().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "content": "poster",
                "created_at_ms": 1_700_000_000_000_i64,
                "lifetime_ms": 3_600_000_u64,
            })
        );
        let decoded = CacheEntry::<String>::from_bytes(&entry.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, entry);
    }

    #[rstest]
    #[case(b"not json".as_slice())]
    #[case(br#"{"content": "x"}"#.as_slice())]
    #[case(br#"{"content": 1, "created_at_ms": 0, "lifetime_ms": 0}"#.as_slice())]
    fn test_corrupt_entries_rejected(#[case] bytes: &[u8]) {
        let err = CacheEntry::<String>::from_bytes(bytes).unwrap_err();
        assert_eq!(*err, ErrorKind::Cache);
    }
}

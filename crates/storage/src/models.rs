//! Storage models.

use time::UtcDateTime;

/// Object metadata returned by storage backends when listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Storage key (file name) of the object
    pub key: String,
    /// Object size in bytes
    pub size: u64,
    /// Last modified timestamp
    pub modified: UtcDateTime,
}
impl FileInfo {
    pub fn new(key: impl Into<String>, size: u64, modified: impl Into<UtcDateTime>) -> Self {
        Self {
            key: key.into(),
            size,
            modified: modified.into(),
        }
    }
}

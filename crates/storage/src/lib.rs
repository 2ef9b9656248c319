//! Flat key/value file storage.
//!
//! Every stored object is addressed by a single storage-safe key (a file
//! name, never a path). Backends only need to support whole-object reads,
//! atomic whole-object writes, deletes and listing.

pub mod backend;
pub mod error;
mod key;
mod models;

pub use crate::backend::StorageBackend;
pub use crate::key::{MAX_KEY_LENGTH, validate as validate_key};
pub use crate::models::FileInfo;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;

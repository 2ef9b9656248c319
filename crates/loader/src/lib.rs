//! Coalescing resource loader with a durable TTL cache.
//!
//! Every network fetch (catalogue documents, images) goes through a
//! [`ResourceLoader`]. It guarantees at most one in-flight transport call per
//! distinct request, hydrates transparently from a [`PersistentCache`] on
//! disk, and treats entries older than their lifetime as misses.
//!
//! # Architecture
//! - [`Request`]s are reduced to a [`Fingerprint`] (method + normalized URL),
//!   which keys both the in-memory status map and the cache file name.
//! - [`CacheEntry`] is the envelope stored in memory and on disk.
//! - [`Transport`] is the injected network capability; [`HttpTransport`] is
//!   the `reqwest` implementation.
//! - [`Payload`] decodes raw response bytes into the loader's content type.

mod clock;
mod entry;
pub mod error;
mod loader;
mod payload;
mod persistent;
mod request;
mod transport;

#[cfg(any(test, feature = "mock"))]
pub use crate::clock::ManualClock;
pub use crate::clock::{Clock, ClockHandle, SystemClock};
pub use crate::entry::CacheEntry;
pub use crate::loader::ResourceLoader;
pub use crate::payload::{Blob, Json, Payload};
pub use crate::persistent::PersistentCache;
pub use crate::request::{Fingerprint, Method, Request};
pub use crate::transport::{HttpTransport, Transport, TransportHandle};

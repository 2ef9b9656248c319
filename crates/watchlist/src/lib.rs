//! The watchlist and its durable record store.
//!
//! The in-memory [`Watchlist`] is the source of truth while the process runs.
//! The SQLite database is shared with an external sync engine that may
//! duplicate, orphan or corrupt records behind our back, so every save is a
//! reconciliation rather than a blind write.
//!
//! # Architecture
//! - [`WatchlistId`] is the stable identity of an item, encoded into an
//!   opaque byte string stored alongside every record.
//! - Each item state maps onto its own record kind ([`ToWatchRecord`],
//!   [`WatchedRecord`]), each in its own table.
//! - [`reconcile`] diffs one record kind against a snapshot of the matching
//!   items through a [`RecordStore`] and applies the result as one batch.
//! - [`WatchlistStore`] hydrates a watchlist at startup and saves it back.

mod db;
pub mod error;
mod identity;
mod item;
mod reconcile;
mod records;
mod session;
mod store;
mod watchlist;

pub use crate::db::Database;
pub use crate::identity::{Identity, MovieId, WatchlistId};
pub use crate::item::{Rating, StateUpdate, Suggestion, ToWatchInfo, WatchedInfo, WatchlistItem, WatchlistState};
pub use crate::reconcile::{Reconciliation, Storeable, reconcile};
pub use crate::records::{Record, ToWatchRecord, WatchedRecord};
pub use crate::session::{RecordStore, Session};
pub use crate::store::{SaveSummary, WatchlistStore};
pub use crate::watchlist::{ToWatchItem, WatchedItem, Watchlist, WatchlistEvent};

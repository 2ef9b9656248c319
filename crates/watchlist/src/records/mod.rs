//! Durable record kinds.
//!
//! Every item state has a matching record kind living in its own table. The
//! set of kinds is closed: [`Record`] is sealed.

mod to_watch;
mod watched;

pub use self::to_watch::ToWatchRecord;
pub use self::watched::WatchedRecord;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{FromRow, Sqlite};
use std::fmt::Debug;
use time::UtcDateTime;

pub(crate) type RecordQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

mod sealed {
    pub trait Sealed {}
}

/// A persisted row representing one domain item.
///
/// `id` is `None` until the record has been inserted. `modified_at` is a
/// millisecond timestamp stamped on every write.
pub trait Record:
    sealed::Sealed + for<'r> FromRow<'r, SqliteRow> + Debug + Clone + Default + PartialEq + Send + Sync + Unpin + 'static
{
    /// Human readable kind, for logging.
    const KIND: &'static str;
    const SELECT_ALL: &'static str;
    /// Binds [`bind_fields`](Self::bind_fields) and returns the new row id.
    const INSERT: &'static str;
    /// Binds [`bind_fields`](Self::bind_fields) followed by the row id.
    const UPDATE: &'static str;
    const DELETE: &'static str;

    fn id(&self) -> Option<i64>;
    fn set_id(&mut self, id: i64);
    fn storeable_identifier(&self) -> Option<&[u8]>;
    fn set_storeable_identifier(&mut self, identifier: Vec<u8>);
    fn modified_at(&self) -> i64;
    fn set_modified_at(&mut self, modified_at: i64);
    /// Bind every column except `id`, in table order.
    fn bind_fields<'q>(&self, query: RecordQuery<'q>) -> RecordQuery<'q>;
}

pub(crate) fn to_millis(date: UtcDateTime) -> i64 {
    date.unix_timestamp() * 1000 + i64::from(date.millisecond())
}

pub(crate) fn from_millis(millis: i64) -> Option<UtcDateTime> {
    UtcDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
}

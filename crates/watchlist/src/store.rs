//! Loading and saving a whole watchlist.

use crate::db::Database;
use crate::error::Result;
use crate::identity::WatchlistId;
use crate::item::WatchlistItem;
use crate::reconcile::{Reconciliation, Storeable, deduplicate, reconcile};
use crate::records::{Record, ToWatchRecord, WatchedRecord};
use crate::session::RecordStore;
use crate::watchlist::{ToWatchItem, WatchedItem, Watchlist};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

/// Outcome of [`WatchlistStore::save`], per record kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveSummary {
    pub watched: Reconciliation,
    pub to_watch: Reconciliation,
}

/// Persists a [`Watchlist`] through the record tables.
///
/// Saves are serialized: only one reconciliation runs at a time per store.
#[derive(Debug)]
pub struct WatchlistStore {
    database: Database,
    writer: Mutex<()>,
}
impl WatchlistStore {
    pub fn new(database: Database) -> Self {
        Self { database, writer: Mutex::new(()) }
    }

    /// Open (creating if needed) the database file at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Database::connect(path).await?))
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Hydrate a watchlist from whatever is currently stored.
    ///
    /// Duplicate and undecodable records are skipped (not deleted; the next
    /// save cleans them up). An identity stored as both kinds resolves to the
    /// more recently modified record, preferring watched on a tie.
    #[instrument(level = "debug", skip(self))]
    pub async fn load(&self) -> Result<Watchlist> {
        let mut session = self.database.begin().await?;
        let to_watch = session.fetch_all::<ToWatchRecord>().await?;
        let watched = session.fetch_all::<WatchedRecord>().await?;
        session.rollback().await?;

        let mut items: HashMap<WatchlistId, (i64, WatchlistItem)> = HashMap::new();
        for (modified_at, item) in hydrate::<ToWatchItem>(to_watch) {
            items.insert(item.id(), (modified_at, item));
        }
        for (modified_at, item) in hydrate::<WatchedItem>(watched) {
            match items.get(&item.id()) {
                Some((existing, _)) if *existing > modified_at => {
                    warn!(id = %item.id(), "Ignoring older watched record for an item still to watch");
                },
                Some(_) => {
                    warn!(id = %item.id(), "Ignoring to-watch record superseded by a watched record");
                    items.insert(item.id(), (modified_at, item));
                },
                None => {
                    items.insert(item.id(), (modified_at, item));
                },
            }
        }
        let watchlist = Watchlist::from_items(items.into_values().map(|(_, item)| item));
        info!(items = watchlist.len(), "Loaded watchlist");
        Ok(watchlist)
    }

    /// Reconcile both record kinds with the watchlist.
    ///
    /// Watched records are reconciled first so that an item moving from one
    /// kind to the other is never missing from the store. Each kind is its
    /// own batch: if the second fails the first stays committed.
    #[instrument(level = "debug", skip_all, fields(items = watchlist.len()))]
    pub async fn save(&self, watchlist: &Watchlist) -> Result<SaveSummary> {
        let _writer = self.writer.lock().await;
        let (to_watch, watched) = watchlist.partition();
        let mut session = self.database.begin().await?;
        let watched = reconcile(&mut session, &watched).await?;
        let mut session = self.database.begin().await?;
        let to_watch = reconcile(&mut session, &to_watch).await?;
        Ok(SaveSummary { watched, to_watch })
    }

    pub async fn close(&self) {
        self.database.close().await;
    }
}

fn hydrate<S>(records: Vec<S::Record>) -> Vec<(i64, WatchlistItem)>
where
    S: Storeable<Id = WatchlistId> + Into<WatchlistItem>,
{
    let (survivors, _) = deduplicate::<WatchlistId, S::Record>(records);
    survivors
        .into_iter()
        .filter_map(|(id, record)| match S::hydrate(id, &record) {
            Some(item) => Some((record.modified_at(), item.into())),
            None => {
                warn!(kind = <S::Record as Record>::KIND, %id, "Skipping record with invalid fields");
                None
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{Identity, MovieId};
    use crate::item::{Rating, StateUpdate, WatchlistState};
    use time::UtcDateTime;

    const MOVIE: WatchlistId = WatchlistId::Movie(MovieId(954));

    fn at(seconds: i64) -> UtcDateTime {
        UtcDateTime::from_unix_timestamp(1_700_000_000 + seconds).unwrap()
    }

    async fn store() -> WatchlistStore {
        WatchlistStore::new(Database::connect_in_memory().await.unwrap())
    }

    async fn stored<R: Record>(store: &WatchlistStore) -> Vec<R> {
        let mut session = store.database().begin().await.unwrap();
        session.fetch_all().await.unwrap()
    }

    #[tokio::test]
    async fn test_cold_start_hydration() {
        let store = store().await;
        sqlx::query(ToWatchRecord::INSERT)
            .bind(MOVIE.encode())
            .bind(1_700_000_000_000_i64)
            .bind(1_700_000_000_000_i64)
            .bind(Option::<String>::None)
            .bind(Option::<String>::None)
            .fetch_one(store.database().pool())
            .await
            .unwrap();

        let watchlist = store.load().await.unwrap();
        assert_eq!(watchlist.len(), 1);
        let item = watchlist.get(MOVIE).unwrap();
        assert_eq!(item.id(), MOVIE);
        assert_eq!(item, &WatchlistItem::to_watch(MOVIE, at(0), None));
    }

    #[tokio::test]
    async fn test_empty_store_loads_empty_watchlist() {
        let store = store().await;
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_to_watch_then_watched_across_two_saves() {
        let store = store().await;
        let mut watchlist = Watchlist::new();
        watchlist.add(WatchlistItem::to_watch(MOVIE, at(0), None));
        let first = store.save(&watchlist).await.unwrap();
        assert_eq!(first.to_watch.created, 1);
        assert_eq!(stored::<ToWatchRecord>(&store).await.len(), 1);
        assert!(stored::<WatchedRecord>(&store).await.is_empty());

        watchlist.update_at(MOVIE, StateUpdate::Watched { rating: Rating::new(9) }, at(3600));
        let second = store.save(&watchlist).await.unwrap();
        assert_eq!(second.watched.created, 1);
        assert_eq!(second.to_watch.deleted, 1);
        assert!(stored::<ToWatchRecord>(&store).await.is_empty());
        let watched = stored::<WatchedRecord>(&store).await;
        assert_eq!(watched.len(), 1);
        assert_eq!(watched[0].rating, Some(9));
        assert_eq!(watched[0].added_on, 1_700_000_000_000);

        let reloaded = store.load().await.unwrap();
        assert_eq!(reloaded.get(MOVIE), watchlist.get(MOVIE));
    }

    #[tokio::test]
    async fn test_removal_is_persisted() {
        let store = store().await;
        let mut watchlist = Watchlist::new();
        watchlist.add(WatchlistItem::to_watch(MOVIE, at(0), None));
        store.save(&watchlist).await.unwrap();
        watchlist.remove(MOVIE);
        let summary = store.save(&watchlist).await.unwrap();
        assert_eq!(summary.to_watch.deleted, 1);
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_identity_in_both_kinds_prefers_newer_record() {
        let store = store().await;
        let mut watchlist = Watchlist::new();
        watchlist.add(WatchlistItem::to_watch(MOVIE, at(0), None));
        store.save(&watchlist).await.unwrap();

        // The sync engine writes a newer watched record without removing
        // the to-watch one.
        sqlx::query(WatchedRecord::INSERT)
            .bind(MOVIE.encode())
            .bind(i64::MAX)
            .bind(1_700_000_000_000_i64)
            .bind(Option::<String>::None)
            .bind(Option::<String>::None)
            .bind(Some(4_i64))
            .bind(1_700_000_060_000_i64)
            .fetch_one(store.database().pool())
            .await
            .unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.len(), 1);
        let WatchlistState::Watched(info) = loaded.get(MOVIE).unwrap().state() else {
            panic!("expected the newer watched record to win");
        };
        assert_eq!(info.rating, Rating::new(4));

        // Saving the loaded watchlist converges the store.
        store.save(&loaded).await.unwrap();
        assert!(stored::<ToWatchRecord>(&store).await.is_empty());
        assert_eq!(stored::<WatchedRecord>(&store).await.len(), 1);
    }
}

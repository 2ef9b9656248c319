//! The in-memory watchlist.

use crate::identity::WatchlistId;
use crate::item::{Rating, StateUpdate, Suggestion, ToWatchInfo, WatchedInfo, WatchlistItem, WatchlistState};
use crate::reconcile::Storeable;
use crate::records::{ToWatchRecord, WatchedRecord, from_millis, to_millis};
use std::collections::BTreeMap;
use time::UtcDateTime;
use tokio::sync::broadcast;

/// Subscribers that fall this far behind start missing events.
const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchlistEvent {
    Added(WatchlistId),
    Updated(WatchlistId),
    Removed(WatchlistId),
}

/// Every item the user is tracking, keyed by identity.
///
/// Mutations are announced on a broadcast channel; see
/// [`subscribe`](Self::subscribe).
#[derive(Debug)]
pub struct Watchlist {
    items: BTreeMap<WatchlistId, WatchlistItem>,
    events: broadcast::Sender<WatchlistEvent>,
}
impl Default for Watchlist {
    fn default() -> Self {
        Self::from_items(std::iter::empty())
    }
}
impl Watchlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a watchlist without announcing anything. Later items replace
    /// earlier ones with the same identity.
    pub fn from_items(items: impl IntoIterator<Item = WatchlistItem>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            items: items.into_iter().map(|item| (item.id(), item)).collect(),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WatchlistEvent> {
        self.events.subscribe()
    }

    /// Add a new item. Returns `false`, leaving the watchlist untouched, if
    /// an item with the same identity is already present.
    pub fn add(&mut self, item: WatchlistItem) -> bool {
        let id = item.id();
        if self.items.contains_key(&id) {
            return false;
        }
        self.items.insert(id, item);
        self.announce(WatchlistEvent::Added(id));
        true
    }

    pub fn remove(&mut self, id: WatchlistId) -> Option<WatchlistItem> {
        let removed = self.items.remove(&id)?;
        self.announce(WatchlistEvent::Removed(id));
        Some(removed)
    }

    /// Apply a state update now. Returns whether anything changed.
    pub fn update(&mut self, id: WatchlistId, update: StateUpdate) -> bool {
        self.update_at(id, update, UtcDateTime::now())
    }

    pub fn update_at(&mut self, id: WatchlistId, update: StateUpdate, now: UtcDateTime) -> bool {
        let Some(item) = self.items.get_mut(&id) else {
            return false;
        };
        let changed = item.apply(update, now);
        if changed {
            self.announce(WatchlistEvent::Updated(id));
        }
        changed
    }

    pub fn get(&self, id: WatchlistId) -> Option<&WatchlistItem> {
        self.items.get(&id)
    }

    pub fn contains(&self, id: WatchlistId) -> bool {
        self.items.contains_key(&id)
    }

    /// Items in identity order.
    pub fn iter(&self) -> impl Iterator<Item = &WatchlistItem> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Snapshot the items, split by the record kind they are stored as.
    pub fn partition(&self) -> (Vec<ToWatchItem>, Vec<WatchedItem>) {
        let mut to_watch = Vec::new();
        let mut watched = Vec::new();
        for item in self.iter() {
            match item.state() {
                WatchlistState::ToWatch(info) => to_watch.push(ToWatchItem { id: item.id(), info: info.clone() }),
                WatchlistState::Watched(info) => watched.push(WatchedItem { id: item.id(), info: info.clone() }),
            }
        }
        (to_watch, watched)
    }

    fn announce(&self, event: WatchlistEvent) {
        // No subscribers is fine.
        _ = self.events.send(event);
    }
}

/// Snapshot of an item that is still to be watched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToWatchItem {
    pub id: WatchlistId,
    pub info: ToWatchInfo,
}
impl From<ToWatchItem> for WatchlistItem {
    fn from(item: ToWatchItem) -> Self {
        WatchlistItem::new(item.id, WatchlistState::ToWatch(item.info))
    }
}

/// Snapshot of an item that has been watched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedItem {
    pub id: WatchlistId,
    pub info: WatchedInfo,
}
impl From<WatchedItem> for WatchlistItem {
    fn from(item: WatchedItem) -> Self {
        WatchlistItem::new(item.id, WatchlistState::Watched(item.info))
    }
}

fn suggestion(owner: &Option<String>, comment: &Option<String>) -> Option<Suggestion> {
    owner.clone().map(|owner| Suggestion { owner, comment: comment.clone() })
}

impl Storeable for ToWatchItem {
    type Id = WatchlistId;
    type Record = ToWatchRecord;

    fn identifier(&self) -> WatchlistId {
        self.id
    }

    fn populate(&self, record: &mut ToWatchRecord) {
        record.added_on = to_millis(self.info.date);
        record.suggestion_owner = self.info.suggestion.as_ref().map(|s| s.owner.clone());
        record.suggestion_comment = self.info.suggestion.as_ref().and_then(|s| s.comment.clone());
    }

    fn hydrate(id: WatchlistId, record: &ToWatchRecord) -> Option<Self> {
        Some(Self {
            id,
            info: ToWatchInfo {
                date: from_millis(record.added_on)?,
                suggestion: suggestion(&record.suggestion_owner, &record.suggestion_comment),
            },
        })
    }
}

impl Storeable for WatchedItem {
    type Id = WatchlistId;
    type Record = WatchedRecord;

    fn identifier(&self) -> WatchlistId {
        self.id
    }

    fn populate(&self, record: &mut WatchedRecord) {
        let to_watch = &self.info.to_watch;
        record.added_on = to_millis(to_watch.date);
        record.suggestion_owner = to_watch.suggestion.as_ref().map(|s| s.owner.clone());
        record.suggestion_comment = to_watch.suggestion.as_ref().and_then(|s| s.comment.clone());
        record.rating = self.info.rating.map(|rating| i64::from(rating.get()));
        record.watched_on = to_millis(self.info.date);
    }

    fn hydrate(id: WatchlistId, record: &WatchedRecord) -> Option<Self> {
        Some(Self {
            id,
            info: WatchedInfo {
                to_watch: ToWatchInfo {
                    date: from_millis(record.added_on)?,
                    suggestion: suggestion(&record.suggestion_owner, &record.suggestion_comment),
                },
                // An out-of-range rating is dropped rather than losing the item.
                rating: record.rating.and_then(|rating| u8::try_from(rating).ok()).and_then(Rating::new),
                date: from_millis(record.watched_on)?,
            },
        })
    }
}

//! Watchlist items and their state transitions.

use crate::identity::WatchlistId;
use derive_more::Display;
use time::UtcDateTime;

/// A user rating between 1 and 10 inclusive.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rating(u8);
impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    /// `None` when the value is out of range.
    pub fn new(value: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&value).then_some(Self(value))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

/// Someone recommended this item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub owner: String,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToWatchInfo {
    /// When the item was added to the watchlist.
    pub date: UtcDateTime,
    pub suggestion: Option<Suggestion>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedInfo {
    /// How the item was on the list before it was watched.
    pub to_watch: ToWatchInfo,
    pub rating: Option<Rating>,
    /// When the item was first marked as watched.
    pub date: UtcDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchlistState {
    ToWatch(ToWatchInfo),
    Watched(WatchedInfo),
}

/// A requested change of state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateUpdate {
    /// Back onto the list; any rating is dropped.
    ToWatch,
    /// Mark as watched, or re-rate an item that already is.
    Watched { rating: Option<Rating> },
}

/// One entry of the watchlist.
///
/// The identity is fixed at construction; only the state changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchlistItem {
    id: WatchlistId,
    state: WatchlistState,
}
impl WatchlistItem {
    pub fn new(id: WatchlistId, state: WatchlistState) -> Self {
        Self { id, state }
    }

    /// A new to-watch item added at `date`.
    pub fn to_watch(id: WatchlistId, date: UtcDateTime, suggestion: Option<Suggestion>) -> Self {
        Self::new(id, WatchlistState::ToWatch(ToWatchInfo { date, suggestion }))
    }

    pub fn id(&self) -> WatchlistId {
        self.id
    }

    pub fn state(&self) -> &WatchlistState {
        &self.state
    }

    pub fn is_watched(&self) -> bool {
        matches!(self.state, WatchlistState::Watched(_))
    }

    /// Apply a state update at `now`. Returns whether anything changed.
    ///
    /// Watching keeps the original to-watch details. Re-rating a watched item
    /// keeps its watched date. Moving back to the list drops the rating.
    pub fn apply(&mut self, update: StateUpdate, now: UtcDateTime) -> bool {
        let next = match (&self.state, update) {
            (WatchlistState::ToWatch(_), StateUpdate::ToWatch) => return false,
            (WatchlistState::ToWatch(info), StateUpdate::Watched { rating }) => WatchlistState::Watched(WatchedInfo {
                to_watch: info.clone(),
                rating,
                date: now,
            }),
            (WatchlistState::Watched(info), StateUpdate::Watched { rating }) => {
                if info.rating == rating {
                    return false;
                }
                WatchlistState::Watched(WatchedInfo { rating, ..info.clone() })
            },
            (WatchlistState::Watched(info), StateUpdate::ToWatch) => WatchlistState::ToWatch(info.to_watch.clone()),
        };
        self.state = next;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::MovieId;
    use rstest::rstest;

    const MOVIE: WatchlistId = WatchlistId::Movie(MovieId(954));

    fn at(seconds: i64) -> UtcDateTime {
        UtcDateTime::from_unix_timestamp(1_700_000_000 + seconds).unwrap()
    }

    fn suggested() -> Option<Suggestion> {
        Some(Suggestion { owner: "Sam".to_string(), comment: Some("You'll love the train scene".to_string()) })
    }

    #[rstest]
    #[case(0, None)]
    #[case(1, Some(1))]
    #[case(10, Some(10))]
    #[case(11, None)]
    fn test_rating_range(#[case] value: u8, #[case] expected: Option<u8>) {
        assert_eq!(Rating::new(value).map(Rating::get), expected);
    }

    #[test]
    fn test_watching_preserves_to_watch_info() {
        let mut item = WatchlistItem::to_watch(MOVIE, at(0), suggested());
        assert!(item.apply(StateUpdate::Watched { rating: Rating::new(8) }, at(60)));
        let WatchlistState::Watched(info) = item.state() else { panic!("expected watched") };
        assert_eq!(info.to_watch, ToWatchInfo { date: at(0), suggestion: suggested() });
        assert_eq!(info.rating, Rating::new(8));
        assert_eq!(info.date, at(60));
        assert_eq!(item.id(), MOVIE);
    }

    #[test]
    fn test_rerating_keeps_watched_date() {
        let mut item = WatchlistItem::to_watch(MOVIE, at(0), None);
        item.apply(StateUpdate::Watched { rating: None }, at(60));
        assert!(item.apply(StateUpdate::Watched { rating: Rating::new(3) }, at(120)));
        let WatchlistState::Watched(info) = item.state() else { panic!("expected watched") };
        assert_eq!(info.date, at(60));
        assert_eq!(info.rating, Rating::new(3));
        assert!(!item.apply(StateUpdate::Watched { rating: Rating::new(3) }, at(180)));
    }

    #[test]
    fn test_unwatching_strips_rating() {
        let mut item = WatchlistItem::to_watch(MOVIE, at(0), suggested());
        item.apply(StateUpdate::Watched { rating: Rating::new(9) }, at(60));
        assert!(item.apply(StateUpdate::ToWatch, at(120)));
        assert_eq!(item.state(), &WatchlistState::ToWatch(ToWatchInfo { date: at(0), suggestion: suggested() }));
        assert!(!item.apply(StateUpdate::ToWatch, at(180)));
    }
}

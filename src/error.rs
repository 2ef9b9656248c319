//! Command Error Types

use derive_more::{Display, Error};
use marquee_watchlist::WatchlistId;

/// A command error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for commands.
pub type Result<T> = std::result::Result<T, Error>;

/// Which part of a command failed.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    #[display("could not open the resource cache")]
    Storage,
    #[display("could not fetch resource")]
    Fetch,
    #[display("resource cache maintenance failed")]
    Cache,
    #[display("watchlist store failed")]
    Watchlist,
    #[display("{_0} is not on the watchlist")]
    NotOnWatchlist(#[error(not(source))] WatchlistId),
}

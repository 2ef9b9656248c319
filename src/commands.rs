//! Subcommands.

use crate::error::{ErrorKind, Result};
use clap::Subcommand;
use exn::{OptionExt, ResultExt};
use marquee_config::Config;
use marquee_loader::{Blob, HttpTransport, Json, PersistentCache, Request, ResourceLoader, TransportHandle};
use marquee_storage::backend::LocalBackend;
use marquee_watchlist::{
    MovieId, Rating, StateUpdate, Suggestion, WatchlistId, WatchlistItem, WatchlistState, WatchlistStore,
};
use std::path::Path;
use std::sync::Arc;
use time::UtcDateTime;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch a resource through the caching loader.
    Fetch {
        url: String,
        /// Treat the resource as an image (binary, longer lifetime).
        #[arg(long)]
        image: bool,
    },
    /// Maintain the on-disk resource cache.
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
    /// Inspect or change the watchlist.
    Watchlist {
        #[command(subcommand)]
        command: WatchlistCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// Delete expired and unreadable entries.
    Evict,
    /// Delete every entry.
    Clear,
}

#[derive(Debug, Subcommand)]
pub enum WatchlistCommand {
    List,
    /// Add a movie to watch.
    Add {
        movie: u64,
        #[arg(long, value_name = "NAME")]
        suggested_by: Option<String>,
        #[arg(long, requires = "suggested_by")]
        comment: Option<String>,
    },
    /// Mark a movie as watched, or change its rating.
    Watched {
        movie: u64,
        #[arg(long, value_parser = parse_rating)]
        rating: Option<Rating>,
    },
    /// Put a watched movie back on the list.
    Unwatch { movie: u64 },
    Remove { movie: u64 },
}

fn parse_rating(value: &str) -> std::result::Result<Rating, String> {
    let number: u8 = value.parse().map_err(|_| format!("`{value}` is not a whole number"))?;
    Rating::new(number).ok_or_else(|| format!("rating must be between {} and {}", Rating::MIN, Rating::MAX))
}

pub async fn run(config: Option<&Path>, command: Command) -> Result<()> {
    let config = Config::load(config).or_raise(|| ErrorKind::Config)?;
    match command {
        Command::Fetch { url, image } => fetch(&config, &url, image).await,
        Command::Cache { command } => cache(&config, command).await,
        Command::Watchlist { command } => watchlist(&config, command).await,
    }
}

fn persistent_cache(config: &Config) -> Result<PersistentCache> {
    let directory = config.cache.directory().or_raise(|| ErrorKind::Config)?;
    let backend = LocalBackend::new("resources", &directory).or_raise(|| ErrorKind::Storage)?;
    Ok(PersistentCache::new(Arc::new(backend)))
}

async fn fetch(config: &Config, url: &str, image: bool) -> Result<()> {
    let request = Request::get(url).or_raise(|| ErrorKind::Fetch)?;
    let transport: TransportHandle = Arc::new(HttpTransport::new(&config.transport).or_raise(|| ErrorKind::Fetch)?);
    let cache = persistent_cache(config)?;
    if image {
        let loader = ResourceLoader::<Blob>::new("images", transport, cache, config.cache.image_ttl());
        let image = loader.fetch(&request).await.or_raise(|| ErrorKind::Fetch)?;
        println!("{}: {} bytes", request.url(), image.as_bytes().len());
    } else {
        let loader =
            ResourceLoader::<Json<serde_json::Value>>::new("responses", transport, cache, config.cache.response_ttl());
        let Json(document) = loader.fetch(&request).await.or_raise(|| ErrorKind::Fetch)?;
        println!("{}", serde_json::to_string_pretty(&document).or_raise(|| ErrorKind::Fetch)?);
    }
    Ok(())
}

async fn cache(config: &Config, command: CacheCommand) -> Result<()> {
    let cache = persistent_cache(config)?;
    let removed = match command {
        CacheCommand::Evict => cache.evict_expired().await,
        CacheCommand::Clear => cache.clear().await,
    }
    .or_raise(|| ErrorKind::Cache)?;
    println!("Removed {removed} cache entries");
    Ok(())
}

async fn watchlist(config: &Config, command: WatchlistCommand) -> Result<()> {
    let path = config.store.database().or_raise(|| ErrorKind::Config)?;
    let store = WatchlistStore::open(&path).await.or_raise(|| ErrorKind::Watchlist)?;
    let result = apply(&store, command).await;
    store.close().await;
    result
}

async fn apply(store: &WatchlistStore, command: WatchlistCommand) -> Result<()> {
    let mut watchlist = store.load().await.or_raise(|| ErrorKind::Watchlist)?;
    match command {
        WatchlistCommand::List => {
            for item in watchlist.iter() {
                println!("{}", describe(item));
            }
            return Ok(());
        },
        WatchlistCommand::Add { movie, suggested_by, comment } => {
            let id = movie_id(movie);
            let suggestion = suggested_by.map(|owner| Suggestion { owner, comment });
            if !watchlist.add(WatchlistItem::to_watch(id, UtcDateTime::now(), suggestion)) {
                println!("{id} is already on the watchlist");
                return Ok(());
            }
        },
        WatchlistCommand::Watched { movie, rating } => {
            update(&mut watchlist, movie_id(movie), StateUpdate::Watched { rating })?;
        },
        WatchlistCommand::Unwatch { movie } => {
            update(&mut watchlist, movie_id(movie), StateUpdate::ToWatch)?;
        },
        WatchlistCommand::Remove { movie } => {
            let id = movie_id(movie);
            watchlist.remove(id).ok_or_raise(|| ErrorKind::NotOnWatchlist(id))?;
        },
    }
    let summary = store.save(&watchlist).await.or_raise(|| ErrorKind::Watchlist)?;
    tracing::info!(?summary, "Saved watchlist");
    Ok(())
}

fn movie_id(movie: u64) -> WatchlistId {
    WatchlistId::Movie(MovieId(movie))
}

fn update(watchlist: &mut marquee_watchlist::Watchlist, id: WatchlistId, update: StateUpdate) -> Result<()> {
    if !watchlist.contains(id) {
        exn::bail!(ErrorKind::NotOnWatchlist(id));
    }
    watchlist.update(id, update);
    Ok(())
}

fn describe(item: &WatchlistItem) -> String {
    match item.state() {
        WatchlistState::ToWatch(info) => {
            let mut line = format!("{}: to watch, added {}", item.id(), info.date.date());
            if let Some(suggestion) = &info.suggestion {
                line.push_str(&format!(", suggested by {}", suggestion.owner));
                if let Some(comment) = &suggestion.comment {
                    line.push_str(&format!(" ({comment})"));
                }
            }
            line
        },
        WatchlistState::Watched(info) => match info.rating {
            Some(rating) => format!("{}: watched {}, rated {rating}/{}", item.id(), info.date.date(), Rating::MAX),
            None => format!("{}: watched {}", item.id(), info.date.date()),
        },
    }
}

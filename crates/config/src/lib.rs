//! Layered configuration for marquee.
//!
//! Values are merged in order, later sources winning:
//! 1. Built-in defaults (see [`Config::default`]).
//! 2. An optional configuration file; the format is picked from the file
//!    extension (`.toml`, `.yaml`/`.yml` or `.json`).
//! 3. Environment variables prefixed with `MARQUEE_`, nested keys separated
//!    by a double underscore (e.g. `MARQUEE_CACHE__IMAGE_TTL_SECS=3600`).
//!
//! Nothing here is a process-wide singleton: the loaded [`Config`] is passed
//! explicitly to whatever needs it.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::{OptionExt, ResultExt};
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "MARQUEE_";
const DATABASE_FILENAME: &str = "watchlist.sqlite";
const RESOURCES_DIRECTORY: &str = "resources";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub transport: TransportConfig,
    pub store: StoreConfig,
}

/// Persistent resource cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding one file per cached request. Defaults to a
    /// `resources` directory inside the platform cache directory.
    pub directory: Option<PathBuf>,
    /// Lifetime of cached image content.
    pub image_ttl_secs: u64,
    /// Lifetime of any other cached network response.
    pub response_ttl_secs: u64,
}
impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: None,
            image_ttl_secs: 24 * 60 * 60,
            response_ttl_secs: 12 * 60 * 60,
        }
    }
}
impl CacheConfig {
    pub fn image_ttl(&self) -> Duration {
        Duration::from_secs(self.image_ttl_secs)
    }

    pub fn response_ttl(&self) -> Duration {
        Duration::from_secs(self.response_ttl_secs)
    }

    /// The configured cache directory, or the platform default.
    pub fn directory(&self) -> Result<PathBuf> {
        match &self.directory {
            Some(directory) => Ok(directory.clone()),
            None => Ok(project_dirs()?.cache_dir().join(RESOURCES_DIRECTORY)),
        }
    }
}

/// Network transport settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Maximum time allowed to establish a connection.
    pub connect_timeout_secs: u64,
    /// Maximum time allowed for the whole request, including the body.
    pub timeout_secs: u64,
    pub user_agent: String,
}
impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            timeout_secs: 20,
            user_agent: concat!("marquee/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}
impl TransportConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Durable watchlist store settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file. Defaults to `watchlist.sqlite` inside the
    /// platform data directory.
    pub database: Option<PathBuf>,
}
impl StoreConfig {
    /// The configured database path, or the platform default.
    pub fn database(&self) -> Result<PathBuf> {
        match &self.database {
            Some(database) => Ok(database.clone()),
            None => Ok(project_dirs()?.data_dir().join(DATABASE_FILENAME)),
        }
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("dev", "marquee", "marquee").ok_or_raise(|| ErrorKind::Directories)
}

impl Config {
    /// Load configuration from defaults, an optional file, and the environment.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(file) = file {
            tracing::debug!(path = %file.display(), "Merging configuration file");
            figment = match file.extension().and_then(|ext| ext.to_str()) {
                Some("yaml" | "yml") => figment.merge(Yaml::file_exact(file)),
                Some("json") => figment.merge(Json::file_exact(file)),
                _ => figment.merge(Toml::file_exact(file)),
            };
        }
        let config: Config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the loader or transport unusable.
    pub fn validate(&self) -> Result<()> {
        if self.cache.image_ttl_secs == 0 {
            exn::bail!(ErrorKind::Invalid("cache.image_ttl_secs"));
        }
        if self.cache.response_ttl_secs == 0 {
            exn::bail!(ErrorKind::Invalid("cache.response_ttl_secs"));
        }
        if self.transport.connect_timeout_secs == 0 {
            exn::bail!(ErrorKind::Invalid("transport.connect_timeout_secs"));
        }
        if self.transport.timeout_secs == 0 {
            exn::bail!(ErrorKind::Invalid("transport.timeout_secs"));
        }
        Ok(())
    }
}

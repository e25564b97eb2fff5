//! Runtime settings.
//!
//! Loaded from an optional TOML file, then overridden by `SHOPKEEP__`
//! environment variables (`__` separates nested keys, e.g.
//! `SHOPKEEP__RETRY__MAX_ATTEMPTS=5`).

use crate::error::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Persistent store location. In-memory storage is used when unset.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    /// CSV file of products to seed the catalog with.
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,
    /// Youngest age allowed to register.
    #[serde(default = "default_minimum_age")]
    pub minimum_age: u32,
    /// How long a transaction waits for the store before giving up.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub log: LogSettings,
}

/// Backoff applied when a transaction hits a storage conflict.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    /// Total attempts, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: None,
            catalog_path: None,
            minimum_age: default_minimum_age(),
            lock_timeout_ms: default_lock_timeout_ms(),
            retry: RetrySettings::default(),
            log: LogSettings::default(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

fn default_minimum_age() -> u32 {
    20
}

fn default_lock_timeout_ms() -> u64 {
    2_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    10
}

fn default_max_backoff_ms() -> u64 {
    250
}

fn default_log_filter() -> String {
    "warn".to_string()
}

impl Settings {
    /// Loads settings from `path` (or `shopkeep.toml` when present) and the
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let builder = config::Config::builder();

        let builder = match path {
            Some(path) => builder.add_source(config::File::from(path)),
            None => builder.add_source(config::File::with_name("shopkeep").required(false)),
        };

        let builder = builder.add_source(
            config::Environment::with_prefix("SHOPKEEP")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl RetrySettings {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

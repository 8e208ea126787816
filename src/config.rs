// SPDX-License-Identifier: GPL-3.0-only
//! Configuration and persisted state
//!
//! Both files live under `$XDG_CONFIG_HOME/studio-brightness/`. A missing
//! file yields defaults; a malformed one is reported once and replaced by
//! defaults so the display stays controllable.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::brightness::DEFAULT_LEVELS;

pub const APP_DIR: &str = "studio-brightness";
pub const CONFIG_FILE: &str = "config.toml";
pub const STATE_FILE: &str = "state.toml";

/// Default `tracing` filter directive
pub const DEFAULT_LOG_FILTER: &str = "warn,studio_brightness=info";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Bounded retry schedule for device acquisition
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub interval_ms: u64,
}

impl RetryPolicy {
    /// Ten attempts two seconds apart, used while the process starts
    pub const fn startup() -> Self {
        Self {
            attempts: 10,
            interval_ms: 2000,
        }
    }

    /// One attempt per second for three minutes, used after the device is lost
    pub const fn reconnect() -> Self {
        Self {
            attempts: 180,
            interval_ms: 1000,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct Config {
    pub startup: RetryPolicy,
    pub reconnect: RetryPolicy,
    /// Keep waiting for the display with the reconnect policy when startup
    /// finds nothing
    pub wait_for_device: bool,
    /// Raw brightness value of every level, ascending
    pub levels: Vec<u32>,
    /// `tracing` filter used when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            startup: RetryPolicy::startup(),
            reconnect: RetryPolicy::reconnect(),
            wait_for_device: false,
            levels: DEFAULT_LEVELS.to_vec(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Config {
    pub fn default_path() -> PathBuf {
        config_dir().join(CONFIG_FILE)
    }

    /// Load config from a file, or return defaults if it does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config: Config = load_toml(path)?.unwrap_or_default();
        if !crate::brightness::is_valid_ladder(&config.levels) {
            tracing::warn!(
                "Ignoring invalid brightness levels in {} (must be non-empty and ascending)",
                path.display()
            );
            config.levels = DEFAULT_LEVELS.to_vec();
        }
        Ok(config)
    }

    /// Load config, logging any error and falling back to defaults
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::error!("errors loading config: {}", e);
            Self::default()
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        save_toml(self, path)
    }
}

/// State remembered between runs
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default)]
pub struct State {
    /// Index into the level ladder last chosen by the user
    pub last_level: Option<usize>,
}

impl State {
    pub fn default_path() -> PathBuf {
        config_dir().join(STATE_FILE)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Ok(load_toml(path)?.unwrap_or_default())
    }

    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("errors loading state: {}", e);
            Self::default()
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        save_toml(self, path)
    }
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn load_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    toml::from_str(&content)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

fn save_toml<T: Serialize>(value: &T, path: &Path) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    let content = toml::to_string_pretty(value)?;
    std::fs::write(path, content).map_err(write_err)
}

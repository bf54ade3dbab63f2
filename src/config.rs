use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::db::StoreLocation;

const DEFAULT_PLAN_CACHE_CAPACITY: usize = 100;
const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 30_000;

/// Service tuning knobs, loadable from a TOML file. Every field has a
/// default so an empty file (or no file at all) yields a working config
/// backed by an in-memory store.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ServiceConfig {
    #[serde(default)]
    pub store_path: Option<PathBuf>,
    #[serde(default = "default_plan_cache_capacity")]
    pub plan_cache_capacity: usize,
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
}

fn default_plan_cache_capacity() -> usize {
    DEFAULT_PLAN_CACHE_CAPACITY
}

fn default_operation_timeout_ms() -> u64 {
    DEFAULT_OPERATION_TIMEOUT_MS
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            plan_cache_capacity: DEFAULT_PLAN_CACHE_CAPACITY,
            operation_timeout_ms: DEFAULT_OPERATION_TIMEOUT_MS,
        }
    }
}

impl ServiceConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn store_location(&self) -> StoreLocation {
        match &self.store_path {
            Some(path) => StoreLocation::OnDisk(path.clone()),
            None => StoreLocation::InMemory,
        }
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Toml(toml::de::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "could not read config file: {}", err),
            ConfigError::Toml(err) => write!(f, "invalid config TOML: {}", err),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Io(err) => Some(err),
            ConfigError::Toml(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        ConfigError::Io(value)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        ConfigError::Toml(value)
    }
}

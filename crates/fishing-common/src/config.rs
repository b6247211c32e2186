//! Worker configuration.
//!
//! The cache name and the precache list are constants of the deployed worker;
//! loading them from JSON exists so tests and alternative deployments can
//! point the same worker at a different cache.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of the cache store the worker populates on install.
pub const DEFAULT_CACHE_NAME: &str = "fishing-cache-v1";

/// Assets fetched and stored on install, in order.
pub const DEFAULT_PRECACHE_URLS: [&str; 2] = ["/", "/static/manifest.json"];

/// Errors raised while loading a [`WorkerConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Configuration of the offline cache worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Cache store name.
    pub cache_name: String,
    /// URLs added to the cache on install, relative to the worker scope.
    pub precache_urls: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            cache_name: DEFAULT_CACHE_NAME.to_string(),
            precache_urls: DEFAULT_PRECACHE_URLS.iter().map(|u| u.to_string()).collect(),
        }
    }
}

impl WorkerConfig {
    /// Build a config from a cache name and a URL list.
    pub fn new<I, S>(cache_name: impl Into<String>, precache_urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cache_name: cache_name.into(),
            precache_urls: precache_urls.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON document from disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Reject configurations the worker cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_name.trim().is_empty() {
            return Err(ConfigError::Invalid("cache_name must not be empty".to_string()));
        }
        if let Some(url) = self.precache_urls.iter().find(|u| u.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "precache url {url:?} is empty"
            )));
        }
        Ok(())
    }
}

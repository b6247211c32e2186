//! # Fishing Common
//!
//! Pieces shared by the fishing offline cache worker crates.
//!
//! - Logging setup on top of `tracing-subscriber`
//! - Worker configuration (cache name and precache list)

pub mod config;
pub mod logging;

pub use config::{ConfigError, WorkerConfig, DEFAULT_CACHE_NAME, DEFAULT_PRECACHE_URLS};
pub use logging::{init_logging, LogConfig, LogFormat};

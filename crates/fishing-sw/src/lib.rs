//! # Fishing Service Worker
//!
//! Offline cache worker for the fishing log front-end.
//!
//! ## Features
//!
//! - **Install**: opens `fishing-cache-v1` and precaches `/` and
//!   `/static/manifest.json`, all or nothing
//! - **Fetch**: cache first, network on miss, responses passed through as-is
//! - **Cache API**: `caches.open()`, `cache.addAll()`, `cache.match()`
//! - **Host shim**: lifecycle dispatch and fetch routing in place of a browser
//!
//! ## Architecture
//!
//! ```text
//! ServiceWorkerHost
//!     ├── ServiceWorkerRegistration
//!     │       ├── installing (ServiceWorker)
//!     │       ├── waiting (ServiceWorker)
//!     │       └── active (ServiceWorker)
//!     └── WorkerScript (OfflineCacheWorker)
//!             └── WorkerGlobalScope
//!                     ├── CacheStorage (caches)
//!                     │       └── Cache: Request → Response
//!                     └── Fetcher (fetch)
//! ```

use fishing_net::NetError;
use http::StatusCode;
use thiserror::Error;
use url::Url;

pub mod cache;
pub mod host;
pub mod lifecycle;
pub mod worker;

pub use cache::{Cache, CacheEntry, CacheStorage, MemoryCacheStorage};
pub use host::{ServiceWorkerEvent, ServiceWorkerHost};
pub use lifecycle::{ServiceWorker, ServiceWorkerId, ServiceWorkerRegistration, ServiceWorkerState};
pub use worker::{FetchEvent, OfflineCacheWorker, WorkerGlobalScope, WorkerScript};

/// Errors that can occur in service worker operations.
#[derive(Error, Debug)]
pub enum ServiceWorkerError {
    #[error("Network error: {0}")]
    Network(#[from] NetError),

    #[error("Bad response status {status} for {url}")]
    BadStatus { url: Url, status: StatusCode },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Install failed: {0}")]
    Install(#[source] Box<ServiceWorkerError>),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

//! Worker scripts and the global scope they run against.

use std::sync::Arc;

use async_trait::async_trait;
use fishing_common::WorkerConfig;
use fishing_net::{Fetcher, Request, Response};
use tracing::debug;
use url::Url;

use crate::cache::CacheStorage;
use crate::ServiceWorkerError;

/// What a running worker can reach: its scope, `caches` and `fetch`.
#[derive(Clone)]
pub struct WorkerGlobalScope {
    scope: Url,
    caches: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
}

impl WorkerGlobalScope {
    pub fn new(scope: Url, caches: Arc<dyn CacheStorage>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            scope,
            caches,
            fetcher,
        }
    }

    /// Scope URL; relative asset URLs resolve against it.
    pub fn scope(&self) -> &Url {
        &self.scope
    }

    /// Cache storage.
    pub fn caches(&self) -> &dyn CacheStorage {
        self.caches.as_ref()
    }

    /// Network fetcher.
    pub fn fetcher(&self) -> &dyn Fetcher {
        self.fetcher.as_ref()
    }

    /// Perform a network fetch.
    pub async fn fetch(&self, request: Request) -> Result<Response, ServiceWorkerError> {
        Ok(self.fetcher.fetch(request).await?)
    }
}

/// A fetch event.
#[derive(Debug, Clone)]
pub struct FetchEvent {
    /// The intercepted request.
    pub request: Request,

    /// Client ID.
    pub client_id: Option<String>,

    /// Is navigation request.
    pub is_navigation: bool,
}

impl FetchEvent {
    /// A subresource fetch.
    pub fn new(request: Request) -> Self {
        Self {
            request,
            client_id: None,
            is_navigation: false,
        }
    }

    /// A top-level navigation.
    pub fn navigation(request: Request) -> Self {
        Self {
            is_navigation: true,
            ..Self::new(request)
        }
    }

    /// Set the originating client.
    pub fn with_client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }
}

/// Event handlers of a worker script.
///
/// The host calls `on_install` once per installation and holds the worker
/// in `Installing` until it resolves; `on_fetch` is called for every request
/// inside the scope once the worker is active, possibly concurrently.
#[async_trait]
pub trait WorkerScript: Send + Sync {
    async fn on_install(&self, global: &WorkerGlobalScope) -> Result<(), ServiceWorkerError>;

    async fn on_fetch(
        &self,
        global: &WorkerGlobalScope,
        event: FetchEvent,
    ) -> Result<Response, ServiceWorkerError>;
}

/// Cache-first worker: precaches a fixed asset list on install and answers
/// fetches from the cache, falling back to the network.
///
/// The fetch path never writes to the cache.
#[derive(Debug, Clone, Default)]
pub struct OfflineCacheWorker {
    config: WorkerConfig,
}

impl OfflineCacheWorker {
    pub fn new(config: WorkerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }
}

#[async_trait]
impl WorkerScript for OfflineCacheWorker {
    async fn on_install(&self, global: &WorkerGlobalScope) -> Result<(), ServiceWorkerError> {
        let cache = global.caches().open(&self.config.cache_name).await?;
        cache
            .add_all(global.fetcher(), global.scope(), self.config.precache_urls.as_slice())
            .await
    }

    async fn on_fetch(
        &self,
        global: &WorkerGlobalScope,
        event: FetchEvent,
    ) -> Result<Response, ServiceWorkerError> {
        if let Some(response) = global.caches().match_request(&event.request).await {
            debug!(url = %event.request.url, navigation = event.is_navigation, "Cache hit");
            return Ok(response);
        }

        debug!(url = %event.request.url, navigation = event.is_navigation, "Cache miss, fetching");
        global.fetch(event.request).await
    }
}

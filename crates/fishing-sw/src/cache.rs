//! Cache API: named stores of request/response pairs.
//!
//! ```text
//! CacheStorage (caches)
//!     └── Cache (by name, in creation order)
//!             └── Request → Response
//! ```
//!
//! A request matches a stored entry when it is a `GET`, its URL equals the
//! stored URL with fragments ignored, and it carries the same values for every
//! header the stored response lists in `Vary`.

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use fishing_net::{Fetcher, Request, Response};
use futures::future::try_join_all;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};
use url::Url;

use crate::ServiceWorkerError;

// ==================== Entries ====================

fn without_fragment(url: &Url) -> Url {
    let mut url = url.clone();
    url.set_fragment(None);
    url
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Request header values a response varies on.
type VaryHeaders = Vec<(HeaderName, Option<HeaderValue>)>;

/// Record the request's values for each header named in the response's `Vary`.
fn capture_vary(request: &Request, response: &Response) -> Result<VaryHeaders, ServiceWorkerError> {
    let mut captured = VaryHeaders::new();
    for value in response.headers.get_all(http::header::VARY) {
        let Ok(value) = value.to_str() else {
            return Err(ServiceWorkerError::InvalidRequest(format!(
                "response for {} has a non-text Vary header",
                request.url
            )));
        };
        for name in value.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            if name == "*" {
                return Err(ServiceWorkerError::InvalidRequest(format!(
                    "response for {} varies on *",
                    request.url
                )));
            }
            if let Ok(name) = HeaderName::from_bytes(name.as_bytes()) {
                let value = request.headers.get(&name).cloned();
                captured.push((name, value));
            }
        }
    }
    Ok(captured)
}

#[derive(Debug, Clone)]
struct StoredEntry {
    url: Url,
    vary: VaryHeaders,
    response: Response,
    cached_at: u64,
}

impl StoredEntry {
    fn new(request: &Request, response: Response) -> Result<Self, ServiceWorkerError> {
        if request.method != Method::GET {
            return Err(ServiceWorkerError::InvalidRequest(format!(
                "only GET requests can be cached, got {} {}",
                request.method, request.url
            )));
        }
        Ok(Self {
            url: without_fragment(&request.url),
            vary: capture_vary(request, &response)?,
            response,
            cached_at: now_millis(),
        })
    }

    fn matches_headers(&self, request: &Request) -> bool {
        self.vary
            .iter()
            .all(|(name, value)| request.headers.get(name) == value.as_ref())
    }

    fn matches(&self, request: &Request) -> bool {
        request.method == Method::GET
            && without_fragment(&request.url) == self.url
            && self.matches_headers(request)
    }
}

/// Serialized form of a cached request/response pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request URL (fragment stripped).
    pub url: Url,

    /// Request headers the response varies on, with the request's raw values.
    pub vary: Vec<(String, Option<Vec<u8>>)>,

    /// Final response URL.
    pub response_url: Url,

    /// Response status.
    pub status: u16,

    /// Response headers, values as raw bytes.
    pub headers: Vec<(String, Vec<u8>)>,

    /// Response body.
    pub body: Vec<u8>,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

fn header_bytes(value: &HeaderValue) -> Vec<u8> {
    value.as_bytes().to_vec()
}

fn parse_header(name: &str, value: &[u8]) -> Result<(HeaderName, HeaderValue), ServiceWorkerError> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| ServiceWorkerError::Persistence(format!("header name {name:?}: {e}")))?;
    let value = HeaderValue::from_bytes(value)
        .map_err(|e| ServiceWorkerError::Persistence(format!("header {name}: {e}")))?;
    Ok((name, value))
}

impl CacheEntry {
    fn from_stored(entry: &StoredEntry) -> Self {
        Self {
            url: entry.url.clone(),
            vary: entry
                .vary
                .iter()
                .map(|(name, value)| (name.to_string(), value.as_ref().map(header_bytes)))
                .collect(),
            response_url: entry.response.url.clone(),
            status: entry.response.status.as_u16(),
            headers: entry
                .response
                .headers
                .iter()
                .map(|(name, value)| (name.to_string(), header_bytes(value)))
                .collect(),
            body: entry.response.body.to_vec(),
            cached_at: entry.cached_at,
        }
    }

    fn into_stored(self) -> Result<StoredEntry, ServiceWorkerError> {
        let status = StatusCode::from_u16(self.status)
            .map_err(|e| ServiceWorkerError::Persistence(format!("status {}: {e}", self.status)))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let (name, value) = parse_header(name, value)?;
            headers.append(name, value);
        }

        let mut vary = VaryHeaders::new();
        for (name, value) in &self.vary {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ServiceWorkerError::Persistence(format!("vary {name:?}: {e}")))?;
            let value = match value {
                Some(v) => Some(parse_header(name.as_str(), v)?.1),
                None => None,
            };
            vary.push((name, value));
        }

        Ok(StoredEntry {
            url: self.url,
            vary,
            response: Response::new(self.response_url, status, headers, Bytes::from(self.body)),
            cached_at: self.cached_at,
        })
    }
}

// ==================== Cache ====================

/// A named cache. Clones share the same entries.
#[derive(Debug, Clone)]
pub struct Cache {
    name: Arc<str>,
    entries: Arc<RwLock<Vec<StoredEntry>>>,
}

/// Insert `entry`, replacing whatever `request` would have matched before.
fn insert(entries: &mut Vec<StoredEntry>, request: &Request, entry: StoredEntry) {
    entries.retain(|existing| !(existing.url == entry.url && existing.matches_headers(request)));
    entries.push(entry);
}

async fn fetch_entry(fetcher: &dyn Fetcher, request: &Request) -> Result<StoredEntry, ServiceWorkerError> {
    let response = fetcher.fetch(request.clone()).await?;
    if !response.ok() {
        return Err(ServiceWorkerError::BadStatus {
            url: request.url.clone(),
            status: response.status,
        });
    }
    StoredEntry::new(request, response)
}

impl Cache {
    /// Create an empty cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Cache name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Find the first response stored for `request`.
    pub async fn match_request(&self, request: &Request) -> Option<Response> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .find(|entry| entry.matches(request))
            .map(|entry| entry.response.clone())
    }

    /// Store `response` for `request`, replacing any previous match.
    pub async fn put(&self, request: &Request, response: Response) -> Result<(), ServiceWorkerError> {
        let entry = StoredEntry::new(request, response)?;
        insert(&mut *self.entries.write().await, request, entry);
        Ok(())
    }

    /// Fetch a single URL and store it.
    pub async fn add(&self, fetcher: &dyn Fetcher, base: &Url, url: &str) -> Result<(), ServiceWorkerError> {
        self.add_all(fetcher, base, &[url]).await
    }

    /// Fetch every URL (resolved against `base`) and store all responses.
    ///
    /// All-or-nothing: a transport error or non-2xx status for any URL fails
    /// the call and leaves the cache untouched.
    pub async fn add_all<S: AsRef<str>>(
        &self,
        fetcher: &dyn Fetcher,
        base: &Url,
        urls: &[S],
    ) -> Result<(), ServiceWorkerError> {
        let mut requests: Vec<Request> = Vec::with_capacity(urls.len());
        for raw in urls {
            let raw = raw.as_ref();
            let url = base
                .join(raw)
                .map_err(|e| ServiceWorkerError::InvalidUrl(format!("{raw}: {e}")))?;
            if requests
                .iter()
                .any(|r| without_fragment(&r.url) == without_fragment(&url))
            {
                return Err(ServiceWorkerError::StateError(format!(
                    "duplicate request for {url}"
                )));
            }
            requests.push(Request::get(url));
        }

        debug!(cache = %self.name, count = requests.len(), "Fetching assets");
        let fetched = try_join_all(requests.iter().map(|request| fetch_entry(fetcher, request))).await?;

        let mut entries = self.entries.write().await;
        for (request, entry) in requests.iter().zip(fetched) {
            insert(&mut entries, request, entry);
        }

        info!(cache = %self.name, count = requests.len(), "Assets cached");
        Ok(())
    }

    /// Remove the entries `request` matches.
    pub async fn delete(&self, request: &Request) -> bool {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|entry| !entry.matches(request));
        entries.len() != before
    }

    /// Request URLs of all entries, in insertion order.
    pub async fn keys(&self) -> Vec<Url> {
        self.entries.read().await.iter().map(|e| e.url.clone()).collect()
    }

    /// Number of entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn snapshot(&self) -> CacheSnapshot {
        let entries = self.entries.read().await;
        CacheSnapshot {
            name: self.name.to_string(),
            entries: entries.iter().map(CacheEntry::from_stored).collect(),
        }
    }

    fn restore(snapshot: CacheSnapshot) -> Result<Self, ServiceWorkerError> {
        let entries = snapshot
            .entries
            .into_iter()
            .map(CacheEntry::into_stored)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: Arc::from(snapshot.name.as_str()),
            entries: Arc::new(RwLock::new(entries)),
        })
    }
}

// ==================== Cache Storage ====================

/// The `caches` capability handed to a worker.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open a cache, creating it if it does not exist.
    async fn open(&self, name: &str) -> Result<Cache, ServiceWorkerError>;

    /// Check if a cache exists.
    async fn has(&self, name: &str) -> bool;

    /// Delete a cache.
    async fn delete(&self, name: &str) -> bool;

    /// Cache names in creation order.
    async fn keys(&self) -> Vec<String>;

    /// Match across all caches, in creation order.
    async fn match_request(&self, request: &Request) -> Option<Response>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StorageSnapshot {
    caches: Vec<CacheSnapshot>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheSnapshot {
    name: String,
    entries: Vec<CacheEntry>,
}

/// In-process [`CacheStorage`], optionally persisted as JSON.
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    caches: RwLock<Vec<Cache>>,
}

impl MemoryCacheStorage {
    /// Create empty cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write every cache to `path`.
    pub async fn save_to(&self, path: impl AsRef<Path>) -> Result<(), ServiceWorkerError> {
        let caches = self.caches.read().await.clone();
        let mut snapshot = StorageSnapshot::default();
        for cache in &caches {
            snapshot.caches.push(cache.snapshot().await);
        }

        let json = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| ServiceWorkerError::Persistence(e.to_string()))?;
        tokio::fs::write(path.as_ref(), json)
            .await
            .map_err(|e| ServiceWorkerError::Persistence(format!("{}: {e}", path.as_ref().display())))?;

        debug!(path = %path.as_ref().display(), caches = caches.len(), "Cache storage saved");
        Ok(())
    }

    /// Restore storage written by [`save_to`](Self::save_to). A missing file
    /// yields empty storage.
    pub async fn load_from(path: impl AsRef<Path>) -> Result<Self, ServiceWorkerError> {
        let path = path.as_ref();
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => {
                return Err(ServiceWorkerError::Persistence(format!("{}: {e}", path.display())))
            }
        };

        let snapshot: StorageSnapshot = serde_json::from_slice(&raw)
            .map_err(|e| ServiceWorkerError::Persistence(format!("{}: {e}", path.display())))?;
        let caches = snapshot
            .caches
            .into_iter()
            .map(Cache::restore)
            .collect::<Result<Vec<_>, _>>()?;

        debug!(path = %path.display(), caches = caches.len(), "Cache storage loaded");
        Ok(Self {
            caches: RwLock::new(caches),
        })
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<Cache, ServiceWorkerError> {
        let mut caches = self.caches.write().await;
        if let Some(cache) = caches.iter().find(|c| c.name() == name) {
            return Ok(cache.clone());
        }
        let cache = Cache::new(name);
        caches.push(cache.clone());
        debug!(cache = name, "Cache created");
        Ok(cache)
    }

    async fn has(&self, name: &str) -> bool {
        self.caches.read().await.iter().any(|c| c.name() == name)
    }

    async fn delete(&self, name: &str) -> bool {
        let mut caches = self.caches.write().await;
        let before = caches.len();
        caches.retain(|c| c.name() != name);
        caches.len() != before
    }

    async fn keys(&self) -> Vec<String> {
        self.caches
            .read()
            .await
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    async fn match_request(&self, request: &Request) -> Option<Response> {
        let caches = self.caches.read().await.clone();
        for cache in &caches {
            if let Some(response) = cache.match_request(request).await {
                return Some(response);
            }
        }
        None
    }
}

//! Cache storage: named partitions of request → response entries.
//!
//! Every operation takes the storage lock once, so a single get or put is
//! atomic. Nothing spans two operations; concurrent writers to the same key
//! resolve last-writer-wins.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use hashbrown::HashMap;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use louder_net::{Request, Response, ResponseSource};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, trace};
use url::Url;

/// A cached request/response pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request URL.
    pub url: String,

    /// Request method.
    pub method: String,

    /// Response status.
    pub status: u16,

    /// Response headers in wire order. Repeated names keep every value.
    pub headers: Vec<(String, Vec<u8>)>,

    /// Response body.
    pub body: Vec<u8>,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

impl CacheEntry {
    /// Capture a response for storage.
    pub fn new(request: &Request, response: &Response) -> Self {
        let headers = response
            .headers
            .iter()
            .map(|(name, value)| (name.as_str().to_string(), value.as_bytes().to_vec()))
            .collect();

        Self {
            url: request.url.to_string(),
            method: request.method.to_string(),
            status: response.status.as_u16(),
            headers,
            body: response.body.to_vec(),
            cached_at: now_millis(),
        }
    }

    /// Rebuild a response served from cache.
    pub fn to_response(&self) -> Response {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            if let (Ok(n), Ok(v)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_bytes(value),
            ) {
                headers.append(n, v);
            }
        }

        Response {
            url: Url::parse(&self.url).ok(),
            status: StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK),
            headers,
            body: Bytes::from(self.body.clone()),
            source: ResponseSource::Cache,
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A cache instance.
#[derive(Debug, Default, Clone)]
pub struct Cache {
    /// Cache name.
    pub name: String,

    /// Cached entries, keyed by [`Request::cache_key`].
    entries: HashMap<String, CacheEntry>,
}

impl Cache {
    /// Create a new cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Match a request.
    pub fn match_request(&self, request: &Request) -> Option<&CacheEntry> {
        self.entries.get(&request.cache_key())
    }

    /// Add entry, overwriting any previous one for the same key.
    pub fn put(&mut self, request: &Request, response: &Response) {
        self.entries
            .insert(request.cache_key(), CacheEntry::new(request, response));
    }

    /// Get all keys.
    pub fn keys(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Default)]
struct Caches {
    by_name: HashMap<String, Cache>,
    /// Creation order; `match_any` searches in this order.
    order: Vec<String>,
}

impl Caches {
    fn open(&mut self, name: &str) -> &mut Cache {
        if !self.by_name.contains_key(name) {
            self.order.push(name.to_string());
        }
        self.by_name
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name))
    }

    fn delete(&mut self, name: &str) -> bool {
        self.order.retain(|n| n != name);
        self.by_name.remove(name).is_some()
    }
}

/// Cache storage shared by every in-flight request.
#[derive(Debug, Default)]
pub struct CacheStorage {
    caches: RwLock<Caches>,
}

impl CacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a cache (creates if it doesn't exist).
    pub async fn open(&self, name: &str) {
        self.caches.write().await.open(name);
    }

    /// Check if cache exists.
    pub async fn has(&self, name: &str) -> bool {
        self.caches.read().await.by_name.contains_key(name)
    }

    /// Delete a cache.
    pub async fn delete(&self, name: &str) -> bool {
        let deleted = self.caches.write().await.delete(name);
        if deleted {
            debug!(cache = %name, "Deleted cache");
        }
        deleted
    }

    /// Delete every cache. Returns how many were removed.
    pub async fn clear(&self) -> usize {
        let mut caches = self.caches.write().await;
        let count = caches.by_name.len();
        caches.by_name.clear();
        caches.order.clear();
        count
    }

    /// Get all cache names, in creation order.
    pub async fn keys(&self) -> Vec<String> {
        self.caches.read().await.order.clone()
    }

    /// Look up a request in one cache.
    pub async fn match_in(&self, name: &str, request: &Request) -> Option<Response> {
        let caches = self.caches.read().await;
        let hit = caches
            .by_name
            .get(name)
            .and_then(|cache| cache.match_request(request))
            .map(CacheEntry::to_response);
        trace!(cache = %name, url = %request.url, hit = hit.is_some(), "Cache lookup");
        hit
    }

    /// Match across all caches, oldest cache first.
    pub async fn match_any(&self, request: &Request) -> Option<Response> {
        let caches = self.caches.read().await;
        caches
            .order
            .iter()
            .filter_map(|name| caches.by_name.get(name))
            .find_map(|cache| cache.match_request(request))
            .map(CacheEntry::to_response)
    }

    /// Store a response, opening the cache if needed.
    pub async fn put(&self, name: &str, request: &Request, response: &Response) {
        self.caches.write().await.open(name).put(request, response);
        trace!(cache = %name, url = %request.url, "Cache put");
    }

    /// Store a batch of responses under a single lock acquisition.
    pub async fn put_all(&self, name: &str, entries: &[(Request, Response)]) {
        let mut caches = self.caches.write().await;
        let cache = caches.open(name);
        for (request, response) in entries {
            cache.put(request, response);
        }
        debug!(cache = %name, count = entries.len(), "Cache batch put");
    }

    /// Number of entries in a cache (0 if it doesn't exist).
    pub async fn entry_count(&self, name: &str) -> usize {
        self.caches
            .read()
            .await
            .by_name
            .get(name)
            .map(Cache::len)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(url: &str) -> Request {
        Request::parse(url).unwrap()
    }

    fn response(body: &'static str) -> Response {
        Response::new(StatusCode::OK, body)
            .with_content_type("text/css")
            .with_source(ResponseSource::Network)
    }

    #[test]
    fn test_cache_put_and_match() {
        let mut cache = Cache::new("v1-runtime");
        cache.put(&request("https://example.com/style.css"), &response("a{}"));

        assert!(cache
            .match_request(&request("https://example.com/style.css"))
            .is_some());
        assert!(cache
            .match_request(&request("https://example.com/other.css"))
            .is_none());
    }

    #[test]
    fn test_cache_key_respects_method() {
        let mut cache = Cache::new("v1-runtime");
        cache.put(&request("https://example.com/api"), &response("{}"));

        let head = request("https://example.com/api").method(http::Method::HEAD);
        assert!(cache.match_request(&head).is_none());
    }

    #[test]
    fn test_entry_round_trips_headers_and_body() {
        let req = request("https://example.com/style.css");
        let entry = CacheEntry::new(&req, &response("a{}"));
        let restored = entry.to_response();

        assert_eq!(restored.status, StatusCode::OK);
        assert_eq!(restored.text(), "a{}");
        assert_eq!(
            restored.headers.get(http::header::CONTENT_TYPE).unwrap(),
            "text/css"
        );
        assert_eq!(restored.source, ResponseSource::Cache);
    }

    #[test]
    fn test_entry_keeps_repeated_and_opaque_headers() {
        let mut original = response("a{}");
        original
            .headers
            .append(http::header::VARY, HeaderValue::from_static("Accept"));
        original
            .headers
            .append(http::header::VARY, HeaderValue::from_static("Accept-Encoding"));
        original.headers.insert(
            HeaderName::from_static("x-label"),
            HeaderValue::from_bytes(b"caf\xe9").unwrap(),
        );

        let restored = CacheEntry::new(&request("https://example.com/style.css"), &original)
            .to_response();

        let vary: Vec<_> = restored.headers.get_all(http::header::VARY).iter().collect();
        assert_eq!(vary, vec!["Accept", "Accept-Encoding"]);
        assert_eq!(
            restored.headers.get("x-label").unwrap().as_bytes(),
            b"caf\xe9"
        );
    }

    #[tokio::test]
    async fn test_storage_put_overwrites() {
        let storage = CacheStorage::new();
        let req = request("https://example.com/app.js");

        storage.put("v1-runtime", &req, &response("old")).await;
        storage.put("v1-runtime", &req, &response("new")).await;

        let hit = storage.match_in("v1-runtime", &req).await.unwrap();
        assert_eq!(hit.text(), "new");
        assert_eq!(storage.entry_count("v1-runtime").await, 1);
    }

    #[tokio::test]
    async fn test_storage_delete_and_keys() {
        let storage = CacheStorage::new();
        storage.open("v0-precache").await;
        storage.open("v1-precache").await;

        assert_eq!(storage.keys().await, vec!["v0-precache", "v1-precache"]);
        assert!(storage.delete("v0-precache").await);
        assert!(!storage.delete("v0-precache").await);
        assert_eq!(storage.keys().await, vec!["v1-precache"]);
    }

    #[tokio::test]
    async fn test_match_any_searches_oldest_first() {
        let storage = CacheStorage::new();
        let req = request("https://example.com/index.html");
        storage.put("first", &req, &response("first")).await;
        storage.put("second", &req, &response("second")).await;

        assert_eq!(storage.match_any(&req).await.unwrap().text(), "first");
    }

    #[tokio::test]
    async fn test_clear_removes_everything() {
        let storage = CacheStorage::new();
        storage.open("a").await;
        storage.open("b").await;

        assert_eq!(storage.clear().await, 2);
        assert!(storage.keys().await.is_empty());
    }
}

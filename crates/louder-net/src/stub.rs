//! In-memory network for tests.
//!
//! Routes are keyed by absolute URL. While offline every fetch fails with
//! [`NetError::Unreachable`]; while online unknown URLs answer 404.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, StatusCode};

use crate::{Fetcher, NetError, Request, Response, ResponseSource};

#[derive(Debug, Clone)]
struct StubRoute {
    status: StatusCode,
    content_type: Option<String>,
    body: Bytes,
    delay: Option<Duration>,
}

/// Scriptable fake network with per-URL call counters.
#[derive(Debug, Default)]
pub struct StubNetwork {
    routes: Mutex<HashMap<String, StubRoute>>,
    calls: Mutex<HashMap<String, usize>>,
    offline: AtomicBool,
}

impl StubNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` with `status` for `url`, replacing any previous route.
    pub fn respond(&self, url: &str, status: u16, content_type: &str, body: impl Into<Bytes>) {
        let route = StubRoute {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::OK),
            content_type: Some(content_type.to_string()),
            body: body.into(),
            delay: None,
        };
        self.routes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.to_string(), route);
    }

    /// Serve a 200 response.
    pub fn ok(&self, url: &str, content_type: &str, body: impl Into<Bytes>) {
        self.respond(url, 200, content_type, body);
    }

    /// Hold the response for `url` back by `delay`.
    pub fn delay(&self, url: &str, delay: Duration) {
        if let Some(route) = self
            .routes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(url)
        {
            route.delay = Some(delay);
        }
    }

    /// Toggle network reachability.
    pub fn set_online(&self, online: bool) {
        self.offline.store(!online, Ordering::SeqCst);
    }

    pub fn is_online(&self) -> bool {
        !self.offline.load(Ordering::SeqCst)
    }

    /// Number of fetches attempted for `url`, online or not.
    pub fn calls(&self, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(url)
            .copied()
            .unwrap_or(0)
    }
}

impl Fetcher for StubNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        let url = request.url.to_string();
        *self
            .calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(url.clone())
            .or_insert(0) += 1;

        if !self.is_online() {
            return Err(NetError::Unreachable(url));
        }

        let route = self
            .routes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&url)
            .cloned();

        let Some(route) = route else {
            return Ok(Response {
                url: Some(request.url.clone()),
                status: StatusCode::NOT_FOUND,
                headers: HeaderMap::new(),
                body: Bytes::new(),
                source: ResponseSource::Network,
            });
        };

        if let Some(delay) = route.delay {
            tokio::time::sleep(delay).await;
        }

        let mut headers = HeaderMap::new();
        if let Some(value) = route
            .content_type
            .as_deref()
            .and_then(|ct| HeaderValue::from_str(ct).ok())
        {
            headers.insert(CONTENT_TYPE, value);
        }

        Ok(Response {
            url: Some(request.url.clone()),
            status: route.status,
            headers,
            body: route.body,
            source: ResponseSource::Network,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stub_counts_calls_when_offline() {
        let network = StubNetwork::new();
        network.ok("https://example.com/a.css", "text/css", "a{}");
        network.set_online(false);

        let request = Request::parse("https://example.com/a.css").unwrap();
        assert!(matches!(
            network.fetch(&request).await,
            Err(NetError::Unreachable(_))
        ));
        assert_eq!(network.calls("https://example.com/a.css"), 1);
    }

    #[tokio::test]
    async fn test_stub_unknown_url_is_404() {
        let network = StubNetwork::new();
        let request = Request::parse("https://example.com/nope").unwrap();
        let response = network.fetch(&request).await.unwrap();
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }
}

//! `reqwest`-backed implementation of the network edge.

use std::time::Duration;

use http::header::{ACCEPT_LANGUAGE, CACHE_CONTROL, PRAGMA};
use http::HeaderValue;
use reqwest::Client;
use tracing::{debug, info, trace};

use crate::{CacheMode, Fetcher, NetError, Request, Response, ResponseSource};

/// Loader configuration.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// User agent string.
    pub user_agent: String,
    /// Accept-Language header.
    pub accept_language: String,
    /// Per-request timeout. `None` leaves hung requests pending, as a browser would.
    pub timeout: Option<Duration>,
    /// Maximum redirects.
    pub max_redirects: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("StillLouder-Offline/{}", env!("CARGO_PKG_VERSION")),
            accept_language: "es-ES,es;q=0.9,en;q=0.8".to_string(),
            timeout: None,
            max_redirects: 10,
        }
    }
}

/// Fetches over real HTTP.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    config: LoaderConfig,
}

impl HttpFetcher {
    /// Create a new fetcher.
    pub fn new(config: LoaderConfig) -> Result<Self, NetError> {
        let mut builder = Client::builder()
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects));
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| NetError::RequestFailed(e.to_string()))?;

        info!("HttpFetcher initialized");

        Ok(Self { client, config })
    }

    async fn send(&self, request: &Request) -> Result<Response, NetError> {
        debug!(url = %request.url, method = %request.method, "Fetching resource");

        let mut req_builder = self
            .client
            .request(request.method.clone(), request.url.clone());

        for (name, value) in request.headers.iter() {
            req_builder = req_builder.header(name, value);
        }

        if !request.headers.contains_key(ACCEPT_LANGUAGE) {
            req_builder = req_builder.header(ACCEPT_LANGUAGE, &self.config.accept_language);
        }

        if request.cache == CacheMode::NoCache {
            req_builder = req_builder
                .header(CACHE_CONTROL, HeaderValue::from_static("no-cache"))
                .header(PRAGMA, HeaderValue::from_static("no-cache"));
        }

        let response = req_builder.send().await?;

        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().await?;

        trace!(
            url = %url,
            status = %status,
            body_len = body.len(),
            "Response received"
        );

        Ok(Response {
            url: Some(url),
            status,
            headers,
            body,
            source: ResponseSource::Network,
        })
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        self.send(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Destination;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_loader_config_default() {
        let config = LoaderConfig::default();
        assert!(config.user_agent.starts_with("StillLouder-Offline/"));
        assert!(config.timeout.is_none());
    }

    #[tokio::test]
    async fn test_fetch_returns_body_and_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/assets/css/style.css"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("body{}", "text/css"),
            )
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(LoaderConfig::default()).unwrap();
        let request = Request::parse(&format!("{}/assets/css/style.css", server.uri()))
            .unwrap()
            .destination(Destination::Style);

        let response = fetcher.fetch(&request).await.unwrap();
        assert!(response.ok());
        assert_eq!(response.text(), "body{}");
        assert_eq!(response.source, ResponseSource::Network);
        assert_eq!(response.content_type(), Some(mime::TEXT_CSS));
    }

    #[tokio::test]
    async fn test_no_cache_mode_sends_cache_control() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/offline.html"))
            .and(header("cache-control", "no-cache"))
            .respond_with(ResponseTemplate::new(200).set_body_string("offline"))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(LoaderConfig::default()).unwrap();
        let request = Request::parse(&format!("{}/offline.html", server.uri()))
            .unwrap()
            .cache_mode(CacheMode::NoCache);

        let response = fetcher.fetch(&request).await.unwrap();
        assert_eq!(response.text(), "offline");
    }

    #[tokio::test]
    async fn test_error_status_is_not_a_network_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(LoaderConfig::default()).unwrap();
        let request = Request::parse(&format!("{}/missing.png", server.uri())).unwrap();

        let response = fetcher.fetch(&request).await.unwrap();
        assert!(!response.ok());
        assert_eq!(response.status.as_u16(), 404);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_an_error() {
        let fetcher = HttpFetcher::new(LoaderConfig {
            timeout: Some(Duration::from_secs(2)),
            ..Default::default()
        })
        .unwrap();
        let request = Request::parse("http://127.0.0.1:1/index.html").unwrap();
        assert!(fetcher.fetch(&request).await.is_err());
    }
}

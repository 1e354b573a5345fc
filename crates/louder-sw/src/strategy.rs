//! Strategy executors.
//!
//! Each strategy makes at most one network attempt per served request. No
//! retries happen here; the next request for the same resource is the retry.

use std::sync::Arc;

use louder_net::{Destination, Fetcher, NetError, Request, Response};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::cache::CacheStorage;
use crate::fallback::{self, NO_CACHE_AVAILABLE};
use crate::partition::{PartitionKind, PartitionSet};
use crate::router::OfflineFallback;
use crate::tasks::BackgroundTasks;
use crate::SwError;

/// Runs strategies against shared cache storage and the network edge.
#[derive(Debug)]
pub struct Executor<F> {
    caches: Arc<CacheStorage>,
    network: Arc<F>,
    partitions: PartitionSet,
    offline_url: Url,
    background: BackgroundTasks,
}

impl<F> Clone for Executor<F> {
    fn clone(&self) -> Self {
        Self {
            caches: Arc::clone(&self.caches),
            network: Arc::clone(&self.network),
            partitions: self.partitions.clone(),
            offline_url: self.offline_url.clone(),
            background: self.background.clone(),
        }
    }
}

impl<F: Fetcher> Executor<F> {
    pub fn new(
        caches: Arc<CacheStorage>,
        network: Arc<F>,
        partitions: PartitionSet,
        offline_url: Url,
        background: BackgroundTasks,
    ) -> Self {
        Self {
            caches,
            network,
            partitions,
            offline_url,
            background,
        }
    }

    /// Serve from the partition; only go to the network on a miss.
    pub async fn cache_first(
        &self,
        request: &Request,
        kind: PartitionKind,
    ) -> Result<Response, SwError> {
        let partition = self.partitions.name(kind);

        if let Some(cached) = self.lookup(&partition, request).await {
            debug!(url = %request.url, partition = %partition, "Cache hit");
            return Ok(cached);
        }

        match self.network.fetch(request).await {
            Ok(response) => {
                if response.ok() {
                    self.caches.put(&partition, request, &response).await;
                    debug!(url = %request.url, partition = %partition, "Cached new resource");
                }
                Ok(response)
            }
            Err(e) => {
                error!(url = %request.url, error = %e, "Fetch failed");
                if request.destination == Destination::Image {
                    return Ok(fallback::offline_image());
                }
                Err(SwError::network(request, e))
            }
        }
    }

    /// Try the network; fall back to any cached copy, then the offline page.
    pub async fn network_first(&self, request: &Request) -> Result<Response, SwError> {
        let error = match self.network.fetch(request).await {
            Ok(response) => {
                if response.ok() {
                    let runtime = self.partitions.name(PartitionKind::Runtime);
                    self.caches.put(&runtime, request, &response).await;
                }
                return Ok(response);
            }
            Err(e) => e,
        };

        info!(url = %request.url, error = %error, "Network failed, checking cache");

        if let Some(cached) = self.caches.match_any(request).await {
            return Ok(cached);
        }

        if request.is_navigation() {
            let offline = self.partitions.name(PartitionKind::Offline);
            let offline_request = Request::get(self.offline_url.clone());
            if let Some(page) = self.caches.match_in(&offline, &offline_request).await {
                return Ok(page);
            }
            warn!(url = %request.url, "Offline page missing from cache");
        }

        Ok(fallback::unavailable(NO_CACHE_AVAILABLE))
    }

    /// Answer from cache when possible while always refreshing in the background.
    pub async fn stale_while_revalidate(
        &self,
        request: &Request,
        kind: PartitionKind,
    ) -> Result<Response, SwError> {
        let partition = self.partitions.name(kind);

        // Started before the lookup so it runs whatever the cache holds.
        let revalidation = {
            let caches = Arc::clone(&self.caches);
            let network = Arc::clone(&self.network);
            let request = request.clone();
            let partition = partition.clone();
            tokio::spawn(async move {
                let response = network
                    .fetch(&request)
                    .await
                    .map_err(|e| SwError::network(&request, e))?;
                if response.ok() {
                    caches.put(&partition, &request, &response).await;
                }
                Ok::<Response, SwError>(response)
            })
        };

        match self.lookup(&partition, request).await {
            Some(cached) => {
                debug!(url = %request.url, partition = %partition, "Serving stale, revalidating");
                let url = request.url.clone();
                self.background.spawn(async move {
                    match revalidation.await {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => error!(url = %url, error = %e, "Background fetch failed"),
                        Err(e) => error!(url = %url, error = %e, "Background fetch aborted"),
                    }
                });
                Ok(cached)
            }
            None => revalidation
                .await
                .map_err(|e| SwError::Task(e.to_string()))?,
        }
    }

    /// Network only. Failures become the route's fallback response.
    pub async fn network_only(&self, request: &Request, on_failure: &OfflineFallback) -> Response {
        match self.network.fetch(request).await {
            Ok(response) => response,
            Err(e) => {
                debug!(url = %request.url, error = %e, "Network-only request failed");
                match on_failure {
                    OfflineFallback::Empty => Response::empty(),
                    OfflineFallback::Unavailable(reason) => fallback::unavailable(reason),
                }
            }
        }
    }

    /// Fetch every request and store all of them, or none.
    pub async fn precache(
        &self,
        kind: PartitionKind,
        requests: Vec<Request>,
    ) -> Result<usize, SwError> {
        let partition = self.partitions.name(kind);
        let mut fetched = Vec::with_capacity(requests.len());

        for request in requests {
            let response = self
                .network
                .fetch(&request)
                .await
                .map_err(|e| SwError::install(&request, e))?;
            if !response.ok() {
                return Err(SwError::InstallFailed(format!(
                    "{} returned {}",
                    request.url, response.status
                )));
            }
            fetched.push((request, response));
        }

        self.caches.put_all(&partition, &fetched).await;
        Ok(fetched.len())
    }

    /// Look in `partition`, then in the precache.
    async fn lookup(&self, partition: &str, request: &Request) -> Option<Response> {
        if let Some(hit) = self.caches.match_in(partition, request).await {
            return Some(hit);
        }
        let precache = self.partitions.name(PartitionKind::Precache);
        if precache == partition {
            return None;
        }
        self.caches.match_in(&precache, request).await
    }

    pub fn caches(&self) -> &Arc<CacheStorage> {
        &self.caches
    }

    pub fn partitions(&self) -> &PartitionSet {
        &self.partitions
    }

    pub fn background(&self) -> &BackgroundTasks {
        &self.background
    }
}

impl SwError {
    pub(crate) fn network(request: &Request, source: NetError) -> Self {
        SwError::Network {
            url: request.url.to_string(),
            source,
        }
    }

    pub(crate) fn install(request: &Request, source: NetError) -> Self {
        SwError::InstallFailed(format!("{}: {}", request.url, source))
    }
}

//! The cache controller: one worker version's event handlers.
//!
//! Platform events arrive as [`WorkerEvent`] variants and are routed through
//! [`CacheController::handle_event`]. Network and cache I/O stay behind the
//! [`Executor`] and the [`Fetcher`] edge.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use louder_core::CacheConfig;
use louder_net::{CacheMode, Fetcher, Request, Response};
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::CacheStorage;
use crate::message::{ControlMessage, ReplyPort, VersionReply};
use crate::partition::{PartitionKind, PartitionSet};
use crate::router::{Route, Router};
use crate::strategy::Executor;
use crate::tasks::BackgroundTasks;
use crate::SwError;

/// Tag of the background sync that flushes queued analytics.
pub const SYNC_ANALYTICS_TAG: &str = "sync-analytics";

/// Events delivered to a worker.
#[derive(Debug)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(Request),
    Message {
        data: serde_json::Value,
        reply: Option<ReplyPort>,
    },
    Sync {
        tag: String,
    },
    Push {
        payload: Option<String>,
    },
    NotificationClick {
        action: Option<String>,
    },
}

/// Result of a fetch event.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Not intercepted; the page's own network handling applies.
    Passthrough,
    Respond(Response),
}

impl FetchOutcome {
    pub fn response(self) -> Option<Response> {
        match self {
            FetchOutcome::Respond(response) => Some(response),
            FetchOutcome::Passthrough => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub precached: usize,
    /// The worker asked to skip the waiting phase.
    pub skip_waiting: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateReport {
    pub deleted: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    SkipWaiting,
    CacheCleared(usize),
    Replied(VersionReply),
    Ignored,
}

/// Notification the worker would show for a push. Nothing is displayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationRequest {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub actions: Vec<NotificationAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

#[derive(Debug)]
pub enum EventOutcome {
    Installed(InstallReport),
    Activated(ActivateReport),
    Fetch(FetchOutcome),
    Message(MessageOutcome),
    Synced,
    Notification(NotificationRequest),
    OpenWindow(Url),
    Ignored,
}

/// Handlers for one worker version.
#[derive(Debug)]
pub struct CacheController<F> {
    config: CacheConfig,
    router: Router,
    executor: Executor<F>,
    offline_url: Url,
    skip_waiting: AtomicBool,
}

impl<F: Fetcher> CacheController<F> {
    /// Build a controller over shared storage.
    pub fn new(
        config: CacheConfig,
        caches: Arc<CacheStorage>,
        network: Arc<F>,
    ) -> Result<Self, SwError> {
        config.validate()?;
        let offline_url = config.offline_url()?;
        let partitions = PartitionSet::new(config.version.clone());
        let executor = Executor::new(
            caches,
            network,
            partitions,
            offline_url.clone(),
            BackgroundTasks::new(),
        );

        Ok(Self {
            router: Router::from_config(&config),
            config,
            executor,
            offline_url,
            skip_waiting: AtomicBool::new(false),
        })
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn partitions(&self) -> &PartitionSet {
        self.executor.partitions()
    }

    pub fn caches(&self) -> &Arc<CacheStorage> {
        self.executor.caches()
    }

    /// Background work started by this version.
    pub fn background(&self) -> &BackgroundTasks {
        self.executor.background()
    }

    /// Whether skip-waiting was requested since the last call; clears the flag.
    pub fn take_skip_waiting(&self) -> bool {
        self.skip_waiting.swap(false, Ordering::SeqCst)
    }

    /// Route one platform event.
    pub async fn handle_event(&self, event: WorkerEvent) -> Result<EventOutcome, SwError> {
        match event {
            WorkerEvent::Install => self.install().await.map(EventOutcome::Installed),
            WorkerEvent::Activate => self.activate().await.map(EventOutcome::Activated),
            WorkerEvent::Fetch(request) => self.fetch(&request).await.map(EventOutcome::Fetch),
            WorkerEvent::Message { data, reply } => Ok(EventOutcome::Message(
                self.handle_message(&data, reply).await,
            )),
            WorkerEvent::Sync { tag } => Ok(self.sync(&tag).await),
            WorkerEvent::Push { payload } => Ok(EventOutcome::Notification(
                self.push_notification(payload.as_deref()),
            )),
            WorkerEvent::NotificationClick { action } => {
                Ok(self.notification_click(action.as_deref()))
            }
        }
    }

    /// Precache the manifest, then the offline page, then ask to skip waiting.
    pub async fn install(&self) -> Result<InstallReport, SwError> {
        info!(version = %self.version(), "Installing");

        let manifest = self
            .config
            .precache_manifest()?
            .into_iter()
            .map(|url| Request::get(url).cache_mode(CacheMode::NoCache))
            .collect();
        let precached = self
            .executor
            .precache(PartitionKind::Precache, manifest)
            .await?;
        info!(count = precached, "Precached critical assets");

        let offline = Request::get(self.offline_url.clone()).cache_mode(CacheMode::NoCache);
        self.executor
            .precache(PartitionKind::Offline, vec![offline])
            .await?;

        let skip_waiting = self.config.skip_waiting_on_install;
        if skip_waiting {
            self.skip_waiting.store(true, Ordering::SeqCst);
        }

        Ok(InstallReport {
            precached,
            skip_waiting,
        })
    }

    /// Delete every partition this version does not own. Claiming clients is
    /// the registration's job once this returns.
    pub async fn activate(&self) -> Result<ActivateReport, SwError> {
        info!(version = %self.version(), "Activating");

        let caches = self.caches();
        let mut deleted = Vec::new();
        for name in caches.keys().await {
            if !self.partitions().is_current(&name) {
                info!(cache = %name, "Deleting old cache");
                if caches.delete(&name).await {
                    deleted.push(name);
                }
            }
        }

        Ok(ActivateReport { deleted })
    }

    /// Classify and serve one request.
    pub async fn fetch(&self, request: &Request) -> Result<FetchOutcome, SwError> {
        let route = self.router.classify(request);
        debug!(url = %request.url, strategy = route.strategy_name(), "Routing request");

        let response = match route {
            Route::Passthrough => return Ok(FetchOutcome::Passthrough),
            Route::NetworkOnly(on_failure) => {
                self.executor.network_only(request, &on_failure).await
            }
            Route::CacheFirst(kind) => self.executor.cache_first(request, kind).await?,
            Route::StaleWhileRevalidate(kind) => {
                self.executor.stale_while_revalidate(request, kind).await?
            }
            Route::NetworkFirst => self.executor.network_first(request).await?,
        };

        Ok(FetchOutcome::Respond(response))
    }

    /// Handle a posted control message. Unknown messages are ignored.
    pub async fn handle_message(
        &self,
        data: &serde_json::Value,
        reply: Option<ReplyPort>,
    ) -> MessageOutcome {
        debug!(data = %data, "Message received");

        let message = match ControlMessage::from_value(data) {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "Ignoring message");
                return MessageOutcome::Ignored;
            }
        };

        match message {
            ControlMessage::SkipWaiting => {
                self.skip_waiting.store(true, Ordering::SeqCst);
                MessageOutcome::SkipWaiting
            }
            ControlMessage::ClearCache => {
                let cleared = self.caches().clear().await;
                info!(count = cleared, "Cleared all caches");
                MessageOutcome::CacheCleared(cleared)
            }
            ControlMessage::GetVersion => {
                let version = VersionReply {
                    version: self.version().to_string(),
                };
                match reply {
                    Some(port) => {
                        if port.send(version.clone()).is_err() {
                            warn!("Version reply channel closed");
                        }
                    }
                    None => warn!("GET_VERSION without a reply port"),
                }
                MessageOutcome::Replied(version)
            }
        }
    }

    async fn sync(&self, tag: &str) -> EventOutcome {
        info!(tag = %tag, "Background sync");
        if tag == SYNC_ANALYTICS_TAG {
            // Analytics are not queued while offline yet, so there is nothing to flush.
            debug!("Syncing analytics");
            EventOutcome::Synced
        } else {
            EventOutcome::Ignored
        }
    }

    fn push_notification(&self, payload: Option<&str>) -> NotificationRequest {
        info!(has_payload = payload.is_some(), "Push received");
        NotificationRequest {
            title: "Still Louder".to_string(),
            body: payload.unwrap_or("New content available!").to_string(),
            icon: "/assets/web-app-manifest-192x192.png".to_string(),
            badge: "/assets/favicon-96x96.png".to_string(),
            vibrate: vec![200, 100, 200],
            actions: vec![
                NotificationAction {
                    action: "explore".to_string(),
                    title: "View".to_string(),
                },
                NotificationAction {
                    action: "close".to_string(),
                    title: "Close".to_string(),
                },
            ],
        }
    }

    fn notification_click(&self, action: Option<&str>) -> EventOutcome {
        debug!(action = ?action, "Notification click");
        match action {
            Some("explore") => match self.config.resolve("/") {
                Ok(url) => EventOutcome::OpenWindow(url),
                Err(e) => {
                    warn!(error = %e, "Cannot resolve start URL");
                    EventOutcome::Ignored
                }
            },
            _ => EventOutcome::Ignored,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::reply_channel;
    use http::StatusCode;
    use louder_net::{Destination, StubNetwork};
    use serde_json::json;

    fn config() -> CacheConfig {
        CacheConfig {
            version: "v1".to_string(),
            precache_urls: vec!["/".to_string(), "/offline.html".to_string()],
            ..Default::default()
        }
    }

    fn serve_site(network: &StubNetwork) {
        network.ok("https://stillouder.space/", "text/html", "home");
        network.ok("https://stillouder.space/offline.html", "text/html", "offline");
    }

    fn controller(network: Arc<StubNetwork>) -> CacheController<StubNetwork> {
        CacheController::new(config(), Arc::new(CacheStorage::new()), network).unwrap()
    }

    #[tokio::test]
    async fn test_install_fills_precache_and_offline() {
        let network = Arc::new(StubNetwork::new());
        serve_site(&network);
        let ctrl = controller(network);

        let report = ctrl.install().await.unwrap();
        assert_eq!(report.precached, 2);
        assert!(report.skip_waiting);
        assert!(ctrl.take_skip_waiting());
        assert!(!ctrl.take_skip_waiting());
        assert_eq!(ctrl.caches().entry_count("v1-precache").await, 2);
        assert_eq!(ctrl.caches().entry_count("v1-offline").await, 1);
    }

    #[tokio::test]
    async fn test_install_failure_propagates() {
        let network = Arc::new(StubNetwork::new());
        network.ok("https://stillouder.space/", "text/html", "home");
        let ctrl = controller(network);

        assert!(matches!(ctrl.install().await, Err(SwError::InstallFailed(_))));
        assert!(!ctrl.caches().has("v1-offline").await);
    }

    #[tokio::test]
    async fn test_activate_sweeps_other_versions() {
        let ctrl = controller(Arc::new(StubNetwork::new()));
        for name in ["v1-precache", "v1-runtime", "v1-images", "v1-offline", "v0-precache"] {
            ctrl.caches().open(name).await;
        }

        let report = ctrl.activate().await.unwrap();
        assert_eq!(report.deleted, vec!["v0-precache".to_string()]);
        assert_eq!(ctrl.caches().keys().await.len(), 4);
    }

    #[tokio::test]
    async fn test_fetch_passthrough_for_post() {
        let ctrl = controller(Arc::new(StubNetwork::new()));
        let request = Request::parse("https://stillouder.space/comments")
            .unwrap()
            .method(http::Method::POST);

        assert!(matches!(
            ctrl.fetch(&request).await.unwrap(),
            FetchOutcome::Passthrough
        ));
    }

    #[tokio::test]
    async fn test_fetch_audio_offline_is_503() {
        let network = Arc::new(StubNetwork::new());
        network.set_online(false);
        let ctrl = controller(network);
        let request = Request::parse("https://stillouder.space/assets/audio/al-vacio.mp3")
            .unwrap()
            .destination(Destination::Audio);

        let response = ctrl.fetch(&request).await.unwrap().response().unwrap();
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.text(), "Audio not available offline");
        assert!(ctrl.caches().keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_get_version_replies_before_returning() {
        let ctrl = controller(Arc::new(StubNetwork::new()));
        let (port, mut rx) = reply_channel();

        let outcome = ctrl
            .handle_message(&json!({ "type": "GET_VERSION" }), Some(port))
            .await;

        assert_eq!(rx.try_recv().unwrap().version, "v1");
        assert!(matches!(outcome, MessageOutcome::Replied(_)));
    }

    #[tokio::test]
    async fn test_clear_cache_message() {
        let ctrl = controller(Arc::new(StubNetwork::new()));
        ctrl.caches().open("v1-runtime").await;
        ctrl.caches().open("v0-images").await;

        let outcome = ctrl
            .handle_event(WorkerEvent::Message {
                data: json!({ "type": "CLEAR_CACHE" }),
                reply: None,
            })
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            EventOutcome::Message(MessageOutcome::CacheCleared(2))
        ));
        assert!(ctrl.caches().keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_message_ignored() {
        let ctrl = controller(Arc::new(StubNetwork::new()));
        let outcome = ctrl.handle_message(&json!({ "type": "PING" }), None).await;
        assert_eq!(outcome, MessageOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_push_and_notification_click_stubs() {
        let ctrl = controller(Arc::new(StubNetwork::new()));

        match ctrl
            .handle_event(WorkerEvent::Push { payload: None })
            .await
            .unwrap()
        {
            EventOutcome::Notification(n) => {
                assert_eq!(n.title, "Still Louder");
                assert_eq!(n.body, "New content available!");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        match ctrl
            .handle_event(WorkerEvent::NotificationClick {
                action: Some("explore".to_string()),
            })
            .await
            .unwrap()
        {
            EventOutcome::OpenWindow(url) => assert_eq!(url.as_str(), "https://stillouder.space/"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_sync_analytics_tag() {
        let ctrl = controller(Arc::new(StubNetwork::new()));
        let synced = ctrl
            .handle_event(WorkerEvent::Sync {
                tag: SYNC_ANALYTICS_TAG.to_string(),
            })
            .await
            .unwrap();
        assert!(matches!(synced, EventOutcome::Synced));
    }
}

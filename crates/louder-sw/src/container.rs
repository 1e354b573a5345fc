//! Service worker container (navigator.serviceWorker).
//!
//! The container owns the registration and drives the lifecycle. Handlers run
//! with no lock held, so fetches keep being served by the active worker while
//! a new version installs.

use std::sync::Arc;
use std::time::Duration;

use louder_core::CacheConfig;
use louder_net::{Fetcher, Request};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::CacheStorage;
use crate::controller::{CacheController, FetchOutcome, MessageOutcome};
use crate::message::ReplyPort;
use crate::registration::{
    Registration, ServiceWorker, ServiceWorkerEvent, ServiceWorkerId, ServiceWorkerState,
    UpdateViaCache, WorkerSlot,
};
use crate::SwError;

/// Options for service worker registration.
#[derive(Debug, Clone, Default)]
pub struct RegistrationOptions {
    /// Scope URL. Defaults to the script's directory.
    pub scope: Option<String>,

    /// Update via cache mode.
    pub update_via_cache: UpdateViaCache,
}

/// What an update check did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateResult {
    /// The deployed script is already installed.
    NoChange,
    /// A new version installed and is waiting.
    Installed(ServiceWorkerId),
    /// A new version installed and took control.
    Activated(ServiceWorkerId),
}

/// Service worker container.
pub struct ServiceWorkerContainer<F> {
    registration: RwLock<Option<Registration<F>>>,

    /// Script currently served at the worker URL.
    deployed: RwLock<CacheConfig>,

    caches: Arc<CacheStorage>,
    network: Arc<F>,
    event_tx: mpsc::UnboundedSender<ServiceWorkerEvent>,
}

impl<F: Fetcher> ServiceWorkerContainer<F> {
    /// Create a new container serving `deployed` as the worker script.
    pub fn new(
        deployed: CacheConfig,
        caches: Arc<CacheStorage>,
        network: Arc<F>,
    ) -> (Self, mpsc::UnboundedReceiver<ServiceWorkerEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        (
            Self {
                registration: RwLock::new(None),
                deployed: RwLock::new(deployed),
                caches,
                network,
                event_tx,
            },
            event_rx,
        )
    }

    /// Register the worker script and run the first install.
    pub async fn register(
        &self,
        script_url: &str,
        options: RegistrationOptions,
    ) -> Result<UpdateResult, SwError> {
        let script_url =
            Url::parse(script_url).map_err(|e| SwError::RegistrationFailed(e.to_string()))?;

        let scope = match options.scope {
            Some(s) => script_url
                .join(&s)
                .map_err(|e| SwError::RegistrationFailed(e.to_string()))?,
            None => script_url
                .join("./")
                .map_err(|e| SwError::RegistrationFailed(e.to_string()))?,
        };
        if scope.origin() != script_url.origin() {
            return Err(SwError::RegistrationFailed(format!(
                "scope {scope} is not on the script's origin"
            )));
        }

        {
            let mut registration = self.registration.write().await;
            match registration.as_mut() {
                Some(existing) if existing.scope == scope => {
                    existing.script_url = script_url.clone();
                }
                _ => {
                    info!(scope = %scope, script = %script_url, "Registering service worker");
                    *registration = Some(Registration::new(
                        scope,
                        script_url.clone(),
                        options.update_via_cache,
                        self.event_tx.clone(),
                    ));
                }
            }
        }

        self.update_from(script_url).await
    }

    /// Replace the script served at the worker URL.
    pub async fn deploy(&self, config: CacheConfig) {
        info!(version = %config.version, "New worker script deployed");
        *self.deployed.write().await = config;
    }

    /// Check the worker URL for a new script and install it if it changed.
    pub async fn update(&self) -> Result<UpdateResult, SwError> {
        let script_url = match self.registration.read().await.as_ref() {
            Some(registration) => registration.script_url.clone(),
            None => return Err(SwError::StateError("no registration".to_string())),
        };
        self.update_from(script_url).await
    }

    /// Whether the last update check is older than `interval`.
    pub async fn update_due(&self, interval: Duration) -> bool {
        self.registration
            .read()
            .await
            .as_ref()
            .is_some_and(|r| r.needs_update(interval))
    }

    async fn update_from(&self, script_url: Url) -> Result<UpdateResult, SwError> {
        let config = self.deployed.read().await.clone();
        let fingerprint = config.version.clone();

        let (id, controller) = {
            let mut registration = self.registration.write().await;
            let registration = registration
                .as_mut()
                .ok_or_else(|| SwError::StateError("no registration".to_string()))?;
            registration.mark_update_check();

            if registration.has_fingerprint(&fingerprint) {
                debug!(version = %fingerprint, "Worker script unchanged");
                return Ok(UpdateResult::NoChange);
            }

            let controller = Arc::new(CacheController::new(
                config,
                Arc::clone(&self.caches),
                Arc::clone(&self.network),
            )?);
            let worker = ServiceWorker::new(script_url, fingerprint, Arc::clone(&controller));
            let id = worker.id;
            registration.begin_install(worker);
            (id, controller)
        };

        match controller.install().await {
            Ok(report) => {
                info!(version = %controller.version(), precached = report.precached, "Install complete");
            }
            Err(e) => {
                warn!(version = %controller.version(), error = %e, "Install failed");
                if let Some(registration) = self.registration.write().await.as_mut() {
                    registration.install_failed(id);
                }
                return Err(e);
            }
        }

        let installed = match self.registration.write().await.as_mut() {
            Some(registration) => registration.install_complete(id),
            None => false,
        };
        if !installed {
            debug!(worker = id.raw(), "Install superseded");
            return Ok(UpdateResult::NoChange);
        }

        // With no active worker there is nobody to wait for.
        let skip_waiting = controller.take_skip_waiting();
        if (skip_waiting || !self.has_controller().await) && self.activate_waiting().await? {
            return Ok(UpdateResult::Activated(id));
        }
        Ok(UpdateResult::Installed(id))
    }

    /// Activate the waiting worker. Returns `false` if nothing was waiting.
    pub async fn activate_waiting(&self) -> Result<bool, SwError> {
        let (id, controller) = {
            let mut registration = self.registration.write().await;
            let Some(registration) = registration.as_mut() else {
                return Ok(false);
            };
            let Some(id) = registration.begin_activate() else {
                return Ok(false);
            };
            let controller = registration
                .waiting()
                .map(|w| Arc::clone(w.controller()))
                .ok_or_else(|| SwError::StateError("waiting worker vanished".to_string()))?;
            (id, controller)
        };

        let report = controller.activate().await?;
        debug!(deleted = ?report.deleted, "Old caches swept");

        let activated = match self.registration.write().await.as_mut() {
            Some(registration) => registration.activate_complete(id),
            None => false,
        };
        Ok(activated)
    }

    /// Post a control message to the worker in `slot`.
    pub async fn post_message(
        &self,
        slot: WorkerSlot,
        data: &serde_json::Value,
        reply: Option<ReplyPort>,
    ) -> Result<MessageOutcome, SwError> {
        let controller = self
            .controller(slot)
            .await
            .ok_or_else(|| SwError::NotFound(format!("no {slot:?} worker")))?;

        let outcome = controller.handle_message(data, reply).await;

        // An installing worker picks the flag up when its install finishes.
        if outcome == MessageOutcome::SkipWaiting && slot != WorkerSlot::Installing {
            controller.take_skip_waiting();
            if slot == WorkerSlot::Waiting {
                self.activate_waiting().await?;
            }
        }
        Ok(outcome)
    }

    /// Route a page request through the active worker.
    pub async fn fetch(&self, request: &Request) -> Result<FetchOutcome, SwError> {
        match self.controller(WorkerSlot::Active).await {
            Some(controller) => controller.fetch(request).await,
            None => Ok(FetchOutcome::Passthrough),
        }
    }

    /// Handlers of the worker in `slot`.
    pub async fn controller(&self, slot: WorkerSlot) -> Option<Arc<CacheController<F>>> {
        self.registration
            .read()
            .await
            .as_ref()?
            .worker(slot)
            .map(|w| Arc::clone(w.controller()))
    }

    /// Id and state of the worker in `slot`.
    pub async fn worker_state(&self, slot: WorkerSlot) -> Option<(ServiceWorkerId, ServiceWorkerState)> {
        self.registration
            .read()
            .await
            .as_ref()?
            .worker(slot)
            .map(|w| (w.id, w.state))
    }

    /// Whether an active worker controls the page.
    pub async fn has_controller(&self) -> bool {
        self.worker_state(WorkerSlot::Active).await.is_some()
    }

    /// Version of the controlling worker.
    pub async fn controller_version(&self) -> Option<String> {
        self.controller(WorkerSlot::Active)
            .await
            .map(|c| c.version().to_string())
    }

    /// Registration scope, if registered.
    pub async fn scope(&self) -> Option<Url> {
        self.registration.read().await.as_ref().map(|r| r.scope.clone())
    }

    pub fn caches(&self) -> &Arc<CacheStorage> {
        &self.caches
    }

    /// Wait for background work of every live worker.
    pub async fn settle(&self) {
        for slot in [WorkerSlot::Active, WorkerSlot::Waiting, WorkerSlot::Installing] {
            if let Some(controller) = self.controller(slot).await {
                controller.background().settle().await;
            }
        }
    }

    /// Drop the registration. Caches are left in place.
    pub async fn unregister(&self) -> bool {
        match self.registration.write().await.take() {
            Some(mut registration) => {
                info!(scope = %registration.scope, "Unregistering service worker");
                registration.unregister();
                true
            }
            None => false,
        }
    }
}

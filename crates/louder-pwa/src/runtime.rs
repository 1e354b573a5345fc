//! Wires the lifecycle manager to a service worker container.
//!
//! The runtime executes the effects that talk to the worker (register,
//! update checks, control messages, timers) and hands the visual ones back
//! to the host.

use std::collections::VecDeque;
use std::sync::Arc;

use louder_core::{init_logging, LogConfig, PwaConfig, SiteConfig};
use louder_net::Fetcher;
use louder_sw::{
    CacheStorage, ControlMessage, RegistrationOptions, ServiceWorkerContainer,
    ServiceWorkerEvent, ServiceWorkerState, UpdateResult, UpdateViaCache, WorkerSlot,
};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::PwaResult;
use crate::manager::{LifecycleManager, PageEffect, PageEvent, Timer};
use crate::storage::{FileStore, KeyValueStore};

pub struct PwaRuntime<F, S> {
    config: PwaConfig,
    origin: Url,
    container: Arc<ServiceWorkerContainer<F>>,
    worker_events: Mutex<mpsc::UnboundedReceiver<ServiceWorkerEvent>>,
    manager: Mutex<LifecycleManager<S>>,
    page_tx: mpsc::UnboundedSender<PageEvent>,
}

impl<F: Fetcher> PwaRuntime<F, FileStore> {
    /// Host entry point: logging from the site's `debug` flag, a fresh
    /// container serving `site.cache`, and the durable flags read from
    /// [`PwaConfig::resolved_storage_path`].
    pub fn for_site(
        site: SiteConfig,
        network: Arc<F>,
    ) -> PwaResult<(Self, mpsc::UnboundedReceiver<PageEvent>)> {
        init_logging(LogConfig::for_pwa(&site.pwa));
        site.cache.validate()?;

        let origin = site.cache.origin.clone();
        let store = FileStore::load(site.pwa.resolved_storage_path());
        debug!(path = %store.path().display(), "Durable flags loaded");

        let (container, worker_events) =
            ServiceWorkerContainer::new(site.cache, Arc::new(CacheStorage::new()), network);
        Ok(Self::new(
            site.pwa,
            origin,
            Arc::new(container),
            worker_events,
            store,
        ))
    }
}

impl<F: Fetcher, S: KeyValueStore> PwaRuntime<F, S> {
    /// The returned receiver yields timer and polling events; feed them back
    /// through [`PwaRuntime::dispatch`].
    pub fn new(
        config: PwaConfig,
        origin: Url,
        container: Arc<ServiceWorkerContainer<F>>,
        worker_events: mpsc::UnboundedReceiver<ServiceWorkerEvent>,
        store: S,
    ) -> (Self, mpsc::UnboundedReceiver<PageEvent>) {
        let (page_tx, page_rx) = mpsc::unbounded_channel();
        let manager = LifecycleManager::new(config.clone(), store);

        (
            Self {
                config,
                origin,
                container,
                worker_events: Mutex::new(worker_events),
                manager: Mutex::new(manager),
                page_tx,
            },
            page_rx,
        )
    }

    /// Page load: detect standalone mode and register the worker.
    pub async fn start(&self, standalone: bool) -> PwaResult<Vec<PageEffect>> {
        let effects = self.dispatch(PageEvent::Init { standalone }).await?;
        info!("PWA features initialized successfully");
        Ok(effects)
    }

    /// Handle one event and everything it causes. Returns the effects the
    /// host has to render.
    pub async fn dispatch(&self, event: PageEvent) -> PwaResult<Vec<PageEffect>> {
        let mut queue = VecDeque::from([event]);
        let mut surfaced = Vec::new();

        while let Some(event) = queue.pop_front() {
            let effects = self.manager.lock().await.handle(event)?;
            for effect in effects {
                match effect {
                    PageEffect::Register => queue.extend(self.register().await),
                    PageEffect::CheckForUpdates => self.check_for_updates().await,
                    PageEffect::PostMessage { slot, message } => self.post(slot, message).await,
                    PageEffect::Schedule { after, timer } => self.schedule(after, timer),
                    visual => surfaced.push(visual),
                }
            }
            queue.extend(self.drain_worker_events().await);
        }

        Ok(surfaced)
    }

    /// Feed timer and polling events back in until the page goes away,
    /// handing every visual effect to `render`.
    pub async fn run<H>(
        &self,
        mut events: mpsc::UnboundedReceiver<PageEvent>,
        mut render: H,
    ) -> PwaResult<()>
    where
        H: FnMut(PageEffect),
    {
        while let Some(event) = events.recv().await {
            for effect in self.dispatch(event).await? {
                render(effect);
            }
        }
        Ok(())
    }

    /// Poll for a new worker script on the configured interval, starting now.
    pub fn spawn_update_checks(&self) -> JoinHandle<()> {
        let tx = self.page_tx.clone();
        let period = self.config.update_check_interval();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if tx.send(PageEvent::UpdateTick).is_err() {
                    break;
                }
            }
        })
    }

    /// Show the custom install prompt now, if allowed.
    pub async fn show_install_prompt(&self) -> PwaResult<Vec<PageEffect>> {
        self.dispatch(PageEvent::InstallPromptDue).await
    }

    pub async fn is_installed(&self) -> bool {
        self.manager.lock().await.is_installed()
    }

    /// Scope of the registration, if registered.
    pub async fn registration(&self) -> Option<Url> {
        self.container.scope().await
    }

    pub async fn check_for_updates_now(&self) -> PwaResult<Vec<PageEffect>> {
        self.dispatch(PageEvent::UpdateTick).await
    }

    pub async fn clear_cache(&self) -> PwaResult<Vec<PageEffect>> {
        self.dispatch(PageEvent::ClearCacheRequested).await
    }

    pub fn container(&self) -> &Arc<ServiceWorkerContainer<F>> {
        &self.container
    }

    pub fn manager(&self) -> &Mutex<LifecycleManager<S>> {
        &self.manager
    }

    /// Register the worker. The page first learns what it attached to, as
    /// seen before this registration call changed anything.
    async fn register(&self) -> Vec<PageEvent> {
        let controlled = self.container.has_controller().await;
        let waiting = match self.container.worker_state(WorkerSlot::Waiting).await {
            Some((id, ServiceWorkerState::Installed)) => Some(id),
            _ => None,
        };
        let mut events = vec![PageEvent::Attached {
            controlled,
            waiting,
        }];

        let script = match self.origin.join(&self.config.sw_path) {
            Ok(script) => script,
            Err(e) => {
                events.push(PageEvent::RegistrationFailed {
                    reason: e.to_string(),
                });
                return events;
            }
        };
        let options = RegistrationOptions {
            scope: Some(self.config.scope.clone()),
            update_via_cache: UpdateViaCache::None,
        };

        match self.container.register(script.as_str(), options).await {
            Ok(outcome) => info!(outcome = ?outcome, "Service Worker registered successfully"),
            Err(e) => events.push(PageEvent::RegistrationFailed {
                reason: e.to_string(),
            }),
        }
        events
    }

    async fn check_for_updates(&self) {
        match self.container.update().await {
            Ok(UpdateResult::NoChange) => debug!("No Service Worker update"),
            Ok(outcome) => info!(outcome = ?outcome, "Service Worker updated"),
            // The next poll retries.
            Err(e) => warn!(error = %e, "Update check failed"),
        }
    }

    async fn post(&self, slot: WorkerSlot, message: ControlMessage) {
        if let Err(e) = self
            .container
            .post_message(slot, &message.to_value(), None)
            .await
        {
            warn!(slot = ?slot, error = %e, "Cannot post message");
        }
    }

    fn schedule(&self, after: std::time::Duration, timer: Timer) {
        let tx = self.page_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            // Page gone.
            let _ = tx.send(timer.event());
        });
    }

    async fn drain_worker_events(&self) -> Vec<PageEvent> {
        let mut rx = self.worker_events.lock().await;
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(match event {
                ServiceWorkerEvent::UpdateFound { .. } => PageEvent::UpdateFound,
                ServiceWorkerEvent::StateChange {
                    worker_id,
                    new_state,
                    controlled,
                } => PageEvent::WorkerStateChanged {
                    worker: worker_id,
                    state: new_state,
                    controlled,
                },
                ServiceWorkerEvent::ControllerChange { version, .. } => {
                    PageEvent::ControllerChanged { version }
                }
            });
        }
        events
    }
}

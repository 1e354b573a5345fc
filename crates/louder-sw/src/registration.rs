//! Worker versions and the registration that holds them.
//!
//! ```text
//! Registration (scope)
//!     ├── installing (ServiceWorker)
//!     ├── waiting    (ServiceWorker)
//!     └── active     (ServiceWorker)
//! ```
//!
//! The registration only records state transitions and emits events. The
//! install/activate handlers themselves run in the container, outside any lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};
use url::Url;

use louder_net::Fetcher;

use crate::controller::CacheController;

/// Unique identifier for a service worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceWorkerId(u64);

impl ServiceWorkerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Service worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceWorkerState {
    /// Script parsed, install not started.
    #[default]
    Parsed,
    /// Install handler running.
    Installing,
    /// Installed and waiting to take over.
    Installed,
    /// Activate handler running.
    Activating,
    /// Active and controlling pages.
    Activated,
    /// Replaced, or install failed.
    Redundant,
}

/// Update via cache type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateViaCache {
    Imports,
    All,
    /// Always check the network for the worker script.
    #[default]
    None,
}

/// Which of the registration's workers a message is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerSlot {
    Installing,
    Waiting,
    Active,
}

/// Events the page can observe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceWorkerEvent {
    /// A new worker started installing.
    UpdateFound { registration_scope: String },
    /// A worker changed state. `controlled` is whether an active worker
    /// existed at the time.
    StateChange {
        worker_id: ServiceWorkerId,
        new_state: ServiceWorkerState,
        controlled: bool,
    },
    /// A new worker took control of the registration's pages.
    ControllerChange {
        worker_id: ServiceWorkerId,
        version: String,
    },
}

/// A service worker instance.
#[derive(Debug)]
pub struct ServiceWorker<F> {
    /// Unique ID.
    pub id: ServiceWorkerId,

    /// Script URL.
    pub script_url: Url,

    /// Identity of the script contents; a different value is an update.
    pub fingerprint: String,

    /// Current state.
    pub state: ServiceWorkerState,

    /// Time of last state change.
    pub state_changed_at: Instant,

    controller: Arc<CacheController<F>>,
}

impl<F> ServiceWorker<F> {
    /// Create a new service worker.
    pub fn new(script_url: Url, fingerprint: String, controller: Arc<CacheController<F>>) -> Self {
        Self {
            id: ServiceWorkerId::new(),
            script_url,
            fingerprint,
            state: ServiceWorkerState::Parsed,
            state_changed_at: Instant::now(),
            controller,
        }
    }

    /// Set state.
    pub fn set_state(&mut self, state: ServiceWorkerState) {
        self.state = state;
        self.state_changed_at = Instant::now();
    }

    pub fn is_active(&self) -> bool {
        self.state == ServiceWorkerState::Activated
    }

    pub fn is_redundant(&self) -> bool {
        self.state == ServiceWorkerState::Redundant
    }

    pub fn controller(&self) -> &Arc<CacheController<F>> {
        &self.controller
    }
}

/// A service worker registration.
#[derive(Debug)]
pub struct Registration<F> {
    /// Scope URL.
    pub scope: Url,

    /// Script URL the registration was made with; update checks fetch it.
    pub script_url: Url,

    /// Update via cache mode.
    pub update_via_cache: UpdateViaCache,

    /// Last update check time.
    pub last_update_check: Option<Instant>,

    installing: Option<ServiceWorker<F>>,
    waiting: Option<ServiceWorker<F>>,
    active: Option<ServiceWorker<F>>,
    events: mpsc::UnboundedSender<ServiceWorkerEvent>,
}

impl<F: Fetcher> Registration<F> {
    /// Create a new registration.
    pub fn new(
        scope: Url,
        script_url: Url,
        update_via_cache: UpdateViaCache,
        events: mpsc::UnboundedSender<ServiceWorkerEvent>,
    ) -> Self {
        Self {
            scope,
            script_url,
            update_via_cache,
            last_update_check: None,
            installing: None,
            waiting: None,
            active: None,
            events,
        }
    }

    pub fn installing(&self) -> Option<&ServiceWorker<F>> {
        self.installing.as_ref()
    }

    pub fn waiting(&self) -> Option<&ServiceWorker<F>> {
        self.waiting.as_ref()
    }

    pub fn active(&self) -> Option<&ServiceWorker<F>> {
        self.active.as_ref()
    }

    /// Worker in `slot`, if any.
    pub fn worker(&self, slot: WorkerSlot) -> Option<&ServiceWorker<F>> {
        match slot {
            WorkerSlot::Installing => self.installing(),
            WorkerSlot::Waiting => self.waiting(),
            WorkerSlot::Active => self.active(),
        }
    }

    /// Whether some worker already runs (or is about to run) this script.
    pub fn has_fingerprint(&self, fingerprint: &str) -> bool {
        [&self.installing, &self.waiting, &self.active]
            .into_iter()
            .flatten()
            .any(|w| w.fingerprint == fingerprint)
    }

    /// Check if update is needed.
    pub fn needs_update(&self, check_interval: Duration) -> bool {
        match self.last_update_check {
            Some(last) => last.elapsed() > check_interval,
            None => true,
        }
    }

    /// Record that the network was checked for a new script.
    pub fn mark_update_check(&mut self) {
        self.last_update_check = Some(Instant::now());
    }

    /// Start installing `worker`. A worker already installing is superseded.
    pub fn begin_install(&mut self, mut worker: ServiceWorker<F>) {
        if let Some(mut old) = self.installing.take() {
            self.transition(&mut old, ServiceWorkerState::Redundant);
        }
        self.emit(ServiceWorkerEvent::UpdateFound {
            registration_scope: self.scope.to_string(),
        });
        self.transition(&mut worker, ServiceWorkerState::Installing);
        self.installing = Some(worker);
    }

    /// Transition installing to waiting. Returns `false` if `id` was superseded.
    pub fn install_complete(&mut self, id: ServiceWorkerId) -> bool {
        let Some(mut worker) = self.take_installing(id) else {
            return false;
        };
        if let Some(mut replaced) = self.waiting.take() {
            self.transition(&mut replaced, ServiceWorkerState::Redundant);
        }
        self.transition(&mut worker, ServiceWorkerState::Installed);
        self.waiting = Some(worker);
        true
    }

    /// Install handler failed; the worker is discarded.
    pub fn install_failed(&mut self, id: ServiceWorkerId) {
        if let Some(mut worker) = self.take_installing(id) {
            self.transition(&mut worker, ServiceWorkerState::Redundant);
        }
    }

    /// Mark the waiting worker as activating and hand back its id.
    pub fn begin_activate(&mut self) -> Option<ServiceWorkerId> {
        let mut worker = self.waiting.take()?;
        if worker.state == ServiceWorkerState::Activating {
            self.waiting = Some(worker);
            return None;
        }
        self.transition(&mut worker, ServiceWorkerState::Activating);
        let id = worker.id;
        self.waiting = Some(worker);
        Some(id)
    }

    /// Promote the activating worker; the previous active one becomes redundant.
    pub fn activate_complete(&mut self, id: ServiceWorkerId) -> bool {
        match self.waiting.as_ref() {
            Some(w) if w.id == id => {}
            _ => return false,
        }
        let Some(mut worker) = self.waiting.take() else {
            return false;
        };
        if let Some(mut old) = self.active.take() {
            self.transition(&mut old, ServiceWorkerState::Redundant);
        }
        self.transition(&mut worker, ServiceWorkerState::Activated);
        let version = worker.controller.version().to_string();
        info!(worker = worker.id.raw(), version = %version, "Worker activated");
        self.emit(ServiceWorkerEvent::ControllerChange {
            worker_id: worker.id,
            version,
        });
        self.active = Some(worker);
        true
    }

    /// Unregister (mark every worker redundant).
    pub fn unregister(&mut self) {
        for mut worker in [self.installing.take(), self.waiting.take(), self.active.take()]
            .into_iter()
            .flatten()
        {
            self.transition(&mut worker, ServiceWorkerState::Redundant);
        }
    }

    fn take_installing(&mut self, id: ServiceWorkerId) -> Option<ServiceWorker<F>> {
        match self.installing.as_ref() {
            Some(w) if w.id == id => self.installing.take(),
            _ => None,
        }
    }

    fn transition(&self, worker: &mut ServiceWorker<F>, state: ServiceWorkerState) {
        debug!(worker = worker.id.raw(), from = ?worker.state, to = ?state, "Worker state change");
        worker.set_state(state);
        self.emit(ServiceWorkerEvent::StateChange {
            worker_id: worker.id,
            new_state: state,
            controlled: self.active.is_some(),
        });
    }

    fn emit(&self, event: ServiceWorkerEvent) {
        // No page listening is fine.
        let _ = self.events.send(event);
    }
}

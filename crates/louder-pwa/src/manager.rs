//! The lifecycle manager: page events in, page effects out.
//!
//! Every platform event and user action arrives as a [`PageEvent`] and goes
//! through [`LifecycleManager::handle`], which updates the two flows and
//! returns what the page must do. The manager performs no I/O besides the
//! durable dismissal flag; the runtime carries the effects out.

use std::time::Duration;

use louder_core::PwaConfig;
use louder_sw::{ControlMessage, ServiceWorkerId, ServiceWorkerState, WorkerSlot};
use tracing::{debug, error, info};

use crate::error::PwaResult;
use crate::install::{DeferredInstallPrompt, InstallFlow, InstallOutcome};
use crate::storage::{KeyValueStore, INSTALL_PROMPT_DISMISSED};
use crate::update::UpdateFlow;

/// Deferred events the page asks the runtime to deliver later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timer {
    InstallPromptDue,
    InstallSuccessExpired,
}

impl Timer {
    pub fn event(self) -> PageEvent {
        match self {
            Timer::InstallPromptDue => PageEvent::InstallPromptDue,
            Timer::InstallSuccessExpired => PageEvent::InstallSuccessExpired,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum PageEvent {
    /// Page loaded. `standalone` is true when running as an installed app.
    Init { standalone: bool },
    /// The page reached its registration. `controlled` is whether a worker
    /// already controlled the page when it loaded; `waiting` is a worker that
    /// finished installing earlier and still waits to take over.
    Attached {
        controlled: bool,
        waiting: Option<ServiceWorkerId>,
    },
    RegistrationFailed { reason: String },
    UpdateFound,
    WorkerStateChanged {
        worker: ServiceWorkerId,
        state: ServiceWorkerState,
        controlled: bool,
    },
    ControllerChanged { version: String },
    UpdateAccepted,
    UpdateDismissed,
    BeforeInstallPrompt(DeferredInstallPrompt),
    InstallPromptDue,
    InstallAccepted,
    InstallDismissed,
    /// Native dialog closed.
    InstallChoice(InstallOutcome),
    AppInstalled,
    InstallSuccessExpired,
    /// A `data-pwa-install` button was clicked.
    ManualInstall,
    ConnectionChanged { online: bool },
    UpdateTick,
    ClearCacheRequested,
}

#[derive(Debug, PartialEq, Eq)]
pub enum PageEffect {
    Register,
    CheckForUpdates,
    PostMessage {
        slot: WorkerSlot,
        message: ControlMessage,
    },
    Schedule {
        after: Duration,
        timer: Timer,
    },
    ShowUpdateNotice,
    HideUpdateNotice,
    Reload,
    ShowInstallPrompt,
    HideInstallPrompt,
    TriggerNativePrompt(DeferredInstallPrompt),
    ShowInstallSuccess,
    HideInstallSuccess,
    /// Re-broadcast as the page's `connectionchange` event.
    ConnectionChange { online: bool },
}

/// Page-side owner of the update and install flows.
#[derive(Debug)]
pub struct LifecycleManager<S> {
    config: PwaConfig,
    store: S,
    update: UpdateFlow,
    install: InstallFlow,
    registered: bool,
    controlled: bool,
    online: bool,
}

impl<S: KeyValueStore> LifecycleManager<S> {
    pub fn new(config: PwaConfig, store: S) -> Self {
        let dismissed = store.flag(INSTALL_PROMPT_DISMISSED);
        Self {
            config,
            store,
            update: UpdateFlow::new(),
            install: InstallFlow::new(dismissed),
            registered: false,
            controlled: false,
            online: true,
        }
    }

    pub fn config(&self) -> &PwaConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn update_flow(&self) -> &UpdateFlow {
        &self.update
    }

    pub fn install_flow(&self) -> &InstallFlow {
        &self.install
    }

    pub fn is_installed(&self) -> bool {
        self.install.is_installed()
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    /// Whether an active worker controls the page.
    pub fn is_controlled(&self) -> bool {
        self.controlled
    }

    /// Apply one event.
    pub fn handle(&mut self, event: PageEvent) -> PwaResult<Vec<PageEffect>> {
        let effects = match event {
            PageEvent::Init { standalone } => {
                info!("Initializing PWA features");
                if standalone {
                    info!("App is running as installed PWA");
                    self.install.mark_installed();
                }
                if self.config.enable_notifications {
                    debug!("Notification permission not yet requested");
                }
                vec![PageEffect::Register]
            }
            PageEvent::Attached {
                controlled,
                waiting,
            } => {
                self.registered = true;
                self.controlled |= controlled;
                let reoffer = waiting.filter(|&worker| {
                    self.update
                        .on_state_change(worker, ServiceWorkerState::Installed, self.controlled)
                });
                match reoffer {
                    Some(worker) => {
                        info!(worker = worker.raw(), "Update still waiting, offering again");
                        vec![PageEffect::ShowUpdateNotice]
                    }
                    None => Vec::new(),
                }
            }
            PageEvent::RegistrationFailed { reason } => {
                error!(reason = %reason, "Service Worker registration failed");
                Vec::new()
            }
            PageEvent::UpdateFound => {
                info!("New Service Worker found, installing");
                Vec::new()
            }
            PageEvent::WorkerStateChanged {
                worker,
                state,
                controlled,
            } => {
                if self.update.on_state_change(worker, state, controlled) {
                    info!("New Service Worker installed, update available");
                    vec![PageEffect::ShowUpdateNotice]
                } else {
                    Vec::new()
                }
            }
            PageEvent::ControllerChanged { version } => self.controller_changed(&version),
            PageEvent::UpdateAccepted => match self.update.accept() {
                Some(worker) => {
                    debug!(worker = worker.raw(), "Promoting waiting worker");
                    vec![PageEffect::PostMessage {
                        slot: WorkerSlot::Waiting,
                        message: ControlMessage::SkipWaiting,
                    }]
                }
                None => Vec::new(),
            },
            PageEvent::UpdateDismissed => {
                if self.update.dismiss() {
                    vec![PageEffect::HideUpdateNotice]
                } else {
                    Vec::new()
                }
            }
            PageEvent::BeforeInstallPrompt(prompt) => {
                if self.install.capture(prompt) {
                    vec![PageEffect::Schedule {
                        after: self.config.install_prompt_delay(),
                        timer: Timer::InstallPromptDue,
                    }]
                } else {
                    Vec::new()
                }
            }
            PageEvent::InstallPromptDue => {
                if self.install.prompt_due() {
                    vec![PageEffect::ShowInstallPrompt]
                } else {
                    Vec::new()
                }
            }
            PageEvent::InstallAccepted => match self.install.accept() {
                Some(prompt) => vec![
                    PageEffect::HideInstallPrompt,
                    PageEffect::TriggerNativePrompt(prompt),
                ],
                None => Vec::new(),
            },
            PageEvent::InstallDismissed => {
                if self.install.dismiss() {
                    self.store.set(INSTALL_PROMPT_DISMISSED, "true")?;
                    vec![PageEffect::HideInstallPrompt]
                } else {
                    Vec::new()
                }
            }
            PageEvent::InstallChoice(outcome) => {
                info!(outcome = ?outcome, "Install prompt outcome");
                Vec::new()
            }
            PageEvent::AppInstalled => {
                info!("PWA installed successfully");
                self.install.on_app_installed();
                vec![
                    PageEffect::HideInstallPrompt,
                    PageEffect::ShowInstallSuccess,
                    PageEffect::Schedule {
                        after: self.config.install_success_duration(),
                        timer: Timer::InstallSuccessExpired,
                    },
                ]
            }
            PageEvent::InstallSuccessExpired => vec![PageEffect::HideInstallSuccess],
            PageEvent::ManualInstall => match self.install.take_for_manual_install() {
                Some(prompt) => vec![PageEffect::TriggerNativePrompt(prompt)],
                None => {
                    debug!("Install prompt not available");
                    Vec::new()
                }
            },
            PageEvent::ConnectionChanged { online } => {
                info!(online, "Connection status changed");
                self.online = online;
                vec![PageEffect::ConnectionChange { online }]
            }
            PageEvent::UpdateTick => {
                debug!("Checking for Service Worker updates");
                vec![PageEffect::CheckForUpdates]
            }
            PageEvent::ClearCacheRequested => {
                if self.registered {
                    info!("Cache clear requested");
                    vec![PageEffect::PostMessage {
                        slot: WorkerSlot::Active,
                        message: ControlMessage::ClearCache,
                    }]
                } else {
                    Vec::new()
                }
            }
        };

        Ok(effects)
    }

    fn controller_changed(&mut self, version: &str) -> Vec<PageEffect> {
        let was_controlled = std::mem::replace(&mut self.controlled, true);
        let notice_visible = self.update.waiting().is_some();
        self.update.on_controller_change();

        if !was_controlled {
            debug!(version, "Page claimed by first controller");
            return Vec::new();
        }

        info!(version, "New Service Worker activated, reloading page");
        let mut effects = Vec::new();
        if notice_visible {
            effects.push(PageEffect::HideUpdateNotice);
        }
        effects.push(PageEffect::Reload);
        effects
    }
}

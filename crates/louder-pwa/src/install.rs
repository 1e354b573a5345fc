//! Custom "install as app" prompt.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::prompt::PromptState;

/// Platform handle that can later open the native install dialog.
///
/// Opaque to the page. It can be used once; triggering the native prompt
/// consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct DeferredInstallPrompt {
    id: u64,
}

impl DeferredInstallPrompt {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self {
            id: COUNTER.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Default for DeferredInstallPrompt {
    fn default() -> Self {
        Self::new()
    }
}

/// What the user picked in the native dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallOutcome {
    Accepted,
    Dismissed,
}

/// Holds at most one deferred prompt and decides when the custom UI shows.
#[derive(Debug, Default)]
pub struct InstallFlow {
    state: PromptState,
    deferred: Option<DeferredInstallPrompt>,
    installed: bool,
    dismissed_before: bool,
}

impl InstallFlow {
    /// `dismissed_before` comes from durable storage.
    pub fn new(dismissed_before: bool) -> Self {
        Self {
            dismissed_before,
            ..Self::default()
        }
    }

    pub fn state(&self) -> PromptState {
        self.state
    }

    pub fn is_installed(&self) -> bool {
        self.installed
    }

    pub fn was_dismissed(&self) -> bool {
        self.dismissed_before
    }

    pub fn has_deferred(&self) -> bool {
        self.deferred.is_some()
    }

    /// Running as an installed app already.
    pub fn mark_installed(&mut self) {
        self.installed = true;
    }

    /// Keep the platform's handle. Returns `true` if the custom prompt should
    /// be scheduled.
    pub fn capture(&mut self, prompt: DeferredInstallPrompt) -> bool {
        debug!(prompt = prompt.id(), "Install prompt available");
        self.deferred = Some(prompt);
        !self.installed && !self.dismissed_before
    }

    /// The scheduled delay elapsed. Returns `true` if the custom prompt shows.
    pub fn prompt_due(&mut self) -> bool {
        if self.deferred.is_none() || self.installed || self.dismissed_before {
            return false;
        }
        self.state.offer()
    }

    /// User accepted the custom prompt. Hands back the handle to trigger.
    pub fn accept(&mut self) -> Option<DeferredInstallPrompt> {
        self.deferred.as_ref()?;
        if !self.state.accept() {
            return None;
        }
        self.deferred.take()
    }

    /// User turned the custom prompt down. The caller persists the flag.
    pub fn dismiss(&mut self) -> bool {
        if !self.state.dismiss() {
            return false;
        }
        self.dismissed_before = true;
        true
    }

    /// Manual install buttons bypass the custom prompt.
    pub fn take_for_manual_install(&mut self) -> Option<DeferredInstallPrompt> {
        self.deferred.take()
    }

    /// The platform reported a completed install.
    pub fn on_app_installed(&mut self) {
        self.installed = true;
        self.deferred = None;
        self.state.reset();
    }
}

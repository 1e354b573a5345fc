//! "New version available" notice.

use louder_sw::{ServiceWorkerId, ServiceWorkerState};
use tracing::debug;

use crate::prompt::PromptState;

/// Tracks the single waiting worker the page knows about.
#[derive(Debug, Clone, Default)]
pub struct UpdateFlow {
    state: PromptState,
    waiting: Option<ServiceWorkerId>,
}

impl UpdateFlow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PromptState {
        self.state
    }

    /// Worker currently offered to the user.
    pub fn waiting(&self) -> Option<ServiceWorkerId> {
        self.waiting
    }

    /// Feed a worker state change. Returns `true` when the notice should appear.
    ///
    /// Only a worker that finished installing while another one already
    /// controls the page is an update; the very first install is not.
    pub fn on_state_change(
        &mut self,
        worker: ServiceWorkerId,
        state: ServiceWorkerState,
        controlled: bool,
    ) -> bool {
        match state {
            ServiceWorkerState::Installed if controlled => {
                if self.waiting == Some(worker) && self.state != PromptState::Idle {
                    return false;
                }
                debug!(worker = worker.raw(), "Update available");
                self.waiting = Some(worker);
                self.state.reset();
                self.state.offer()
            }
            ServiceWorkerState::Redundant if self.waiting == Some(worker) => {
                self.waiting = None;
                self.state.reset();
                false
            }
            _ => false,
        }
    }

    /// User chose to update. Returns the worker to promote.
    pub fn accept(&mut self) -> Option<ServiceWorkerId> {
        if self.state.accept() {
            self.waiting
        } else {
            None
        }
    }

    /// User chose "later". Nothing is remembered across loads.
    pub fn dismiss(&mut self) -> bool {
        self.state.dismiss()
    }

    /// A new controller took over; whatever was waiting has been acted upon.
    pub fn on_controller_change(&mut self) {
        self.waiting = None;
        self.state.reset();
    }
}

//! The offer → accept | dismiss state shared by the update and install flows.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptState {
    #[default]
    Idle,
    /// UI is showing.
    Offered,
    Accepted,
    Dismissed,
}

impl PromptState {
    /// Show the prompt. No-op while one is already showing.
    pub fn offer(&mut self) -> bool {
        if *self == PromptState::Offered {
            return false;
        }
        *self = PromptState::Offered;
        true
    }

    pub fn accept(&mut self) -> bool {
        self.resolve(PromptState::Accepted)
    }

    pub fn dismiss(&mut self) -> bool {
        self.resolve(PromptState::Dismissed)
    }

    pub fn reset(&mut self) {
        *self = PromptState::Idle;
    }

    pub fn is_offered(&self) -> bool {
        *self == PromptState::Offered
    }

    /// Only an offered prompt can be answered.
    fn resolve(&mut self, to: PromptState) -> bool {
        if *self != PromptState::Offered {
            return false;
        }
        *self = to;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_then_accept() {
        let mut state = PromptState::default();
        assert!(!state.accept());
        assert!(state.offer());
        assert!(!state.offer());
        assert!(state.accept());
        assert_eq!(state, PromptState::Accepted);
        assert!(!state.dismiss());
    }

    #[test]
    fn test_dismiss_and_reoffer() {
        let mut state = PromptState::Idle;
        state.offer();
        assert!(state.dismiss());
        assert!(!state.is_offered());
        assert!(state.offer());
        state.reset();
        assert_eq!(state, PromptState::Idle);
    }
}

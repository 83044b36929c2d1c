//! Transition hooks
//!
//! Hooks receive the breaker name and run after the breaker lock is released,
//! so they may call back into the breaker or registry.

use crate::circuit::BreakerState;
use std::sync::Arc;

pub type TransitionHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Hooks fired when a breaker enters a state
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_open: Option<TransitionHook>,
    pub on_close: Option<TransitionHook>,
    pub on_half_open: Option<TransitionHook>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the hook registered for `entered`
    pub fn trigger(&self, breaker: &str, entered: BreakerState) {
        let hook = match entered {
            BreakerState::Open => &self.on_open,
            BreakerState::Closed => &self.on_close,
            BreakerState::HalfOpen => &self.on_half_open,
        };
        if let Some(hook) = hook {
            hook(breaker);
        }
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_half_open", &self.on_half_open.is_some())
            .finish()
    }
}

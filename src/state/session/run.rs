use super::SessionState;
use crate::types::{Interrupt, PendingInterrupt, RunState};
use tracing::debug;

/// A human decision that has been claimed for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub interrupt_id: String,
    pub action: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionStart {
    /// The gate is now marked submitted; the caller owns the single delivery
    /// attempt.
    Ready(Resolution),
    AlreadySubmitted,
    NoPendingInterrupt,
    /// The gate lists options and `action` is not one of them, or the
    /// free-form action is blank.
    UnknownAction,
}

impl SessionState {
    pub(super) fn set_run_state(&mut self, run_state: RunState) {
        self.run_state = Some(run_state);
    }

    pub(super) fn install_interrupt(&mut self, interrupt: Interrupt) {
        if let Some(pending) = self.interrupt.as_ref() {
            if pending.submitted && pending.interrupt.id == interrupt.id {
                debug!(interrupt_id = %interrupt.id, "repeat of a submitted interrupt; ignoring");
                return;
            }
            debug!(
                previous = %pending.interrupt.id,
                interrupt_id = %interrupt.id,
                submitted = pending.submitted,
                "replacing interrupt"
            );
        }
        self.interrupt = Some(PendingInterrupt {
            interrupt,
            submitted: false,
        });
    }

    /// Claims the pending gate for `action`. Marks it submitted before any
    /// delivery happens, so a second call returns `AlreadySubmitted`.
    pub fn begin_resolution(&mut self, action: &str) -> ResolutionStart {
        let Some(pending) = self.interrupt.as_mut() else {
            return ResolutionStart::NoPendingInterrupt;
        };
        if pending.submitted {
            return ResolutionStart::AlreadySubmitted;
        }
        if action.trim().is_empty() {
            return ResolutionStart::UnknownAction;
        }

        let label = if pending.interrupt.has_options() {
            match pending.interrupt.option(action) {
                Some(option) => option.label.clone(),
                None => return ResolutionStart::UnknownAction,
            }
        } else {
            action.to_string()
        };

        pending.submitted = true;
        ResolutionStart::Ready(Resolution {
            interrupt_id: pending.interrupt.id.clone(),
            action: action.to_string(),
            label,
        })
    }

    /// Re-opens the gate after a failed delivery. Returns false when the
    /// gate has since been replaced or was never submitted.
    pub fn resolution_failed(&mut self, interrupt_id: &str) -> bool {
        match self.interrupt.as_mut() {
            Some(pending) if pending.submitted && pending.interrupt.id == interrupt_id => {
                pending.submitted = false;
                true
            }
            _ => false,
        }
    }
}

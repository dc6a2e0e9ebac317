//! Single-slot admission control for the agent loop.
//!
//! At most one prompt runs at a time. [`ConcurrencyGuard::acquire`] is an
//! atomic check-and-set that hands out a [`RunPermit`]; the permit owns the
//! run's cancellation token and puts the guard back to idle when dropped, on
//! every exit path.

use std::sync::{Arc, Mutex, MutexGuard};

use harness_core::error::Error;
use tokio_util::sync::CancellationToken;

enum LoopState {
    Idle,
    Running { cancel: CancellationToken },
}

#[derive(Clone)]
pub struct ConcurrencyGuard {
    state: Arc<Mutex<LoopState>>,
}

impl ConcurrencyGuard {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(LoopState::Idle)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LoopState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claim the slot. The permit's token is a child of `parent`, so
    /// cancelling either one stops the run.
    pub fn acquire(&self, parent: &CancellationToken) -> Result<RunPermit, Error> {
        let mut state = self.lock();
        if matches!(*state, LoopState::Running { .. }) {
            return Err(Error::PromptInProgress);
        }
        let cancel = parent.child_token();
        *state = LoopState::Running {
            cancel: cancel.clone(),
        };
        Ok(RunPermit {
            guard: self.clone(),
            cancel,
        })
    }

    /// Signal the running prompt, if any. Returns whether one was running.
    ///
    /// The state stays `Running` until the permit is dropped.
    pub fn cancel(&self) -> bool {
        match &*self.lock() {
            LoopState::Running { cancel } => {
                cancel.cancel();
                true
            }
            LoopState::Idle => false,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.lock(), LoopState::Running { .. })
    }

    fn release(&self) {
        *self.lock() = LoopState::Idle;
    }
}

impl Default for ConcurrencyGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof of admission for one prompt run.
pub struct RunPermit {
    guard: ConcurrencyGuard,
    cancel: CancellationToken,
}

impl RunPermit {
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.guard.release();
    }
}

impl std::fmt::Debug for RunPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunPermit")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

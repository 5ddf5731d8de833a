//! # Worker Lifecycle
//!
//! The start/stop/destroy state machine shared by every background worker.
//!
//! ```text
//! STOPPED -> STARTING -> STARTED -> STOPPING -> STOPPED
//!    \_________ any state ________/-> DESTROYED
//! ```
//!
//! Transitions are compare-and-set on an atomic, so two callers racing for the
//! same edge see exactly one winner. `destroy()` is terminal and cancels the
//! worker's token, which wakes anything the worker is parked on.

use crate::error::{PlanningError, Result};
use core_async::sync::CancellationToken;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

// ============================================================================
// Worker Status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WorkerStatus {
    Starting = 0,
    Started = 1,
    Stopping = 2,
    Stopped = 3,
    Destroyed = 4,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Starting => "STARTING",
            WorkerStatus::Started => "STARTED",
            WorkerStatus::Stopping => "STOPPING",
            WorkerStatus::Stopped => "STOPPED",
            WorkerStatus::Destroyed => "DESTROYED",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerStatus::Starting,
            1 => WorkerStatus::Started,
            2 => WorkerStatus::Stopping,
            3 => WorkerStatus::Stopped,
            _ => WorkerStatus::Destroyed,
        }
    }

    /// Returns true if `self -> to` is an edge of the state machine.
    pub fn can_transition_to(&self, to: WorkerStatus) -> bool {
        match (self, to) {
            (WorkerStatus::Stopped, WorkerStatus::Starting) => true,

            (WorkerStatus::Starting, WorkerStatus::Started) => true,
            (WorkerStatus::Starting, WorkerStatus::Stopping) => true,
            (WorkerStatus::Starting, WorkerStatus::Stopped) => true,

            (WorkerStatus::Started, WorkerStatus::Stopping) => true,
            (WorkerStatus::Started, WorkerStatus::Stopped) => true,

            (WorkerStatus::Stopping, WorkerStatus::Stopped) => true,

            // Destroyed is only entered through destroy() and never left
            (WorkerStatus::Destroyed, _) => false,
            (_, WorkerStatus::Destroyed) => false,

            _ => false,
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Shared state machine embedded in each worker.
#[derive(Debug)]
pub struct WorkerLifecycle {
    name: &'static str,
    status: AtomicU8,
    token: CancellationToken,
}

impl WorkerLifecycle {
    /// Creates a lifecycle in the `STOPPED` state.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            status: AtomicU8::new(WorkerStatus::Stopped as u8),
            token: CancellationToken::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn status(&self) -> WorkerStatus {
        WorkerStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Moves `expected -> to` if the worker is currently in `expected`.
    pub fn compare_and_set(&self, expected: WorkerStatus, to: WorkerStatus) -> bool {
        if !expected.can_transition_to(to) {
            return false;
        }
        self.status
            .compare_exchange(
                expected as u8,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Like [`compare_and_set`](Self::compare_and_set) but reports the
    /// conflicting state as an error.
    pub fn transition(&self, expected: WorkerStatus, to: WorkerStatus) -> Result<()> {
        if self.compare_and_set(expected, to) {
            return Ok(());
        }
        match self.status() {
            WorkerStatus::Destroyed => Err(PlanningError::Destroyed(self.name)),
            actual => Err(PlanningError::StateConflict {
                component: self.name,
                expected: expected.to_string(),
                actual: actual.to_string(),
            }),
        }
    }

    /// Marks the worker destroyed and cancels its token.
    ///
    /// Idempotent; returns true only for the call that performed the destroy.
    pub fn destroy(&self) -> bool {
        let previous = self
            .status
            .swap(WorkerStatus::Destroyed as u8, Ordering::AcqRel);
        self.token.cancel();
        previous != WorkerStatus::Destroyed as u8
    }

    pub fn is_destroyed(&self) -> bool {
        self.status() == WorkerStatus::Destroyed
    }

    /// False once destroyed or once the worker's token has been cancelled.
    pub fn is_alive(&self) -> bool {
        !self.is_destroyed() && !self.token.is_cancelled()
    }

    /// Token cancelled on destroy; workers select on it while parked.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

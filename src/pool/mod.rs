//! Coordinator and worker pool
//!
//! - Lifecycle states shared with observers
//! - Worker threads waiting for their wake-up signal
//! - Coordinator that owns the terminal signals and drives shutdown

mod coordinator;
mod state;
mod worker;

pub use coordinator::{
    join_workers, signal_workers, spawn_workers, wait_workers_configured, Coordinator,
    DrainSummary, ShutdownReport,
};
pub use state::{CoordinatorState, Lifecycle, StateCell, WorkerState};
pub use worker::{JoinOutcome, Worker, WorkerExit};

use nix::errno::Errno;
use nix::sys::signal::Signal;

use crate::signals::{describe_errno, SignalError};

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Failed to spawn worker {index}: {source}")]
    Spawn {
        index: usize,
        source: std::io::Error,
    },

    #[error("Failed to send {signal} to worker {index}: {}", describe_errno(.errno))]
    Delivery {
        index: usize,
        signal: Signal,
        errno: Errno,
    },

    #[error("Failed to join worker {index}: {reason}")]
    Join { index: usize, reason: String },

    #[error(transparent)]
    Signal(#[from] SignalError),
}

/// Poll `cell` until it reaches `want` or `timeout` passes
#[cfg(test)]
pub(crate) fn wait_for_state<S>(cell: &StateCell<S>, want: S, timeout: std::time::Duration) -> bool
where
    S: Lifecycle + PartialEq,
{
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if cell.get() == want {
            return true;
        }
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    cell.get() == want
}

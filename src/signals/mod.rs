//! Signal plumbing shared by the coordinator and the workers
//!
//! - Signal sets and name parsing
//! - Per-thread mask configuration
//! - Process-wide recording handler
//! - Synchronous (sigwait-style) wait with a restart policy

mod handler;
mod mask;
mod set;
mod wait;

pub use handler::{handler_deliveries, install_recording_handlers};
pub use mask::{
    block_all_signals, configure_thread_mask, current_thread_mask, restore_thread_mask,
    unblocked_signals,
};
pub use set::{parse_signal, SignalSet};
pub use wait::{wait_for_signal, WaitOutcome, WaitPolicy};

use nix::errno::Errno;

#[derive(Debug, Clone, thiserror::Error)]
pub enum SignalError {
    #[error("Signal configuration failed: {}", describe_errno(.0))]
    Configuration(Errno),

    #[error("Signal wait failed: {}", describe_errno(.0))]
    Wait(Errno),
}

impl SignalError {
    /// Underlying OS error
    pub fn errno(&self) -> Errno {
        match self {
            SignalError::Configuration(e) | SignalError::Wait(e) => *e,
        }
    }
}

/// Render an OS error as "description (code)"
pub fn describe_errno(errno: &Errno) -> String {
    format!("{} ({})", errno.desc(), *errno as i32)
}

//! Per-thread signal masks
//!
//! Every function here touches only the calling thread's mask. A thread
//! never changes another thread's mask.

use nix::sys::pthread::pthread_self;
use nix::sys::signal::{SigSet, SigmaskHow, Signal};

use super::{SignalError, SignalSet};

/// Replace the calling thread's mask so that exactly `allowed` is unblocked
///
/// The mask is replaced, not merged: calling this twice with the same set
/// leaves the same mask. An empty set blocks everything.
pub fn configure_thread_mask(allowed: &SignalSet) -> Result<(), SignalError> {
    allowed.complement().thread_set_mask().map_err(|e| {
        log::error!(
            "thread {:?}: pthread_sigmask failed: {}",
            pthread_self(),
            super::describe_errno(&e)
        );
        SignalError::Configuration(e)
    })?;

    log::debug!(
        "thread {:?}: signal mask set, accepting [{}]",
        pthread_self(),
        allowed
    );
    Ok(())
}

/// The calling thread's current mask
pub fn current_thread_mask() -> Result<SigSet, SignalError> {
    SigSet::thread_get_mask().map_err(SignalError::Configuration)
}

/// Standard signals that are not blocked for the calling thread
///
/// SIGKILL and SIGSTOP are left out since they can never be blocked.
pub fn unblocked_signals() -> Result<SignalSet, SignalError> {
    let mask = current_thread_mask()?;
    Ok(Signal::iterator()
        .filter(|&sig| !matches!(sig, Signal::SIGKILL | Signal::SIGSTOP))
        .filter(|&sig| !mask.contains(sig))
        .collect())
}

/// Block every signal on the calling thread, returning the previous mask
///
/// Threads spawned while everything is blocked start out deaf to signals
/// until they configure their own mask.
pub fn block_all_signals() -> Result<SigSet, SignalError> {
    SigSet::all()
        .thread_swap_mask(SigmaskHow::SIG_SETMASK)
        .map_err(SignalError::Configuration)
}

/// Reinstall a mask previously returned by [`block_all_signals`]
pub fn restore_thread_mask(previous: &SigSet) -> Result<(), SignalError> {
    previous.thread_set_mask().map_err(SignalError::Configuration)
}

//! Synchronous signal wait
//!
//! The calling thread suspends in `sigwait` until one of the listened
//! signals is pending. The wait consumes the signal itself, so the recording
//! handler never sees it. Signals in the ignore set are logged and the wait
//! starts over.
//!
//! While the wait runs, the listened signals are held blocked on the
//! calling thread and the configured mask is put back on return. A signal
//! that ran the handler on this thread before the wait began is claimed from
//! the handler's per-thread record instead of being lost.

use nix::errno::Errno;
use nix::sys::pthread::pthread_self;
use nix::sys::signal::{SigmaskHow, Signal};

use super::handler::take_recorded;
use super::{SignalError, SignalSet};

/// Which signals to wait for and which of them to swallow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitPolicy {
    listen: SignalSet,
    ignore: SignalSet,
}

impl WaitPolicy {
    pub fn new(listen: SignalSet) -> Self {
        Self {
            listen,
            ignore: SignalSet::new(),
        }
    }

    /// Keep waiting when any of `ignore` is observed
    pub fn ignoring(mut self, ignore: SignalSet) -> Self {
        self.ignore = ignore;
        self
    }

    pub fn listen(&self) -> &SignalSet {
        &self.listen
    }

    pub fn ignore(&self) -> &SignalSet {
        &self.ignore
    }

    /// True if at least one listened signal ends the wait
    fn can_return(&self) -> bool {
        self.listen.iter().any(|sig| !self.ignore.contains(sig))
    }
}

/// Result of a completed wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOutcome {
    /// The signal that ended the wait
    pub signal: Signal,
    /// Ignorable signals swallowed before it
    pub ignored: u32,
}

/// Block until a non-ignorable signal from the policy arrives
///
/// The caller must have configured its mask first; see
/// [`configure_thread_mask`](super::configure_thread_mask).
pub fn wait_for_signal(policy: &WaitPolicy) -> Result<WaitOutcome, SignalError> {
    let set = policy.listen.to_sigset();

    // Blocked from here on, a listened signal stays pending for sigwait
    // instead of reaching the handler between the record check and the wait
    let previous = set
        .thread_swap_mask(SigmaskHow::SIG_BLOCK)
        .map_err(SignalError::Wait)?;

    let result = wait_with(policy, || match take_recorded(&policy.listen) {
        Some(sig) => {
            log::debug!("signal {} ({}) claimed from handler record", sig, sig as i32);
            Ok(sig)
        }
        None => set.wait(),
    });

    if let Err(e) = previous.thread_set_mask() {
        log::error!(
            "thread {:?}: cannot restore signal mask after wait: {}",
            pthread_self(),
            super::describe_errno(&e)
        );
    }
    result
}

/// Wait loop over an arbitrary source of observed signals
fn wait_with<F>(policy: &WaitPolicy, mut next: F) -> Result<WaitOutcome, SignalError>
where
    F: FnMut() -> nix::Result<Signal>,
{
    if policy.listen.is_empty() || !policy.can_return() {
        log::error!(
            "Refusing to wait on [{}] ignoring [{}]: the wait could never return",
            policy.listen,
            policy.ignore
        );
        return Err(SignalError::Wait(Errno::EINVAL));
    }

    let thread = pthread_self();
    let mut ignored = 0;

    loop {
        let sig = next().map_err(|e| {
            log::error!(
                "thread {:?}: signal wait failed: {}",
                thread,
                super::describe_errno(&e)
            );
            SignalError::Wait(e)
        })?;

        log::info!(
            "signal {} ({}) received in thread {:?}",
            sig,
            sig as i32,
            thread
        );

        if policy.ignore.contains(sig) {
            ignored += 1;
            log::warn!(
                "signal {} ({}) in thread {:?} ignored, continuing wait",
                sig,
                sig as i32,
                thread
            );
            continue;
        }

        return Ok(WaitOutcome {
            signal: sig,
            ignored,
        });
    }
}

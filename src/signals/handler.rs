//! Process-wide recording handler
//!
//! Overrides the default disposition (usually "terminate") for the signals
//! the pool cares about. The handler only records that a signal reached it:
//! an atomic counter bump, a bit in the receiving thread's pending record,
//! and one unbuffered `write(2)` to stderr. Signals taken by the synchronous
//! wait never reach it; signals that slip past it are picked up from the
//! per-thread record by the next wait on that thread.

use nix::errno::Errno;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::sync::atomic::{AtomicU64, Ordering};

use super::{SignalError, SignalSet};

thread_local! {
    /// Bit `n` set: signal `n` ran the handler on this thread and has not
    /// been claimed by a wait yet
    static RECORDED: AtomicU64 = const { AtomicU64::new(0) };
}

/// Covers the standard signals on every supported platform
const MAX_SIGNAL: usize = 65;

#[allow(clippy::declare_interior_mutable_const)]
const ZERO: AtomicU64 = AtomicU64::new(0);

static DELIVERIES: [AtomicU64; MAX_SIGNAL] = [ZERO; MAX_SIGNAL];

const PREFIX: &[u8] = b"sigpool: signal ";
const SUFFIX: &[u8] = b" delivered to handler\n";

extern "C" fn record_signal(signum: libc::c_int) {
    if let Some(counter) = usize::try_from(signum).ok().and_then(|i| DELIVERIES.get(i)) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
    if let Some(bit) = signal_bit(signum) {
        let _ = RECORDED.try_with(|r| r.fetch_or(bit, Ordering::SeqCst));
    }

    // Stack buffer only: no allocation, no locks, no stdio
    let mut line = [0u8; 64];
    let mut len = 0;
    for &b in PREFIX {
        line[len] = b;
        len += 1;
    }
    len += write_decimal(signum, &mut line[len..]);
    for &b in SUFFIX {
        line[len] = b;
        len += 1;
    }

    // Best-effort diagnostic; nothing useful can be done on failure here
    unsafe {
        libc::write(libc::STDERR_FILENO, line.as_ptr().cast(), len);
    }
}

fn signal_bit(signum: libc::c_int) -> Option<u64> {
    u32::try_from(signum)
        .ok()
        .filter(|&n| n < u64::BITS)
        .map(|n| 1u64 << n)
}

/// Format a non-negative number into `buf`, returning the byte count
fn write_decimal(value: libc::c_int, buf: &mut [u8]) -> usize {
    let mut digits = [0u8; 10];
    let mut n = value.unsigned_abs();
    let mut count = 0;
    loop {
        digits[count] = b'0' + (n % 10) as u8;
        count += 1;
        n /= 10;
        if n == 0 {
            break;
        }
    }
    for i in 0..count {
        buf[i] = digits[count - 1 - i];
    }
    count
}

/// Install the recording handler for every signal in `signals`
///
/// Safe to call more than once; later calls simply reinstall the same
/// handler. SIGKILL and SIGSTOP cannot be caught and are rejected.
pub fn install_recording_handlers(signals: &SignalSet) -> Result<(), SignalError> {
    let action = SigAction::new(
        SigHandler::Handler(record_signal),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );

    for sig in signals.iter() {
        if matches!(sig, Signal::SIGKILL | Signal::SIGSTOP) {
            log::error!("Cannot install handler for {}", sig);
            return Err(SignalError::Configuration(Errno::EINVAL));
        }

        // SAFETY: record_signal only touches atomics (one of them
        // thread-local, const-initialised) and calls write(2).
        unsafe { sigaction(sig, &action) }.map_err(|e| {
            log::error!("sigaction({}) failed: {}", sig, super::describe_errno(&e));
            SignalError::Configuration(e)
        })?;
        log::debug!("Installed recording handler for {} ({})", sig, sig as i32);
    }

    Ok(())
}

/// How many times `sig` reached the recording handler
pub fn handler_deliveries(sig: Signal) -> u64 {
    DELIVERIES
        .get(sig as usize)
        .map(|c| c.load(Ordering::Relaxed))
        .unwrap_or(0)
}

/// Claim a signal from `listen` that ran the handler on the calling thread
///
/// Signals are checked in the set's order; the claimed one is cleared, the
/// rest stay recorded for later waits.
pub(crate) fn take_recorded(listen: &SignalSet) -> Option<Signal> {
    RECORDED
        .try_with(|r| {
            listen.iter().find(|&sig| {
                signal_bit(sig as libc::c_int)
                    .map(|bit| r.fetch_and(!bit, Ordering::SeqCst) & bit != 0)
                    .unwrap_or(false)
            })
        })
        .ok()
        .flatten()
}

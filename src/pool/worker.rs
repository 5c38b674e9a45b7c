//! Pool worker threads
//!
//! Each worker accepts exactly one signal, the wake-up signal, and blocks in
//! a synchronous wait for it. Once it arrives the thread exits and the
//! coordinator reclaims it with a join.

use nix::sys::pthread::{pthread_kill, pthread_self, Pthread};
use nix::sys::signal::Signal;
use std::any::Any;
use std::os::unix::thread::JoinHandleExt;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::state::{StateCell, WorkerState};
use super::PoolError;
use crate::signals::{
    block_all_signals, configure_thread_mask, restore_thread_mask, wait_for_signal, SignalError,
    SignalSet, WaitPolicy,
};

/// Poll interval for bounded joins
const JOIN_POLL: Duration = Duration::from_millis(5);

/// Poll interval while a worker configures itself
const READY_POLL: Duration = Duration::from_millis(1);

/// How a worker thread ended
#[derive(Debug, Clone)]
pub enum WorkerExit {
    /// The wake-up signal was observed
    Woken(Signal),
    /// The wait failed at the OS level
    WaitFailed(SignalError),
    /// The mask could not be configured; the thread never waited
    ConfigurationFailed(SignalError),
}

impl WorkerExit {
    /// Thread exit status: non-zero only when configuration failed
    pub fn status(&self) -> i32 {
        match self {
            WorkerExit::Woken(_) | WorkerExit::WaitFailed(_) => 0,
            WorkerExit::ConfigurationFailed(_) => 1,
        }
    }
}

/// Result of a bounded join
#[derive(Debug)]
pub enum JoinOutcome {
    Joined(WorkerExit),
    /// Still running at the deadline; the handle is handed back
    TimedOut(Worker),
}

/// Handle to a running worker, owned by the coordinator
#[derive(Debug)]
pub struct Worker {
    index: usize,
    wake_signal: Signal,
    thread: Pthread,
    handle: JoinHandle<WorkerExit>,
    state: StateCell<WorkerState>,
}

impl Worker {
    /// Spawn worker `index`, listening for `wake_signal`
    ///
    /// The thread is created with every signal blocked so nothing reaches it
    /// before it has installed its own mask.
    pub fn spawn(index: usize, wake_signal: Signal) -> Result<Self, PoolError> {
        let state = StateCell::new(WorkerState::Created);
        let thread_state = state.clone();

        let previous = block_all_signals()?;
        let spawned = thread::Builder::new()
            .name(format!("sigpool-worker-{}", index))
            .spawn(move || worker_main(index, wake_signal, thread_state));
        if let Err(e) = restore_thread_mask(&previous) {
            log::error!("Failed to restore coordinator mask after spawn: {}", e);
        }

        let handle = spawned.map_err(|source| PoolError::Spawn { index, source })?;
        let thread = handle.as_pthread_t();

        Ok(Self {
            index,
            wake_signal,
            thread,
            handle,
            state,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn thread(&self) -> Pthread {
        self.thread
    }

    pub fn state(&self) -> WorkerState {
        self.state.get()
    }

    /// Shared view of the worker's state
    pub fn state_cell(&self) -> StateCell<WorkerState> {
        self.state.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the worker is past Configuring or its thread has ended
    ///
    /// Configuring never blocks, so this returns promptly.
    pub fn wait_configured(&self) -> WorkerState {
        loop {
            let state = self.state();
            if !matches!(state, WorkerState::Created | WorkerState::Configuring)
                || self.is_finished()
            {
                return state;
            }
            thread::sleep(READY_POLL);
        }
    }

    /// Send the wake-up signal to this worker's thread
    pub fn wake(&self) -> Result<(), PoolError> {
        let sig = self.wake_signal;
        log::info!(
            "worker {}: sending signal {} ({}) to thread {:?}",
            self.index,
            sig,
            sig as i32,
            self.thread
        );

        pthread_kill(self.thread, sig).map_err(|errno| PoolError::Delivery {
            index: self.index,
            signal: sig,
            errno,
        })?;

        log::info!(
            "worker {}: signal sent (signal={}/{}, thread={:?})",
            self.index,
            sig,
            sig as i32,
            self.thread
        );
        Ok(())
    }

    /// Block until the worker thread has terminated
    pub fn join(self) -> Result<WorkerExit, PoolError> {
        let index = self.index;
        let thread = self.thread;
        let state = self.state;

        match self.handle.join() {
            Ok(exit) => {
                state.set(WorkerState::Joined);
                log::info!(
                    "worker {}: joined (thread={:?}, status={})",
                    index,
                    thread,
                    exit.status()
                );
                Ok(exit)
            }
            Err(payload) => Err(PoolError::Join {
                index,
                reason: panic_message(payload.as_ref()),
            }),
        }
    }

    /// Join, giving up once `timeout` has elapsed
    pub fn join_timeout(self, timeout: Duration) -> Result<JoinOutcome, PoolError> {
        let deadline = Instant::now() + timeout;
        while !self.is_finished() {
            if Instant::now() >= deadline {
                return Ok(JoinOutcome::TimedOut(self));
            }
            thread::sleep(JOIN_POLL);
        }
        self.join().map(JoinOutcome::Joined)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "thread panicked".to_string()
    }
}

/// Worker thread body
fn worker_main(index: usize, wake_signal: Signal, state: StateCell<WorkerState>) -> WorkerExit {
    let thread = pthread_self();
    state.set(WorkerState::Configuring);
    log::info!("worker {}: thread started (thread={:?})", index, thread);

    let accepted = SignalSet::from_signals(&[wake_signal]);
    let exit = match configure_thread_mask(&accepted) {
        Err(e) => {
            log::error!("worker {}: cannot configure signal mask: {}", index, e);
            WorkerExit::ConfigurationFailed(e)
        }
        Ok(()) => {
            state.set(WorkerState::Waiting);
            log::info!(
                "worker {}: waiting for {} ({}) in thread {:?}",
                index,
                wake_signal,
                wake_signal as i32,
                thread
            );
            match wait_for_signal(&WaitPolicy::new(accepted)) {
                Ok(outcome) => WorkerExit::Woken(outcome.signal),
                Err(e) => WorkerExit::WaitFailed(e),
            }
        }
    };

    state.set(WorkerState::Exiting);
    log::info!(
        "worker {}: thread exiting (thread={:?}, status={})",
        index,
        thread,
        exit.status()
    );
    exit
}

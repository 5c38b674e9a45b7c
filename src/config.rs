//! Pool configuration

use nix::sys::signal::Signal;
use std::time::Duration;

use crate::signals::SignalSet;

/// Default number of worker threads
pub const DEFAULT_POOL_SIZE: usize = 4;

/// How the coordinator reacts when spawning a worker fails
///
/// Send and join failures are always logged and skipped; this only decides
/// whether pool creation carries on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartialFailurePolicy {
    /// Log the failure and keep spawning the remaining workers
    #[default]
    ContinueBestEffort,
    /// Stop creating workers, shut down the ones already running, exit 1
    FailFast,
}

/// Coordinator and pool settings
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of worker threads
    pub pool_size: usize,
    /// Signal sent to each worker to request its exit
    pub wake_signal: Signal,
    /// Signals the coordinator waits on
    pub terminal_signals: SignalSet,
    /// Terminal signals that are logged and waited past
    pub ignored_signals: SignalSet,
    pub failure_policy: PartialFailurePolicy,
    /// Upper bound on each worker join; None waits forever
    pub join_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            wake_signal: Signal::SIGUSR1,
            terminal_signals: SignalSet::from_signals(&[
                Signal::SIGQUIT,
                Signal::SIGTERM,
                Signal::SIGHUP,
                Signal::SIGINT,
            ]),
            ignored_signals: SignalSet::from_signals(&[Signal::SIGHUP]),
            failure_policy: PartialFailurePolicy::default(),
            join_timeout: None,
        }
    }
}

impl Config {
    /// Every signal the process installs a handler for
    pub fn handled_signals(&self) -> SignalSet {
        self.terminal_signals
            .union(&SignalSet::from_signals(&[self.wake_signal]))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_size == 0 {
            return Err(ConfigError::EmptyPool);
        }

        for sig in self.handled_signals().iter() {
            if matches!(sig, Signal::SIGKILL | Signal::SIGSTOP) {
                return Err(ConfigError::Uncatchable(sig));
            }
        }

        if self.terminal_signals.is_empty() {
            return Err(ConfigError::NoTerminalSignals);
        }

        if self.terminal_signals.contains(self.wake_signal) {
            return Err(ConfigError::WakeSignalIsTerminal(self.wake_signal));
        }

        if let Some(sig) = self
            .ignored_signals
            .iter()
            .find(|&sig| !self.terminal_signals.contains(sig))
        {
            return Err(ConfigError::IgnoredNotTerminal(sig));
        }

        if self.terminal_signals.is_subset(&self.ignored_signals) {
            return Err(ConfigError::AllIgnored);
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Pool size must be at least 1")]
    EmptyPool,

    #[error("{0} cannot be caught or blocked")]
    Uncatchable(Signal),

    #[error("No terminal signals configured")]
    NoTerminalSignals,

    #[error("Wake-up signal {0} is also a terminal signal")]
    WakeSignalIsTerminal(Signal),

    #[error("Ignored signal {0} is not a terminal signal")]
    IgnoredNotTerminal(Signal),

    #[error("Every terminal signal is ignored; the coordinator could never shut down")]
    AllIgnored,
}

//! Coordinator lifecycle
//!
//! The coordinator is the only thread that accepts the terminal signals.
//! It spawns the pool, waits for a terminal signal, wakes every worker and
//! joins them in creation order:
//!
//! 1. Init: install handlers, restrict own mask to the terminal set
//! 2. Spawning: create the workers and let each reach its wait
//! 3. Running: wait, swallowing ignorable signals
//! 4. Signaling: send the wake-up signal to each worker once
//! 5. Draining: join each worker
//! 6. Done
//!
//! The worker handles live in a `Vec` owned by `run()` and are lent to the
//! spawn/signal/join helpers; nothing else ever sees them.

use nix::sys::pthread::pthread_self;
use nix::sys::signal::Signal;
use std::time::Duration;

use super::state::{CoordinatorState, StateCell, WorkerState};
use super::worker::{JoinOutcome, Worker};
use super::PoolError;
use crate::config::{Config, ConfigError, PartialFailurePolicy};
use crate::signals::{
    configure_thread_mask, install_recording_handlers, wait_for_signal, WaitPolicy,
};

/// What happened during a coordinator run
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// Signal that ended the Running phase; None if the wait failed or never ran
    pub trigger: Option<Signal>,
    /// Ignorable signals swallowed while running
    pub ignored: u32,
    pub spawned: usize,
    /// Wake-up signals delivered
    pub sent: usize,
    pub joined: usize,
    /// Workers still running when their bounded join expired
    pub abandoned: usize,
    /// Pool creation stopped early under `FailFast`
    pub spawn_aborted: bool,
    /// Every logged-and-skipped failure, in the order it happened
    pub failures: Vec<PoolError>,
}

impl ShutdownReport {
    /// Process exit status for this run
    pub fn exit_code(&self) -> i32 {
        if self.spawn_aborted {
            1
        } else {
            0
        }
    }
}

/// Outcome of the Draining phase
#[derive(Debug, Default)]
pub struct DrainSummary {
    pub joined: usize,
    pub abandoned: usize,
    pub failures: Vec<PoolError>,
}

pub struct Coordinator {
    config: Config,
    state: StateCell<CoordinatorState>,
}

impl Coordinator {
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            state: StateCell::new(CoordinatorState::Init),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> CoordinatorState {
        self.state.get()
    }

    /// Shared view of the coordinator's state, usable from other threads
    pub fn state_cell(&self) -> StateCell<CoordinatorState> {
        self.state.clone()
    }

    fn enter(&self, state: CoordinatorState) {
        log::debug!("coordinator: {} -> {}", self.state.get().as_str(), state.as_str());
        self.state.set(state);
    }

    /// Install process-wide handlers and restrict this thread to the
    /// terminal signals
    pub fn init(&self) -> Result<(), PoolError> {
        install_recording_handlers(&self.config.handled_signals())?;
        configure_thread_mask(&self.config.terminal_signals)?;
        log::info!(
            "coordinator: thread {:?} set up signal mask [{}]",
            pthread_self(),
            self.config.terminal_signals
        );
        Ok(())
    }

    /// Run the whole lifecycle on the calling thread
    ///
    /// Only an Init failure is returned as an error; everything later is
    /// logged, recorded in the report, and shutdown carries on.
    pub fn run(self) -> Result<ShutdownReport, PoolError> {
        self.run_with(Worker::spawn)
    }

    fn run_with<F>(self, spawn: F) -> Result<ShutdownReport, PoolError>
    where
        F: FnMut(usize, Signal) -> Result<Worker, PoolError>,
    {
        self.init()?;
        log::info!("coordinator: started (main thread={:?})", pthread_self());

        let mut report = ShutdownReport::default();
        let mut workers = Vec::with_capacity(self.config.pool_size);

        self.enter(CoordinatorState::Spawning);
        match spawn_workers_with(&self.config, &mut workers, spawn) {
            Ok(failures) => report.failures.extend(failures),
            Err(e) => {
                log::error!("coordinator: aborting pool creation: {}", e);
                report.failures.push(e);
                report.spawn_aborted = true;
            }
        }
        report.spawned = workers.len();

        if !report.spawn_aborted {
            wait_workers_configured(&workers);
            self.enter(CoordinatorState::Running);
            let policy = WaitPolicy::new(self.config.terminal_signals.clone())
                .ignoring(self.config.ignored_signals.clone());
            log::info!(
                "coordinator: waiting for terminal signals [{}] (ignoring [{}])",
                policy.listen(),
                policy.ignore()
            );
            match wait_for_signal(&policy) {
                Ok(outcome) => {
                    log::info!(
                        "coordinator: shutting down on {} ({})",
                        outcome.signal,
                        outcome.signal as i32
                    );
                    report.trigger = Some(outcome.signal);
                    report.ignored = outcome.ignored;
                }
                Err(e) => {
                    log::error!("coordinator: {}; proceeding to shutdown", e);
                    report.failures.push(e.into());
                }
            }
        }

        self.enter(CoordinatorState::Signaling);
        let send_failures = signal_workers(&workers);
        report.sent = workers.len() - send_failures.len();
        report.failures.extend(send_failures);

        self.enter(CoordinatorState::Draining);
        let drain = join_workers(workers, self.config.join_timeout);
        report.joined = drain.joined;
        report.abandoned = drain.abandoned;
        report.failures.extend(drain.failures);

        self.enter(CoordinatorState::Done);
        log::info!(
            "coordinator: done (spawned={}, sent={}, joined={}, abandoned={}, failures={})",
            report.spawned,
            report.sent,
            report.joined,
            report.abandoned,
            report.failures.len()
        );
        Ok(report)
    }
}

/// Spawn `config.pool_size` workers into `workers`
///
/// Under `ContinueBestEffort` failures are logged and returned; under
/// `FailFast` the first failure stops the loop and is returned as the error.
pub fn spawn_workers(config: &Config, workers: &mut Vec<Worker>) -> Result<Vec<PoolError>, PoolError> {
    spawn_workers_with(config, workers, Worker::spawn)
}

fn spawn_workers_with<F>(
    config: &Config,
    workers: &mut Vec<Worker>,
    mut spawn: F,
) -> Result<Vec<PoolError>, PoolError>
where
    F: FnMut(usize, Signal) -> Result<Worker, PoolError>,
{
    log::info!("coordinator: starting {} workers", config.pool_size);
    let mut failures = Vec::new();

    for index in 0..config.pool_size {
        match spawn(index, config.wake_signal) {
            Ok(worker) => workers.push(worker),
            Err(e) => {
                log::error!("coordinator: {}", e);
                if config.failure_policy == PartialFailurePolicy::FailFast {
                    return Err(e);
                }
                failures.push(e);
            }
        }
    }

    log::info!(
        "coordinator: started {} of {} workers",
        workers.len(),
        config.pool_size
    );
    for worker in workers.iter() {
        log::info!("coordinator: worker[{}] = thread {:?}", worker.index(), worker.thread());
    }
    Ok(failures)
}

/// Block until every worker has configured its mask and entered its wait
///
/// A worker whose configuration failed has already moved on to Exiting and
/// is not waited for.
pub fn wait_workers_configured(workers: &[Worker]) {
    let waiting = workers
        .iter()
        .filter(|w| w.wait_configured() == WorkerState::Waiting)
        .count();
    log::info!(
        "coordinator: {} of {} workers waiting for their wake-up signal",
        waiting,
        workers.len()
    );
}

/// Send each worker its wake-up signal once, in creation order
pub fn signal_workers(workers: &[Worker]) -> Vec<PoolError> {
    log::info!("coordinator: stopping {} workers", workers.len());
    let mut failures = Vec::new();

    for worker in workers {
        if let Err(e) = worker.wake() {
            log::error!("coordinator: {}", e);
            failures.push(e);
        }
    }

    failures
}

/// Join each worker in creation order
///
/// With a timeout, a worker that has not finished in time is abandoned:
/// its handle is dropped and the thread is left to die with the process.
pub fn join_workers(workers: Vec<Worker>, timeout: Option<Duration>) -> DrainSummary {
    let total = workers.len();
    let mut summary = DrainSummary::default();

    for worker in workers {
        let index = worker.index();
        let result = match timeout {
            None => worker.join().map(JoinOutcome::Joined),
            Some(t) => worker.join_timeout(t),
        };

        match result {
            Ok(JoinOutcome::Joined(_)) => summary.joined += 1,
            Ok(JoinOutcome::TimedOut(worker)) => {
                log::warn!(
                    "coordinator: worker {} (thread {:?}) still {} after {:?}, abandoning it",
                    index,
                    worker.thread(),
                    worker.state().as_str(),
                    timeout.unwrap_or_default()
                );
                summary.abandoned += 1;
            }
            Err(e) => {
                log::error!("coordinator: {}", e);
                summary.failures.push(e);
            }
        }
    }

    log::info!("coordinator: stopped {} of {} workers", summary.joined, total);
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::wait_for_state;
    use crate::signals::SignalSet;
    use nix::sys::pthread::{pthread_kill, Pthread};
    use std::io;
    use std::sync::mpsc;
    use std::thread;

    /// Run a coordinator on its own thread, returning its thread, its state
    /// and a channel carrying the final report
    fn start(
        config: Config,
    ) -> (
        Pthread,
        StateCell<CoordinatorState>,
        mpsc::Receiver<Result<ShutdownReport, PoolError>>,
    ) {
        let (ready_tx, ready_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();

        thread::spawn(move || {
            let coordinator = Coordinator::new(config).unwrap();
            ready_tx.send((pthread_self(), coordinator.state_cell())).unwrap();
            let _ = done_tx.send(coordinator.run());
        });

        let (target, state) = ready_rx.recv().unwrap();
        assert!(wait_for_state(&state, CoordinatorState::Running, Duration::from_secs(5)));
        (target, state, done_rx)
    }

    #[test]
    fn test_report_exit_code() {
        let report = ShutdownReport::default();
        assert_eq!(report.exit_code(), 0);

        let report = ShutdownReport {
            spawn_aborted: true,
            ..Default::default()
        };
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = Config {
            pool_size: 0,
            ..Config::default()
        };
        assert!(Coordinator::new(config).is_err());
    }

    #[test]
    fn test_new_starts_in_init() {
        let coordinator = Coordinator::new(Config::default()).unwrap();
        assert_eq!(coordinator.state(), CoordinatorState::Init);
        assert_eq!(coordinator.config().pool_size, 4);
    }

    #[test]
    fn test_spawn_signal_join_helpers() {
        install_recording_handlers(&SignalSet::from_signals(&[Signal::SIGUSR1])).unwrap();
        let config = Config {
            pool_size: 3,
            ..Config::default()
        };

        let mut workers = Vec::new();
        let failures = spawn_workers(&config, &mut workers).unwrap();
        assert!(failures.is_empty());
        assert_eq!(workers.len(), 3);

        let indexes: Vec<usize> = workers.iter().map(|w| w.index()).collect();
        assert_eq!(indexes, vec![0, 1, 2]);

        for worker in &workers {
            assert!(wait_for_state(
                &worker.state_cell(),
                WorkerState::Waiting,
                Duration::from_secs(5)
            ));
        }

        assert!(signal_workers(&workers).is_empty());
        let cells: Vec<_> = workers.iter().map(|w| w.state_cell()).collect();
        let drain = join_workers(workers, Some(Duration::from_secs(5)));
        assert_eq!(drain.joined, 3);
        assert_eq!(drain.abandoned, 0);
        assert!(drain.failures.is_empty());
        assert!(cells.iter().all(|c| c.get() == WorkerState::Joined));
    }

    #[test]
    fn test_join_timeout_abandons_unwoken_workers() {
        install_recording_handlers(&SignalSet::from_signals(&[Signal::SIGUSR1])).unwrap();
        let config = Config {
            pool_size: 2,
            ..Config::default()
        };

        let mut workers = Vec::new();
        spawn_workers(&config, &mut workers).unwrap();

        let drain = join_workers(workers, Some(Duration::from_millis(50)));
        assert_eq!(drain.joined, 0);
        assert_eq!(drain.abandoned, 2);
    }

    #[test]
    fn test_hangup_ignored_then_terminate_shuts_down() {
        let config = Config {
            pool_size: 3,
            join_timeout: Some(Duration::from_secs(5)),
            ..Config::default()
        };
        let (target, state, done) = start(config);

        pthread_kill(target, Signal::SIGHUP).unwrap();
        pthread_kill(target, Signal::SIGTERM).unwrap();
        let report = done
            .recv_timeout(Duration::from_secs(10))
            .expect("coordinator did not finish")
            .unwrap();

        assert_eq!(state.get(), CoordinatorState::Done);
        assert_eq!(report.trigger, Some(Signal::SIGTERM));
        // Both may already be pending together, in which case TERM wins
        assert!(report.ignored <= 1, "ignored={}", report.ignored);
        assert_eq!(report.spawned, 3);
        assert_eq!(report.sent, 3);
        assert_eq!(report.joined, 3);
        assert_eq!(report.abandoned, 0);
        assert!(report.failures.is_empty(), "{:?}", report.failures);
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn test_hangup_alone_keeps_running() {
        let config = Config {
            pool_size: 2,
            join_timeout: Some(Duration::from_secs(5)),
            ..Config::default()
        };
        let (target, state, done) = start(config);

        pthread_kill(target, Signal::SIGHUP).unwrap();
        assert!(done.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(state.get(), CoordinatorState::Running);

        pthread_kill(target, Signal::SIGQUIT).unwrap();
        let report = done
            .recv_timeout(Duration::from_secs(10))
            .expect("coordinator did not finish")
            .unwrap();
        assert_eq!(report.trigger, Some(Signal::SIGQUIT));
        assert_eq!(report.ignored, 1);
        assert_eq!(report.joined, 2);
    }

    #[test]
    fn test_interrupt_wakes_every_worker_once() {
        let config = Config {
            pool_size: 4,
            join_timeout: Some(Duration::from_secs(5)),
            ..Config::default()
        };
        let (target, _state, done) = start(config);

        pthread_kill(target, Signal::SIGINT).unwrap();
        let report = done
            .recv_timeout(Duration::from_secs(10))
            .expect("coordinator did not finish")
            .unwrap();

        assert_eq!(report.trigger, Some(Signal::SIGINT));
        assert_eq!(report.ignored, 0);
        assert_eq!(report.sent, 4);
        assert_eq!(report.joined, 4);
    }

    #[test]
    fn test_terminate_before_running_is_not_lost() {
        let config = Config {
            pool_size: 4,
            join_timeout: Some(Duration::from_secs(5)),
            ..Config::default()
        };
        // Handlers first, so an early signal cannot take the default action
        install_recording_handlers(&config.handled_signals()).unwrap();

        let (ready_tx, ready_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        thread::spawn(move || {
            let coordinator = Coordinator::new(config).unwrap();
            ready_tx.send(pthread_self()).unwrap();
            let _ = done_tx.send(coordinator.run());
        });

        // Lands during Init or Spawning, well before the wait starts
        pthread_kill(ready_rx.recv().unwrap(), Signal::SIGTERM).unwrap();

        let report = done_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("early terminate was lost")
            .unwrap();
        assert_eq!(report.trigger, Some(Signal::SIGTERM));
        assert_eq!(report.spawned, 4);
        assert_eq!(report.sent, 4);
        assert_eq!(report.joined, 4);
        assert_eq!(report.abandoned, 0);
        assert_eq!(report.exit_code(), 0);
    }

    fn failing_at(bad: usize) -> impl FnMut(usize, Signal) -> Result<Worker, PoolError> {
        move |index, wake_signal| {
            if index == bad {
                Err(PoolError::Spawn {
                    index,
                    source: io::Error::from(io::ErrorKind::WouldBlock),
                })
            } else {
                Worker::spawn(index, wake_signal)
            }
        }
    }

    #[test]
    fn test_best_effort_spawn_skips_failed_worker() {
        install_recording_handlers(&SignalSet::from_signals(&[Signal::SIGUSR1])).unwrap();
        let config = Config {
            pool_size: 4,
            ..Config::default()
        };

        let mut workers = Vec::new();
        let failures = spawn_workers_with(&config, &mut workers, failing_at(1)).unwrap();
        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0], PoolError::Spawn { index: 1, .. }));

        let indexes: Vec<usize> = workers.iter().map(|w| w.index()).collect();
        assert_eq!(indexes, vec![0, 2, 3]);

        assert!(signal_workers(&workers).is_empty());
        let drain = join_workers(workers, Some(Duration::from_secs(5)));
        assert_eq!(drain.joined, 3);
    }

    #[test]
    fn test_fail_fast_spawn_stops_at_first_failure() {
        install_recording_handlers(&SignalSet::from_signals(&[Signal::SIGUSR1])).unwrap();
        let config = Config {
            pool_size: 4,
            failure_policy: PartialFailurePolicy::FailFast,
            ..Config::default()
        };

        let mut workers = Vec::new();
        let err = spawn_workers_with(&config, &mut workers, failing_at(2)).unwrap_err();
        assert!(matches!(err, PoolError::Spawn { index: 2, .. }));
        assert_eq!(workers.len(), 2);

        assert!(signal_workers(&workers).is_empty());
        let drain = join_workers(workers, Some(Duration::from_secs(5)));
        assert_eq!(drain.joined, 2);
    }

    #[test]
    fn test_fail_fast_run_shuts_down_partial_pool() {
        let config = Config {
            pool_size: 4,
            failure_policy: PartialFailurePolicy::FailFast,
            join_timeout: Some(Duration::from_secs(5)),
            ..Config::default()
        };

        let (done_tx, done_rx) = mpsc::channel();
        thread::spawn(move || {
            let coordinator = Coordinator::new(config).unwrap();
            let state = coordinator.state_cell();
            let result = coordinator.run_with(failing_at(2));
            let _ = done_tx.send((result, state.get()));
        });

        let (result, state) = done_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("coordinator did not finish");
        let report = result.unwrap();

        assert_eq!(state, CoordinatorState::Done);
        assert!(report.spawn_aborted);
        assert_eq!(report.exit_code(), 1);
        // Never reached Running
        assert_eq!(report.trigger, None);
        assert_eq!(report.spawned, 2);
        assert_eq!(report.sent, 2);
        assert_eq!(report.joined, 2);
        assert_eq!(report.abandoned, 0);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.failures[0], PoolError::Spawn { index: 2, .. }));
    }
}

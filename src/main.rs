//! sigpool - run a coordinator and a pool of signal-driven workers
//!
//! The main thread becomes the coordinator. Send it SIGINT, SIGTERM or
//! SIGQUIT to shut the pool down; SIGHUP is logged and ignored.

use clap::Parser;
use nix::sys::signal::Signal;
use std::time::Duration;

use sigpool::config::{Config, PartialFailurePolicy, DEFAULT_POOL_SIZE};
use sigpool::signals::{parse_signal, SignalSet};
use sigpool::Coordinator;

#[derive(Parser)]
#[command(name = "sigpool")]
#[command(about = "Coordinated signal handling across a pool of worker threads")]
#[command(
    long_about = "sigpool starts a fixed pool of worker threads, each waiting for a \
    wake-up signal, and blocks the main thread until a terminal signal arrives. \
    It then wakes every worker and joins them before exiting."
)]
struct Args {
    /// Number of worker threads
    #[arg(long, short = 'n', default_value_t = DEFAULT_POOL_SIZE)]
    workers: usize,

    /// Signal used to wake each worker for shutdown
    #[arg(long, value_parser = parse_signal, default_value = "SIGUSR1")]
    wake_signal: Signal,

    /// Signals the coordinator waits on (repeatable)
    #[arg(
        long = "terminal",
        value_name = "SIGNAL",
        value_parser = parse_signal,
        default_values = ["SIGQUIT", "SIGTERM", "SIGHUP", "SIGINT"]
    )]
    terminal: Vec<Signal>,

    /// Terminal signals that are logged and waited past (repeatable)
    #[arg(
        long = "ignore",
        value_name = "SIGNAL",
        value_parser = parse_signal,
        default_values = ["SIGHUP"]
    )]
    ignore: Vec<Signal>,

    /// Give up on a worker that has not exited this many seconds after being woken
    #[arg(long, value_name = "SECS")]
    join_timeout: Option<u64>,

    /// Stop creating workers at the first spawn failure and exit 1
    #[arg(long)]
    fail_fast: bool,
}

impl Args {
    fn into_config(self) -> Config {
        Config {
            pool_size: self.workers,
            wake_signal: self.wake_signal,
            terminal_signals: SignalSet::from_signals(&self.terminal),
            ignored_signals: SignalSet::from_signals(&self.ignore),
            failure_policy: if self.fail_fast {
                PartialFailurePolicy::FailFast
            } else {
                PartialFailurePolicy::ContinueBestEffort
            },
            join_timeout: self.join_timeout.map(Duration::from_secs),
        }
    }
}

fn main() {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let coordinator = match Coordinator::new(args.into_config()) {
        Ok(c) => c,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    match coordinator.run() {
        Ok(report) => {
            for failure in &report.failures {
                log::warn!("shutdown: {}", failure);
            }
            std::process::exit(report.exit_code());
        }
        Err(e) => {
            log::error!("Signal setup failed: {}", e);
            std::process::exit(1);
        }
    }
}

//! sigpool - Coordinated signal handling for a pool of threads
//!
//! A coordinator thread owns the terminal signals (quit, terminate, hangup,
//! interrupt) while every worker thread waits for a single wake-up signal
//! that the coordinator uses to request its shutdown.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                     Coordinator                      │
//! │ Init → Spawning → Running → Signaling → Draining     │
//! ├───────────────────────────┬──────────────────────────┤
//! │   Worker 0 .. N-1         │  mask = {wake signal}    │
//! │   Configuring → Waiting   │  sigwait → Exiting       │
//! ├───────────────────────────┴──────────────────────────┤
//! │   signals: set / mask / handler / wait               │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod pool;
pub mod signals;

pub use config::{Config, ConfigError, PartialFailurePolicy};
pub use pool::{Coordinator, CoordinatorState, PoolError, ShutdownReport, Worker, WorkerState};
pub use signals::{SignalError, SignalSet, WaitOutcome, WaitPolicy};

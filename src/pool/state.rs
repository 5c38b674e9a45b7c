//! Worker and coordinator lifecycle states
//!
//! Worker:
//!
//! ```text
//!     ┌─────────┐
//!     │ Created │
//!     └────┬────┘
//!     ┌────▼────────┐  mask failed
//!     │ Configuring │──────────────┐
//!     └────┬────────┘              │
//!     ┌────▼────┐                  │
//!     │ Waiting │ (sigwait)        │
//!     └────┬────┘                  │
//!     ┌────▼────┐◄─────────────────┘
//!     │ Exiting │
//!     └────┬────┘
//!     ┌────▼───┐
//!     │ Joined │
//!     └────────┘
//! ```
//!
//! Coordinator: Init → Spawning → Running → Signaling → Draining → Done

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// A lifecycle state that can be packed into a byte
pub trait Lifecycle: Copy {
    fn to_u8(self) -> u8;
    fn from_u8(raw: u8) -> Self;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Created,
    Configuring,
    Waiting,
    Exiting,
    Joined,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Configuring => "configuring",
            Self::Waiting => "waiting",
            Self::Exiting => "exiting",
            Self::Joined => "joined",
        }
    }
}

impl Lifecycle for WorkerState {
    fn to_u8(self) -> u8 {
        self as u8
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Created,
            1 => Self::Configuring,
            2 => Self::Waiting,
            3 => Self::Exiting,
            _ => Self::Joined,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Init,
    Spawning,
    Running,
    Signaling,
    Draining,
    Done,
}

impl CoordinatorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Spawning => "spawning",
            Self::Running => "running",
            Self::Signaling => "signaling",
            Self::Draining => "draining",
            Self::Done => "done",
        }
    }
}

impl Lifecycle for CoordinatorState {
    fn to_u8(self) -> u8 {
        self as u8
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Init,
            1 => Self::Spawning,
            2 => Self::Running,
            3 => Self::Signaling,
            4 => Self::Draining,
            _ => Self::Done,
        }
    }
}

/// Lock-free, shareable holder of a lifecycle state
///
/// Written only by the thread that owns the lifecycle; anyone holding a
/// clone may read it.
#[derive(Debug)]
pub struct StateCell<S> {
    raw: Arc<AtomicU8>,
    _state: PhantomData<fn() -> S>,
}

impl<S: Lifecycle> StateCell<S> {
    pub fn new(initial: S) -> Self {
        Self {
            raw: Arc::new(AtomicU8::new(initial.to_u8())),
            _state: PhantomData,
        }
    }

    pub fn get(&self) -> S {
        S::from_u8(self.raw.load(Ordering::Acquire))
    }

    pub fn set(&self, state: S) {
        self.raw.store(state.to_u8(), Ordering::Release);
    }
}

impl<S> Clone for StateCell<S> {
    fn clone(&self) -> Self {
        Self {
            raw: Arc::clone(&self.raw),
            _state: PhantomData,
        }
    }
}

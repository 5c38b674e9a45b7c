//! Ordered signal sets
//!
//! `SigSet` from nix is what the kernel consumes, but it cannot be iterated
//! in a stable order or printed nicely. `SignalSet` keeps the signals in the
//! order they were added so log lines and pool shutdown stay deterministic.

use nix::sys::signal::{SigSet, Signal};
use std::fmt;

/// Ordered, duplicate-free set of signals
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalSet {
    signals: Vec<Signal>,
}

impl SignalSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from a slice, dropping duplicates
    pub fn from_signals(signals: &[Signal]) -> Self {
        let mut set = Self::new();
        for &sig in signals {
            set.insert(sig);
        }
        set
    }

    /// Add a signal; returns false if it was already present
    pub fn insert(&mut self, sig: Signal) -> bool {
        if self.contains(sig) {
            return false;
        }
        self.signals.push(sig);
        true
    }

    pub fn contains(&self, sig: Signal) -> bool {
        self.signals.contains(&sig)
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Signal> + '_ {
        self.signals.iter().copied()
    }

    /// Signals present in either set, ours first
    pub fn union(&self, other: &SignalSet) -> SignalSet {
        let mut set = self.clone();
        for sig in other.iter() {
            set.insert(sig);
        }
        set
    }

    pub fn is_subset(&self, other: &SignalSet) -> bool {
        self.iter().all(|sig| other.contains(sig))
    }

    /// The set as the kernel sees it
    pub fn to_sigset(&self) -> SigSet {
        let mut set = SigSet::empty();
        for sig in self.iter() {
            set.add(sig);
        }
        set
    }

    /// Every signal not in this set
    pub fn complement(&self) -> SigSet {
        let mut set = SigSet::all();
        for sig in self.iter() {
            set.remove(sig);
        }
        set
    }
}

impl FromIterator<Signal> for SignalSet {
    fn from_iter<I: IntoIterator<Item = Signal>>(iter: I) -> Self {
        let mut set = Self::new();
        for sig in iter {
            set.insert(sig);
        }
        set
    }
}

impl fmt::Display for SignalSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.signals.iter().map(|s| s.as_str()).collect();
        write!(f, "{}", names.join(","))
    }
}

/// Parse a signal name or number
///
/// Accepts `SIGHUP`, `HUP`, `hup` and `1`. The error is a plain string so it
/// can be used directly as a clap value parser.
pub fn parse_signal(name: &str) -> Result<Signal, String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("empty signal name".to_string());
    }

    if let Ok(num) = trimmed.parse::<i32>() {
        return Signal::try_from(num).map_err(|_| format!("unknown signal number: {}", num));
    }

    let upper = trimmed.to_ascii_uppercase();
    let full = if upper.starts_with("SIG") {
        upper
    } else {
        format!("SIG{}", upper)
    };

    full.parse::<Signal>()
        .map_err(|_| format!("unknown signal: {}", name))
}

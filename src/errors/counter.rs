//! Monotonic Counters
//!
//! Counters are cheap, lock-free handles over a shared `AtomicU64`. Cloning a
//! counter clones the handle, not the value: every clone observes and bumps
//! the same count. This is how the dispatcher, the client proxy and the
//! background stats reporter share them without ambient globals.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A shared, monotonically increasing counter.
#[derive(Debug, Clone, Default)]
pub struct AtomicCounter {
    value: Arc<AtomicU64>,
}

impl AtomicCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one and returns the previous value.
    #[inline]
    pub fn increment(&self) -> u64 {
        self.value.fetch_add(1, Ordering::Relaxed)
    }

    /// Adds `delta` and returns the previous value.
    #[inline]
    pub fn add(&self, delta: u64) -> u64 {
        self.value.fetch_add(delta, Ordering::Relaxed)
    }

    /// Current value.
    #[inline]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Counters exposed by a running driver.
#[derive(Debug, Clone, Default)]
pub struct SystemCounters {
    /// Commands that failed, by rejection or unexpected fault
    pub errors: AtomicCounter,
    /// Commands handed to the dispatcher, including failed ones
    pub commands_received: AtomicCounter,
    /// Records with a type id the dispatcher does not know
    pub unknown_commands: AtomicCounter,
    /// Error responses dropped because the response buffer was full
    pub dropped_responses: AtomicCounter,
    /// Clients removed after missing their keepalive deadline
    pub client_timeouts: AtomicCounter,
}

impl SystemCounters {
    pub fn new() -> Self {
        Self::default()
    }
}

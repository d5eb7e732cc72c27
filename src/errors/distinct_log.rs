//! Deduplicating Error Log
//!
//! Misbehaving clients tend to send the same bad command over and over. The
//! log keeps one entry per distinct error, identified by its kind, code and
//! message, and counts repeat observations against that entry instead of
//! growing without bound.
//!
//! ```text
//! record(UNKNOWN_PUBLICATION "unknown publication: 12")  -> new entry   (count 1)
//! record(UNKNOWN_PUBLICATION "unknown publication: 12")  -> same entry  (count 2)
//! record(INVALID_CHANNEL     "invalid channel: foo")     -> new entry   (count 1)
//! ```
//!
//! Only the dispatcher thread records into the log. Appending a new entry
//! allocates, which is acceptable since faults are rare compared to
//! commands.

use crate::errors::CommandError;
use crate::protocol::ErrorCode;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Default upper bound on distinct entries.
pub const DEFAULT_MAX_DISTINCT_ERRORS: usize = 1024;

/// One distinct error and how often it has been seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorObservation {
    /// Error class, see [`CommandError::kind`]
    pub kind: &'static str,
    /// Code sent back to the client
    pub code: ErrorCode,
    /// Message text
    pub message: String,
    /// Number of times this error has been recorded
    pub observation_count: u64,
    /// Wall clock time of the first observation (ms since epoch)
    pub first_observation_ms: i64,
    /// Wall clock time of the most recent observation (ms since epoch)
    pub last_observation_ms: i64,
}

impl ErrorObservation {
    fn matches(&self, kind: &str, code: ErrorCode, message: &str) -> bool {
        self.kind == kind && self.code == code && self.message == message
    }
}

/// Log of distinct errors with observation counts.
#[derive(Debug)]
pub struct DistinctErrorLog {
    observations: Vec<ErrorObservation>,
    max_distinct: usize,
    unrecorded: u64,
}

/// Handle through which the log is injected into the dispatcher.
pub type SharedErrorLog = Arc<Mutex<DistinctErrorLog>>;

impl Default for DistinctErrorLog {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DISTINCT_ERRORS)
    }
}

impl DistinctErrorLog {
    /// Creates a log that holds at most `max_distinct` entries.
    pub fn new(max_distinct: usize) -> Self {
        Self {
            observations: Vec::new(),
            max_distinct,
            unrecorded: 0,
        }
    }

    /// Creates a log already wrapped in a shareable handle.
    pub fn shared(max_distinct: usize) -> SharedErrorLog {
        Arc::new(Mutex::new(Self::new(max_distinct)))
    }

    /// Records an observation of `error` at `now_ms`.
    ///
    /// Returns `false` if the error is new and the log is already full; the
    /// observation is then only counted in [`unrecorded`](Self::unrecorded).
    pub fn record(&mut self, error: &CommandError, now_ms: i64) -> bool {
        let (kind, code, message) = (error.kind(), error.code(), error.to_string());

        if let Some(existing) = self
            .observations
            .iter_mut()
            .find(|o| o.matches(kind, code, &message))
        {
            existing.observation_count += 1;
            existing.last_observation_ms = now_ms;
            return true;
        }

        if self.observations.len() >= self.max_distinct {
            self.unrecorded += 1;
            return false;
        }

        warn!(kind, code = %code, error = %message, "New distinct error");

        self.observations.push(ErrorObservation {
            kind,
            code,
            message,
            observation_count: 1,
            first_observation_ms: now_ms,
            last_observation_ms: now_ms,
        });
        true
    }

    /// All distinct errors in order of first observation.
    pub fn observations(&self) -> &[ErrorObservation] {
        &self.observations
    }

    /// Number of distinct errors held.
    pub fn distinct_count(&self) -> usize {
        self.observations.len()
    }

    /// Observations that were dropped because the log was full.
    pub fn unrecorded(&self) -> u64 {
        self.unrecorded
    }

    /// Total observations across all entries.
    pub fn total_observations(&self) -> u64 {
        self.observations
            .iter()
            .map(|o| o.observation_count)
            .sum()
    }
}

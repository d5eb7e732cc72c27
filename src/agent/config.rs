//! Driver Configuration

use crate::conductor::registry::DEFAULT_CLIENT_LIVENESS_TIMEOUT;
use crate::errors::distinct_log::DEFAULT_MAX_DISTINCT_ERRORS;
use std::time::Duration;

/// Configuration for a driver instance.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Capacity of the command queue in bytes, a power of two (default: 64 KiB)
    pub command_queue_capacity: usize,

    /// Capacity of the to-clients response buffer in bytes (default: 64 KiB)
    pub response_buffer_capacity: usize,

    /// Maximum number of distinct errors kept in the error log (default: 1024)
    pub error_log_capacity: usize,

    /// Silence after which a client and its registrations are removed (default: 10s)
    pub client_liveness_timeout: Duration,

    /// Pause between duty cycles that found no work (default: 1ms)
    pub idle_sleep: Duration,

    /// Interval between stats reports (default: 5s)
    pub stats_interval: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            command_queue_capacity: 64 * 1024,
            response_buffer_capacity: 64 * 1024,
            error_log_capacity: DEFAULT_MAX_DISTINCT_ERRORS,
            client_liveness_timeout: DEFAULT_CLIENT_LIVENESS_TIMEOUT,
            idle_sleep: Duration::from_millis(1),
            stats_interval: Duration::from_secs(5),
        }
    }
}

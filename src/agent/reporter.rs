//! Background Stats Reporter
//!
//! A Tokio task that periodically logs the driver's counters. It only reads
//! shared state: counters are atomics and the error log lock is taken just
//! long enough to read its size.

use crate::errors::{SharedErrorLog, SystemCounters};
use std::sync::PoisonError;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Point-in-time view of the driver counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub commands_received: u64,
    pub errors: u64,
    pub unknown_commands: u64,
    pub dropped_responses: u64,
    pub client_timeouts: u64,
    pub distinct_errors: usize,
}

impl StatsSnapshot {
    /// Reads the current counter values.
    pub fn capture(counters: &SystemCounters, error_log: &SharedErrorLog) -> Self {
        let distinct_errors = error_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .distinct_count();

        Self {
            commands_received: counters.commands_received.get(),
            errors: counters.errors.get(),
            unknown_commands: counters.unknown_commands.get(),
            dropped_responses: counters.dropped_responses.get(),
            client_timeouts: counters.client_timeouts.get(),
            distinct_errors,
        }
    }
}

/// A handle to the running stats reporter.
///
/// When this handle is dropped, the reporter task will be stopped.
#[derive(Debug)]
pub struct StatsReporter {
    shutdown_tx: watch::Sender<bool>,
    reports: watch::Receiver<StatsSnapshot>,
}

impl StatsReporter {
    /// Starts the reporter as a background task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(counters: SystemCounters, error_log: SharedErrorLog, interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (report_tx, reports) = watch::channel(StatsSnapshot::default());

        tokio::spawn(reporter_loop(counters, error_log, interval, shutdown_rx, report_tx));

        info!(interval_ms = interval.as_millis() as u64, "Stats reporter started");

        Self {
            shutdown_tx,
            reports,
        }
    }

    /// The most recently reported snapshot.
    pub fn last_report(&self) -> StatsSnapshot {
        *self.reports.borrow()
    }

    /// Stops the reporter.
    ///
    /// This is called automatically when the handle is dropped.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for StatsReporter {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn reporter_loop(
    counters: SystemCounters,
    error_log: SharedErrorLog,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
    report_tx: watch::Sender<StatsSnapshot>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Stats reporter received shutdown signal");
                    return;
                }
            }
        }

        let snapshot = StatsSnapshot::capture(&counters, &error_log);
        info!(
            commands = snapshot.commands_received,
            errors = snapshot.errors,
            distinct_errors = snapshot.distinct_errors,
            dropped_responses = snapshot.dropped_responses,
            unknown_commands = snapshot.unknown_commands,
            client_timeouts = snapshot.client_timeouts,
            "Driver stats"
        );
        let _ = report_tx.send(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{CommandError, DistinctErrorLog};
    use crate::protocol::ErrorCode;

    #[test]
    fn test_snapshot_reads_counters() {
        let counters = SystemCounters::new();
        let error_log = DistinctErrorLog::shared(8);

        counters.commands_received.add(5);
        counters.errors.add(2);
        counters.dropped_responses.increment();
        error_log.lock().unwrap().record(
            &CommandError::rejected(ErrorCode::InvalidChannel, "bad"),
            0,
        );

        let snapshot = StatsSnapshot::capture(&counters, &error_log);
        assert_eq!(snapshot.commands_received, 5);
        assert_eq!(snapshot.errors, 2);
        assert_eq!(snapshot.dropped_responses, 1);
        assert_eq!(snapshot.distinct_errors, 1);
        assert_eq!(snapshot.client_timeouts, 0);
    }

    #[tokio::test]
    async fn test_reporter_publishes_snapshots() {
        let counters = SystemCounters::new();
        let error_log = DistinctErrorLog::shared(8);
        counters.errors.add(3);

        let reporter = StatsReporter::start(counters.clone(), error_log, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(reporter.last_report().errors, 3);
    }

    #[tokio::test]
    async fn test_reporter_stops_on_drop() {
        let counters = SystemCounters::new();
        let error_log = DistinctErrorLog::shared(8);

        let mut reports = {
            let reporter =
                StatsReporter::start(counters.clone(), error_log, Duration::from_millis(10));
            let reports = reporter.reports.clone();
            tokio::time::sleep(Duration::from_millis(30)).await;
            reports
            // Reporter is dropped here
        };

        // The task exits and drops its sender, closing the channel
        let closed = tokio::time::timeout(Duration::from_secs(1), async {
            while reports.changed().await.is_ok() {}
        })
        .await;
        tokio_test::assert_ok!(closed);
    }
}

//! Driver Hosting Module
//!
//! Everything needed to run the dispatcher as a live driver:
//!
//! - [`DriverConfig`]: buffer sizes, timeouts and intervals
//! - [`DriverAgent`]: one duty cycle of command draining and housekeeping
//! - [`AgentRunner`]: runs the agent on a dedicated thread
//! - [`StatsReporter`]: a Tokio task that logs counters periodically
//!
//! The duty cycle busy-polls the command queue, so it runs on a plain OS
//! thread and never on a Tokio worker.

pub mod config;
pub mod duty_cycle;
pub mod reporter;

pub use config::DriverConfig;
pub use duty_cycle::{AgentRunner, DriverAgent};
pub use reporter::{StatsReporter, StatsSnapshot};

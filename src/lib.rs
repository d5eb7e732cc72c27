//! # FlashDriver - Control-Plane Command Dispatcher
//!
//! FlashDriver is the front door of a low-latency messaging driver. Clients
//! write binary commands into a shared ring buffer; a single duty cycle
//! thread drains them, decodes them in place and routes each one to the
//! conductor that owns publications, subscriptions and client liveness.
//!
//! ## Features
//!
//! - **Wait-Free Hand-Off**: Many client threads write commands without
//!   blocking each other or the driver
//! - **Zero-Copy Decoding**: Commands are read through flyweight views over
//!   the queue; only the channel string is copied out
//! - **Fault Isolation**: A malformed or rejected command produces an error
//!   response and a log entry, never a stalled driver
//! - **Channel Routing**: In-process, spy and network registrations are told
//!   apart by their channel prefix
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                             FlashDriver                              │
//! │                                                                      │
//! │  ┌─────────────┐    ┌─────────────────────┐    ┌──────────────────┐  │
//! │  │ DriverProxy │───>│ ManyToOneRingBuffer │───>│  ClientListener  │  │
//! │  │  (clients)  │    │   (command queue)   │    │ (≤10 per cycle)  │  │
//! │  └─────────────┘    └─────────────────────┘    └────────┬─────────┘  │
//! │         ▲                                               │            │
//! │         │                                               ▼            │
//! │  ┌──────┴──────────────┐  ┌─────────────┐  ┌───────────────────────┐ │
//! │  │ ManyToOneRingBuffer │<─│ ClientProxy │<─│ RegistrationConductor │ │
//! │  │     (responses)     │  │  (on error) │  │                       │ │
//! │  └─────────────────────┘  └─────────────┘  └───────────────────────┘ │
//! │                                                                      │
//! │  AgentRunner (duty cycle thread)       StatsReporter (Tokio task)    │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use flashdriver::agent::{AgentRunner, DriverAgent, DriverConfig};
//! use flashdriver::client::DriverProxy;
//! use std::sync::Arc;
//!
//! let config = DriverConfig::default();
//! let agent = DriverAgent::new(&config)?;
//! let to_driver = Arc::clone(agent.to_driver());
//!
//! let _runner = AgentRunner::start(agent, config.idle_sleep)?;
//!
//! let mut client = DriverProxy::new(to_driver, 1);
//! let registration_id = client.add_publication("aeron:ipc", 1001)?;
//! ```
//!
//! ## Module Overview
//!
//! - [`queue`]: Many-to-one ring buffer used for commands and responses
//! - [`protocol`]: Command ids, error codes, flyweight decoders and encoders
//! - [`dispatch`]: The command listener
//! - [`conductor`]: Conductor interface and the in-memory registry
//! - [`client`]: Response channel plus the client side of the protocol
//! - [`errors`]: Command errors, counters and the distinct error log
//! - [`agent`]: Duty cycle, runner thread and stats reporter

pub mod agent;
pub mod client;
pub mod conductor;
pub mod dispatch;
pub mod errors;
pub mod protocol;
pub mod queue;

// Re-export commonly used types for convenience
pub use agent::{AgentRunner, DriverAgent, DriverConfig, StatsReporter};
pub use client::{ClientProxy, DriverProxy, ResponseChannel};
pub use conductor::{DriverConductor, RegistrationConductor};
pub use dispatch::{ClientListener, MESSAGE_COUNT_LIMIT};
pub use errors::{CommandError, CommandResult, DistinctErrorLog, SystemCounters};
pub use protocol::{DecodeError, ErrorCode};
pub use queue::{ManyToOneRingBuffer, QueueError, RingBufferConsumer};

/// Version of FlashDriver
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

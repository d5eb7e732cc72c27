//! Command Queue Module
//!
//! The command queue is the single point of concurrent access in the driver:
//! many client threads write commands into it without blocking, and the
//! driver's duty cycle thread drains them in order.
//!
//! ## Architecture
//!
//! ```text
//!  ┌──────────┐  ┌──────────┐  ┌──────────┐
//!  │ Client A │  │ Client B │  │ Client C │     write() - CAS on tail
//!  └────┬─────┘  └────┬─────┘  └────┬─────┘
//!       │             │             │
//!       ▼             ▼             ▼
//! ┌─────────────────────────────────────────┐
//! │          ManyToOneRingBuffer            │
//! │  [len|type|payload][len|type|payload].. │
//! └────────────────────┬────────────────────┘
//!                      │ read(handler, limit)
//!                      ▼
//!             ┌──────────────────┐
//!             │RingBufferConsumer│  (exactly one)
//!             └──────────────────┘
//! ```
//!
//! The same buffer type carries error responses from the driver back to
//! clients.

pub mod ring_buffer;

use thiserror::Error;

pub use ring_buffer::{ManyToOneRingBuffer, RingBufferConsumer, HEADER_LENGTH};

/// Errors that can occur when using a ring buffer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// Capacity must be a power of two and not too small
    #[error("invalid ring buffer capacity: {0}")]
    InvalidCapacity(usize),

    /// Message type ids must be positive
    #[error("invalid message type id: {0}")]
    InvalidMessageType(i32),

    /// The payload exceeds the maximum record size
    #[error("message too long: {length} bytes (max: {max})")]
    MessageTooLong { length: usize, max: usize },

    /// Not enough free space for the record right now
    #[error("insufficient capacity in ring buffer")]
    InsufficientCapacity,

    /// Another consumer already owns the reading side
    #[error("ring buffer consumer already claimed")]
    ConsumerClaimed,
}

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

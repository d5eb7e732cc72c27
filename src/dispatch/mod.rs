//! Command Dispatch Module
//!
//! The driver-side end of the command queue. [`ClientListener`] turns raw
//! queue records into conductor calls and isolates every failure to the
//! message that caused it.

pub mod listener;

pub use listener::{ClientListener, MESSAGE_COUNT_LIMIT};

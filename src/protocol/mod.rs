//! Control Protocol Implementation
//!
//! This module defines the binary commands clients send to the driver and the
//! error responses the driver sends back.
//!
//! ## Modules
//!
//! - `control`: Command type ids, error codes and channel literals
//! - `flyweight`: Zero-copy views over command records, plus encoders
//!
//! ## Example
//!
//! ```
//! use flashdriver::protocol::{encode_channel_message, PublicationMessageFlyweight};
//! use bytes::BytesMut;
//!
//! let mut buf = BytesMut::new();
//! encode_channel_message(&mut buf, 1, 100, 10, "aeron:ipc");
//!
//! let msg = PublicationMessageFlyweight::wrap(&buf, 0);
//! assert_eq!(msg.correlation_id(), Ok(100));
//! assert_eq!(msg.channel().unwrap(), "aeron:ipc");
//! ```

pub mod control;
pub mod flyweight;

// Re-export commonly used types for convenience
pub use control::{command, response, ErrorCode, CHANNEL_PREFIX, IPC_CHANNEL, SPY_PREFIX};
pub use flyweight::{
    encode_channel_message, encode_correlated, encode_destination_message,
    encode_error_response, encode_remove_message, CorrelatedMessageFlyweight, DecodeError,
    DecodeResult, DestinationMessageFlyweight, ErrorResponseFlyweight,
    PublicationMessageFlyweight, RemoveMessageFlyweight, SubscriptionMessageFlyweight,
};

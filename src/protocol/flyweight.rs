//! Zero-Copy Command Flyweights
//!
//! A flyweight is a typed view over a region of a byte buffer. Wrapping a
//! flyweight copies nothing: it records the buffer borrow and an offset, and
//! each accessor reads its field from a fixed offset on demand.
//!
//! ## Layouts
//!
//! All numeric fields are little-endian. Every command starts with the
//! correlated header:
//!
//! ```text
//!  0                   8                   16
//!  ├───────────────────┼───────────────────┤
//!  │ client id (i64)   │ correlation (i64) │
//!  └───────────────────┴───────────────────┘
//! ```
//!
//! - Publication / subscription: `stream id i32 @16`, `channel length i32 @20`,
//!   `channel @24`
//! - Remove: `registration id i64 @16`
//! - Destination: `registration correlation id i64 @16`,
//!   `channel length i32 @24`, `channel @28`
//! - Error response: `offending correlation id i64 @0`, `error code i32 @8`,
//!   `message length i32 @12`, `message @16`
//!
//! ## Bounds
//!
//! The flyweights check only what is needed to read a field without going
//! past the end of the slice. A short record surfaces as
//! [`DecodeError::Truncated`] on the first field that does not fit, so any
//! field read before that point is still usable by the caller.
//!
//! The encoders at the bottom of this module write the same layouts into a
//! `BytesMut` and are what clients (and tests) use to build commands.

use crate::protocol::control::ErrorCode;
use bytes::{BufMut, BytesMut};
use thiserror::Error;

/// Errors that can occur while reading a command.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The record ends before the field being read
    #[error("truncated record: need {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// A length prefix is negative
    #[error("invalid length prefix: {0}")]
    InvalidLength(i32),

    /// The channel bytes are not valid UTF-8
    #[error("invalid channel encoding: {0}")]
    InvalidChannelEncoding(String),
}

/// Result type for decoding operations.
pub type DecodeResult<T> = Result<T, DecodeError>;

const SIZE_OF_I32: usize = 4;
const SIZE_OF_I64: usize = 8;

const CLIENT_ID_OFFSET: usize = 0;
const CORRELATION_ID_OFFSET: usize = CLIENT_ID_OFFSET + SIZE_OF_I64;

/// Length of the correlated header shared by every command.
pub const CORRELATED_MESSAGE_LENGTH: usize = CORRELATION_ID_OFFSET + SIZE_OF_I64;

const STREAM_ID_OFFSET: usize = CORRELATED_MESSAGE_LENGTH;
const CHANNEL_OFFSET: usize = STREAM_ID_OFFSET + SIZE_OF_I32;

const REGISTRATION_ID_OFFSET: usize = CORRELATED_MESSAGE_LENGTH;

/// Length of a remove command.
pub const REMOVE_MESSAGE_LENGTH: usize = REGISTRATION_ID_OFFSET + SIZE_OF_I64;

const REGISTRATION_CORRELATION_ID_OFFSET: usize = CORRELATED_MESSAGE_LENGTH;
const DESTINATION_CHANNEL_OFFSET: usize = REGISTRATION_CORRELATION_ID_OFFSET + SIZE_OF_I64;

const OFFENDING_CORRELATION_ID_OFFSET: usize = 0;
const ERROR_CODE_OFFSET: usize = OFFENDING_CORRELATION_ID_OFFSET + SIZE_OF_I64;
const ERROR_MESSAGE_OFFSET: usize = ERROR_CODE_OFFSET + SIZE_OF_I32;

/// Returns the `N` bytes at `index`, or `Truncated` if they are not there.
#[inline]
fn field<const N: usize>(buffer: &[u8], index: usize) -> DecodeResult<[u8; N]> {
    buffer
        .get(index..index + N)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or(DecodeError::Truncated {
            offset: index,
            needed: N,
            available: buffer.len().saturating_sub(index),
        })
}

#[inline]
fn read_i64(buffer: &[u8], index: usize) -> DecodeResult<i64> {
    field::<SIZE_OF_I64>(buffer, index).map(i64::from_le_bytes)
}

#[inline]
fn read_i32(buffer: &[u8], index: usize) -> DecodeResult<i32> {
    field::<SIZE_OF_I32>(buffer, index).map(i32::from_le_bytes)
}

/// Borrows a length-prefixed UTF-8 string starting at `index`.
fn read_str(buffer: &[u8], index: usize) -> DecodeResult<&str> {
    let length = read_i32(buffer, index)?;
    if length < 0 {
        return Err(DecodeError::InvalidLength(length));
    }

    let start = index + SIZE_OF_I32;
    let length = length as usize;
    let bytes = buffer
        .get(start..start + length)
        .ok_or(DecodeError::Truncated {
            offset: start,
            needed: length,
            available: buffer.len().saturating_sub(start),
        })?;

    std::str::from_utf8(bytes).map_err(|e| DecodeError::InvalidChannelEncoding(e.to_string()))
}

// ============================================================================
// Command flyweights
// ============================================================================

/// Header shared by all commands; on its own it is the keepalive command.
#[derive(Debug, Clone, Copy)]
pub struct CorrelatedMessageFlyweight<'a> {
    buffer: &'a [u8],
    offset: usize,
}

impl<'a> CorrelatedMessageFlyweight<'a> {
    /// Wraps the region of `buffer` starting at `offset`.
    #[inline]
    pub fn wrap(buffer: &'a [u8], offset: usize) -> Self {
        Self { buffer, offset }
    }

    /// Id of the client that sent the command.
    #[inline]
    pub fn client_id(&self) -> DecodeResult<i64> {
        read_i64(self.buffer, self.offset + CLIENT_ID_OFFSET)
    }

    /// Caller-chosen id echoed back on rejection.
    #[inline]
    pub fn correlation_id(&self) -> DecodeResult<i64> {
        read_i64(self.buffer, self.offset + CORRELATION_ID_OFFSET)
    }
}

/// View over an add-publication command.
#[derive(Debug, Clone, Copy)]
pub struct PublicationMessageFlyweight<'a> {
    header: CorrelatedMessageFlyweight<'a>,
}

impl<'a> PublicationMessageFlyweight<'a> {
    #[inline]
    pub fn wrap(buffer: &'a [u8], offset: usize) -> Self {
        Self {
            header: CorrelatedMessageFlyweight::wrap(buffer, offset),
        }
    }

    #[inline]
    pub fn client_id(&self) -> DecodeResult<i64> {
        self.header.client_id()
    }

    #[inline]
    pub fn correlation_id(&self) -> DecodeResult<i64> {
        self.header.correlation_id()
    }

    #[inline]
    pub fn stream_id(&self) -> DecodeResult<i32> {
        read_i32(self.header.buffer, self.header.offset + STREAM_ID_OFFSET)
    }

    /// Copies the channel out of the buffer.
    ///
    /// This is the one allocation made per command: the conductor may keep
    /// the channel after the record has been released back to the queue.
    pub fn channel(&self) -> DecodeResult<String> {
        read_str(self.header.buffer, self.header.offset + CHANNEL_OFFSET).map(str::to_owned)
    }
}

/// View over an add-subscription command.
#[derive(Debug, Clone, Copy)]
pub struct SubscriptionMessageFlyweight<'a> {
    header: CorrelatedMessageFlyweight<'a>,
}

impl<'a> SubscriptionMessageFlyweight<'a> {
    #[inline]
    pub fn wrap(buffer: &'a [u8], offset: usize) -> Self {
        Self {
            header: CorrelatedMessageFlyweight::wrap(buffer, offset),
        }
    }

    #[inline]
    pub fn client_id(&self) -> DecodeResult<i64> {
        self.header.client_id()
    }

    #[inline]
    pub fn correlation_id(&self) -> DecodeResult<i64> {
        self.header.correlation_id()
    }

    #[inline]
    pub fn stream_id(&self) -> DecodeResult<i32> {
        read_i32(self.header.buffer, self.header.offset + STREAM_ID_OFFSET)
    }

    pub fn channel(&self) -> DecodeResult<String> {
        read_str(self.header.buffer, self.header.offset + CHANNEL_OFFSET).map(str::to_owned)
    }
}

/// View over a remove-publication or remove-subscription command.
#[derive(Debug, Clone, Copy)]
pub struct RemoveMessageFlyweight<'a> {
    header: CorrelatedMessageFlyweight<'a>,
}

impl<'a> RemoveMessageFlyweight<'a> {
    #[inline]
    pub fn wrap(buffer: &'a [u8], offset: usize) -> Self {
        Self {
            header: CorrelatedMessageFlyweight::wrap(buffer, offset),
        }
    }

    #[inline]
    pub fn client_id(&self) -> DecodeResult<i64> {
        self.header.client_id()
    }

    #[inline]
    pub fn correlation_id(&self) -> DecodeResult<i64> {
        self.header.correlation_id()
    }

    /// Correlation id of the add command that created the registration.
    #[inline]
    pub fn registration_id(&self) -> DecodeResult<i64> {
        read_i64(self.header.buffer, self.header.offset + REGISTRATION_ID_OFFSET)
    }
}

/// View over an add-destination or remove-destination command.
#[derive(Debug, Clone, Copy)]
pub struct DestinationMessageFlyweight<'a> {
    header: CorrelatedMessageFlyweight<'a>,
}

impl<'a> DestinationMessageFlyweight<'a> {
    #[inline]
    pub fn wrap(buffer: &'a [u8], offset: usize) -> Self {
        Self {
            header: CorrelatedMessageFlyweight::wrap(buffer, offset),
        }
    }

    #[inline]
    pub fn client_id(&self) -> DecodeResult<i64> {
        self.header.client_id()
    }

    #[inline]
    pub fn correlation_id(&self) -> DecodeResult<i64> {
        self.header.correlation_id()
    }

    #[inline]
    pub fn registration_correlation_id(&self) -> DecodeResult<i64> {
        read_i64(
            self.header.buffer,
            self.header.offset + REGISTRATION_CORRELATION_ID_OFFSET,
        )
    }

    pub fn channel(&self) -> DecodeResult<String> {
        read_str(
            self.header.buffer,
            self.header.offset + DESTINATION_CHANNEL_OFFSET,
        )
        .map(str::to_owned)
    }
}

/// View over an error response sent back to a client.
#[derive(Debug, Clone, Copy)]
pub struct ErrorResponseFlyweight<'a> {
    buffer: &'a [u8],
    offset: usize,
}

impl<'a> ErrorResponseFlyweight<'a> {
    #[inline]
    pub fn wrap(buffer: &'a [u8], offset: usize) -> Self {
        Self { buffer, offset }
    }

    /// Correlation id of the command that was rejected.
    #[inline]
    pub fn offending_correlation_id(&self) -> DecodeResult<i64> {
        read_i64(self.buffer, self.offset + OFFENDING_CORRELATION_ID_OFFSET)
    }

    #[inline]
    pub fn error_code(&self) -> DecodeResult<ErrorCode> {
        read_i32(self.buffer, self.offset + ERROR_CODE_OFFSET).map(ErrorCode::from_i32)
    }

    /// Borrows the message text without copying it.
    pub fn error_message(&self) -> DecodeResult<&'a str> {
        read_str(self.buffer, self.offset + ERROR_MESSAGE_OFFSET)
    }
}

// ============================================================================
// Encoders
// ============================================================================

#[inline]
fn put_str(buf: &mut BytesMut, value: &str) {
    buf.put_i32_le(value.len() as i32);
    buf.put_slice(value.as_bytes());
}

/// Appends a correlated header (the complete keepalive command).
pub fn encode_correlated(buf: &mut BytesMut, client_id: i64, correlation_id: i64) {
    buf.reserve(CORRELATED_MESSAGE_LENGTH);
    buf.put_i64_le(client_id);
    buf.put_i64_le(correlation_id);
}

/// Appends an add-publication or add-subscription command.
pub fn encode_channel_message(
    buf: &mut BytesMut,
    client_id: i64,
    correlation_id: i64,
    stream_id: i32,
    channel: &str,
) {
    buf.reserve(CHANNEL_OFFSET + SIZE_OF_I32 + channel.len());
    encode_correlated(buf, client_id, correlation_id);
    buf.put_i32_le(stream_id);
    put_str(buf, channel);
}

/// Appends a remove-publication or remove-subscription command.
pub fn encode_remove_message(
    buf: &mut BytesMut,
    client_id: i64,
    correlation_id: i64,
    registration_id: i64,
) {
    buf.reserve(REMOVE_MESSAGE_LENGTH);
    encode_correlated(buf, client_id, correlation_id);
    buf.put_i64_le(registration_id);
}

/// Appends an add-destination or remove-destination command.
pub fn encode_destination_message(
    buf: &mut BytesMut,
    client_id: i64,
    correlation_id: i64,
    registration_correlation_id: i64,
    channel: &str,
) {
    buf.reserve(DESTINATION_CHANNEL_OFFSET + SIZE_OF_I32 + channel.len());
    encode_correlated(buf, client_id, correlation_id);
    buf.put_i64_le(registration_correlation_id);
    put_str(buf, channel);
}

/// Appends an error response.
pub fn encode_error_response(
    buf: &mut BytesMut,
    offending_correlation_id: i64,
    code: ErrorCode,
    message: &str,
) {
    buf.reserve(ERROR_MESSAGE_OFFSET + SIZE_OF_I32 + message.len());
    buf.put_i64_le(offending_correlation_id);
    buf.put_i32_le(code.value());
    put_str(buf, message);
}

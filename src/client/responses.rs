//! Client-side reading of driver responses.

use crate::protocol::control::response;
use crate::protocol::{DecodeResult, ErrorCode, ErrorResponseFlyweight};
use crate::queue::RingBufferConsumer;
use tracing::warn;

/// An error response decoded from the to-clients buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Correlation id of the rejected command
    pub correlation_id: i64,
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorResponse {
    /// Decodes a response record payload.
    pub fn decode(buffer: &[u8]) -> DecodeResult<Self> {
        let flyweight = ErrorResponseFlyweight::wrap(buffer, 0);
        Ok(Self {
            correlation_id: flyweight.offending_correlation_id()?,
            code: flyweight.error_code()?,
            message: flyweight.error_message()?.to_owned(),
        })
    }
}

/// Drains up to `limit` records and returns the error responses among them.
///
/// Malformed responses are logged and skipped.
pub fn read_error_responses(consumer: &mut RingBufferConsumer, limit: usize) -> Vec<ErrorResponse> {
    let mut responses = Vec::new();

    consumer.read(
        |msg_type_id, buffer| {
            if msg_type_id != response::ON_ERROR {
                return;
            }
            match ErrorResponse::decode(buffer) {
                Ok(response) => responses.push(response),
                Err(e) => warn!(error = %e, "Malformed error response"),
            }
        },
        limit,
    );

    responses
}

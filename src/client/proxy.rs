//! Response Channel
//!
//! The dispatcher tells a client that its command was rejected through a
//! [`ResponseChannel`]. Notifications are fire-and-forget: the dispatcher
//! never waits for the client and never retries.
//!
//! [`ClientProxy`] is the production implementation. It encodes an error
//! response and offers it to the to-clients ring buffer. If that buffer is
//! full the response is dropped and counted, since stalling the duty cycle
//! would hurt every client, not only the slow one.

use crate::errors::AtomicCounter;
use crate::protocol::control::response;
use crate::protocol::{encode_error_response, ErrorCode};
use crate::queue::ManyToOneRingBuffer;
use bytes::BytesMut;
use std::sync::Arc;
use tracing::debug;

/// Size of the fixed part of an error response (correlation, code, length).
const ERROR_RESPONSE_HEADER_LENGTH: usize = 16;

/// Outbound notifications to clients.
pub trait ResponseChannel {
    /// Tells the client that issued `correlation_id` that it was rejected.
    ///
    /// Must not block. Failures to deliver are absorbed by the implementation.
    fn on_error(&mut self, code: ErrorCode, message: &str, correlation_id: i64);
}

/// Writes error responses to the to-clients buffer.
#[derive(Debug)]
pub struct ClientProxy {
    to_clients: Arc<ManyToOneRingBuffer>,
    // Reused for every response so that steady state does not allocate
    scratch: BytesMut,
    dropped: AtomicCounter,
}

impl ClientProxy {
    /// Creates a proxy writing to `to_clients` and counting drops in `dropped`.
    pub fn new(to_clients: Arc<ManyToOneRingBuffer>, dropped: AtomicCounter) -> Self {
        let scratch = BytesMut::with_capacity(to_clients.max_msg_length());
        Self {
            to_clients,
            scratch,
            dropped,
        }
    }

    /// Number of responses dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.get()
    }

    /// Longest message that fits in one response record.
    fn max_message_length(&self) -> usize {
        self.to_clients
            .max_msg_length()
            .saturating_sub(ERROR_RESPONSE_HEADER_LENGTH)
    }
}

impl ResponseChannel for ClientProxy {
    fn on_error(&mut self, code: ErrorCode, message: &str, correlation_id: i64) {
        let message = truncate_to_boundary(message, self.max_message_length());

        self.scratch.clear();
        encode_error_response(&mut self.scratch, correlation_id, code, message);

        if let Err(e) = self.to_clients.write(response::ON_ERROR, &self.scratch) {
            self.dropped.increment();
            debug!(correlation_id, code = %code, error = %e, "Dropped error response");
        }
    }
}

/// Cuts `message` to at most `max` bytes without splitting a character.
fn truncate_to_boundary(message: &str, max: usize) -> &str {
    if message.len() <= max {
        return message;
    }

    let mut end = max;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    &message[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::responses::{read_error_responses, ErrorResponse};
    use crate::queue::RingBufferConsumer;

    fn proxy(capacity: usize) -> (ClientProxy, RingBufferConsumer, AtomicCounter) {
        let ring = Arc::new(ManyToOneRingBuffer::new(capacity).unwrap());
        let consumer = RingBufferConsumer::claim(Arc::clone(&ring)).unwrap();
        let dropped = AtomicCounter::new();
        (ClientProxy::new(ring, dropped.clone()), consumer, dropped)
    }

    #[test]
    fn test_error_response_is_written() {
        let (mut proxy, mut consumer, dropped) = proxy(4096);

        proxy.on_error(ErrorCode::UnknownPublication, "unknown publication: 3", 77);

        let responses = read_error_responses(&mut consumer, 10);
        assert_eq!(
            responses,
            vec![ErrorResponse {
                correlation_id: 77,
                code: ErrorCode::UnknownPublication,
                message: "unknown publication: 3".to_string(),
            }]
        );
        assert_eq!(dropped.get(), 0);
    }

    #[test]
    fn test_full_buffer_drops_and_counts() {
        // 256 bytes holds eight 32-byte response records
        let (mut proxy, mut consumer, dropped) = proxy(256);

        for i in 0..10 {
            proxy.on_error(ErrorCode::GenericError, "boom", i);
        }

        assert_eq!(dropped.get(), 2);
        assert_eq!(proxy.dropped(), 2);

        let responses = read_error_responses(&mut consumer, 10);
        let ids: Vec<i64> = responses.iter().map(|r| r.correlation_id).collect();
        assert_eq!(ids, (0..8).collect::<Vec<i64>>());
    }

    #[test]
    fn test_long_message_is_truncated() {
        let (mut proxy, mut consumer, dropped) = proxy(256);

        // max_msg_length is 32, leaving 16 bytes of message
        let long = "é".repeat(20);
        proxy.on_error(ErrorCode::InvalidChannel, &long, 5);

        let responses = read_error_responses(&mut consumer, 10);
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].message, "é".repeat(8));
        assert_eq!(dropped.get(), 0);
    }

    #[test]
    fn test_truncate_to_boundary() {
        assert_eq!(truncate_to_boundary("hello", 10), "hello");
        assert_eq!(truncate_to_boundary("hello", 3), "hel");
        assert_eq!(truncate_to_boundary("aé", 2), "a");
    }
}

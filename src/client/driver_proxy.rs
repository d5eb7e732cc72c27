//! Client-side Command Writer
//!
//! [`DriverProxy`] is what a client uses to talk to the driver: each method
//! encodes one command, writes it to the command queue and returns the
//! correlation id the driver will echo back if it rejects the command.
//!
//! Writes never block. A full queue is reported to the caller as
//! [`QueueError::InsufficientCapacity`].

use crate::protocol::command;
use crate::protocol::{
    encode_channel_message, encode_correlated, encode_destination_message,
    encode_remove_message,
};
use crate::queue::{ManyToOneRingBuffer, QueueError, QueueResult};
use bytes::BytesMut;
use std::sync::Arc;

/// Writes commands to the driver on behalf of one client.
#[derive(Debug)]
pub struct DriverProxy {
    to_driver: Arc<ManyToOneRingBuffer>,
    client_id: i64,
    scratch: BytesMut,
}

impl DriverProxy {
    /// Creates a proxy for `client_id` writing to `to_driver`.
    pub fn new(to_driver: Arc<ManyToOneRingBuffer>, client_id: i64) -> Self {
        Self {
            to_driver,
            client_id,
            scratch: BytesMut::with_capacity(256),
        }
    }

    /// The id this proxy stamps on every command.
    pub fn client_id(&self) -> i64 {
        self.client_id
    }

    pub fn add_publication(&mut self, channel: &str, stream_id: i32) -> QueueResult<i64> {
        let correlation_id = self.to_driver.next_correlation_id();
        self.scratch.clear();
        encode_channel_message(
            &mut self.scratch,
            self.client_id,
            correlation_id,
            stream_id,
            channel,
        );
        self.send(command::ADD_PUBLICATION, correlation_id)
    }

    pub fn remove_publication(&mut self, registration_id: i64) -> QueueResult<i64> {
        self.remove(command::REMOVE_PUBLICATION, registration_id)
    }

    pub fn add_subscription(&mut self, channel: &str, stream_id: i32) -> QueueResult<i64> {
        let correlation_id = self.to_driver.next_correlation_id();
        self.scratch.clear();
        encode_channel_message(
            &mut self.scratch,
            self.client_id,
            correlation_id,
            stream_id,
            channel,
        );
        self.send(command::ADD_SUBSCRIPTION, correlation_id)
    }

    pub fn remove_subscription(&mut self, registration_id: i64) -> QueueResult<i64> {
        self.remove(command::REMOVE_SUBSCRIPTION, registration_id)
    }

    /// Attaches `channel` as an extra destination of an existing registration.
    pub fn add_destination(&mut self, registration_id: i64, channel: &str) -> QueueResult<i64> {
        self.destination(command::ADD_DESTINATION, registration_id, channel)
    }

    pub fn remove_destination(&mut self, registration_id: i64, channel: &str) -> QueueResult<i64> {
        self.destination(command::REMOVE_DESTINATION, registration_id, channel)
    }

    /// Tells the driver this client is still alive.
    pub fn send_keepalive(&mut self) -> QueueResult<()> {
        self.scratch.clear();
        encode_correlated(&mut self.scratch, self.client_id, 0);
        self.to_driver
            .write(command::CLIENT_KEEPALIVE, &self.scratch)
    }

    fn remove(&mut self, msg_type_id: i32, registration_id: i64) -> QueueResult<i64> {
        let correlation_id = self.to_driver.next_correlation_id();
        self.scratch.clear();
        encode_remove_message(
            &mut self.scratch,
            self.client_id,
            correlation_id,
            registration_id,
        );
        self.send(msg_type_id, correlation_id)
    }

    fn destination(
        &mut self,
        msg_type_id: i32,
        registration_id: i64,
        channel: &str,
    ) -> QueueResult<i64> {
        let correlation_id = self.to_driver.next_correlation_id();
        self.scratch.clear();
        encode_destination_message(
            &mut self.scratch,
            self.client_id,
            correlation_id,
            registration_id,
            channel,
        );
        self.send(msg_type_id, correlation_id)
    }

    fn send(&self, msg_type_id: i32, correlation_id: i64) -> Result<i64, QueueError> {
        self.to_driver.write(msg_type_id, &self.scratch)?;
        Ok(correlation_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        DestinationMessageFlyweight, PublicationMessageFlyweight, RemoveMessageFlyweight,
    };
    use crate::queue::RingBufferConsumer;

    #[test]
    fn test_commands_reach_queue_in_order() {
        let ring = Arc::new(ManyToOneRingBuffer::new(4096).unwrap());
        let mut consumer = RingBufferConsumer::claim(Arc::clone(&ring)).unwrap();
        let mut proxy = DriverProxy::new(Arc::clone(&ring), 9);

        let add = proxy.add_publication("aeron:ipc", 10).unwrap();
        let remove = proxy.remove_publication(add).unwrap();
        let dest = proxy
            .add_destination(add, "aeron:udp?endpoint=host:1")
            .unwrap();
        proxy.send_keepalive().unwrap();

        assert!(add < remove && remove < dest);

        let mut seen = Vec::new();
        consumer.read(
            |msg_type_id, buffer| match msg_type_id {
                command::ADD_PUBLICATION => {
                    let msg = PublicationMessageFlyweight::wrap(buffer, 0);
                    assert_eq!(msg.client_id(), Ok(9));
                    assert_eq!(msg.correlation_id(), Ok(add));
                    assert_eq!(msg.stream_id(), Ok(10));
                    seen.push(msg_type_id);
                }
                command::REMOVE_PUBLICATION => {
                    let msg = RemoveMessageFlyweight::wrap(buffer, 0);
                    assert_eq!(msg.registration_id(), Ok(add));
                    seen.push(msg_type_id);
                }
                command::ADD_DESTINATION => {
                    let msg = DestinationMessageFlyweight::wrap(buffer, 0);
                    assert_eq!(msg.registration_correlation_id(), Ok(add));
                    assert_eq!(msg.channel().unwrap(), "aeron:udp?endpoint=host:1");
                    seen.push(msg_type_id);
                }
                other => seen.push(other),
            },
            10,
        );

        assert_eq!(
            seen,
            vec![
                command::ADD_PUBLICATION,
                command::REMOVE_PUBLICATION,
                command::ADD_DESTINATION,
                command::CLIENT_KEEPALIVE,
            ]
        );
    }

    #[test]
    fn test_full_queue_is_reported() {
        let ring = Arc::new(ManyToOneRingBuffer::new(128).unwrap());
        let mut proxy = DriverProxy::new(Arc::clone(&ring), 1);

        // 24-byte records; the sixth does not fit in 128 bytes
        for _ in 0..5 {
            proxy.send_keepalive().unwrap();
        }
        assert_eq!(
            proxy.send_keepalive(),
            Err(QueueError::InsufficientCapacity)
        );
    }
}

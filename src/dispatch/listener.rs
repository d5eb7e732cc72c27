//! Client Command Listener
//!
//! [`ClientListener`] drains the command queue on the driver's duty cycle,
//! decodes each record in place and routes it to the conductor.
//!
//! ## Flow
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         ClientListener                           │
//! │                                                                  │
//! │  ┌───────────┐    ┌──────────────┐    ┌──────────────────────┐   │
//! │  │ receive() │───>│ on_message() │───>│ DriverConductor      │   │
//! │  └───────────┘    └──────────────┘    └──────────────────────┘   │
//! │   at most 10           │  Err                                    │
//! │   records              ▼                                         │
//! │              ResponseChannel + error counter + DistinctErrorLog  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A failed command never reaches past [`ClientListener::on_message`]: the
//! client is told, the failure is counted and logged, and the next record
//! is processed as if nothing happened.

use crate::client::ResponseChannel;
use crate::conductor::DriverConductor;
use crate::errors::{epoch_millis, CommandError, CommandResult, SharedErrorLog, SystemCounters};
use crate::protocol::control::command_name;
use crate::protocol::{
    command, CorrelatedMessageFlyweight, DestinationMessageFlyweight, PublicationMessageFlyweight,
    RemoveMessageFlyweight, SubscriptionMessageFlyweight, IPC_CHANNEL, SPY_PREFIX,
};
use crate::queue::RingBufferConsumer;
use std::sync::PoisonError;
use tracing::{debug, trace};

/// Maximum number of commands handled per [`ClientListener::receive`] call.
///
/// Bounds the time one duty cycle spends on client commands so that the rest
/// of the driver's work is never starved by a busy client.
pub const MESSAGE_COUNT_LIMIT: usize = 10;

/// Receives client commands and routes them to a [`DriverConductor`].
pub struct ClientListener<C, R> {
    consumer: RingBufferConsumer,
    router: CommandRouter<C, R>,
}

/// Everything `on_message` touches, kept apart from the consumer so the
/// read callback can borrow it mutably.
struct CommandRouter<C, R> {
    conductor: C,
    responses: R,
    counters: SystemCounters,
    error_log: SharedErrorLog,
}

impl<C, R> ClientListener<C, R>
where
    C: DriverConductor,
    R: ResponseChannel,
{
    /// Creates a listener.
    ///
    /// # Arguments
    ///
    /// * `consumer` - The claimed read side of the command queue
    /// * `conductor` - Receives every decoded command
    /// * `responses` - Where rejection notices go
    /// * `counters` - `errors`, `commands_received` and `unknown_commands`
    ///   are updated here
    /// * `error_log` - Deduplicated record of every failure
    pub fn new(
        consumer: RingBufferConsumer,
        conductor: C,
        responses: R,
        counters: SystemCounters,
        error_log: SharedErrorLog,
    ) -> Self {
        Self {
            consumer,
            router: CommandRouter {
                conductor,
                responses,
                counters,
                error_log,
            },
        }
    }

    /// Handles up to [`MESSAGE_COUNT_LIMIT`] queued commands.
    ///
    /// Returns the number handled; zero when the queue was empty. Commands
    /// left in the queue are picked up, in order, by later calls.
    pub fn receive(&mut self) -> usize {
        let router = &mut self.router;
        self.consumer.read(
            |msg_type_id, buffer| router.on_message(msg_type_id, buffer),
            MESSAGE_COUNT_LIMIT,
        )
    }

    /// Decodes and routes a single command.
    ///
    /// `buffer` is only borrowed for this call.
    pub fn on_message(&mut self, msg_type_id: i32, buffer: &[u8]) {
        self.router.on_message(msg_type_id, buffer);
    }

    pub fn conductor(&self) -> &C {
        &self.router.conductor
    }

    pub fn conductor_mut(&mut self) -> &mut C {
        &mut self.router.conductor
    }

    pub fn responses(&self) -> &R {
        &self.router.responses
    }

    pub fn counters(&self) -> &SystemCounters {
        &self.router.counters
    }
}

impl<C, R> CommandRouter<C, R>
where
    C: DriverConductor,
    R: ResponseChannel,
{
    fn on_message(&mut self, msg_type_id: i32, buffer: &[u8]) {
        self.counters.commands_received.increment();

        // Echoed back on failure; stays 0 if the fault hits before it is read
        let mut correlation_id = 0;

        if let Err(error) = self.dispatch(msg_type_id, buffer, &mut correlation_id) {
            self.on_failure(msg_type_id, error, correlation_id);
        }
    }

    fn dispatch(&mut self, msg_type_id: i32, buffer: &[u8], correlation_id: &mut i64) -> CommandResult {
        match msg_type_id {
            command::ADD_PUBLICATION => {
                let msg = PublicationMessageFlyweight::wrap(buffer, 0);
                *correlation_id = msg.correlation_id()?;
                let client_id = msg.client_id()?;
                let stream_id = msg.stream_id()?;
                let channel = msg.channel()?;

                trace!(correlation_id = *correlation_id, client_id, stream_id, channel = %channel, "ADD_PUBLICATION");
                if channel.starts_with(IPC_CHANNEL) {
                    self.conductor
                        .on_add_ipc_publication(channel, stream_id, *correlation_id, client_id)
                } else {
                    self.conductor
                        .on_add_network_publication(channel, stream_id, *correlation_id, client_id)
                }
            }

            command::REMOVE_PUBLICATION => {
                let msg = RemoveMessageFlyweight::wrap(buffer, 0);
                *correlation_id = msg.correlation_id()?;
                let registration_id = msg.registration_id()?;

                trace!(correlation_id = *correlation_id, registration_id, "REMOVE_PUBLICATION");
                self.conductor
                    .on_remove_publication(registration_id, *correlation_id)
            }

            command::ADD_SUBSCRIPTION => {
                let msg = SubscriptionMessageFlyweight::wrap(buffer, 0);
                *correlation_id = msg.correlation_id()?;
                let client_id = msg.client_id()?;
                let stream_id = msg.stream_id()?;
                let mut channel = msg.channel()?;

                trace!(correlation_id = *correlation_id, client_id, stream_id, channel = %channel, "ADD_SUBSCRIPTION");
                if channel.starts_with(IPC_CHANNEL) {
                    self.conductor
                        .on_add_ipc_subscription(channel, stream_id, *correlation_id, client_id)
                } else if channel.starts_with(SPY_PREFIX) {
                    channel.replace_range(..SPY_PREFIX.len(), "");
                    self.conductor
                        .on_add_spy_subscription(channel, stream_id, *correlation_id, client_id)
                } else {
                    self.conductor
                        .on_add_network_subscription(channel, stream_id, *correlation_id, client_id)
                }
            }

            command::REMOVE_SUBSCRIPTION => {
                let msg = RemoveMessageFlyweight::wrap(buffer, 0);
                *correlation_id = msg.correlation_id()?;
                let registration_id = msg.registration_id()?;

                trace!(correlation_id = *correlation_id, registration_id, "REMOVE_SUBSCRIPTION");
                self.conductor
                    .on_remove_subscription(registration_id, *correlation_id)
            }

            command::ADD_DESTINATION => {
                let msg = DestinationMessageFlyweight::wrap(buffer, 0);
                *correlation_id = msg.correlation_id()?;
                let registration_id = msg.registration_correlation_id()?;
                let channel = msg.channel()?;

                trace!(correlation_id = *correlation_id, registration_id, channel = %channel, "ADD_DESTINATION");
                self.conductor
                    .on_add_destination(registration_id, channel, *correlation_id)
            }

            command::REMOVE_DESTINATION => {
                let msg = DestinationMessageFlyweight::wrap(buffer, 0);
                *correlation_id = msg.correlation_id()?;
                let registration_id = msg.registration_correlation_id()?;
                let channel = msg.channel()?;

                trace!(correlation_id = *correlation_id, registration_id, channel = %channel, "REMOVE_DESTINATION");
                self.conductor
                    .on_remove_destination(registration_id, channel, *correlation_id)
            }

            command::CLIENT_KEEPALIVE => {
                let msg = CorrelatedMessageFlyweight::wrap(buffer, 0);
                let client_id = msg.client_id()?;

                trace!(client_id, "CLIENT_KEEPALIVE");
                self.conductor.on_client_keepalive(client_id)
            }

            _ => {
                self.counters.unknown_commands.increment();
                trace!(msg_type_id, length = buffer.len(), "Ignoring unknown command");
                Ok(())
            }
        }
    }

    fn on_failure(&mut self, msg_type_id: i32, error: CommandError, correlation_id: i64) {
        let code = error.code();
        let message = error.to_string();

        debug!(
            command = command_name(msg_type_id),
            correlation_id,
            code = %code,
            kind = error.kind(),
            error = %message,
            "Command failed"
        );

        self.responses.on_error(code, &message, correlation_id);
        self.counters.errors.increment();
        self.error_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(&error, epoch_millis());
    }
}

impl<C, R> std::fmt::Debug for ClientListener<C, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientListener")
            .field("errors", &self.router.counters.errors.get())
            .field("commands_received", &self.router.counters.commands_received.get())
            .finish_non_exhaustive()
    }
}

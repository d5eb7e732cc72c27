//! In-Memory Registration Conductor
//!
//! [`RegistrationConductor`] keeps the registration tables of a driver:
//! publications and subscriptions keyed by the correlation id of the command
//! that created them, the extra destinations attached to each, and the
//! liveness of every client that owns a registration.
//!
//! ## Client Liveness
//!
//! Every add command and every keepalive refreshes the sending client's
//! deadline. [`RegistrationConductor::do_work`] runs as part of the duty
//! cycle, advances the conductor's clock and removes clients that have been
//! silent for longer than the liveness timeout, together with everything
//! they registered.
//!
//! ## Rejections
//!
//! | Situation                                 | Code                   |
//! |-------------------------------------------|------------------------|
//! | Channel without the `aeron:` scheme       | `INVALID_CHANNEL`      |
//! | Remove of an unknown publication          | `UNKNOWN_PUBLICATION`  |
//! | Remove of an unknown subscription         | `UNKNOWN_SUBSCRIPTION` |
//! | Destination on an unknown registration    | `UNKNOWN_PUBLICATION`  |
//! | Destination on an IPC or spy registration | `INVALID_CHANNEL`      |
//! | Remove of a destination not attached      | `UNKNOWN_DESTINATION`  |

use crate::conductor::DriverConductor;
use crate::errors::{AtomicCounter, CommandError, CommandResult};
use crate::protocol::{ErrorCode, CHANNEL_PREFIX};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

/// Default time a client may stay silent before it is removed.
pub const DEFAULT_CLIENT_LIVENESS_TIMEOUT: Duration = Duration::from_secs(10);

/// Which subsystem owns a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// In-process shared memory
    Ipc,
    /// Local view of a network publication
    Spy,
    /// Network media endpoint
    Network,
}

/// A publication or subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Correlation id of the add command
    pub registration_id: i64,
    pub client_id: i64,
    pub stream_id: i32,
    pub channel: String,
    pub route: Route,
    /// Extra destinations attached with ADD_DESTINATION
    pub destinations: Vec<String>,
}

/// Liveness state of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientSession {
    pub client_id: i64,
    /// Conductor clock at the last command or keepalive (ms)
    pub last_keepalive_ms: i64,
}

/// Conductor backed by in-memory registration tables.
#[derive(Debug)]
pub struct RegistrationConductor {
    publications: HashMap<i64, Registration>,
    subscriptions: HashMap<i64, Registration>,
    clients: HashMap<i64, ClientSession>,
    liveness_timeout_ms: i64,
    /// Clock cached by `do_work`, so commands need no time source of their own
    now_ms: i64,
    client_timeouts: AtomicCounter,
}

impl Default for RegistrationConductor {
    fn default() -> Self {
        Self::new(DEFAULT_CLIENT_LIVENESS_TIMEOUT, AtomicCounter::new())
    }
}

impl RegistrationConductor {
    /// Creates an empty conductor.
    ///
    /// # Arguments
    ///
    /// * `liveness_timeout` - How long a client may stay silent
    /// * `client_timeouts` - Counter bumped for every client that times out
    pub fn new(liveness_timeout: Duration, client_timeouts: AtomicCounter) -> Self {
        Self {
            publications: HashMap::new(),
            subscriptions: HashMap::new(),
            clients: HashMap::new(),
            liveness_timeout_ms: liveness_timeout.as_millis() as i64,
            now_ms: 0,
            client_timeouts,
        }
    }

    /// Advances the clock to `now_ms` and removes timed-out clients.
    ///
    /// Returns the number of clients removed.
    pub fn do_work(&mut self, now_ms: i64) -> usize {
        self.now_ms = now_ms;

        let deadline = now_ms - self.liveness_timeout_ms;
        let expired: Vec<i64> = self
            .clients
            .values()
            .filter(|session| session.last_keepalive_ms < deadline)
            .map(|session| session.client_id)
            .collect();

        for client_id in &expired {
            self.remove_client(*client_id);
        }

        expired.len()
    }

    pub fn publication(&self, registration_id: i64) -> Option<&Registration> {
        self.publications.get(&registration_id)
    }

    pub fn subscription(&self, registration_id: i64) -> Option<&Registration> {
        self.subscriptions.get(&registration_id)
    }

    pub fn client(&self, client_id: i64) -> Option<&ClientSession> {
        self.clients.get(&client_id)
    }

    pub fn publication_count(&self) -> usize {
        self.publications.len()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    // ========================================================================
    // Helper functions
    // ========================================================================

    fn remove_client(&mut self, client_id: i64) {
        self.clients.remove(&client_id);
        self.publications.retain(|_, r| r.client_id != client_id);
        self.subscriptions.retain(|_, r| r.client_id != client_id);
        self.client_timeouts.increment();

        info!(client_id, "Client timed out, registrations removed");
    }

    /// Creates or refreshes the session of `client_id`.
    fn touch_client(&mut self, client_id: i64) {
        let now_ms = self.now_ms;
        self.clients
            .entry(client_id)
            .and_modify(|session| session.last_keepalive_ms = now_ms)
            .or_insert(ClientSession {
                client_id,
                last_keepalive_ms: now_ms,
            });
    }

    fn validate_channel(channel: &str) -> CommandResult {
        if channel.starts_with(CHANNEL_PREFIX) {
            Ok(())
        } else {
            Err(CommandError::rejected(
                ErrorCode::InvalidChannel,
                format!("invalid channel: {}", channel),
            ))
        }
    }

    fn add_publication(
        &mut self,
        route: Route,
        channel: String,
        stream_id: i32,
        correlation_id: i64,
        client_id: i64,
    ) -> CommandResult {
        Self::validate_channel(&channel)?;
        self.touch_client(client_id);

        debug!(correlation_id, client_id, stream_id, channel = %channel, ?route, "Publication added");
        self.publications.insert(
            correlation_id,
            Registration {
                registration_id: correlation_id,
                client_id,
                stream_id,
                channel,
                route,
                destinations: Vec::new(),
            },
        );
        Ok(())
    }

    fn add_subscription(
        &mut self,
        route: Route,
        channel: String,
        stream_id: i32,
        correlation_id: i64,
        client_id: i64,
    ) -> CommandResult {
        Self::validate_channel(&channel)?;
        self.touch_client(client_id);

        debug!(correlation_id, client_id, stream_id, channel = %channel, ?route, "Subscription added");
        self.subscriptions.insert(
            correlation_id,
            Registration {
                registration_id: correlation_id,
                client_id,
                stream_id,
                channel,
                route,
                destinations: Vec::new(),
            },
        );
        Ok(())
    }

    /// Finds the registration a destination command refers to.
    fn destination_target(&mut self, registration_id: i64) -> Result<&mut Registration, CommandError> {
        let registration = match self.publications.get_mut(&registration_id) {
            Some(registration) => registration,
            None => self.subscriptions.get_mut(&registration_id).ok_or_else(|| {
                CommandError::rejected(
                    ErrorCode::UnknownPublication,
                    format!("unknown registration: {}", registration_id),
                )
            })?,
        };

        if registration.route != Route::Network {
            return Err(CommandError::rejected(
                ErrorCode::InvalidChannel,
                format!(
                    "destinations not supported on channel: {}",
                    registration.channel
                ),
            ));
        }

        Ok(registration)
    }
}

impl DriverConductor for RegistrationConductor {
    fn on_add_ipc_publication(
        &mut self,
        channel: String,
        stream_id: i32,
        correlation_id: i64,
        client_id: i64,
    ) -> CommandResult {
        self.add_publication(Route::Ipc, channel, stream_id, correlation_id, client_id)
    }

    fn on_add_network_publication(
        &mut self,
        channel: String,
        stream_id: i32,
        correlation_id: i64,
        client_id: i64,
    ) -> CommandResult {
        self.add_publication(Route::Network, channel, stream_id, correlation_id, client_id)
    }

    fn on_remove_publication(
        &mut self,
        registration_id: i64,
        correlation_id: i64,
    ) -> CommandResult {
        match self.publications.remove(&registration_id) {
            Some(_) => {
                debug!(registration_id, correlation_id, "Publication removed");
                Ok(())
            }
            None => Err(CommandError::rejected(
                ErrorCode::UnknownPublication,
                format!("unknown publication: {}", registration_id),
            )),
        }
    }

    fn on_add_ipc_subscription(
        &mut self,
        channel: String,
        stream_id: i32,
        correlation_id: i64,
        client_id: i64,
    ) -> CommandResult {
        self.add_subscription(Route::Ipc, channel, stream_id, correlation_id, client_id)
    }

    fn on_add_spy_subscription(
        &mut self,
        channel: String,
        stream_id: i32,
        correlation_id: i64,
        client_id: i64,
    ) -> CommandResult {
        self.add_subscription(Route::Spy, channel, stream_id, correlation_id, client_id)
    }

    fn on_add_network_subscription(
        &mut self,
        channel: String,
        stream_id: i32,
        correlation_id: i64,
        client_id: i64,
    ) -> CommandResult {
        self.add_subscription(Route::Network, channel, stream_id, correlation_id, client_id)
    }

    fn on_remove_subscription(
        &mut self,
        registration_id: i64,
        correlation_id: i64,
    ) -> CommandResult {
        match self.subscriptions.remove(&registration_id) {
            Some(_) => {
                debug!(registration_id, correlation_id, "Subscription removed");
                Ok(())
            }
            None => Err(CommandError::rejected(
                ErrorCode::UnknownSubscription,
                format!("unknown subscription: {}", registration_id),
            )),
        }
    }

    fn on_add_destination(
        &mut self,
        registration_correlation_id: i64,
        channel: String,
        correlation_id: i64,
    ) -> CommandResult {
        Self::validate_channel(&channel)?;
        let registration = self.destination_target(registration_correlation_id)?;

        if !registration.destinations.contains(&channel) {
            debug!(registration_correlation_id, correlation_id, channel = %channel, "Destination added");
            registration.destinations.push(channel);
        }
        Ok(())
    }

    fn on_remove_destination(
        &mut self,
        registration_correlation_id: i64,
        channel: String,
        correlation_id: i64,
    ) -> CommandResult {
        let registration = self.destination_target(registration_correlation_id)?;

        match registration.destinations.iter().position(|d| *d == channel) {
            Some(index) => {
                registration.destinations.remove(index);
                debug!(registration_correlation_id, correlation_id, channel = %channel, "Destination removed");
                Ok(())
            }
            None => Err(CommandError::rejected(
                ErrorCode::UnknownDestination,
                format!("unknown destination: {}", channel),
            )),
        }
    }

    fn on_client_keepalive(&mut self, client_id: i64) -> CommandResult {
        // Keepalives from clients without registrations carry no state
        if let Some(session) = self.clients.get_mut(&client_id) {
            session.last_keepalive_ms = self.now_ms;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UDP: &str = "aeron:udp?endpoint=localhost:40123";

    fn create_conductor() -> RegistrationConductor {
        RegistrationConductor::new(Duration::from_millis(1000), AtomicCounter::new())
    }

    #[test]
    fn test_add_and_remove_publication() {
        let mut conductor = create_conductor();

        conductor
            .on_add_network_publication(UDP.to_string(), 10, 1, 100)
            .unwrap();
        let publication = conductor.publication(1).unwrap();
        assert_eq!(publication.route, Route::Network);
        assert_eq!(publication.stream_id, 10);
        assert_eq!(publication.client_id, 100);

        conductor.on_remove_publication(1, 2).unwrap();
        assert_eq!(conductor.publication_count(), 0);
    }

    #[test]
    fn test_remove_unknown_publication() {
        let mut conductor = create_conductor();

        let err = conductor.on_remove_publication(42, 3).unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnknownPublication);
        assert_eq!(err.to_string(), "unknown publication: 42");
    }

    #[test]
    fn test_remove_unknown_subscription() {
        let mut conductor = create_conductor();

        let err = conductor.on_remove_subscription(42, 3).unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnknownSubscription);
    }

    #[test]
    fn test_invalid_channel_rejected() {
        let mut conductor = create_conductor();

        let err = conductor
            .on_add_network_subscription("udp://nope".to_string(), 10, 1, 100)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidChannel);
        assert_eq!(conductor.subscription_count(), 0);
        // A rejected command does not register the client
        assert!(conductor.client(100).is_none());
    }

    #[test]
    fn test_subscription_routes_are_kept() {
        let mut conductor = create_conductor();

        conductor
            .on_add_ipc_subscription("aeron:ipc".to_string(), 1, 1, 7)
            .unwrap();
        conductor
            .on_add_spy_subscription(UDP.to_string(), 1, 2, 7)
            .unwrap();
        conductor
            .on_add_network_subscription(UDP.to_string(), 1, 3, 7)
            .unwrap();

        assert_eq!(conductor.subscription(1).unwrap().route, Route::Ipc);
        assert_eq!(conductor.subscription(2).unwrap().route, Route::Spy);
        assert_eq!(conductor.subscription(3).unwrap().route, Route::Network);
    }

    #[test]
    fn test_destinations() {
        let mut conductor = create_conductor();
        let dest = "aeron:udp?endpoint=remote:9000";

        conductor
            .on_add_network_publication("aeron:udp?control=localhost:9001".to_string(), 1, 10, 7)
            .unwrap();

        conductor.on_add_destination(10, dest.to_string(), 11).unwrap();
        assert_eq!(conductor.publication(10).unwrap().destinations, vec![dest]);

        conductor
            .on_remove_destination(10, dest.to_string(), 12)
            .unwrap();
        assert!(conductor.publication(10).unwrap().destinations.is_empty());

        let err = conductor
            .on_remove_destination(10, dest.to_string(), 13)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnknownDestination);
    }

    #[test]
    fn test_destination_on_subscription() {
        let mut conductor = create_conductor();

        conductor
            .on_add_network_subscription(UDP.to_string(), 1, 20, 7)
            .unwrap();
        conductor
            .on_add_destination(20, "aeron:udp?endpoint=other:1".to_string(), 21)
            .unwrap();
        assert_eq!(conductor.subscription(20).unwrap().destinations.len(), 1);
    }

    #[test]
    fn test_destination_unknown_registration() {
        let mut conductor = create_conductor();

        let err = conductor
            .on_add_destination(99, UDP.to_string(), 1)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnknownPublication);
    }

    #[test]
    fn test_destination_on_ipc_rejected() {
        let mut conductor = create_conductor();

        conductor
            .on_add_ipc_publication("aeron:ipc".to_string(), 1, 5, 7)
            .unwrap();
        let err = conductor
            .on_add_destination(5, UDP.to_string(), 6)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidChannel);
    }

    #[test]
    fn test_client_timeout_removes_registrations() {
        let timeouts = AtomicCounter::new();
        let mut conductor = RegistrationConductor::new(Duration::from_millis(1000), timeouts.clone());

        conductor.do_work(0);
        conductor
            .on_add_ipc_publication("aeron:ipc".to_string(), 1, 1, 7)
            .unwrap();
        conductor
            .on_add_ipc_subscription("aeron:ipc".to_string(), 1, 2, 8)
            .unwrap();

        // Client 8 keeps itself alive, client 7 goes quiet
        conductor.do_work(800);
        conductor.on_client_keepalive(8).unwrap();

        assert_eq!(conductor.do_work(1500), 1);
        assert!(conductor.client(7).is_none());
        assert_eq!(conductor.publication_count(), 0);
        assert_eq!(conductor.subscription_count(), 1);
        assert_eq!(conductor.client(8).unwrap().last_keepalive_ms, 800);
        assert_eq!(timeouts.get(), 1);
    }

    #[test]
    fn test_keepalive_for_unknown_client_is_ignored() {
        let mut conductor = create_conductor();

        conductor.on_client_keepalive(123).unwrap();
        assert_eq!(conductor.client_count(), 0);
    }
}

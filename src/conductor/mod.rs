//! Conductor Module
//!
//! The conductor owns all registration state of the driver. The dispatcher
//! calls it synchronously, once per decoded command, from the duty cycle
//! thread; that thread is the only one that ever mutates conductor state, so
//! implementations need no locking.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ ClientListener  │  (dispatch module)
//! └────────┬────────┘
//!          │ on_add_*_publication / on_add_*_subscription / ...
//!          ▼
//! ┌─────────────────┐
//! │ DriverConductor │  (this module)
//! │                 │
//! │  - Registrations│
//! │  - Destinations │
//! │  - Client       │
//! │    liveness     │
//! └─────────────────┘
//! ```
//!
//! Every operation returns a [`CommandResult`]. A rejection is an ordinary
//! `Err` value that the dispatcher turns into a client notification; nothing
//! unwinds across the dispatch boundary.

pub mod registry;

use crate::errors::CommandResult;

pub use registry::{ClientSession, Registration, RegistrationConductor, Route};

/// Operations the dispatcher routes decoded commands to.
///
/// Channels arrive as owned strings so that implementations can keep them.
pub trait DriverConductor {
    /// Adds a publication on the in-process channel.
    fn on_add_ipc_publication(
        &mut self,
        channel: String,
        stream_id: i32,
        correlation_id: i64,
        client_id: i64,
    ) -> CommandResult;

    /// Adds a publication on a network media channel.
    fn on_add_network_publication(
        &mut self,
        channel: String,
        stream_id: i32,
        correlation_id: i64,
        client_id: i64,
    ) -> CommandResult;

    /// Removes the publication created by the add command `registration_id`.
    fn on_remove_publication(&mut self, registration_id: i64, correlation_id: i64)
        -> CommandResult;

    /// Adds a subscription on the in-process channel.
    fn on_add_ipc_subscription(
        &mut self,
        channel: String,
        stream_id: i32,
        correlation_id: i64,
        client_id: i64,
    ) -> CommandResult;

    /// Adds a subscription that spies on a local network publication.
    ///
    /// `channel` is the publication's channel with the spy prefix removed.
    fn on_add_spy_subscription(
        &mut self,
        channel: String,
        stream_id: i32,
        correlation_id: i64,
        client_id: i64,
    ) -> CommandResult;

    /// Adds a subscription on a network media channel.
    fn on_add_network_subscription(
        &mut self,
        channel: String,
        stream_id: i32,
        correlation_id: i64,
        client_id: i64,
    ) -> CommandResult;

    /// Removes the subscription created by the add command `registration_id`.
    fn on_remove_subscription(
        &mut self,
        registration_id: i64,
        correlation_id: i64,
    ) -> CommandResult;

    /// Attaches `channel` as a destination of an existing registration.
    fn on_add_destination(
        &mut self,
        registration_correlation_id: i64,
        channel: String,
        correlation_id: i64,
    ) -> CommandResult;

    /// Detaches `channel` from an existing registration.
    fn on_remove_destination(
        &mut self,
        registration_correlation_id: i64,
        channel: String,
        correlation_id: i64,
    ) -> CommandResult;

    /// Records that `client_id` is still alive.
    fn on_client_keepalive(&mut self, client_id: i64) -> CommandResult;
}

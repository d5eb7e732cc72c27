//! Control Protocol Constants
//!
//! This module defines the contract shared by clients and the driver on both
//! sides of the command queue: command type ids, error codes and the channel
//! literals used for routing.
//!
//! ## Command Type Ids
//!
//! | Command              | Id     |
//! |----------------------|--------|
//! | `ADD_PUBLICATION`    | `0x01` |
//! | `REMOVE_PUBLICATION` | `0x02` |
//! | `ADD_SUBSCRIPTION`   | `0x04` |
//! | `REMOVE_SUBSCRIPTION`| `0x05` |
//! | `CLIENT_KEEPALIVE`   | `0x06` |
//! | `ADD_DESTINATION`    | `0x07` |
//! | `REMOVE_DESTINATION` | `0x08` |
//!
//! Responses travel on a separate buffer; the only response this crate emits
//! is `ON_ERROR` (`0x0F01`).

use std::fmt;

/// Command type ids sent from clients to the driver.
pub mod command {
    /// Add a publication.
    pub const ADD_PUBLICATION: i32 = 0x01;
    /// Remove a publication.
    pub const REMOVE_PUBLICATION: i32 = 0x02;
    /// Add a subscription.
    pub const ADD_SUBSCRIPTION: i32 = 0x04;
    /// Remove a subscription.
    pub const REMOVE_SUBSCRIPTION: i32 = 0x05;
    /// Keepalive from a client.
    pub const CLIENT_KEEPALIVE: i32 = 0x06;
    /// Add a destination to an existing registration.
    pub const ADD_DESTINATION: i32 = 0x07;
    /// Remove a destination from an existing registration.
    pub const REMOVE_DESTINATION: i32 = 0x08;
}

/// Response type ids sent from the driver to clients.
pub mod response {
    /// A command was rejected.
    pub const ON_ERROR: i32 = 0x0F01;
}

/// Channel for in-process (IPC) publications and subscriptions.
pub const IPC_CHANNEL: &str = "aeron:ipc";

/// Prefix marking a subscription that spies on a local network publication.
pub const SPY_PREFIX: &str = "aeron-spy:";

/// Scheme prefix every valid media channel starts with.
pub const CHANNEL_PREFIX: &str = "aeron:";

/// Error codes carried in error responses.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Unexpected failure, no more specific code applies
    GenericError = 0,
    /// Channel string is not acceptable to the driver
    InvalidChannel = 1,
    /// Registration id does not name a known subscription
    UnknownSubscription = 2,
    /// Registration id does not name a known publication
    UnknownPublication = 3,
    /// The channel endpoint could not be created or reached
    ChannelEndpointError = 4,
    /// Destination is not attached to the registration
    UnknownDestination = 5,
}

impl ErrorCode {
    /// Returns the wire value of this code.
    #[inline]
    pub fn value(self) -> i32 {
        self as i32
    }

    /// Maps a wire value back to a code.
    ///
    /// Values this version does not know map to `GenericError` so that newer
    /// drivers can add codes without breaking older clients.
    pub fn from_i32(value: i32) -> Self {
        match value {
            1 => Self::InvalidChannel,
            2 => Self::UnknownSubscription,
            3 => Self::UnknownPublication,
            4 => Self::ChannelEndpointError,
            5 => Self::UnknownDestination,
            _ => Self::GenericError,
        }
    }

    /// Canonical upper-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GenericError => "GENERIC_ERROR",
            Self::InvalidChannel => "INVALID_CHANNEL",
            Self::UnknownSubscription => "UNKNOWN_SUBSCRIPTION",
            Self::UnknownPublication => "UNKNOWN_PUBLICATION",
            Self::ChannelEndpointError => "CHANNEL_ENDPOINT_ERROR",
            Self::UnknownDestination => "UNKNOWN_DESTINATION",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-readable name of a command type id, used in log output.
pub fn command_name(msg_type_id: i32) -> &'static str {
    match msg_type_id {
        command::ADD_PUBLICATION => "ADD_PUBLICATION",
        command::REMOVE_PUBLICATION => "REMOVE_PUBLICATION",
        command::ADD_SUBSCRIPTION => "ADD_SUBSCRIPTION",
        command::REMOVE_SUBSCRIPTION => "REMOVE_SUBSCRIPTION",
        command::CLIENT_KEEPALIVE => "CLIENT_KEEPALIVE",
        command::ADD_DESTINATION => "ADD_DESTINATION",
        command::REMOVE_DESTINATION => "REMOVE_DESTINATION",
        _ => "UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_wire_values() {
        assert_eq!(ErrorCode::GenericError.value(), 0);
        assert_eq!(ErrorCode::InvalidChannel.value(), 1);
        assert_eq!(ErrorCode::UnknownPublication.value(), 3);
        assert_eq!(ErrorCode::from_i32(2), ErrorCode::UnknownSubscription);
    }

    #[test]
    fn test_unknown_error_code_is_generic() {
        assert_eq!(ErrorCode::from_i32(42), ErrorCode::GenericError);
        assert_eq!(ErrorCode::from_i32(-1), ErrorCode::GenericError);
    }

    #[test]
    fn test_spy_prefix_is_not_ipc() {
        assert!(!SPY_PREFIX.starts_with(IPC_CHANNEL));
        assert!(IPC_CHANNEL.starts_with(CHANNEL_PREFIX));
    }

    #[test]
    fn test_command_names() {
        assert_eq!(command_name(command::ADD_SUBSCRIPTION), "ADD_SUBSCRIPTION");
        assert_eq!(command_name(0x7F), "UNKNOWN");
    }
}

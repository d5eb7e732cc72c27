//! Error Handling Module
//!
//! This module defines the outcome of a failed command and the sink that
//! failures are reported to.
//!
//! ## Taxonomy
//!
//! - **Protocol rejection** ([`CommandError::Rejected`]): the command was well
//!   formed but the conductor refused it. Carries a specific [`ErrorCode`].
//! - **Unexpected failure** ([`CommandError::Decode`],
//!   [`CommandError::Unexpected`]): the record could not be decoded, or the
//!   conductor failed in a way it did not anticipate. Reported to the client
//!   as [`ErrorCode::GenericError`].
//!
//! Both kinds stop at the message boundary inside the dispatcher. Each
//! produces a rejection notice to the client, one increment of the error
//! counter and an entry in the [`DistinctErrorLog`].

pub mod counter;
pub mod distinct_log;

use crate::protocol::{DecodeError, ErrorCode};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

pub use counter::{AtomicCounter, SystemCounters};
pub use distinct_log::{DistinctErrorLog, ErrorObservation, SharedErrorLog};

/// Why a command could not be applied.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Well-formed command refused by the conductor
    #[error("{message}")]
    Rejected { code: ErrorCode, message: String },

    /// The command record could not be decoded
    #[error("{0}")]
    Decode(#[from] DecodeError),

    /// Any other failure while applying the command
    #[error("{0}")]
    Unexpected(String),
}

/// Result type returned by every conductor operation.
pub type CommandResult = Result<(), CommandError>;

impl CommandError {
    /// Creates a protocol rejection.
    pub fn rejected(code: ErrorCode, message: impl Into<String>) -> Self {
        CommandError::Rejected {
            code,
            message: message.into(),
        }
    }

    /// Creates an unexpected failure.
    pub fn unexpected(message: impl Into<String>) -> Self {
        CommandError::Unexpected(message.into())
    }

    /// The code sent back to the client.
    pub fn code(&self) -> ErrorCode {
        match self {
            CommandError::Rejected { code, .. } => *code,
            CommandError::Decode(_) | CommandError::Unexpected(_) => ErrorCode::GenericError,
        }
    }

    /// Error class, used with code and message to tell errors apart.
    pub fn kind(&self) -> &'static str {
        match self {
            CommandError::Rejected { .. } => "ControlProtocolRejection",
            CommandError::Decode(_) => "DecodeError",
            CommandError::Unexpected(_) => "UnexpectedFailure",
        }
    }

    /// Returns true if this is a protocol rejection.
    pub fn is_rejection(&self) -> bool {
        matches!(self, CommandError::Rejected { .. })
    }
}

/// Milliseconds since the Unix epoch, used to timestamp log entries.
pub fn epoch_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_keeps_code() {
        let error = CommandError::rejected(ErrorCode::InvalidChannel, "invalid channel: foo");
        assert_eq!(error.code(), ErrorCode::InvalidChannel);
        assert_eq!(error.to_string(), "invalid channel: foo");
        assert!(error.is_rejection());
    }

    #[test]
    fn test_unexpected_failures_are_generic() {
        let decode = CommandError::from(DecodeError::InvalidLength(-3));
        assert_eq!(decode.code(), ErrorCode::GenericError);
        assert_eq!(decode.to_string(), "invalid length prefix: -3");
        assert!(!decode.is_rejection());

        let other = CommandError::unexpected("endpoint exploded");
        assert_eq!(other.code(), ErrorCode::GenericError);
        assert_eq!(other.kind(), "UnexpectedFailure");
    }
}

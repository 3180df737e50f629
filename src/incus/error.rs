//! Error types for the Incus client.

use thiserror::Error;

/// Errors raised while talking to the Incus API.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum IncusError {
    /// Raised when the request never produced an HTTP response.
    #[error("{message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },
    /// Raised when the daemon answers with an error response.
    #[error("Incus API error ({status_code}): {message}")]
    Api {
        /// HTTP or Incus error code.
        status_code: u16,
        /// Error text returned by the daemon.
        message: String,
    },
    /// Raised when a response body cannot be decoded.
    #[error("failed to decode {what}: {message}")]
    Decode {
        /// Kind of payload being decoded.
        what: String,
        /// Decoder error message.
        message: String,
    },
    /// Raised when a background operation finishes unsuccessfully.
    #[error("operation {id} failed: {message}")]
    Operation {
        /// Operation identifier.
        id: String,
        /// Failure text reported by the daemon.
        message: String,
    },
}

impl IncusError {
    /// Returns `true` when the daemon reported that the resource is missing.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status_code: 404, .. })
    }

    pub(crate) fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport {
            message: err.to_string(),
        }
    }

    pub(crate) fn decode(what: &str, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            what: what.to_owned(),
            message: err.to_string(),
        }
    }
}

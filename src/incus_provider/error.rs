//! Error types for the Incus provider.

use thiserror::Error;

use crate::cloud_init::CloudInitError;
use crate::config::ConfigError;
use crate::connect::ConnectError;
use crate::incus::IncusError;

/// Errors raised by the Incus provider.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum IncusProviderError {
    /// Raised when the provider configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),
    /// Raised when bootstrap parameters lack a required field.
    #[error("invalid bootstrap parameters: missing {0}")]
    Validation(String),
    /// Raised when pool extra specs cannot be interpreted.
    #[error("invalid extra specs: {0}")]
    ExtraSpecs(String),
    /// Raised when user-data cannot be rendered.
    #[error("cloud-init error: {0}")]
    CloudInit(#[from] CloudInitError),
    /// Raised when the requested instance does not exist.
    #[error("instance {name} not found")]
    NotFound {
        /// Instance name.
        name: String,
    },
    /// Raised when the client cannot be built.
    #[error(transparent)]
    Connect(#[from] ConnectError),
    /// Wrapper for Incus API failures.
    #[error("incus error: {0}")]
    Incus(#[from] IncusError),
}

impl From<ConfigError> for IncusProviderError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}

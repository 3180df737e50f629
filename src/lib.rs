//! Core library for the GARM Incus provider.
//!
//! The crate maps Incus instances to GARM's provider-neutral instance view,
//! builds Incus clients from configuration, and implements the external
//! provider operations GARM invokes (create, delete, get, list, start, stop).

pub mod cli;
pub mod cloud_init;
pub mod config;
pub mod connect;
pub mod execution;
pub mod incus;
pub mod incus_provider;
pub mod mapping;
pub mod params;
pub mod provider;
pub mod test_support;

pub use config::{ConfigError, IncusConfig};
pub use connect::{ConnectError, CredentialField, get_client_from_config};
pub use incus::{IncusClient, IncusError};
pub use incus_provider::{ExtraSpecs, IncusProvider, IncusProviderError};
pub use mapping::{garm_arch_to_incus, incus_arch_to_garm, incus_instance_to_api_instance};
pub use params::{Address, AddressType, BootstrapInstance, ProviderInstance, RunnerTool};
pub use provider::{Provider, ProviderFuture};

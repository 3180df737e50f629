//! Dispatch of a GARM command to a [`Provider`].
//!
//! The caller owns stdout; [`run`] returns the text to print, which is JSON
//! for every command that produces output.

use std::io::Read;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::cli::{Cli, GarmCommand};
use crate::params::BootstrapInstance;
use crate::provider::Provider;

/// Version reported by `GetVersion`.
pub const PROVIDER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Errors raised while executing a GARM command.
#[derive(Debug, Error)]
pub enum ExecutionError<E>
where
    E: std::error::Error + 'static,
{
    /// Raised when the command requires an environment variable GARM did not
    /// set.
    #[error("missing {0} environment variable")]
    MissingEnv(&'static str),
    /// Raised when stdin cannot be read.
    #[error("failed to read bootstrap parameters from stdin: {0}")]
    Stdin(String),
    /// Raised when stdin does not hold valid bootstrap JSON.
    #[error("failed to decode bootstrap parameters: {0}")]
    Bootstrap(String),
    /// Raised when the result cannot be encoded.
    #[error("failed to encode response: {0}")]
    Encode(String),
    /// Wrapper for provider failures.
    #[error("{0}")]
    Provider(#[source] E),
}

fn required<'a, E>(
    value: Option<&'a str>,
    name: &'static str,
) -> Result<&'a str, ExecutionError<E>>
where
    E: std::error::Error + 'static,
{
    value
        .map(str::trim)
        .filter(|inner| !inner.is_empty())
        .ok_or(ExecutionError::MissingEnv(name))
}

fn encode<T, E>(value: &T) -> Result<String, ExecutionError<E>>
where
    T: Serialize,
    E: std::error::Error + 'static,
{
    serde_json::to_string(value).map_err(|err| ExecutionError::Encode(err.to_string()))
}

fn read_bootstrap<E>(mut stdin: impl Read) -> Result<BootstrapInstance, ExecutionError<E>>
where
    E: std::error::Error + 'static,
{
    let mut raw = String::new();
    stdin
        .read_to_string(&mut raw)
        .map_err(|err| ExecutionError::Stdin(err.to_string()))?;
    serde_json::from_str(&raw).map_err(|err| ExecutionError::Bootstrap(err.to_string()))
}

/// Output of `GetVersion`, independent of any provider.
#[must_use]
pub fn version_output() -> String {
    format!("v{PROVIDER_VERSION}")
}

/// Runs the command described by `cli` against `provider`.
///
/// Returns the text to write to stdout, which is empty for commands that
/// produce no output.
///
/// # Errors
///
/// Returns [`ExecutionError`] when a required variable is missing, stdin
/// cannot be decoded, or the provider fails.
pub async fn run<P>(
    provider: &P,
    cli: &Cli,
    stdin: impl Read,
) -> Result<String, ExecutionError<P::Error>>
where
    P: Provider,
{
    debug!(command = %cli.command, "executing garm command");
    match cli.command {
        GarmCommand::CreateInstance => {
            let bootstrap = read_bootstrap::<P::Error>(stdin)?;
            let instance = provider
                .create_instance(&bootstrap)
                .await
                .map_err(ExecutionError::Provider)?;
            encode(&instance)
        }
        GarmCommand::DeleteInstance => {
            let name = required::<P::Error>(cli.instance_id.as_deref(), "GARM_INSTANCE_ID")?;
            provider
                .delete_instance(name)
                .await
                .map_err(ExecutionError::Provider)?;
            Ok(String::new())
        }
        GarmCommand::GetInstance => {
            let name = required::<P::Error>(cli.instance_id.as_deref(), "GARM_INSTANCE_ID")?;
            let instance = provider
                .get_instance(name)
                .await
                .map_err(ExecutionError::Provider)?;
            encode(&instance)
        }
        GarmCommand::ListInstances => {
            let pool = required::<P::Error>(cli.pool_id.as_deref(), "GARM_POOL_ID")?;
            let instances = provider
                .list_instances(pool)
                .await
                .map_err(ExecutionError::Provider)?;
            encode(&instances)
        }
        GarmCommand::RemoveAllInstances => {
            provider
                .remove_all_instances()
                .await
                .map_err(ExecutionError::Provider)?;
            Ok(String::new())
        }
        GarmCommand::StartInstance => {
            let name = required::<P::Error>(cli.instance_id.as_deref(), "GARM_INSTANCE_ID")?;
            provider.start(name).await.map_err(ExecutionError::Provider)?;
            Ok(String::new())
        }
        GarmCommand::StopInstance => {
            let name = required::<P::Error>(cli.instance_id.as_deref(), "GARM_INSTANCE_ID")?;
            provider
                .stop(name, true)
                .await
                .map_err(ExecutionError::Provider)?;
            Ok(String::new())
        }
        GarmCommand::GetVersion => Ok(version_output()),
    }
}

//! Binary entry point for the GARM Incus provider.
//!
//! GARM runs the binary once per operation. Results go to stdout as JSON;
//! logs and errors go to stderr.

use std::env;
use std::io::{self, Write};
use std::process;

use camino::Utf8Path;
use clap::Parser;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use garm_provider_incus::cli::{Cli, GarmCommand};
use garm_provider_incus::execution::{self, ExecutionError};
use garm_provider_incus::{IncusConfig, IncusProvider, IncusProviderError};

const CONFIG_FILE_ENV: &str = "GARM_PROVIDER_CONFIG_FILE";

#[derive(Debug, Error)]
enum CliError {
    #[error("missing GARM_CONTROLLER_ID environment variable")]
    MissingControllerId,
    #[error("provider config file {0} does not exist")]
    MissingConfigFile(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("failed to start runtime: {0}")]
    Runtime(String),
    #[error(transparent)]
    Provider(#[from] IncusProviderError),
    #[error(transparent)]
    Execution(#[from] ExecutionError<IncusProviderError>),
}

fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let exit_code = match execute(&cli) {
        Ok(output) => {
            if !output.is_empty() {
                writeln!(io::stdout(), "{output}").ok();
            }
            0
        }
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn execute(cli: &Cli) -> Result<String, CliError> {
    if cli.command == GarmCommand::GetVersion {
        return Ok(execution::version_output());
    }

    export_config_path(cli.provider_config_file.as_deref())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::Runtime(err.to_string()))?;
    runtime.block_on(dispatch(cli))
}

/// Makes a config path given on the command line visible to the loader,
/// which only consults the environment.
///
/// Runs before the runtime starts so no other thread observes the change.
fn export_config_path(path: Option<&str>) -> Result<(), CliError> {
    let Some(config_path) = path.map(str::trim).filter(|inner| !inner.is_empty()) else {
        return Ok(());
    };
    if !Utf8Path::new(config_path).is_file() {
        return Err(CliError::MissingConfigFile(config_path.to_owned()));
    }
    if env::var(CONFIG_FILE_ENV).ok().as_deref() != Some(config_path) {
        // SAFETY: The process is still single threaded at this point.
        unsafe { env::set_var(CONFIG_FILE_ENV, config_path) };
    }
    Ok(())
}

async fn dispatch(cli: &Cli) -> Result<String, CliError> {
    let controller_id = cli
        .controller_id
        .as_deref()
        .map(str::trim)
        .filter(|inner| !inner.is_empty())
        .ok_or(CliError::MissingControllerId)?;

    let config =
        IncusConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;

    let cancel = CancellationToken::new();
    let watcher = tokio::spawn(cancel_on_interrupt(cancel.clone()));

    let result = async {
        let provider = IncusProvider::connect(&cancel, config, controller_id).await?;
        debug!(command = %cli.command, "provider ready");
        let output = execution::run(&provider, cli, io::stdin()).await?;
        Ok::<_, CliError>(output)
    }
    .await;

    watcher.abort();
    result
}

async fn cancel_on_interrupt(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            warn!("interrupt received; cancelling");
            cancel.cancel();
        }
        Err(err) => debug!(error = %err, "interrupt handler unavailable"),
    }
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

//! Command-line interface definitions for the `garm-provider-incus` binary.
//!
//! GARM drives external providers through environment variables rather than
//! arguments, so every field reads from the environment first. The build
//! script includes this module to render the manual page.

use std::fmt;

use clap::{Parser, ValueEnum};

/// Operation GARM asks the provider to perform.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum GarmCommand {
    /// Create and start a runner instance from the bootstrap JSON on stdin.
    #[value(name = "CreateInstance")]
    CreateInstance,
    /// Delete a runner instance.
    #[value(name = "DeleteInstance")]
    DeleteInstance,
    /// Print one runner instance.
    #[value(name = "GetInstance")]
    GetInstance,
    /// Print every runner instance in the pool.
    #[value(name = "ListInstances")]
    ListInstances,
    /// Delete every runner instance owned by the controller.
    #[value(name = "RemoveAllInstances")]
    RemoveAllInstances,
    /// Start a stopped runner instance.
    #[value(name = "StartInstance")]
    StartInstance,
    /// Stop a running runner instance.
    #[value(name = "StopInstance")]
    StopInstance,
    /// Print the provider version.
    #[value(name = "GetVersion")]
    GetVersion,
}

impl GarmCommand {
    /// Name GARM uses for the command.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateInstance => "CreateInstance",
            Self::DeleteInstance => "DeleteInstance",
            Self::GetInstance => "GetInstance",
            Self::ListInstances => "ListInstances",
            Self::RemoveAllInstances => "RemoveAllInstances",
            Self::StartInstance => "StartInstance",
            Self::StopInstance => "StopInstance",
            Self::GetVersion => "GetVersion",
        }
    }
}

impl fmt::Display for GarmCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level CLI for the `garm-provider-incus` binary.
#[derive(Debug, Parser)]
#[command(
    name = "garm-provider-incus",
    version,
    about = "GARM external provider that runs GitHub Actions runners on Incus"
)]
pub struct Cli {
    /// Operation requested by GARM.
    #[arg(long, env = "GARM_COMMAND", value_enum)]
    pub command: GarmCommand,
    /// Identifier of the GARM controller invoking the provider.
    #[arg(long, env = "GARM_CONTROLLER_ID", value_name = "ID")]
    pub controller_id: Option<String>,
    /// Pool the operation applies to.
    #[arg(long, env = "GARM_POOL_ID", value_name = "ID")]
    pub pool_id: Option<String>,
    /// Provider configuration file.
    #[arg(long, env = "GARM_PROVIDER_CONFIG_FILE", value_name = "PATH")]
    pub provider_config_file: Option<String>,
    /// Instance the operation applies to.
    #[arg(long, env = "GARM_INSTANCE_ID", value_name = "NAME")]
    pub instance_id: Option<String>,
}

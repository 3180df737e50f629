//! Cloud-init user-data rendering for runner instances.
//!
//! The rendered `#cloud-config` document sets the hostname, installs the
//! bootstrap SSH keys, and creates the `runner` account. It writes the GARM
//! endpoints, instance token and selected runner archive into
//! `/etc/garm/runner.env`, next to an install script that sources that file.
//! Extra-spec commands run first, then the install script downloads,
//! registers and starts the runner while reporting status to GARM.

use serde::Serialize;
use shell_escape::unix::escape;
use thiserror::Error;

use crate::params::{BootstrapInstance, RunnerTool};

/// Location of the runner environment file inside the instance.
pub const RUNNER_ENV_PATH: &str = "/etc/garm/runner.env";

/// Location of the runner install script inside the instance.
pub const INSTALL_SCRIPT_PATH: &str = "/usr/local/sbin/garm-install-runner";

const INSTALL_SCRIPT: &str = include_str!("cloud_init/install_runner.sh");

const CLOUD_CONFIG_HEADER: &str = "#cloud-config\n";

const RUNNER_USER: &str = "runner";

/// Errors raised while rendering user-data.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum CloudInitError {
    /// Raised when an extra-spec command is empty or only whitespace.
    #[error("runcmd entry {index} must not be empty")]
    EmptyCommand {
        /// Zero-based position of the offending command.
        index: usize,
    },
    /// Raised when a value contains characters that cannot be written to the
    /// environment file.
    #[error("{field} must not contain newlines")]
    MultilineValue {
        /// Bootstrap field holding the value.
        field: &'static str,
    },
    /// Raised when the bootstrap asks for an OS the install script cannot set
    /// up.
    #[error("unsupported os_type `{os_type}`; only linux runners can be bootstrapped")]
    UnsupportedOs {
        /// Requested OS type.
        os_type: String,
    },
    /// Raised when no runner archive matches the requested platform.
    #[error("no runner tools offered for {os}/{arch}")]
    MissingTools {
        /// Forge OS name searched for.
        os: String,
        /// Forge architecture name searched for.
        arch: String,
    },
    /// Raised when YAML serialisation fails.
    #[error("failed to render cloud-config: {0}")]
    Render(String),
}

#[derive(Serialize)]
struct CloudConfig<'a> {
    hostname: &'a str,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    ssh_authorized_keys: &'a [String],
    users: [UserEntry; 2],
    write_files: [WriteFile; 2],
    runcmd: Vec<String>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum UserEntry {
    Default(&'static str),
    Account(RunnerAccount),
}

#[derive(Serialize)]
struct RunnerAccount {
    name: &'static str,
    shell: &'static str,
    sudo: &'static str,
}

#[derive(Serialize)]
struct WriteFile {
    path: &'static str,
    permissions: &'static str,
    owner: &'static str,
    content: String,
}

/// Maps GARM's architecture names to the forge's runner archive names.
fn forge_arch(arch: &str) -> String {
    match arch {
        "amd64" => String::from("x64"),
        other => other.to_owned(),
    }
}

/// Picks the runner archive matching the bootstrap's OS and architecture.
fn select_tool(bootstrap: &BootstrapInstance) -> Result<&RunnerTool, CloudInitError> {
    let os_type = bootstrap.os_type.trim().to_ascii_lowercase();
    if !os_type.is_empty() && os_type != "linux" {
        return Err(CloudInitError::UnsupportedOs { os_type });
    }
    let arch = forge_arch(&bootstrap.os_arch.trim().to_ascii_lowercase());

    bootstrap
        .tools
        .iter()
        .find(|tool| {
            tool.os.eq_ignore_ascii_case("linux") && tool.architecture.eq_ignore_ascii_case(&arch)
        })
        .ok_or_else(|| CloudInitError::MissingTools {
            os: String::from("linux"),
            arch,
        })
}

fn env_line(key: &str, field: &'static str, value: &str) -> Result<String, CloudInitError> {
    if value.contains(['\n', '\r']) {
        return Err(CloudInitError::MultilineValue { field });
    }
    Ok(format!("{key}={}\n", escape(value.into())))
}

fn runner_env(bootstrap: &BootstrapInstance, tool: &RunnerTool) -> Result<String, CloudInitError> {
    let labels = bootstrap.labels.join(",");
    let entries = [
        ("GARM_RUNNER_NAME", "name", bootstrap.name.trim()),
        ("GARM_REPO_URL", "repo_url", bootstrap.repo_url.as_str()),
        ("GARM_CALLBACK_URL", "callback_url", bootstrap.callback_url.as_str()),
        ("GARM_METADATA_URL", "metadata_url", bootstrap.metadata_url.as_str()),
        ("GARM_INSTANCE_TOKEN", "instance_token", bootstrap.instance_token.as_str()),
        ("GARM_RUNNER_LABELS", "labels", labels.as_str()),
        ("GARM_RUNNER_GROUP", "github_runner_group", bootstrap.github_runner_group.as_str()),
        ("GARM_POOL_ID", "pool_id", bootstrap.pool_id.as_str()),
        ("GARM_RUNNER_DOWNLOAD_URL", "download_url", tool.download_url.as_str()),
        ("GARM_RUNNER_FILENAME", "filename", tool.filename.as_str()),
        ("GARM_RUNNER_SHA256", "sha256_checksum", tool.sha256_checksum.as_str()),
        ("GARM_RUNNER_DOWNLOAD_TOKEN", "temp_download_token", tool.temp_download_token.as_str()),
    ];

    let mut content = String::new();
    for (key, field, value) in entries {
        content.push_str(&env_line(key, field, value)?);
    }
    Ok(content)
}

/// Renders the `#cloud-config` user-data for `bootstrap`.
///
/// `runcmd` holds the extra-spec commands; they run before the runner is
/// installed.
///
/// # Errors
///
/// Returns [`CloudInitError`] when a command is blank, a value spans several
/// lines, no runner archive fits the requested platform, or serialisation
/// fails.
pub fn render_user_data(
    bootstrap: &BootstrapInstance,
    runcmd: &[String],
) -> Result<String, CloudInitError> {
    if let Some(index) = runcmd.iter().position(|cmd| cmd.trim().is_empty()) {
        return Err(CloudInitError::EmptyCommand { index });
    }
    let tool = select_tool(bootstrap)?;

    let document = CloudConfig {
        hostname: bootstrap.name.trim(),
        ssh_authorized_keys: &bootstrap.ssh_keys,
        users: [
            UserEntry::Default("default"),
            UserEntry::Account(RunnerAccount {
                name: RUNNER_USER,
                shell: "/bin/bash",
                sudo: "ALL=(ALL) NOPASSWD:ALL",
            }),
        ],
        write_files: [
            WriteFile {
                path: RUNNER_ENV_PATH,
                permissions: "0600",
                owner: "root:root",
                content: runner_env(bootstrap, tool)?,
            },
            WriteFile {
                path: INSTALL_SCRIPT_PATH,
                permissions: "0755",
                owner: "root:root",
                content: INSTALL_SCRIPT.to_owned(),
            },
        ],
        runcmd: runcmd
            .iter()
            .cloned()
            .chain(Some(INSTALL_SCRIPT_PATH.to_owned()))
            .collect(),
    };

    let body =
        serde_yaml::to_string(&document).map_err(|err| CloudInitError::Render(err.to_string()))?;
    Ok(format!("{CLOUD_CONFIG_HEADER}{body}"))
}

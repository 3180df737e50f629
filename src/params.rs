//! Normalised instance types shared with the GARM orchestrator.
//!
//! These mirror the JSON documents GARM exchanges with external providers:
//! [`BootstrapInstance`] arrives on stdin for creation, and every command that
//! reports instances prints [`ProviderInstance`] records on stdout.

use serde::{Deserialize, Serialize};

use crate::incus::types::null_as_default;

/// Classification attached to an instance address.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressType {
    /// Address reachable from outside the host.
    Public,
    /// Address only reachable on a private network.
    Private,
}

/// A single address reported for an instance.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Address {
    /// Textual IP address without a prefix length.
    pub address: String,
    /// Address classification.
    #[serde(rename = "type")]
    pub kind: AddressType,
}

impl Address {
    /// Creates a public address record.
    #[must_use]
    pub fn public(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            kind: AddressType::Public,
        }
    }
}

/// Hypervisor-agnostic instance record every GARM provider produces.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ProviderInstance {
    /// Identifier the provider uses for the instance.
    pub provider_id: String,
    /// Display name of the instance.
    pub name: String,
    /// Operating system family (for example `linux`).
    pub os_type: String,
    /// Operating system distribution name.
    pub os_name: String,
    /// Operating system release.
    pub os_version: String,
    /// Normalised CPU architecture (for example `amd64`).
    pub os_arch: String,
    /// Addresses in a stable order.
    #[serde(default)]
    pub addresses: Vec<Address>,
    /// Lower-cased hypervisor status.
    pub status: String,
    /// Provider-side failure description; empty when healthy.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub provider_fault: String,
}

/// A runner archive the forge offers for one platform.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct RunnerTool {
    /// Forge operating system name (`linux`, `win` or `osx`).
    #[serde(deserialize_with = "null_as_default")]
    pub os: String,
    /// Forge architecture name (`x64`, `arm64` or `arm`).
    #[serde(deserialize_with = "null_as_default")]
    pub architecture: String,
    /// Archive location.
    #[serde(deserialize_with = "null_as_default")]
    pub download_url: String,
    /// Archive file name.
    #[serde(deserialize_with = "null_as_default")]
    pub filename: String,
    /// Hex SHA-256 digest of the archive; empty when the forge omits it.
    #[serde(deserialize_with = "null_as_default")]
    pub sha256_checksum: String,
    /// Bearer token required by some forges to download the archive.
    #[serde(deserialize_with = "null_as_default")]
    pub temp_download_token: String,
}

/// Creation parameters GARM passes to the provider on stdin.
///
/// Field names follow GARM's wire format, which mixes dashed and snake-case
/// keys. Go encodes empty slices as `null`, so every list tolerates it.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct BootstrapInstance {
    /// Name the instance must be created with.
    pub name: String,
    /// Runner archives offered by the forge, one per platform.
    #[serde(deserialize_with = "null_as_default")]
    pub tools: Vec<RunnerTool>,
    /// Repository, organisation or enterprise URL the runner registers with.
    pub repo_url: String,
    /// GARM callback endpoint for status updates.
    #[serde(rename = "callback-url")]
    pub callback_url: String,
    /// GARM metadata endpoint.
    #[serde(rename = "metadata-url")]
    pub metadata_url: String,
    /// Token the instance uses against the callback and metadata endpoints.
    #[serde(rename = "instance-token")]
    pub instance_token: String,
    /// SSH public keys installed for the default user.
    #[serde(rename = "ssh-keys", deserialize_with = "null_as_default")]
    pub ssh_keys: Vec<String>,
    /// Provider specific settings attached to the pool.
    pub extra_specs: Option<serde_json::Value>,
    /// Runner group the runner joins; empty for the default group.
    #[serde(rename = "github-runner-group")]
    pub github_runner_group: String,
    /// Requested GARM architecture (for example `amd64`).
    #[serde(rename = "arch")]
    pub os_arch: String,
    /// Requested operating system family.
    pub os_type: String,
    /// Pool flavor; maps to an Incus profile.
    pub flavor: String,
    /// Image alias to launch.
    pub image: String,
    /// Runner labels.
    #[serde(deserialize_with = "null_as_default")]
    pub labels: Vec<String>,
    /// Pool the instance belongs to.
    pub pool_id: String,
}

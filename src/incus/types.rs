//! Wire types for the Incus REST API.
//!
//! Only the fields this provider reads or sends are modelled. Every field is
//! optional on the wire and defaults to an empty value when absent.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Config key carrying the distribution name published by the image.
pub const OS_NAME_KEY: &str = "image.os";
/// Config key carrying the distribution release published by the image.
pub const OS_VERSION_KEY: &str = "image.release";
/// Config key this provider writes with the GARM OS type at creation.
pub const OS_TYPE_KEY: &str = "user.os-type";
/// Config key tagging an instance with the owning GARM controller.
pub const CONTROLLER_ID_KEY: &str = "user.garm-controller-id";
/// Config key tagging an instance with the owning GARM pool.
pub const POOL_ID_KEY: &str = "user.garm-pool-id";
/// Config key holding cloud-init user-data.
pub const USER_DATA_KEY: &str = "cloud-init.user-data";
/// Config key toggling UEFI secure boot on virtual machines.
pub const SECURE_BOOT_KEY: &str = "security.secureboot";

/// Incus sends `null` for empty maps and lists (for example the network of a
/// stopped instance). GARM does the same for empty arrays.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Free-form instance configuration with typed accessors for the keys the
/// provider understands.
///
/// Every accessor returns an empty string when its key is absent.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ExpandedConfig(BTreeMap<String, String>);

impl ExpandedConfig {
    /// Returns the raw value for `key`, or `""` when absent.
    #[must_use]
    pub fn get(&self, key: &str) -> &str {
        self.0.get(key).map_or("", String::as_str)
    }

    /// Distribution name (`image.os`).
    #[must_use]
    pub fn os_name(&self) -> &str {
        self.get(OS_NAME_KEY)
    }

    /// Distribution release (`image.release`).
    #[must_use]
    pub fn os_version(&self) -> &str {
        self.get(OS_VERSION_KEY)
    }

    /// GARM OS type recorded at creation (`user.os-type`).
    #[must_use]
    pub fn os_type(&self) -> &str {
        self.get(OS_TYPE_KEY)
    }

    /// Owning controller (`user.garm-controller-id`).
    #[must_use]
    pub fn controller_id(&self) -> &str {
        self.get(CONTROLLER_ID_KEY)
    }

    /// Owning pool (`user.garm-pool-id`).
    #[must_use]
    pub fn pool_id(&self) -> &str {
        self.get(POOL_ID_KEY)
    }

    /// Inserts or replaces a value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ExpandedConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

/// An instance together with its runtime state, as returned with recursion.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct InstanceFull {
    /// Instance name; unique within a project.
    pub name: String,
    /// Incus architecture name (for example `x86_64`).
    pub architecture: String,
    /// Status string as reported on the instance record.
    pub status: String,
    /// Configuration with profile values applied.
    #[serde(deserialize_with = "null_as_default")]
    pub expanded_config: ExpandedConfig,
    /// Runtime state; absent when the server did not include it.
    pub state: Option<InstanceState>,
}

/// Runtime state of an instance.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct InstanceState {
    /// Current status (for example `Running`).
    pub status: String,
    /// Network interfaces keyed by name.
    #[serde(deserialize_with = "null_as_default")]
    pub network: BTreeMap<String, InstanceStateNetwork>,
}

/// Runtime state of one network interface.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct InstanceStateNetwork {
    /// Addresses bound to the interface.
    #[serde(deserialize_with = "null_as_default")]
    pub addresses: Vec<InstanceStateNetworkAddress>,
}

/// One address bound to an interface.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct InstanceStateNetworkAddress {
    /// `inet` or `inet6`.
    pub family: String,
    /// The address itself.
    pub address: String,
    /// Prefix length.
    pub netmask: String,
    /// `global`, `link` or `local`.
    pub scope: String,
}

/// Kind of instance Incus should create.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum InstanceType {
    /// System container.
    #[serde(rename = "container")]
    Container,
    /// Virtual machine.
    #[serde(rename = "virtual-machine")]
    VirtualMachine,
}

impl InstanceType {
    /// Parses the configuration spelling of an instance type.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "container" => Some(Self::Container),
            "virtual-machine" => Some(Self::VirtualMachine),
            _ => None,
        }
    }
}

/// Image source for a new instance.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct InstanceSource {
    /// Always `image`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Image alias on the remote server.
    pub alias: String,
    /// Remote image server URL.
    pub server: String,
    /// Remote protocol (`simplestreams` or `incus`).
    pub protocol: String,
}

/// Body of `POST /1.0/instances`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct InstancesPost {
    /// Name of the new instance.
    pub name: String,
    /// Container or virtual machine.
    #[serde(rename = "type")]
    pub kind: InstanceType,
    /// Incus architecture name; omitted to let the server pick.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub architecture: String,
    /// Profiles applied in order.
    pub profiles: Vec<String>,
    /// Instance configuration.
    pub config: ExpandedConfig,
    /// Image to launch.
    pub source: InstanceSource,
    /// Whether to start the instance once created.
    pub start: bool,
}

/// Body of `PUT /1.0/instances/<name>/state`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct InstanceStatePut {
    /// `start`, `stop`, `restart`, `freeze` or `unfreeze`.
    pub action: String,
    /// Seconds to wait; `-1` waits indefinitely.
    pub timeout: i64,
    /// Whether to force the transition.
    pub force: bool,
}

impl InstanceStatePut {
    /// Request to start an instance.
    #[must_use]
    pub fn start() -> Self {
        Self {
            action: String::from("start"),
            timeout: -1,
            force: false,
        }
    }

    /// Request to stop an instance.
    #[must_use]
    pub fn stop(force: bool) -> Self {
        Self {
            action: String::from("stop"),
            timeout: -1,
            force,
        }
    }
}

/// Server information returned by `GET /1.0`.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct ServerInfo {
    /// API version string (for example `1.0`).
    pub api_version: String,
    /// `trusted` or `untrusted`.
    pub auth: String,
    /// Environment details.
    pub environment: ServerEnvironment,
}

/// Environment section of [`ServerInfo`].
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct ServerEnvironment {
    /// Daemon version.
    pub server_version: String,
    /// Daemon name (`incus`).
    pub server: String,
}

/// Background operation record.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct Operation {
    /// Operation identifier.
    pub id: String,
    /// Human readable status.
    pub status: String,
    /// Numeric status; 200 means success.
    pub status_code: u16,
    /// Failure text when the operation failed.
    pub err: String,
}

/// Envelope wrapping every Incus API response.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ResponseEnvelope {
    #[serde(rename = "type")]
    pub(crate) kind: String,
    pub(crate) operation: String,
    pub(crate) error_code: u16,
    pub(crate) error: String,
    pub(crate) metadata: serde_json::Value,
}

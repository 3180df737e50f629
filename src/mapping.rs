//! Translation between Incus instance descriptors and GARM instance records.

use crate::incus::types::InstanceFull;
use crate::params::{Address, ProviderInstance};

/// Incus architecture names paired with their GARM spelling.
const ARCHITECTURES: &[(&str, &str)] = &[
    ("x86_64", "amd64"),
    ("aarch64", "arm64"),
    ("armv7l", "arm"),
    ("i686", "i386"),
];

/// Maps an Incus architecture to GARM's canonical name.
///
/// Architectures missing from the table are returned unchanged.
#[must_use]
pub fn incus_arch_to_garm(arch: &str) -> &str {
    ARCHITECTURES
        .iter()
        .find(|(incus, _)| *incus == arch)
        .map_or(arch, |&(_, garm)| garm)
}

/// Maps a GARM architecture to the Incus name used at creation.
///
/// Architectures missing from the table are returned unchanged.
#[must_use]
pub fn garm_arch_to_incus(arch: &str) -> &str {
    ARCHITECTURES
        .iter()
        .find(|(_, garm)| *garm == arch)
        .map_or(arch, |&(incus, _)| incus)
}

/// Converts an Incus instance into GARM's normalised record.
///
/// Interfaces are visited in lexical order of their names and every address
/// is reported as public. The status comes from the runtime state when
/// present, otherwise from the instance record, and is lower-cased.
#[must_use]
pub fn incus_instance_to_api_instance(instance: &InstanceFull) -> ProviderInstance {
    let config = &instance.expanded_config;

    let (status, addresses) = instance.state.as_ref().map_or_else(
        || (instance.status.as_str(), Vec::new()),
        |state| {
            let addresses: Vec<Address> = state
                .network
                .values()
                .flat_map(|iface| iface.addresses.iter())
                .map(|addr| Address::public(addr.address.clone()))
                .collect();
            (state.status.as_str(), addresses)
        },
    );

    ProviderInstance {
        provider_id: instance.name.clone(),
        name: instance.name.clone(),
        os_type: config.os_type().to_owned(),
        os_name: config.os_name().to_owned(),
        os_version: config.os_version().to_owned(),
        os_arch: incus_arch_to_garm(&instance.architecture).to_owned(),
        addresses,
        status: status.to_lowercase(),
        provider_fault: String::new(),
    }
}

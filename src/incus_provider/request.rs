//! Translation of GARM bootstrap parameters into an Incus creation request.

use super::{ExtraSpecs, IncusProviderError};
use crate::cloud_init::render_user_data;
use crate::config::IncusConfig;
use crate::incus::types::{
    CONTROLLER_ID_KEY, ExpandedConfig, InstanceSource, InstanceType, InstancesPost, OS_TYPE_KEY,
    POOL_ID_KEY, SECURE_BOOT_KEY, USER_DATA_KEY,
};
use crate::mapping::garm_arch_to_incus;
use crate::params::BootstrapInstance;

const DEFAULT_PROFILE: &str = "default";

/// Builds the `POST /1.0/instances` body for `bootstrap`.
///
/// Profiles apply in order: `default` (when configured), the pool flavor, then
/// any extra-spec profiles, with duplicates and blanks dropped. The instance
/// is created stopped so the caller can clean up if the first start fails.
///
/// # Errors
///
/// Returns [`IncusProviderError`] when the name or image is missing, extra
/// specs are invalid, or user-data cannot be rendered.
pub fn build_create_request(
    config: &IncusConfig,
    controller_id: &str,
    bootstrap: &BootstrapInstance,
) -> Result<InstancesPost, IncusProviderError> {
    let name = bootstrap.name.trim();
    if name.is_empty() {
        return Err(IncusProviderError::Validation(String::from("name")));
    }
    let image = bootstrap.image.trim();
    if image.is_empty() {
        return Err(IncusProviderError::Validation(String::from("image")));
    }

    let specs = ExtraSpecs::parse(bootstrap.extra_specs.as_ref())?;
    let kind = match specs.instance_type()? {
        Some(kind) => kind,
        None => config.parsed_instance_type()?,
    };

    let mut instance_config = ExpandedConfig::default();
    instance_config.insert(CONTROLLER_ID_KEY, controller_id);
    instance_config.insert(POOL_ID_KEY, bootstrap.pool_id.as_str());
    instance_config.insert(OS_TYPE_KEY, bootstrap.os_type.as_str());
    instance_config.insert(USER_DATA_KEY, render_user_data(bootstrap, &specs.runcmd)?);
    let secure_boot = specs.secure_boot.unwrap_or(config.secure_boot);
    if kind == InstanceType::VirtualMachine && !secure_boot {
        instance_config.insert(SECURE_BOOT_KEY, "false");
    }

    Ok(InstancesPost {
        name: name.to_owned(),
        kind,
        architecture: garm_arch_to_incus(bootstrap.os_arch.trim()).to_owned(),
        profiles: profiles(config, bootstrap, &specs),
        config: instance_config,
        source: InstanceSource {
            kind: String::from("image"),
            alias: image.to_owned(),
            server: config.image_server.clone(),
            protocol: config.image_protocol.clone(),
        },
        start: false,
    })
}

fn profiles(
    config: &IncusConfig,
    bootstrap: &BootstrapInstance,
    specs: &ExtraSpecs,
) -> Vec<String> {
    let candidates = config
        .include_default_profile
        .then_some(DEFAULT_PROFILE)
        .into_iter()
        .chain(Some(bootstrap.flavor.as_str()))
        .chain(specs.profiles.iter().map(String::as_str));

    let mut selected: Vec<String> = Vec::new();
    for profile in candidates.map(str::trim) {
        if !profile.is_empty() && !selected.iter().any(|seen| seen == profile) {
            selected.push(profile.to_owned());
        }
    }
    selected
}

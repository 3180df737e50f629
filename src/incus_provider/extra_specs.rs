//! Pool extra specs understood by the Incus provider.

use serde::Deserialize;

use super::IncusProviderError;
use crate::incus::types::InstanceType;

/// Per-pool overrides carried in `BootstrapInstance::extra_specs`.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ExtraSpecs {
    /// Overrides the configured instance type.
    pub instance_type: Option<String>,
    /// Overrides the configured secure boot setting.
    pub secure_boot: Option<bool>,
    /// Additional profiles applied after the flavor.
    pub profiles: Vec<String>,
    /// Commands appended to the cloud-init `runcmd` list.
    pub runcmd: Vec<String>,
}

impl ExtraSpecs {
    /// Parses extra specs; `None` and JSON `null` yield the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`IncusProviderError::ExtraSpecs`] for unknown keys or values
    /// of the wrong type.
    pub fn parse(value: Option<&serde_json::Value>) -> Result<Self, IncusProviderError> {
        match value {
            None | Some(serde_json::Value::Null) => Ok(Self::default()),
            Some(raw) => Self::deserialize(raw)
                .map_err(|err| IncusProviderError::ExtraSpecs(err.to_string())),
        }
    }

    /// Parsed instance type override.
    ///
    /// # Errors
    ///
    /// Returns [`IncusProviderError::ExtraSpecs`] for unknown spellings.
    pub fn instance_type(&self) -> Result<Option<InstanceType>, IncusProviderError> {
        self.instance_type
            .as_deref()
            .map(|raw| {
                InstanceType::parse(raw).ok_or_else(|| {
                    IncusProviderError::ExtraSpecs(format!(
                        "unknown instance_type '{raw}': expected container or virtual-machine"
                    ))
                })
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_and_null_specs_use_defaults() {
        assert_eq!(ExtraSpecs::parse(None), Ok(ExtraSpecs::default()));
        assert_eq!(
            ExtraSpecs::parse(Some(&serde_json::Value::Null)),
            Ok(ExtraSpecs::default())
        );
    }

    #[test]
    fn parses_known_keys() {
        let raw = json!({
            "instance_type": "virtual-machine",
            "secure_boot": true,
            "profiles": ["gpu"],
            "runcmd": ["echo ready"]
        });
        let specs = ExtraSpecs::parse(Some(&raw)).unwrap_or_else(|err| panic!("parse: {err}"));
        assert_eq!(
            specs.instance_type(),
            Ok(Some(InstanceType::VirtualMachine))
        );
        assert_eq!(specs.secure_boot, Some(true));
        assert_eq!(specs.profiles, vec![String::from("gpu")]);
    }

    #[test]
    fn rejects_unknown_keys() {
        let raw = json!({"cpus": 4});
        let err = ExtraSpecs::parse(Some(&raw)).expect_err("unknown key");
        assert!(err.to_string().contains("cpus"), "unexpected error: {err}");
    }

    #[test]
    fn rejects_unknown_instance_type() {
        let raw = json!({"instance_type": "vm"});
        let specs = ExtraSpecs::parse(Some(&raw)).unwrap_or_else(|err| panic!("parse: {err}"));
        assert!(specs.instance_type().is_err());
    }
}

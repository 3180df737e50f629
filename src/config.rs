//! Configuration loading via `ortho-config`.

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::incus::types::InstanceType;

/// Incus connection and provisioning settings derived from defaults, the
/// provider configuration file, and environment variables.
///
/// GARM points the provider at its configuration file through
/// `GARM_PROVIDER_CONFIG_FILE`.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "INCUS",
    discovery(
        app_name = "garm-provider-incus",
        env_var = "GARM_PROVIDER_CONFIG_FILE",
        config_file_name = "garm-provider-incus.toml",
        dotfile_name = ".garm-provider-incus.toml",
        project_file_name = "garm-provider-incus.toml"
    )
)]
pub struct IncusConfig {
    /// Path to the local Incus Unix socket. Takes precedence over `url`.
    pub unix_socket_path: Option<String>,
    /// Remote HTTPS endpoint (for example `https://incus.example:8443`).
    pub url: Option<String>,
    /// Server certificate, inline PEM or a path. Pins the remote server.
    pub tls_server_certificate: Option<String>,
    /// CA certificate, inline PEM or a path.
    pub tls_ca: Option<String>,
    /// Client certificate, inline PEM or a path.
    pub client_certificate: Option<String>,
    /// Client private key, inline PEM or a path.
    pub client_key: Option<String>,
    /// Incus project that scopes every request.
    pub project_name: Option<String>,
    /// Whether new instances receive the `default` profile.
    #[ortho_config(default = false)]
    pub include_default_profile: bool,
    /// `container` or `virtual-machine`.
    #[ortho_config(default = "container".to_owned())]
    pub instance_type: String,
    /// Whether UEFI secure boot stays enabled on virtual machines.
    #[ortho_config(default = false)]
    pub secure_boot: bool,
    /// Image server used to resolve image aliases.
    #[ortho_config(default = "https://images.linuxcontainers.org".to_owned())]
    pub image_server: String,
    /// Protocol spoken by `image_server`.
    #[ortho_config(default = "simplestreams".to_owned())]
    pub image_protocol: String,
}

/// Defaults match the values the loader applies when nothing is configured.
impl Default for IncusConfig {
    fn default() -> Self {
        Self {
            unix_socket_path: None,
            url: None,
            tls_server_certificate: None,
            tls_ca: None,
            client_certificate: None,
            client_key: None,
            project_name: None,
            include_default_profile: false,
            instance_type: String::from("container"),
            secure_boot: false,
            image_server: String::from("https://images.linuxcontainers.org"),
            image_protocol: String::from("simplestreams"),
        }
    }
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn guidance(&self) -> String {
        format!(
            "set {} or add {} to the provider configuration file",
            self.env_var, self.toml_key
        )
    }
}

const IMAGE_SERVER: FieldMetadata =
    FieldMetadata::new("image server", "INCUS_IMAGE_SERVER", "image_server");
const IMAGE_PROTOCOL: FieldMetadata =
    FieldMetadata::new("image protocol", "INCUS_IMAGE_PROTOCOL", "image_protocol");
const INSTANCE_TYPE: FieldMetadata =
    FieldMetadata::new("instance type", "INCUS_INSTANCE_TYPE", "instance_type");
const CLIENT_CERTIFICATE: FieldMetadata = FieldMetadata::new(
    "client certificate",
    "INCUS_CLIENT_CERTIFICATE",
    "client_certificate",
);
const CLIENT_KEY: FieldMetadata =
    FieldMetadata::new("client key", "INCUS_CLIENT_KEY", "client_key");

impl IncusConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: {}",
                metadata.description,
                metadata.guidance()
            )));
        }
        Ok(())
    }

    fn is_set(value: Option<&str>) -> bool {
        value.is_some_and(|inner| !inner.trim().is_empty())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, the configuration file, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("garm-provider-incus")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Parsed form of [`IncusConfig::instance_type`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for spellings other than `container`
    /// and `virtual-machine`.
    pub fn parsed_instance_type(&self) -> Result<InstanceType, ConfigError> {
        InstanceType::parse(&self.instance_type).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "unknown {} '{}': expected container or virtual-machine; {}",
                INSTANCE_TYPE.description,
                self.instance_type,
                INSTANCE_TYPE.guidance()
            ))
        })
    }

    /// Performs semantic validation. Error messages name the environment
    /// variable and configuration key that fix the problem.
    ///
    /// Connection settings are not validated here; the client factory reports
    /// missing or unreadable connection material.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a field is empty, unknown, or only half of
    /// the client identity is configured.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(&self.image_server, &IMAGE_SERVER)?;
        Self::require_field(&self.image_protocol, &IMAGE_PROTOCOL)?;
        self.parsed_instance_type()?;

        let has_cert = Self::is_set(self.client_certificate.as_deref());
        let has_key = Self::is_set(self.client_key.as_deref());
        if has_cert && !has_key {
            return Err(ConfigError::MissingField(format!(
                "{} configured without {}: {}",
                CLIENT_CERTIFICATE.description,
                CLIENT_KEY.description,
                CLIENT_KEY.guidance()
            )));
        }
        if has_key && !has_cert {
            return Err(ConfigError::MissingField(format!(
                "{} configured without {}: {}",
                CLIENT_KEY.description,
                CLIENT_CERTIFICATE.description,
                CLIENT_CERTIFICATE.guidance()
            )));
        }
        Ok(())
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configuration value is not recognised.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

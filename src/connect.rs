//! Client factory: turns an [`IncusConfig`] into a connected [`IncusClient`].
//!
//! Validation is sequential and fails fast. Each failure names the stage (or
//! credential field) that produced it, and no client handle is ever returned
//! together with an error.

use std::fmt;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::IncusConfig;
use crate::incus::{IncusClient, IncusError, Transport};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const PEM_MARKER: &str = "-----BEGIN";

/// Credential settings in the order they are loaded.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CredentialField {
    /// Remote server certificate used for pinning.
    TlsServerCert,
    /// Certificate authority trusted for the remote server.
    TlsCa,
    /// Client certificate presented to the server.
    ClientCertificate,
    /// Private key for the client certificate.
    ClientKey,
}

impl fmt::Display for CredentialField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TlsServerCert => "TLSServerCert",
            Self::TlsCa => "TLSCA",
            Self::ClientCertificate => "ClientCertificate",
            Self::ClientKey => "ClientKey",
        };
        f.write_str(name)
    }
}

/// Errors raised while building a client.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ConnectError {
    /// Raised when no configuration was supplied.
    #[error("no Incus configuration found")]
    MissingConfig,
    /// Raised when a credential file cannot be read.
    #[error("reading {field}: {message}")]
    CredentialRead {
        /// Credential that failed to load.
        field: CredentialField,
        /// Underlying I/O error message.
        message: String,
    },
    /// Raised when the daemon cannot be reached or rejects the handshake.
    #[error("connecting to Incus: {message}")]
    Connect {
        /// Description of the failure, including the underlying dial error.
        message: String,
    },
    /// Raised when the caller cancels the attempt.
    #[error("connecting to Incus: operation cancelled")]
    Cancelled,
}

impl From<IncusError> for ConnectError {
    fn from(value: IncusError) -> Self {
        Self::Connect {
            message: value.to_string(),
        }
    }
}

/// Resolved TLS material for a remote connection.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Credentials {
    /// Pinned server certificate.
    pub server_cert: Option<Vec<u8>>,
    /// Trusted certificate authority.
    pub ca: Option<Vec<u8>>,
    /// Client certificate.
    pub client_cert: Option<Vec<u8>>,
    /// Client private key.
    pub client_key: Option<Vec<u8>>,
}

impl Credentials {
    /// Loads every credential configured in `config`, in field order.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::CredentialRead`] for the first field whose file
    /// cannot be read.
    pub fn load(config: &IncusConfig) -> Result<Self, ConnectError> {
        Ok(Self {
            server_cert: resolve_credential(
                CredentialField::TlsServerCert,
                config.tls_server_certificate.as_deref(),
            )?,
            ca: resolve_credential(CredentialField::TlsCa, config.tls_ca.as_deref())?,
            client_cert: resolve_credential(
                CredentialField::ClientCertificate,
                config.client_certificate.as_deref(),
            )?,
            client_key: resolve_credential(
                CredentialField::ClientKey,
                config.client_key.as_deref(),
            )?,
        })
    }

    fn http_client(&self) -> Result<reqwest::Client, ConnectError> {
        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .connect_timeout(CONNECT_TIMEOUT);

        let trusted: Vec<&Vec<u8>> = [self.server_cert.as_ref(), self.ca.as_ref()]
            .into_iter()
            .flatten()
            .collect();
        if !trusted.is_empty() {
            builder = builder.tls_built_in_root_certs(false);
        }
        for pem in trusted {
            let certificate = reqwest::Certificate::from_pem(pem).map_err(connect_error)?;
            builder = builder.add_root_certificate(certificate);
        }

        match (&self.client_cert, &self.client_key) {
            (Some(cert), Some(key)) => {
                let mut bundle = cert.clone();
                bundle.push(b'\n');
                bundle.extend_from_slice(key);
                let identity = reqwest::Identity::from_pem(&bundle).map_err(connect_error)?;
                builder = builder.identity(identity);
            }
            (None, None) => {}
            _ => {
                return Err(ConnectError::Connect {
                    message: String::from(
                        "client certificate and client key must be configured together",
                    ),
                });
            }
        }

        builder.build().map_err(connect_error)
    }
}

fn connect_error(err: impl fmt::Display) -> ConnectError {
    ConnectError::Connect {
        message: err.to_string(),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|inner| !inner.is_empty())
}

/// Returns the credential bytes for `value`: inline PEM is used as-is, any
/// other value is treated as a path and read from disk.
///
/// # Errors
///
/// Returns [`ConnectError::CredentialRead`] naming `field` when the file
/// cannot be read.
pub fn resolve_credential(
    field: CredentialField,
    value: Option<&str>,
) -> Result<Option<Vec<u8>>, ConnectError> {
    let Some(raw) = non_empty(value) else {
        return Ok(None);
    };
    if raw.starts_with(PEM_MARKER) {
        return Ok(Some(raw.as_bytes().to_vec()));
    }
    read_ambient(Utf8Path::new(raw))
        .map(Some)
        .map_err(|message| ConnectError::CredentialRead { field, message })
}

/// Reads `path` after resolving symlinks and `..` against the working
/// directory; the capability sandbox only sees the final parent directory.
fn read_ambient(path: &Utf8Path) -> Result<Vec<u8>, String> {
    let resolved = path.canonicalize_utf8().map_err(|err| err.to_string())?;
    let parent = resolved
        .parent()
        .ok_or_else(|| format!("path has no parent directory: {resolved}"))?;
    let file_name = resolved
        .file_name()
        .ok_or_else(|| format!("path has no file name: {resolved}"))?;

    let dir =
        Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| err.to_string())?;
    dir.read(file_name).map_err(|err| err.to_string())
}

/// Builds a connected client from `cfg`.
///
/// A configured Unix socket wins over the remote endpoint; credentials are
/// only loaded for remote connections. Cancelling `cancel` aborts the attempt
/// with [`ConnectError::Cancelled`].
///
/// # Errors
///
/// Returns [`ConnectError`] when the configuration is absent, a credential
/// cannot be read, the connection fails, or the attempt is cancelled.
pub async fn get_client_from_config(
    cancel: &CancellationToken,
    cfg: Option<&IncusConfig>,
) -> Result<IncusClient, ConnectError> {
    let Some(config) = cfg else {
        return Err(ConnectError::MissingConfig);
    };
    if cancel.is_cancelled() {
        return Err(ConnectError::Cancelled);
    }

    tokio::select! {
        biased;
        () = cancel.cancelled() => {
            debug!("incus connection attempt cancelled");
            Err(ConnectError::Cancelled)
        }
        result = connect(config) => result,
    }
}

async fn connect(config: &IncusConfig) -> Result<IncusClient, ConnectError> {
    let project = config.project_name.clone();

    if let Some(socket) = non_empty(config.unix_socket_path.as_deref()) {
        info!(%socket, "connecting to incus over unix socket");
        let transport = Transport::Local {
            socket: Utf8PathBuf::from(socket),
        };
        return Ok(IncusClient::connect(transport, project).await?);
    }

    let credentials = Credentials::load(config)?;
    let Some(url) = non_empty(config.url.as_deref()) else {
        return Err(ConnectError::Connect {
            message: String::from("no unix socket path or remote URL configured"),
        });
    };

    info!(%url, "connecting to remote incus");
    let transport = Transport::Remote {
        http: credentials.http_client()?,
        base_url: url.to_owned(),
    };
    Ok(IncusClient::connect(transport, project).await?)
}

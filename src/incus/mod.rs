//! Minimal Incus REST client covering the instance lifecycle used by the
//! provider.

mod error;
mod transport;
pub mod types;

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

pub use error::IncusError;
pub(crate) use transport::Transport;
use transport::Verb;
use types::{
    InstanceFull, InstanceStatePut, InstancesPost, Operation, ResponseEnvelope, ServerInfo,
};

const API_ROOT: &str = "/1.0";
const OPERATION_WAIT_SECS: u32 = 600;

/// Connected handle to an Incus daemon.
///
/// Clones share the underlying transport.
#[derive(Clone, Debug)]
pub struct IncusClient {
    transport: Arc<Transport>,
    project: Option<String>,
    server: ServerInfo,
}

impl IncusClient {
    /// Fetches the server information over `transport` and returns a client
    /// bound to it.
    pub(crate) async fn connect(
        transport: Transport,
        project: Option<String>,
    ) -> Result<Self, IncusError> {
        let mut client = Self {
            transport: Arc::new(transport),
            project: project.filter(|name| !name.trim().is_empty()),
            server: ServerInfo::default(),
        };
        client.server = client.query(Verb::Get, API_ROOT, None).await?;
        debug!(
            server_version = %client.server.environment.server_version,
            auth = %client.server.auth,
            "connected to incus"
        );
        Ok(client)
    }

    /// Server information captured when the client connected.
    #[must_use]
    pub const fn server_info(&self) -> &ServerInfo {
        &self.server
    }

    /// Project requests are scoped to, when one is configured.
    #[must_use]
    pub fn project(&self) -> Option<&str> {
        self.project.as_deref()
    }

    /// Returns the instance with its state, or `None` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`IncusError`] for transport, API or decoding failures other
    /// than a missing instance.
    pub async fn get_instance_full(&self, name: &str) -> Result<Option<InstanceFull>, IncusError> {
        let path = self.scoped(&format!("{API_ROOT}/instances/{name}"), Some("recursion=1"));
        match self.query(Verb::Get, &path, None).await {
            Ok(instance) => Ok(Some(instance)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Lists every instance in the project together with its state.
    ///
    /// # Errors
    ///
    /// Returns [`IncusError`] when the request or decoding fails.
    pub async fn list_instances_full(&self) -> Result<Vec<InstanceFull>, IncusError> {
        let path = self.scoped(&format!("{API_ROOT}/instances"), Some("recursion=2"));
        let instances: Option<Vec<InstanceFull>> = self.query(Verb::Get, &path, None).await?;
        Ok(instances.unwrap_or_default())
    }

    /// Creates an instance and waits for the creation to finish.
    ///
    /// # Errors
    ///
    /// Returns [`IncusError`] when the request is rejected or the creation
    /// operation fails.
    pub async fn create_instance(&self, request: &InstancesPost) -> Result<(), IncusError> {
        let path = self.scoped(&format!("{API_ROOT}/instances"), None);
        let envelope = self
            .exchange(Verb::Post, &path, Some(encode(request)?))
            .await?;
        self.wait_for_envelope(&envelope).await
    }

    /// Changes the power state of an instance and waits for it to settle.
    ///
    /// # Errors
    ///
    /// Returns [`IncusError`] when the request is rejected or the state change
    /// fails.
    pub async fn update_instance_state(
        &self,
        name: &str,
        state: &InstanceStatePut,
    ) -> Result<(), IncusError> {
        let path = self.scoped(&format!("{API_ROOT}/instances/{name}/state"), None);
        let envelope = self.exchange(Verb::Put, &path, Some(encode(state)?)).await?;
        self.wait_for_envelope(&envelope).await
    }

    /// Deletes an instance and waits for the deletion to finish.
    ///
    /// # Errors
    ///
    /// Returns [`IncusError`] when the request is rejected or the deletion
    /// fails.
    pub async fn delete_instance(&self, name: &str) -> Result<(), IncusError> {
        let path = self.scoped(&format!("{API_ROOT}/instances/{name}"), None);
        let envelope = self.exchange(Verb::Delete, &path, None).await?;
        self.wait_for_envelope(&envelope).await
    }

    /// Blocks until the operation `id` completes.
    ///
    /// # Errors
    ///
    /// Returns [`IncusError::Operation`] when the operation finishes with a
    /// failure status.
    pub async fn wait_for_operation(&self, id: &str) -> Result<Operation, IncusError> {
        let query = format!("timeout={OPERATION_WAIT_SECS}");
        let path = self.scoped(&format!("{API_ROOT}/operations/{id}/wait"), Some(&query));
        let operation: Operation = self.query(Verb::Get, &path, None).await?;
        debug!(operation = %id, status = %operation.status, "incus operation finished");

        if operation.status_code == 200 {
            return Ok(operation);
        }

        let message = if operation.err.is_empty() {
            operation.status.clone()
        } else {
            operation.err.clone()
        };
        Err(IncusError::Operation {
            id: id.to_owned(),
            message,
        })
    }

    async fn wait_for_envelope(&self, envelope: &ResponseEnvelope) -> Result<(), IncusError> {
        if envelope.kind != "async" {
            return Ok(());
        }
        let id = operation_id(envelope)?;
        self.wait_for_operation(&id).await.map(|_| ())
    }

    fn scoped(&self, path: &str, query: Option<&str>) -> String {
        let mut params: Vec<String> = query.into_iter().map(str::to_owned).collect();
        if let Some(project) = &self.project {
            params.push(format!("project={project}"));
        }
        if params.is_empty() {
            path.to_owned()
        } else {
            format!("{path}?{}", params.join("&"))
        }
    }

    async fn query<T: DeserializeOwned>(
        &self,
        verb: Verb,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<T, IncusError> {
        let envelope = self.exchange(verb, path, body).await?;
        serde_json::from_value(envelope.metadata).map_err(|err| IncusError::decode(path, err))
    }

    async fn exchange(
        &self,
        verb: Verb,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<ResponseEnvelope, IncusError> {
        debug!(?verb, %path, "incus request");
        let response = self.transport.send(verb, path, body).await?;
        let envelope: ResponseEnvelope = serde_json::from_slice(&response.body)
            .map_err(|err| IncusError::decode("response envelope", err))?;

        if envelope.kind == "error" || response.status >= 400 {
            let status_code = if envelope.error_code == 0 {
                response.status
            } else {
                envelope.error_code
            };
            return Err(IncusError::Api {
                status_code,
                message: envelope.error,
            });
        }
        Ok(envelope)
    }
}

fn encode(body: &impl Serialize) -> Result<Vec<u8>, IncusError> {
    serde_json::to_vec(body).map_err(|err| IncusError::decode("request body", err))
}

fn operation_id(envelope: &ResponseEnvelope) -> Result<String, IncusError> {
    if let Some(id) = envelope.metadata.get("id").and_then(|value| value.as_str()) {
        return Ok(id.to_owned());
    }

    // `/1.0/operations/<id>` with an optional query string.
    envelope
        .operation
        .split('?')
        .next()
        .and_then(|path| path.rsplit('/').next())
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| IncusError::decode("operation", "async response without an operation"))
}

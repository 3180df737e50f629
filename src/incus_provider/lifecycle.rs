//! Lookup and teardown helpers for the Incus provider.

use tracing::{debug, info};

use super::{IncusProvider, IncusProviderError};
use crate::incus::types::{InstanceFull, InstanceStatePut};

/// Status of the instance, preferring the runtime state.
fn current_status(instance: &InstanceFull) -> &str {
    instance
        .state
        .as_ref()
        .map_or(instance.status.as_str(), |state| state.status.as_str())
}

fn is_stopped(instance: &InstanceFull) -> bool {
    current_status(instance).eq_ignore_ascii_case("stopped")
}

impl IncusProvider {
    pub(super) async fn fetch(&self, name: &str) -> Result<InstanceFull, IncusProviderError> {
        self.client
            .get_instance_full(name)
            .await?
            .ok_or_else(|| IncusProviderError::NotFound {
                name: name.to_owned(),
            })
    }

    fn is_owned(&self, instance: &InstanceFull) -> bool {
        instance.expanded_config.controller_id() == self.controller_id
    }

    pub(super) async fn owned_instances(&self) -> Result<Vec<InstanceFull>, IncusProviderError> {
        let instances = self.client.list_instances_full().await?;
        Ok(instances
            .into_iter()
            .filter(|instance| self.is_owned(instance))
            .collect())
    }

    pub(super) async fn delete(&self, name: &str) -> Result<(), IncusProviderError> {
        let Some(instance) = self.client.get_instance_full(name).await? else {
            debug!(instance = %name, "instance already absent");
            return Ok(());
        };

        if !is_stopped(&instance) {
            info!(instance = %name, "force stopping incus instance before delete");
            self.client
                .update_instance_state(name, &InstanceStatePut::stop(true))
                .await?;
        }

        info!(instance = %name, "deleting incus instance");
        match self.client.delete_instance(name).await {
            Err(err) if err.is_not_found() => Ok(()),
            other => other.map_err(IncusProviderError::from),
        }
    }
}

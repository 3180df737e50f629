//! Incus implementation of the GARM provider operations.

mod error;
mod extra_specs;
mod lifecycle;
mod request;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::IncusConfig;
use crate::connect::get_client_from_config;
use crate::incus::IncusClient;
use crate::incus::types::{InstanceStatePut, InstancesPost};
use crate::mapping::incus_instance_to_api_instance;
use crate::params::{BootstrapInstance, ProviderInstance};
use crate::provider::{Provider, ProviderFuture};

pub use error::IncusProviderError;
pub use extra_specs::ExtraSpecs;
pub use request::build_create_request;

/// Provider that manages GARM runners as Incus instances.
#[derive(Clone, Debug)]
pub struct IncusProvider {
    client: IncusClient,
    config: IncusConfig,
    controller_id: String,
}

impl IncusProvider {
    /// Wraps an existing client.
    ///
    /// # Errors
    ///
    /// Returns [`IncusProviderError::Config`] when the configuration fails
    /// validation or the controller id is blank.
    pub fn new(
        client: IncusClient,
        config: IncusConfig,
        controller_id: impl Into<String>,
    ) -> Result<Self, IncusProviderError> {
        config.validate()?;
        let controller = controller_id.into().trim().to_owned();
        if controller.is_empty() {
            return Err(IncusProviderError::Config(String::from(
                "missing GARM controller id",
            )));
        }
        Ok(Self {
            client,
            config,
            controller_id: controller,
        })
    }

    /// Connects to Incus using `config` and wraps the resulting client.
    ///
    /// # Errors
    ///
    /// Returns [`IncusProviderError::Connect`] when the client cannot be
    /// built, or [`IncusProviderError::Config`] when validation fails.
    pub async fn connect(
        cancel: &CancellationToken,
        config: IncusConfig,
        controller_id: impl Into<String>,
    ) -> Result<Self, IncusProviderError> {
        config.validate()?;
        let client = get_client_from_config(cancel, Some(&config)).await?;
        Self::new(client, config, controller_id)
    }

    /// Controller id instances are tagged with.
    #[must_use]
    pub fn controller_id(&self) -> &str {
        &self.controller_id
    }

    /// Builds the creation request for `bootstrap` without contacting Incus.
    ///
    /// # Errors
    ///
    /// See [`build_create_request`].
    pub fn build_create_request(
        &self,
        bootstrap: &BootstrapInstance,
    ) -> Result<InstancesPost, IncusProviderError> {
        build_create_request(&self.config, &self.controller_id, bootstrap)
    }

    async fn create(
        &self,
        bootstrap: &BootstrapInstance,
    ) -> Result<ProviderInstance, IncusProviderError> {
        let request = self.build_create_request(bootstrap)?;
        info!(
            instance = %request.name,
            pool = %bootstrap.pool_id,
            image = %request.source.alias,
            "creating incus instance"
        );
        self.client.create_instance(&request).await?;

        if let Err(err) = self
            .client
            .update_instance_state(&request.name, &InstanceStatePut::start())
            .await
        {
            warn!(instance = %request.name, error = %err, "start failed; removing instance");
            if let Err(cleanup) = self.client.delete_instance(&request.name).await {
                warn!(
                    instance = %request.name,
                    error = %cleanup,
                    "cleanup after failed start failed"
                );
            }
            return Err(err.into());
        }

        let instance = self.fetch(&request.name).await?;
        Ok(incus_instance_to_api_instance(&instance))
    }
}

impl Provider for IncusProvider {
    type Error = IncusProviderError;

    fn create_instance<'a>(
        &'a self,
        bootstrap: &'a BootstrapInstance,
    ) -> ProviderFuture<'a, ProviderInstance, Self::Error> {
        Box::pin(self.create(bootstrap))
    }

    fn delete_instance<'a>(&'a self, instance: &'a str) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(self.delete(instance))
    }

    fn get_instance<'a>(
        &'a self,
        instance: &'a str,
    ) -> ProviderFuture<'a, ProviderInstance, Self::Error> {
        Box::pin(async move {
            let found = self.fetch(instance).await?;
            Ok(incus_instance_to_api_instance(&found))
        })
    }

    fn list_instances<'a>(
        &'a self,
        pool_id: &'a str,
    ) -> ProviderFuture<'a, Vec<ProviderInstance>, Self::Error> {
        Box::pin(async move {
            let instances = self.owned_instances().await?;
            Ok(instances
                .iter()
                .filter(|instance| instance.expanded_config.pool_id() == pool_id)
                .map(incus_instance_to_api_instance)
                .collect())
        })
    }

    fn remove_all_instances(&self) -> ProviderFuture<'_, (), Self::Error> {
        Box::pin(async move {
            for instance in self.owned_instances().await? {
                self.delete(&instance.name).await?;
            }
            Ok(())
        })
    }

    fn stop<'a>(&'a self, instance: &'a str, force: bool) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.fetch(instance).await?;
            info!(%instance, force, "stopping incus instance");
            self.client
                .update_instance_state(instance, &InstanceStatePut::stop(force))
                .await?;
            Ok(())
        })
    }

    fn start<'a>(&'a self, instance: &'a str) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.fetch(instance).await?;
            info!(%instance, "starting incus instance");
            self.client
                .update_instance_state(instance, &InstanceStatePut::start())
                .await?;
            Ok(())
        })
    }
}

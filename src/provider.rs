//! Provider abstraction for the operations GARM invokes on a backend.

use std::future::Future;
use std::pin::Pin;

use crate::params::{BootstrapInstance, ProviderInstance};

/// Future returned by provider operations.
pub type ProviderFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Instance lifecycle operations implemented by GARM providers.
pub trait Provider {
    /// Provider specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Creates and starts an instance described by `bootstrap`.
    fn create_instance<'a>(
        &'a self,
        bootstrap: &'a BootstrapInstance,
    ) -> ProviderFuture<'a, ProviderInstance, Self::Error>;

    /// Deletes an instance. Deleting a missing instance succeeds.
    fn delete_instance<'a>(&'a self, instance: &'a str) -> ProviderFuture<'a, (), Self::Error>;

    /// Fetches one instance.
    fn get_instance<'a>(
        &'a self,
        instance: &'a str,
    ) -> ProviderFuture<'a, ProviderInstance, Self::Error>;

    /// Lists the instances belonging to `pool_id`.
    fn list_instances<'a>(
        &'a self,
        pool_id: &'a str,
    ) -> ProviderFuture<'a, Vec<ProviderInstance>, Self::Error>;

    /// Deletes every instance owned by the controller.
    fn remove_all_instances(&self) -> ProviderFuture<'_, (), Self::Error>;

    /// Stops an instance.
    fn stop<'a>(&'a self, instance: &'a str, force: bool) -> ProviderFuture<'a, (), Self::Error>;

    /// Starts an instance.
    fn start<'a>(&'a self, instance: &'a str) -> ProviderFuture<'a, (), Self::Error>;
}

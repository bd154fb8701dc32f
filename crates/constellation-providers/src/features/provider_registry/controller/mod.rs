use crate::features::provider_registry::service::ProviderRegistryService;
use crate::{ProviderMetadata, ProviderResource, ProviderSource};
use constellation_core::{ErrorResponse, ServiceType};
use std::sync::Arc;
use tracing::info;

/// Entry points used by the admin processes
pub struct ProviderRegistryController {
    service: Arc<ProviderRegistryService>,
}

impl ProviderRegistryController {
    pub fn new(service: Arc<ProviderRegistryService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Arc<ProviderRegistryService> {
        &self.service
    }

    pub fn create_provider(&self, source: ProviderSource) -> Result<ProviderMetadata, ErrorResponse> {
        info!(kind = %self.service.kind(), provider_id = %source.id(), "Received create provider request");

        self.service
            .create_provider(source)
            .map(|p| p.metadata())
            .map_err(|e| e.into())
    }

    pub fn replace_provider(&self, source: ProviderSource) -> Result<ProviderMetadata, ErrorResponse> {
        info!(kind = %self.service.kind(), provider_id = %source.id(), "Received replace provider request");

        self.service
            .replace_provider(source)
            .map(|p| p.metadata())
            .map_err(|e| e.into())
    }

    pub fn remove_provider(&self, provider_id: &str) -> Result<(), ErrorResponse> {
        info!(kind = %self.service.kind(), provider_id, "Received remove provider request");

        self.service.remove_provider(provider_id).map_err(|e| e.into())
    }

    /// Returns the key count after reload
    pub fn reload_provider(&self, provider_id: &str) -> Result<usize, ErrorResponse> {
        info!(kind = %self.service.kind(), provider_id, "Received reload provider request");

        self.service.reload_provider(provider_id).map_err(|e| e.into())
    }

    pub fn get_config(&self, provider_id: &str) -> Result<ProviderSource, ErrorResponse> {
        self.service.source(provider_id).map_err(|e| e.into())
    }

    pub fn list_providers(&self) -> Result<Vec<ProviderMetadata>, ErrorResponse> {
        info!(kind = %self.service.kind(), "Received list providers request");

        self.service
            .providers()
            .map(|providers| providers.iter().map(|p| p.metadata()).collect())
            .map_err(|e| e.into())
    }

    pub fn keys(&self, service: Option<ServiceType>) -> Result<Vec<String>, ErrorResponse> {
        self.service
            .keys(service)
            .map(|keys| keys.into_iter().collect())
            .map_err(|e| e.into())
    }

    pub fn set_resource(
        &self,
        provider_id: &str,
        resource: ProviderResource,
    ) -> Result<(), ErrorResponse> {
        info!(provider_id, key = %resource.name, "Received set resource request");

        self.service
            .set_resource(provider_id, resource)
            .map_err(|e| e.into())
    }

    pub fn rename_resource(
        &self,
        provider_id: &str,
        key: &str,
        new_key: &str,
    ) -> Result<(), ErrorResponse> {
        info!(provider_id, key, new_key, "Received rename resource request");

        self.service
            .rename_resource(provider_id, key, new_key)
            .map_err(|e| e.into())
    }

    pub fn remove_resource(&self, provider_id: &str, key: &str) -> Result<(), ErrorResponse> {
        info!(provider_id, key, "Received remove resource request");

        self.service
            .remove_resource(provider_id, key)
            .map_err(|e| e.into())
    }
}

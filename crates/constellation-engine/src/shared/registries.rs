use constellation_core::{CoreError, ProviderKind, Result, SharedEventRecorder};
use constellation_providers::features::provider_registry::repo::{
    FileProviderConfigRepository, InMemoryProviderConfigRepository, InMemoryProviderRegistryRepository,
    ProviderConfigRepository,
};
use constellation_providers::features::provider_registry::service::ProviderRegistryService;
use constellation_providers::FactoryRegistry;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// The three provider registries (layers, styles, data).
#[derive(Clone)]
pub struct ProviderRegistries {
    layers: Arc<ProviderRegistryService>,
    styles: Arc<ProviderRegistryService>,
    data: Arc<ProviderRegistryService>,
}

impl ProviderRegistries {
    /// Registries persisting their definitions under `providers_dir`.
    pub fn open(
        providers_dir: &Path,
        factories: Arc<FactoryRegistry>,
        events: SharedEventRecorder,
    ) -> Self {
        let configs: Arc<dyn ProviderConfigRepository> =
            Arc::new(FileProviderConfigRepository::new(providers_dir));
        Self::with_configs(configs, factories, events)
    }

    /// Registries whose definitions are kept in memory only.
    pub fn in_memory(factories: Arc<FactoryRegistry>, events: SharedEventRecorder) -> Self {
        Self::with_configs(
            Arc::new(InMemoryProviderConfigRepository::new()),
            factories,
            events,
        )
    }

    fn with_configs(
        configs: Arc<dyn ProviderConfigRepository>,
        factories: Arc<FactoryRegistry>,
        events: SharedEventRecorder,
    ) -> Self {
        let registry = |kind| {
            Arc::new(ProviderRegistryService::new(
                kind,
                Arc::new(InMemoryProviderRegistryRepository::new()),
                configs.clone(),
                factories.clone(),
                events.clone(),
            ))
        };
        Self {
            layers: registry(ProviderKind::Layer),
            styles: registry(ProviderKind::Style),
            data: registry(ProviderKind::Data),
        }
    }

    pub fn get(&self, kind: ProviderKind) -> &Arc<ProviderRegistryService> {
        match kind {
            ProviderKind::Layer => &self.layers,
            ProviderKind::Style => &self.styles,
            ProviderKind::Data => &self.data,
        }
    }

    pub fn layers(&self) -> &Arc<ProviderRegistryService> {
        &self.layers
    }

    pub fn styles(&self) -> &Arc<ProviderRegistryService> {
        &self.styles
    }

    /// Load every persisted definition. Returns how many providers loaded.
    pub fn load_all(&self) -> Result<usize> {
        let mut loaded = 0;
        for kind in ProviderKind::ALL {
            loaded += self.get(kind).load_all()?;
        }
        Ok(loaded)
    }

    /// Dispose every provider of every registry, continuing past failures.
    pub fn shutdown(&self) -> Result<()> {
        let mut failures = Vec::new();
        for kind in ProviderKind::ALL {
            if let Err(error) = self.get(kind).shutdown() {
                warn!(%kind, error = %error, "Provider registry did not shut down cleanly");
                failures.push(error.to_string());
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(CoreError::ProviderDisposal(failures.join("; ")))
        }
    }
}

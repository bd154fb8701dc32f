use crate::features::provider_registry::repo::{
    ProviderConfigRepository, ProviderRegistryRepository,
};
use crate::{FactoryRegistry, Provider, ProviderResource, ProviderSource};
use constellation_core::{
    record_shared, CoreError, LifecycleEvent, LifecycleEventType, ProviderKind, Result,
    ServiceType, SharedEventRecorder,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One provider registry (layers, styles or data).
///
/// Replaces the process-wide proxies: the registry is built once at start-up,
/// handed around by `Arc`, and torn down with [`ProviderRegistryService::shutdown`].
/// Removing or replacing a provider always disposes the old instance.
pub struct ProviderRegistryService {
    kind: ProviderKind,
    repo: Arc<dyn ProviderRegistryRepository>,
    configs: Arc<dyn ProviderConfigRepository>,
    factories: Arc<FactoryRegistry>,
    events: SharedEventRecorder,
}

impl ProviderRegistryService {
    pub fn new(
        kind: ProviderKind,
        repo: Arc<dyn ProviderRegistryRepository>,
        configs: Arc<dyn ProviderConfigRepository>,
        factories: Arc<FactoryRegistry>,
        events: SharedEventRecorder,
    ) -> Self {
        Self {
            kind,
            repo,
            configs,
            factories,
            events,
        }
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn factories(&self) -> &FactoryRegistry {
        &self.factories
    }

    /// Live providers in registration order.
    pub fn providers(&self) -> Result<Vec<Arc<dyn Provider>>> {
        self.repo.list()
    }

    pub fn provider_ids(&self) -> Result<Vec<String>> {
        Ok(self
            .repo
            .list()?
            .iter()
            .map(|p| p.id().to_string())
            .collect())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.repo.list()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn get_provider(&self, provider_id: &str) -> Result<Arc<dyn Provider>> {
        self.repo
            .get(provider_id)?
            .ok_or_else(|| CoreError::ProviderNotFound(provider_id.to_string()))
    }

    /// First provider, in registration order, that exports `key`.
    pub fn get_by_key(&self, key: &str) -> Result<Arc<dyn Provider>> {
        let mut matches = self
            .repo
            .list()?
            .into_iter()
            .filter(|p| p.contains_key(key));

        let first = matches.next().ok_or_else(|| {
            CoreError::ResourceNotFound(format!("no {} provider exports '{key}'", self.kind))
        })?;
        let shadowed: Vec<String> = matches.map(|p| p.id().to_string()).collect();
        if !shadowed.is_empty() {
            warn!(key, provider_id = %first.id(), ?shadowed, "Key exported by several providers, using the first registered");
        }
        Ok(first)
    }

    /// Union of keys across providers, optionally limited to providers that
    /// publish to `service`.
    pub fn keys(&self, service: Option<ServiceType>) -> Result<BTreeSet<String>> {
        Ok(self
            .repo
            .list()?
            .iter()
            .filter(|p| service.map_or(true, |s| p.capabilities().supports(s)))
            .flat_map(|p| p.keys())
            .collect())
    }

    pub fn get_resource(&self, key: &str, version: Option<&str>) -> Result<ProviderResource> {
        let provider = self.get_by_key(key)?;
        provider.get(key, version)?.ok_or_else(|| {
            CoreError::ResourceNotFound(match version {
                Some(version) => format!("{key} (version {version})"),
                None => key.to_string(),
            })
        })
    }

    /// Register an already built provider without persisting its source.
    pub fn add_provider(&self, provider: Arc<dyn Provider>) -> Result<()> {
        self.check_kind(provider.kind(), provider.id())?;
        self.repo.insert(provider.clone())?;
        self.record(LifecycleEventType::ProviderCreated, provider.id());
        info!(kind = %self.kind, provider_id = %provider.id(), "Provider registered");
        Ok(())
    }

    /// Build a provider from `source`, register it and persist the source.
    /// Either every step succeeds or the registry is left untouched.
    pub fn create_provider(&self, source: ProviderSource) -> Result<Arc<dyn Provider>> {
        let provider = self.instantiate(source.clone())?;

        if let Err(error) = self.configs.save(&source) {
            self.repo.remove(provider.id())?;
            self.dispose_quietly(provider.as_ref());
            self.record_failure(source.id(), &error);
            return Err(error);
        }
        Ok(provider)
    }

    /// Remove the provider and dispose it. The persisted definition goes
    /// first; if it cannot be deleted the provider stays registered. Once
    /// removed, the provider leaves the registry even when disposal fails.
    pub fn remove_provider(&self, provider_id: &str) -> Result<()> {
        self.get_provider(provider_id)?;
        if let Err(error) = self.configs.delete(self.kind, provider_id) {
            warn!(provider_id, error = %error, "Failed to delete provider definition, keeping provider");
            return Err(error);
        }

        let provider = self
            .repo
            .remove(provider_id)?
            .ok_or_else(|| CoreError::ProviderNotFound(provider_id.to_string()))?;
        info!(kind = %self.kind, provider_id, "Provider removed");
        self.dispose(provider.as_ref())
    }

    /// Rebuild a provider from a new definition and dispose the old instance.
    /// The old instance keeps serving if the new one cannot be built or its
    /// definition cannot be persisted.
    pub fn replace_provider(&self, source: ProviderSource) -> Result<Arc<dyn Provider>> {
        self.check_kind(source.kind(), source.id())?;
        let provider = self.build(source.clone())?;
        let previous = self.repo.replace(provider.clone())?;
        if let Err(error) = self.configs.save(&source) {
            match previous {
                Some(previous) => {
                    self.repo.replace(previous)?;
                }
                None => {
                    self.repo.remove(provider.id())?;
                }
            }
            self.dispose_quietly(provider.as_ref());
            self.record_failure(source.id(), &error);
            warn!(provider_id = %source.id(), error = %error, "Failed to persist provider definition, kept previous provider");
            return Err(error);
        }

        self.record(LifecycleEventType::ProviderCreated, provider.id());
        if let Some(previous) = previous {
            if let Err(error) = self.dispose(previous.as_ref()) {
                warn!(provider_id = %source.id(), error = %error, "Replaced provider failed to dispose");
            }
        }
        info!(kind = %self.kind, provider_id = %source.id(), "Provider replaced");
        Ok(provider)
    }

    /// Re-read a provider's store. Returns the refreshed key count.
    pub fn reload_provider(&self, provider_id: &str) -> Result<usize> {
        let provider = self.get_provider(provider_id)?;
        provider.reload()?;
        self.record(LifecycleEventType::ProviderReloaded, provider_id);
        let keys = provider.keys().len();
        info!(kind = %self.kind, provider_id, keys, "Provider reloaded");
        Ok(keys)
    }

    pub fn source(&self, provider_id: &str) -> Result<ProviderSource> {
        Ok(self.get_provider(provider_id)?.source().clone())
    }

    pub fn set_resource(&self, provider_id: &str, resource: ProviderResource) -> Result<()> {
        let provider = self.get_provider(provider_id)?;
        let mutable = provider
            .as_mutable()
            .ok_or_else(|| CoreError::ProviderImmutable(provider_id.to_string()))?;
        debug!(provider_id, key = %resource.name, "Setting resource");
        mutable.set(resource)
    }

    pub fn rename_resource(&self, provider_id: &str, key: &str, new_key: &str) -> Result<()> {
        let provider = self.get_provider(provider_id)?;
        let mutable = provider
            .as_mutable()
            .ok_or_else(|| CoreError::ProviderImmutable(provider_id.to_string()))?;
        mutable.rename(key, new_key)
    }

    pub fn remove_resource(&self, provider_id: &str, key: &str) -> Result<()> {
        let provider = self.get_provider(provider_id)?;
        let mutable = provider
            .as_mutable()
            .ok_or_else(|| CoreError::ProviderImmutable(provider_id.to_string()))?;
        if mutable.remove(key)? {
            Ok(())
        } else {
            Err(CoreError::ResourceNotFound(key.to_string()))
        }
    }

    /// Build every persisted definition of this registry's kind. A definition
    /// that fails to build is logged and skipped. Returns how many loaded.
    pub fn load_all(&self) -> Result<usize> {
        let mut loaded = 0;
        for source in self.configs.load_all(self.kind)? {
            let provider_id = source.id().to_string();
            match self.instantiate(source) {
                Ok(_) => loaded += 1,
                Err(error) => {
                    warn!(kind = %self.kind, %provider_id, error = %error, "Skipping provider that failed to load");
                }
            }
        }
        info!(kind = %self.kind, loaded, "Providers loaded");
        Ok(loaded)
    }

    /// Dispose every provider. All providers are attempted even if some fail.
    pub fn shutdown(&self) -> Result<()> {
        let failures: Vec<String> = self
            .repo
            .drain()?
            .iter()
            .filter_map(|p| self.dispose(p.as_ref()).err().map(|e| format!("{}: {e}", p.id())))
            .collect();

        info!(kind = %self.kind, failures = failures.len(), "Provider registry shut down");
        if failures.is_empty() {
            Ok(())
        } else {
            Err(CoreError::ProviderDisposal(failures.join("; ")))
        }
    }

    fn check_kind(&self, kind: ProviderKind, provider_id: &str) -> Result<()> {
        if kind != self.kind {
            return Err(CoreError::KindMismatch(format!(
                "provider '{provider_id}' is a {kind} provider, registry holds {} providers",
                self.kind
            )));
        }
        Ok(())
    }

    fn build(&self, source: ProviderSource) -> Result<Arc<dyn Provider>> {
        let provider_id = source.id().to_string();
        self.factories.create(source).map_err(|error| {
            self.record_failure(&provider_id, &error);
            warn!(kind = %self.kind, %provider_id, error = %error, "Provider construction failed");
            error
        })
    }

    /// Build and register without persisting.
    fn instantiate(&self, source: ProviderSource) -> Result<Arc<dyn Provider>> {
        self.check_kind(source.kind(), source.id())?;
        if self.repo.get(source.id())?.is_some() {
            return Err(CoreError::DuplicateProvider(source.id().to_string()));
        }

        let provider = self.build(source)?;
        if let Err(error) = self.repo.insert(provider.clone()) {
            // Lost a race with a concurrent create of the same id.
            self.dispose_quietly(provider.as_ref());
            return Err(error);
        }
        self.record(LifecycleEventType::ProviderCreated, provider.id());
        info!(kind = %self.kind, provider_id = %provider.id(), factory = %provider.source().factory(), "Provider created");
        Ok(provider)
    }

    fn dispose(&self, provider: &dyn Provider) -> Result<()> {
        match provider.dispose() {
            Ok(()) => {
                self.record(LifecycleEventType::ProviderDisposed, provider.id());
                Ok(())
            }
            Err(error) => {
                self.record_failure(provider.id(), &error);
                warn!(provider_id = %provider.id(), error = %error, "Provider disposal failed");
                Err(error)
            }
        }
    }

    fn dispose_quietly(&self, provider: &dyn Provider) {
        let _ = self.dispose(provider);
    }

    fn record(&self, event_type: LifecycleEventType, provider_id: &str) {
        record_shared(&self.events, LifecycleEvent::new(event_type, provider_id));
    }

    fn record_failure(&self, provider_id: &str, error: &CoreError) {
        record_shared(
            &self.events,
            LifecycleEvent::new(LifecycleEventType::ProviderFailed, provider_id)
                .with_error(error.to_string()),
        );
    }
}

use crate::{
    MutableProvider, Provider, ProviderCapabilities, ProviderFactory, ProviderResource,
    ProviderSource,
};
use constellation_core::{
    CoreError, DataType, ParameterDescriptor, ParameterDescriptorGroup, ParameterType,
    ParameterValues, ProviderKind, Result,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Thread-safe in-memory provider. Its factory can be told to fail on
/// construction or disposal, which is how registry fault handling is
/// exercised.
pub struct MemoryProvider {
    source: ProviderSource,
    capabilities: ProviderCapabilities,
    crash_on_dispose: bool,
    state: RwLock<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    resources: BTreeMap<String, ProviderResource>,
    disposed: bool,
}

impl MemoryProvider {
    pub fn new(source: ProviderSource, data_type: DataType, keys: Vec<String>) -> Self {
        let capabilities = ProviderCapabilities::new(data_type, source.services().to_vec());
        let resources = keys
            .into_iter()
            .filter(|key| !source.is_ignored(key))
            .map(|key| {
                let resource = ProviderResource::new(key.clone(), data_type, json!({ "name": key }));
                (key, resource)
            })
            .collect();

        Self {
            source,
            capabilities,
            crash_on_dispose: false,
            state: RwLock::new(MemoryState {
                resources,
                disposed: false,
            }),
        }
    }

    fn with_crash_on_dispose(mut self, crash_on_dispose: bool) -> Self {
        self.crash_on_dispose = crash_on_dispose;
        self
    }

    fn read_state(&self) -> Result<std::sync::RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|_| CoreError::LockPoisoned(format!("memory provider '{}'", self.id())))
    }

    fn write_state(&self) -> Result<std::sync::RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|_| CoreError::LockPoisoned(format!("memory provider '{}'", self.id())))
    }

    fn live_state(&self) -> Result<std::sync::RwLockWriteGuard<'_, MemoryState>> {
        let state = self.write_state()?;
        if state.disposed {
            return Err(CoreError::ProviderDisposed(self.id().to_string()));
        }
        Ok(state)
    }
}

impl Provider for MemoryProvider {
    fn id(&self) -> &str {
        self.source.id()
    }

    fn kind(&self) -> ProviderKind {
        self.source.kind()
    }

    fn source(&self) -> &ProviderSource {
        &self.source
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    fn keys(&self) -> Vec<String> {
        match self.read_state() {
            Ok(state) if !state.disposed => state.resources.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    fn get(&self, key: &str, version: Option<&str>) -> Result<Option<ProviderResource>> {
        let state = self.read_state()?;
        if state.disposed {
            return Err(CoreError::ProviderDisposed(self.id().to_string()));
        }
        Ok(state
            .resources
            .get(key)
            .filter(|resource| resource.matches_version(version))
            .cloned())
    }

    fn reload(&self) -> Result<()> {
        // Memory is the store; nothing to re-read.
        self.live_state().map(|_| ())
    }

    fn dispose(&self) -> Result<()> {
        let mut state = self.write_state()?;
        if state.disposed {
            return Ok(());
        }
        state.disposed = true;
        state.resources.clear();
        if self.crash_on_dispose {
            return Err(CoreError::ProviderDisposal(format!(
                "provider '{}' failed to release its resources",
                self.id()
            )));
        }
        Ok(())
    }

    fn is_disposed(&self) -> bool {
        self.read_state().map(|s| s.disposed).unwrap_or(true)
    }

    fn as_mutable(&self) -> Option<&dyn MutableProvider> {
        Some(self)
    }
}

impl MutableProvider for MemoryProvider {
    fn set(&self, resource: ProviderResource) -> Result<()> {
        constellation_core::validate_name("resource name", &resource.name)?;
        let mut state = self.live_state()?;
        if !self.source.is_ignored(&resource.name) {
            state.resources.insert(resource.name.clone(), resource);
        }
        Ok(())
    }

    fn rename(&self, key: &str, new_key: &str) -> Result<()> {
        constellation_core::validate_name("resource name", new_key)?;
        let mut state = self.live_state()?;
        if state.resources.contains_key(new_key) {
            return Err(CoreError::Configuration(format!(
                "resource '{new_key}' already exists in provider '{}'",
                self.id()
            )));
        }
        let mut resource = state
            .resources
            .remove(key)
            .ok_or_else(|| CoreError::ResourceNotFound(key.to_string()))?;
        resource.name = new_key.to_string();
        if !self.source.is_ignored(new_key) {
            state.resources.insert(new_key.to_string(), resource);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let mut state = self.live_state()?;
        Ok(state.resources.remove(key).is_some())
    }
}

pub struct MemoryProviderFactory {
    descriptor: ParameterDescriptorGroup,
}

impl MemoryProviderFactory {
    pub const NAME: &'static str = "memory";

    pub fn new() -> Self {
        Self {
            descriptor: ParameterDescriptorGroup::new(
                Self::NAME,
                vec![
                    ParameterDescriptor::optional("keys", ParameterType::StringList)
                        .with_default(json!([]))
                        .with_description("Keys the provider starts with"),
                    ParameterDescriptor::optional("data_type", ParameterType::String)
                        .with_default("vector"),
                    ParameterDescriptor::optional("crash_on_create", ParameterType::Boolean)
                        .with_default(false),
                    ParameterDescriptor::optional("crash_on_dispose", ParameterType::Boolean)
                        .with_default(false),
                ],
            ),
        }
    }
}

impl Default for MemoryProviderFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderFactory for MemoryProviderFactory {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn supports_kind(&self, _kind: ProviderKind) -> bool {
        true
    }

    fn descriptor(&self) -> &ParameterDescriptorGroup {
        &self.descriptor
    }

    fn build(&self, source: ProviderSource, params: ParameterValues) -> Result<Arc<dyn Provider>> {
        if params.get_bool("crash_on_create").unwrap_or(false) {
            return Err(CoreError::ProviderCreation(format!(
                "provider '{}' failed during construction",
                source.id()
            )));
        }
        let data_type = params.require_str("data_type")?.parse::<DataType>()?;
        let keys = params.get_string_list("keys");
        let crash_on_dispose = params.get_bool("crash_on_dispose").unwrap_or(false);

        Ok(Arc::new(
            MemoryProvider::new(source, data_type, keys).with_crash_on_dispose(crash_on_dispose),
        ))
    }
}

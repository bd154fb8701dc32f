use crate::directory_provider::DirectoryProviderFactory;
use crate::memory_provider::MemoryProviderFactory;
use crate::static_style_provider::StaticStyleProviderFactory;
use crate::{Provider, ProviderSource};
use constellation_core::{
    CoreError, ParameterDescriptorGroup, ParameterValues, ProviderKind, Result,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Builds providers of one flavour from their configuration.
pub trait ProviderFactory: Send + Sync {
    fn name(&self) -> &str;

    fn supports_kind(&self, kind: ProviderKind) -> bool;

    /// Parameters accepted by this factory.
    fn descriptor(&self) -> &ParameterDescriptorGroup;

    /// Construct a provider from an already validated parameter set.
    fn build(&self, source: ProviderSource, params: ParameterValues) -> Result<Arc<dyn Provider>>;

    /// Validate `source` against the descriptor and build the provider.
    fn create(&self, source: ProviderSource) -> Result<Arc<dyn Provider>> {
        if !self.supports_kind(source.kind()) {
            return Err(CoreError::KindMismatch(format!(
                "factory '{}' cannot build {} providers",
                self.name(),
                source.kind()
            )));
        }
        let params = self.descriptor().validate(source.parameters())?;
        self.build(source, params)
    }
}

#[derive(Clone, Default)]
pub struct FactoryRegistry {
    factories: BTreeMap<String, Arc<dyn ProviderFactory>>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in factories.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(DirectoryProviderFactory::new()));
        registry.register(Arc::new(StaticStyleProviderFactory::new()));
        registry.register(Arc::new(MemoryProviderFactory::new()));
        registry
    }

    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        self.factories.insert(factory.name().to_string(), factory);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn ProviderFactory>> {
        self.factories
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::FactoryNotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    pub fn create(&self, source: ProviderSource) -> Result<Arc<dyn Provider>> {
        source.validate()?;
        self.get(source.factory())?.create(source)
    }
}

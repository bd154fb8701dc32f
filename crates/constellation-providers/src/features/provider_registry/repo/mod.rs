pub mod config_store;

use crate::Provider;
use constellation_core::{CoreError, Result};
use std::sync::{Arc, RwLock};

pub use config_store::{
    FileProviderConfigRepository, InMemoryProviderConfigRepository, ProviderConfigRepository,
};

/// Storage for live providers of one registry.
///
/// Iteration order is registration order; lookups by key rely on it.
pub trait ProviderRegistryRepository: Send + Sync {
    /// Fails with `DuplicateProvider` if the id is taken.
    fn insert(&self, provider: Arc<dyn Provider>) -> Result<()>;

    /// Swap in `provider`, keeping the position of the entry it replaces.
    /// Appends when no provider has that id.
    fn replace(&self, provider: Arc<dyn Provider>) -> Result<Option<Arc<dyn Provider>>>;

    fn remove(&self, provider_id: &str) -> Result<Option<Arc<dyn Provider>>>;

    fn get(&self, provider_id: &str) -> Result<Option<Arc<dyn Provider>>>;

    fn list(&self) -> Result<Vec<Arc<dyn Provider>>>;

    /// Take every provider out of the registry.
    fn drain(&self) -> Result<Vec<Arc<dyn Provider>>>;
}

#[derive(Clone, Default)]
pub struct InMemoryProviderRegistryRepository {
    providers: Arc<RwLock<Vec<Arc<dyn Provider>>>>,
}

impl InMemoryProviderRegistryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> CoreError {
    CoreError::LockPoisoned("provider registry".to_string())
}

impl ProviderRegistryRepository for InMemoryProviderRegistryRepository {
    fn insert(&self, provider: Arc<dyn Provider>) -> Result<()> {
        let mut providers = self.providers.write().map_err(|_| poisoned())?;
        if providers.iter().any(|p| p.id() == provider.id()) {
            return Err(CoreError::DuplicateProvider(provider.id().to_string()));
        }
        providers.push(provider);
        Ok(())
    }

    fn replace(&self, provider: Arc<dyn Provider>) -> Result<Option<Arc<dyn Provider>>> {
        let mut providers = self.providers.write().map_err(|_| poisoned())?;
        match providers.iter().position(|p| p.id() == provider.id()) {
            Some(index) => Ok(Some(std::mem::replace(&mut providers[index], provider))),
            None => {
                providers.push(provider);
                Ok(None)
            }
        }
    }

    fn remove(&self, provider_id: &str) -> Result<Option<Arc<dyn Provider>>> {
        let mut providers = self.providers.write().map_err(|_| poisoned())?;
        Ok(providers
            .iter()
            .position(|p| p.id() == provider_id)
            .map(|index| providers.remove(index)))
    }

    fn get(&self, provider_id: &str) -> Result<Option<Arc<dyn Provider>>> {
        let providers = self.providers.read().map_err(|_| poisoned())?;
        Ok(providers.iter().find(|p| p.id() == provider_id).cloned())
    }

    fn list(&self) -> Result<Vec<Arc<dyn Provider>>> {
        let providers = self.providers.read().map_err(|_| poisoned())?;
        Ok(providers.clone())
    }

    fn drain(&self) -> Result<Vec<Arc<dyn Provider>>> {
        let mut providers = self.providers.write().map_err(|_| poisoned())?;
        Ok(std::mem::take(&mut *providers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_provider::MemoryProvider;
    use crate::ProviderSource;
    use constellation_core::{DataType, ProviderKind};

    fn provider(id: &str) -> Arc<dyn Provider> {
        Arc::new(MemoryProvider::new(
            ProviderSource::new(id, "memory", ProviderKind::Layer),
            DataType::Vector,
            vec![],
        ))
    }

    fn ids(repo: &InMemoryProviderRegistryRepository) -> Vec<String> {
        repo.list()
            .unwrap()
            .iter()
            .map(|p| p.id().to_string())
            .collect()
    }

    #[test]
    fn test_insert_keeps_registration_order() {
        let repo = InMemoryProviderRegistryRepository::new();
        repo.insert(provider("b")).unwrap();
        repo.insert(provider("a")).unwrap();
        repo.insert(provider("c")).unwrap();
        assert_eq!(ids(&repo), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_insert_rejects_duplicate_id() {
        let repo = InMemoryProviderRegistryRepository::new();
        repo.insert(provider("a")).unwrap();
        assert!(matches!(
            repo.insert(provider("a")),
            Err(CoreError::DuplicateProvider(_))
        ));
        assert_eq!(repo.list().unwrap().len(), 1);
    }

    #[test]
    fn test_replace_keeps_position() {
        let repo = InMemoryProviderRegistryRepository::new();
        repo.insert(provider("a")).unwrap();
        repo.insert(provider("b")).unwrap();
        let replacement = provider("a");

        let previous = repo.replace(replacement.clone()).unwrap().unwrap();
        assert!(!Arc::ptr_eq(&previous, &replacement));
        assert_eq!(ids(&repo), vec!["a", "b"]);
        assert!(Arc::ptr_eq(&repo.get("a").unwrap().unwrap(), &replacement));

        assert!(repo.replace(provider("c")).unwrap().is_none());
        assert_eq!(ids(&repo), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_remove_and_get() {
        let repo = InMemoryProviderRegistryRepository::new();
        repo.insert(provider("a")).unwrap();
        assert!(repo.remove("a").unwrap().is_some());
        assert!(repo.remove("a").unwrap().is_none());
        assert!(repo.get("a").unwrap().is_none());
    }

    #[test]
    fn test_drain_empties_registry() {
        let repo = InMemoryProviderRegistryRepository::new();
        repo.insert(provider("a")).unwrap();
        repo.insert(provider("b")).unwrap();
        assert_eq!(repo.drain().unwrap().len(), 2);
        assert!(repo.list().unwrap().is_empty());
    }

    #[test]
    fn test_clones_share_storage() {
        let repo = InMemoryProviderRegistryRepository::new();
        let clone = repo.clone();
        repo.insert(provider("a")).unwrap();
        assert!(clone.get("a").unwrap().is_some());
    }
}

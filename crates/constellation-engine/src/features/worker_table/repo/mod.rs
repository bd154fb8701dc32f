use crate::shared::error::{EngineError, EngineResult};
use crate::shared::types::ServiceType;
use crate::worker::Worker;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

pub type WorkerMap = BTreeMap<String, Arc<dyn Worker>>;

/// Repository trait for the service worker table
#[async_trait]
pub trait WorkerTableRepository: Send + Sync {
    /// Store a worker, returning the one it replaced
    async fn insert(
        &self,
        service_type: ServiceType,
        id: &str,
        worker: Arc<dyn Worker>,
    ) -> EngineResult<Option<Arc<dyn Worker>>>;

    async fn remove(&self, service_type: ServiceType, id: &str)
        -> EngineResult<Option<Arc<dyn Worker>>>;

    async fn get(&self, service_type: ServiceType, id: &str) -> EngineResult<Option<Arc<dyn Worker>>>;

    async fn contains(&self, service_type: ServiceType, id: &str) -> EngineResult<bool>;

    async fn count(&self, service_type: ServiceType) -> EngineResult<usize>;

    /// Snapshot of the workers of one service, keyed by instance id
    async fn snapshot(&self, service_type: ServiceType) -> EngineResult<WorkerMap>;

    /// Take every worker of one service out of the table
    async fn drain(&self, service_type: ServiceType) -> EngineResult<WorkerMap>;

    /// Service types holding at least one worker
    async fn service_types(&self) -> EngineResult<Vec<ServiceType>>;
}

/// In-memory implementation of the worker table
#[derive(Clone, Default)]
pub struct InMemoryWorkerTableRepository {
    storage: Arc<RwLock<HashMap<ServiceType, WorkerMap>>>,
}

impl InMemoryWorkerTableRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> EngineError {
    EngineError::StorageError("Lock poisoned".to_string())
}

#[async_trait]
impl WorkerTableRepository for InMemoryWorkerTableRepository {
    async fn insert(
        &self,
        service_type: ServiceType,
        id: &str,
        worker: Arc<dyn Worker>,
    ) -> EngineResult<Option<Arc<dyn Worker>>> {
        let mut storage = self.storage.write().map_err(|_| poisoned())?;
        Ok(storage
            .entry(service_type)
            .or_default()
            .insert(id.to_string(), worker))
    }

    async fn remove(
        &self,
        service_type: ServiceType,
        id: &str,
    ) -> EngineResult<Option<Arc<dyn Worker>>> {
        let mut storage = self.storage.write().map_err(|_| poisoned())?;
        let Some(workers) = storage.get_mut(&service_type) else {
            return Ok(None);
        };
        let removed = workers.remove(id);
        if workers.is_empty() {
            storage.remove(&service_type);
        }
        Ok(removed)
    }

    async fn get(&self, service_type: ServiceType, id: &str) -> EngineResult<Option<Arc<dyn Worker>>> {
        let storage = self.storage.read().map_err(|_| poisoned())?;
        Ok(storage
            .get(&service_type)
            .and_then(|workers| workers.get(id))
            .cloned())
    }

    async fn contains(&self, service_type: ServiceType, id: &str) -> EngineResult<bool> {
        let storage = self.storage.read().map_err(|_| poisoned())?;
        Ok(storage
            .get(&service_type)
            .is_some_and(|workers| workers.contains_key(id)))
    }

    async fn count(&self, service_type: ServiceType) -> EngineResult<usize> {
        let storage = self.storage.read().map_err(|_| poisoned())?;
        Ok(storage.get(&service_type).map_or(0, BTreeMap::len))
    }

    async fn snapshot(&self, service_type: ServiceType) -> EngineResult<WorkerMap> {
        let storage = self.storage.read().map_err(|_| poisoned())?;
        Ok(storage.get(&service_type).cloned().unwrap_or_default())
    }

    async fn drain(&self, service_type: ServiceType) -> EngineResult<WorkerMap> {
        let mut storage = self.storage.write().map_err(|_| poisoned())?;
        Ok(storage.remove(&service_type).unwrap_or_default())
    }

    async fn service_types(&self) -> EngineResult<Vec<ServiceType>> {
        let storage = self.storage.read().map_err(|_| poisoned())?;
        let mut types: Vec<ServiceType> = storage.keys().copied().collect();
        types.sort();
        Ok(types)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::testing::StubWorker;

    fn worker(service_type: ServiceType, id: &str) -> Arc<dyn Worker> {
        StubWorker::started(service_type, id)
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let repo = InMemoryWorkerTableRepository::new();
        let previous = repo
            .insert(ServiceType::Wms, "default", worker(ServiceType::Wms, "default"))
            .await
            .unwrap();
        assert!(previous.is_none());

        let retrieved = repo.get(ServiceType::Wms, "default").await.unwrap();
        assert_eq!(retrieved.unwrap().id(), "default");
        assert!(repo.get(ServiceType::Wfs, "default").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_returns_replaced_worker() {
        let repo = InMemoryWorkerTableRepository::new();
        let first = worker(ServiceType::Wms, "default");
        repo.insert(ServiceType::Wms, "default", first.clone())
            .await
            .unwrap();

        let previous = repo
            .insert(ServiceType::Wms, "default", worker(ServiceType::Wms, "default"))
            .await
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&previous, &first));
        assert_eq!(repo.count(ServiceType::Wms).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_count_is_per_service() {
        let repo = InMemoryWorkerTableRepository::new();
        for id in ["a", "b", "c"] {
            repo.insert(ServiceType::Wms, id, worker(ServiceType::Wms, id))
                .await
                .unwrap();
        }
        repo.insert(ServiceType::Sos, "a", worker(ServiceType::Sos, "a"))
            .await
            .unwrap();

        assert_eq!(repo.count(ServiceType::Wms).await.unwrap(), 3);
        assert_eq!(repo.count(ServiceType::Sos).await.unwrap(), 1);
        assert_eq!(repo.count(ServiceType::Csw).await.unwrap(), 0);
        assert_eq!(
            repo.service_types().await.unwrap(),
            vec![ServiceType::Wms, ServiceType::Sos]
        );
    }

    #[tokio::test]
    async fn test_remove_drops_empty_service() {
        let repo = InMemoryWorkerTableRepository::new();
        repo.insert(ServiceType::Wcs, "a", worker(ServiceType::Wcs, "a"))
            .await
            .unwrap();

        assert!(repo.remove(ServiceType::Wcs, "a").await.unwrap().is_some());
        assert!(repo.remove(ServiceType::Wcs, "a").await.unwrap().is_none());
        assert!(!repo.contains(ServiceType::Wcs, "a").await.unwrap());
        assert!(repo.service_types().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_is_detached() {
        let repo = InMemoryWorkerTableRepository::new();
        repo.insert(ServiceType::Wms, "a", worker(ServiceType::Wms, "a"))
            .await
            .unwrap();

        let snapshot = repo.snapshot(ServiceType::Wms).await.unwrap();
        repo.insert(ServiceType::Wms, "b", worker(ServiceType::Wms, "b"))
            .await
            .unwrap();

        assert_eq!(snapshot.keys().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(repo.count(ServiceType::Wms).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_drain() {
        let repo = InMemoryWorkerTableRepository::new();
        repo.insert(ServiceType::Wfs, "a", worker(ServiceType::Wfs, "a"))
            .await
            .unwrap();
        repo.insert(ServiceType::Wfs, "b", worker(ServiceType::Wfs, "b"))
            .await
            .unwrap();

        assert_eq!(repo.drain(ServiceType::Wfs).await.unwrap().len(), 2);
        assert_eq!(repo.count(ServiceType::Wfs).await.unwrap(), 0);
        assert!(repo.drain(ServiceType::Wfs).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_arc_clone_behavior() {
        let repo = InMemoryWorkerTableRepository::new();
        let repo_clone = repo.clone();
        repo.insert(ServiceType::Wms, "a", worker(ServiceType::Wms, "a"))
            .await
            .unwrap();
        assert!(repo_clone.contains(ServiceType::Wms, "a").await.unwrap());
    }
}

use crate::features::observability::controller::ObservabilityController;
use crate::features::worker_table::repo::{WorkerMap, WorkerTableRepository};
use crate::shared::error::{EngineError, EngineResult};
use crate::shared::types::{ServiceType, WorkerStatus};
use crate::worker::Worker;
use constellation_core::{
    record_shared, worker_subject, LifecycleEvent, LifecycleEventType, SharedEventRecorder,
};
use std::sync::Arc;
use tracing::{info, warn};

/// The service worker table.
///
/// Installing a worker under a taken key shuts the previous worker down,
/// and removal always shuts the removed worker down, so no worker outlives
/// its entry.
pub struct WorkerTableService {
    repo: Arc<dyn WorkerTableRepository>,
    events: SharedEventRecorder,
    metrics: Arc<ObservabilityController>,
}

impl WorkerTableService {
    pub fn new(
        repo: Arc<dyn WorkerTableRepository>,
        events: SharedEventRecorder,
        metrics: Arc<ObservabilityController>,
    ) -> Self {
        Self {
            repo,
            events,
            metrics,
        }
    }

    pub async fn service_instance_exists(
        &self,
        service_type: ServiceType,
        id: &str,
    ) -> EngineResult<bool> {
        self.repo.contains(service_type, id).await
    }

    pub async fn instance_size(&self, service_type: ServiceType) -> EngineResult<usize> {
        self.repo.count(service_type).await
    }

    pub async fn get_worker(
        &self,
        service_type: ServiceType,
        id: &str,
    ) -> EngineResult<Arc<dyn Worker>> {
        self.repo
            .get(service_type, id)
            .await?
            .ok_or_else(|| EngineError::InstanceNotFound(worker_subject(service_type, id)))
    }

    /// Install `worker`, shutting down the worker it replaces.
    pub async fn add_service_instance(
        &self,
        service_type: ServiceType,
        id: &str,
        worker: Arc<dyn Worker>,
    ) -> EngineResult<()> {
        let previous = self.repo.insert(service_type, id, worker.clone()).await?;
        let subject = worker_subject(service_type, id);

        if let Some(previous) = previous.filter(|p| !Arc::ptr_eq(p, &worker)) {
            if let Err(error) = self.stop(&subject, previous.as_ref()) {
                warn!(worker = %subject, error = %error, "Replaced worker failed to shut down");
            }
        }

        if worker.is_started() {
            record_shared(
                &self.events,
                LifecycleEvent::new(LifecycleEventType::WorkerStarted, &subject),
            );
        }
        info!(worker = %subject, started = worker.is_started(), "Worker installed");
        self.refresh_gauge(service_type).await;
        Ok(())
    }

    /// Stop and remove one worker. Returns whether a worker was registered.
    pub async fn shutdown_instance(&self, service_type: ServiceType, id: &str) -> EngineResult<bool> {
        let Some(worker) = self.repo.remove(service_type, id).await? else {
            return Ok(false);
        };
        let subject = worker_subject(service_type, id);
        let result = self.stop(&subject, worker.as_ref());
        self.refresh_gauge(service_type).await;
        result.map(|_| true)
    }

    /// Stop and remove every worker of a service. All workers are attempted;
    /// failures are aggregated. Returns how many workers were removed.
    pub async fn destroy_instances(&self, service_type: ServiceType) -> EngineResult<usize> {
        let workers = self.repo.drain(service_type).await?;
        let removed = workers.len();
        let failures = self.stop_all(service_type, workers);
        self.refresh_gauge(service_type).await;

        info!(service = %service_type, removed, failures = failures.len(), "Service instances destroyed");
        if failures.is_empty() {
            Ok(removed)
        } else {
            Err(EngineError::ShutdownFailed(failures.join("; ")))
        }
    }

    pub async fn workers_map(&self, service_type: ServiceType) -> EngineResult<WorkerMap> {
        self.repo.snapshot(service_type).await
    }

    pub async fn service_types(&self) -> EngineResult<Vec<ServiceType>> {
        self.repo.service_types().await
    }

    pub async fn list_status(&self, service_type: ServiceType) -> EngineResult<Vec<WorkerStatus>> {
        Ok(self
            .repo
            .snapshot(service_type)
            .await?
            .values()
            .map(|worker| worker.status())
            .collect())
    }

    /// Stop every worker of every service.
    pub async fn shutdown_all(&self) -> EngineResult<()> {
        let mut failures = Vec::new();
        for service_type in self.repo.service_types().await? {
            if let Err(error) = self.destroy_instances(service_type).await {
                failures.push(error.to_string());
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(EngineError::ShutdownFailed(failures.join("; ")))
        }
    }

    fn stop_all(&self, service_type: ServiceType, workers: WorkerMap) -> Vec<String> {
        workers
            .iter()
            .filter_map(|(id, worker)| {
                self.stop(&worker_subject(service_type, id), worker.as_ref())
                    .err()
                    .map(|e| format!("{id}: {e}"))
            })
            .collect()
    }

    fn stop(&self, subject: &str, worker: &dyn Worker) -> EngineResult<()> {
        match worker.shutdown() {
            Ok(()) => {
                record_shared(
                    &self.events,
                    LifecycleEvent::new(LifecycleEventType::WorkerShutdown, subject),
                );
                Ok(())
            }
            Err(error) => {
                record_shared(
                    &self.events,
                    LifecycleEvent::new(LifecycleEventType::WorkerFailed, subject)
                        .with_error(error.to_string()),
                );
                Err(error)
            }
        }
    }

    async fn refresh_gauge(&self, service_type: ServiceType) {
        match self.repo.snapshot(service_type).await {
            Ok(workers) => {
                let started = workers.values().filter(|w| w.is_started()).count();
                self.metrics.set_active_workers(service_type, started);
            }
            Err(error) => warn!(service = %service_type, error = %error, "Cannot refresh worker gauge"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::worker_table::repo::InMemoryWorkerTableRepository;
    use crate::worker::testing::StubWorker;
    use constellation_core::LifecycleEventRecorder;
    use std::sync::Mutex;

    fn create_test_service() -> (WorkerTableService, SharedEventRecorder) {
        let events: SharedEventRecorder = Arc::new(Mutex::new(LifecycleEventRecorder::new()));
        let service = WorkerTableService::new(
            Arc::new(InMemoryWorkerTableRepository::new()),
            events.clone(),
            Arc::new(ObservabilityController::with_new_registry().unwrap()),
        );
        (service, events)
    }

    #[tokio::test]
    async fn test_add_and_exists() {
        let (service, _) = create_test_service();
        service
            .add_service_instance(ServiceType::Wms, "default", StubWorker::started(ServiceType::Wms, "default"))
            .await
            .unwrap();

        assert!(service.service_instance_exists(ServiceType::Wms, "default").await.unwrap());
        assert!(!service.service_instance_exists(ServiceType::Wfs, "default").await.unwrap());
        assert_eq!(service.instance_size(ServiceType::Wms).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_add_replaces_and_shuts_down_previous() {
        let (service, events) = create_test_service();
        let first = StubWorker::started(ServiceType::Wms, "default");
        let second = StubWorker::started(ServiceType::Wms, "default");

        service
            .add_service_instance(ServiceType::Wms, "default", first.clone())
            .await
            .unwrap();
        service
            .add_service_instance(ServiceType::Wms, "default", second.clone())
            .await
            .unwrap();

        assert_eq!(first.shutdown_count(), 1);
        assert_eq!(second.shutdown_count(), 0);
        assert_eq!(service.instance_size(ServiceType::Wms).await.unwrap(), 1);
        let installed = service.get_worker(ServiceType::Wms, "default").await.unwrap();
        assert!(installed.is_started());

        let events = events.lock().unwrap();
        let kinds: Vec<LifecycleEventType> = events
            .events_for("WMS/default")
            .iter()
            .map(|e| e.event_type)
            .collect();
        assert_eq!(
            kinds,
            vec![
                LifecycleEventType::WorkerStarted,
                LifecycleEventType::WorkerShutdown,
                LifecycleEventType::WorkerStarted
            ]
        );
    }

    #[tokio::test]
    async fn test_readding_same_worker_does_not_shut_it_down() {
        let (service, _) = create_test_service();
        let worker = StubWorker::started(ServiceType::Csw, "meta");
        service
            .add_service_instance(ServiceType::Csw, "meta", worker.clone())
            .await
            .unwrap();
        service
            .add_service_instance(ServiceType::Csw, "meta", worker.clone())
            .await
            .unwrap();
        assert_eq!(worker.shutdown_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_instance_is_idempotent() {
        let (service, _) = create_test_service();
        let worker = StubWorker::started(ServiceType::Wfs, "features");
        service
            .add_service_instance(ServiceType::Wfs, "features", worker.clone())
            .await
            .unwrap();

        assert!(service.shutdown_instance(ServiceType::Wfs, "features").await.unwrap());
        assert!(!service.shutdown_instance(ServiceType::Wfs, "features").await.unwrap());
        assert_eq!(worker.shutdown_count(), 1);
        assert!(!worker.is_started());
        assert!(matches!(
            service.get_worker(ServiceType::Wfs, "features").await,
            Err(EngineError::InstanceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_destroy_instances_attempts_every_worker() {
        let (service, _) = create_test_service();
        let mut faulty = StubWorker::with_outcome(ServiceType::Wms, "b", None);
        faulty.fail_shutdown = true;
        let faulty = Arc::new(faulty);
        let a = StubWorker::started(ServiceType::Wms, "a");
        let c = StubWorker::started(ServiceType::Wms, "c");

        for worker in [a.clone(), faulty.clone(), c.clone()] {
            let id = worker.id.clone();
            service
                .add_service_instance(ServiceType::Wms, &id, worker)
                .await
                .unwrap();
        }

        let result = service.destroy_instances(ServiceType::Wms).await;
        assert!(matches!(result, Err(EngineError::ShutdownFailed(ref m)) if m.contains("b")));
        assert_eq!(a.shutdown_count(), 1);
        assert_eq!(c.shutdown_count(), 1);
        assert_eq!(service.instance_size(ServiceType::Wms).await.unwrap(), 0);

        assert_eq!(service.destroy_instances(ServiceType::Wms).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_status_and_shutdown_all() {
        let (service, _) = create_test_service();
        service
            .add_service_instance(ServiceType::Wms, "a", StubWorker::started(ServiceType::Wms, "a"))
            .await
            .unwrap();
        service
            .add_service_instance(
                ServiceType::Sos,
                "obs",
                StubWorker::failed(ServiceType::Sos, "obs", "no layer context"),
            )
            .await
            .unwrap();

        let statuses = service.list_status(ServiceType::Sos).await.unwrap();
        assert_eq!(statuses.len(), 1);
        assert!(!statuses[0].started);
        assert_eq!(statuses[0].start_error.as_deref(), Some("no layer context"));

        service.shutdown_all().await.unwrap();
        assert!(service.service_types().await.unwrap().is_empty());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;
        use std::collections::BTreeSet;

        #[derive(Debug, Clone)]
        enum Op {
            Add(u8),
            Shutdown(u8),
        }

        fn op_strategy() -> impl Strategy<Value = Op> {
            prop_oneof![(0u8..6).prop_map(Op::Add), (0u8..6).prop_map(Op::Shutdown)]
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(100))]

            // Instance size equals the distinct ids added minus those shut down.
            #[test]
            fn property_instance_size_accounting(ops in prop::collection::vec(op_strategy(), 0..40)) {
                tokio_test::block_on(async {
                    let (service, _) = create_test_service();
                    let mut live = BTreeSet::new();

                    for op in ops {
                        match op {
                            Op::Add(n) => {
                                let id = format!("i{n}");
                                service
                                    .add_service_instance(ServiceType::Wms, &id, StubWorker::started(ServiceType::Wms, &id))
                                    .await
                                    .unwrap();
                                live.insert(id);
                            }
                            Op::Shutdown(n) => {
                                let id = format!("i{n}");
                                let existed = service.shutdown_instance(ServiceType::Wms, &id).await.unwrap();
                                assert_eq!(existed, live.remove(&id));
                            }
                        }
                        assert_eq!(service.instance_size(ServiceType::Wms).await.unwrap(), live.len());
                    }
                });
            }
        }
    }
}

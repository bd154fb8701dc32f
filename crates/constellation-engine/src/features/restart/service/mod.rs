use crate::features::observability::controller::ObservabilityController;
use crate::features::restart::repo::InstanceDirectoryRepository;
use crate::features::worker_table::service::WorkerTableService;
use crate::shared::error::{EngineError, EngineResult};
use crate::shared::types::{RestartReport, RestartRequest, ServiceType};
use crate::worker::{Worker, WorkerFactory};
use constellation_core::{
    record_shared, worker_subject, LifecycleEvent, LifecycleEventType, SharedEventRecorder,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, warn};

/// Rebuilds workers from their instance directories.
///
/// Restart of a single instance:
/// - `close_first`: the current worker is shut down before the new one is
///   built; a new worker that does not start is not left installed.
/// - otherwise the new worker is built while the old one keeps serving and
///   only replaces it once started.
///
/// Restart of every running instance:
/// - `close_first`: best effort. Every instance is attempted and the ones
///   that did not come back are reported together.
/// - otherwise all or nothing. Old workers are only replaced once every
///   replacement has started.
pub struct RestartService {
    table: Arc<WorkerTableService>,
    directories: Arc<dyn InstanceDirectoryRepository>,
    factory: Arc<dyn WorkerFactory>,
    events: SharedEventRecorder,
    metrics: Arc<ObservabilityController>,
}

impl RestartService {
    pub fn new(
        table: Arc<WorkerTableService>,
        directories: Arc<dyn InstanceDirectoryRepository>,
        factory: Arc<dyn WorkerFactory>,
        events: SharedEventRecorder,
        metrics: Arc<ObservabilityController>,
    ) -> Self {
        Self {
            table,
            directories,
            factory,
            events,
            metrics,
        }
    }

    pub async fn restart(&self, request: RestartRequest) -> EngineResult<RestartReport> {
        let RestartRequest {
            service_type,
            identifier,
            close_first,
        } = request;

        let restarted = match identifier {
            Some(id) => self
                .restart_one(service_type, &id, close_first)
                .await
                .map(|_| vec![id]),
            None => self.restart_all(service_type, close_first).await,
        };

        self.metrics.record_restart(service_type, restarted.is_ok());
        Ok(RestartReport {
            service_type,
            restarted: restarted?,
        })
    }

    /// Start every instance directory of a service. Workers that fail to
    /// start are still installed so their error can be listed. Returns the
    /// ids that started.
    pub async fn start_all(&self, service_type: ServiceType) -> EngineResult<Vec<String>> {
        let mut started = Vec::new();
        for id in self.directories.list_instances(service_type)? {
            let worker = self.build(service_type, &id)?;
            if worker.is_started() {
                started.push(id.clone());
            }
            self.table
                .add_service_instance(service_type, &id, worker)
                .await?;
        }
        info!(service = %service_type, started = started.len(), "Service instances started");
        Ok(started)
    }

    async fn restart_one(
        &self,
        service_type: ServiceType,
        id: &str,
        close_first: bool,
    ) -> EngineResult<()> {
        let subject = worker_subject(service_type, id);
        if !self.directories.exists(service_type, id)? {
            self.record_failure(&subject, "no such instance");
            return Err(EngineError::InstanceNotFound(subject));
        }

        if close_first {
            if let Err(error) = self.table.shutdown_instance(service_type, id).await {
                warn!(worker = %subject, error = %error, "Previous worker failed to shut down");
            }
        }

        let worker = self.build(service_type, id)?;
        if let Err(reason) = check_started(worker.as_ref()) {
            discard(worker.as_ref());
            self.record_failure(&subject, &reason);
            return Err(EngineError::InstanceStartFailed(format!("{subject}: {reason}")));
        }

        self.table
            .add_service_instance(service_type, id, worker)
            .await?;
        self.record_restarted(&subject);
        info!(worker = %subject, close_first, "Instance restarted");
        Ok(())
    }

    async fn restart_all(
        &self,
        service_type: ServiceType,
        close_first: bool,
    ) -> EngineResult<Vec<String>> {
        let snapshot = self.table.workers_map(service_type).await?;
        let on_disk: BTreeSet<String> = self
            .directories
            .list_instances(service_type)?
            .into_iter()
            .collect();

        let mut failures = BTreeMap::new();
        let mut targets = Vec::new();
        for id in snapshot.keys() {
            if on_disk.contains(id) {
                targets.push(id.clone());
            } else {
                failures.insert(id.clone(), "instance directory no longer exists".to_string());
            }
        }

        if close_first {
            self.restart_all_best_effort(service_type, targets, failures)
                .await
        } else {
            self.restart_all_atomic(service_type, targets, failures)
                .await
        }
    }

    async fn restart_all_best_effort(
        &self,
        service_type: ServiceType,
        targets: Vec<String>,
        mut failures: BTreeMap<String, String>,
    ) -> EngineResult<Vec<String>> {
        if let Err(error) = self.table.destroy_instances(service_type).await {
            warn!(service = %service_type, error = %error, "Some workers failed to shut down");
        }

        let mut restarted = Vec::new();
        for id in targets {
            let subject = worker_subject(service_type, &id);
            let worker = self.build(service_type, &id)?;
            match check_started(worker.as_ref()) {
                Ok(()) => {
                    self.table
                        .add_service_instance(service_type, &id, worker)
                        .await?;
                    self.record_restarted(&subject);
                    restarted.push(id);
                }
                Err(reason) => {
                    discard(worker.as_ref());
                    self.record_failure(&subject, &reason);
                    failures.insert(id, reason);
                }
            }
        }

        self.finish_all(service_type, restarted, failures)
    }

    async fn restart_all_atomic(
        &self,
        service_type: ServiceType,
        targets: Vec<String>,
        mut failures: BTreeMap<String, String>,
    ) -> EngineResult<Vec<String>> {
        if !failures.is_empty() {
            return self.finish_all(service_type, Vec::new(), failures);
        }

        let mut replacements = Vec::new();
        for id in targets {
            let worker = self.build(service_type, &id)?;
            if let Err(reason) = check_started(worker.as_ref()) {
                self.record_failure(&worker_subject(service_type, &id), &reason);
                failures.insert(id.clone(), reason);
            }
            replacements.push((id, worker));
        }

        if !failures.is_empty() {
            for (_, worker) in &replacements {
                discard(worker.as_ref());
            }
            return self.finish_all(service_type, Vec::new(), failures);
        }

        let mut restarted = Vec::new();
        for (id, worker) in replacements {
            self.table
                .add_service_instance(service_type, &id, worker)
                .await?;
            self.record_restarted(&worker_subject(service_type, &id));
            restarted.push(id);
        }
        self.finish_all(service_type, restarted, failures)
    }

    fn finish_all(
        &self,
        service_type: ServiceType,
        restarted: Vec<String>,
        failures: BTreeMap<String, String>,
    ) -> EngineResult<Vec<String>> {
        info!(service = %service_type, restarted = restarted.len(), failed = failures.len(), "Restart of all instances finished");
        if failures.is_empty() {
            Ok(restarted)
        } else {
            Err(EngineError::restart_failed(failures))
        }
    }

    fn build(&self, service_type: ServiceType, id: &str) -> EngineResult<Arc<dyn Worker>> {
        let dir = self.directories.instance_dir(service_type, id)?;
        Ok(self.factory.build(service_type, id, &dir))
    }

    fn record_restarted(&self, subject: &str) {
        record_shared(
            &self.events,
            LifecycleEvent::new(LifecycleEventType::WorkerRestarted, subject),
        );
    }

    fn record_failure(&self, subject: &str, reason: &str) {
        warn!(worker = %subject, reason, "Instance could not be restarted");
        record_shared(
            &self.events,
            LifecycleEvent::new(LifecycleEventType::WorkerFailed, subject).with_error(reason),
        );
    }
}

fn check_started(worker: &dyn Worker) -> Result<(), String> {
    if worker.is_started() {
        Ok(())
    } else {
        Err(worker
            .start_error()
            .unwrap_or_else(|| "could not start instance".to_string()))
    }
}

/// Release a worker that never made it into the table.
fn discard(worker: &dyn Worker) {
    if let Err(error) = worker.shutdown() {
        warn!(worker = %worker_subject(worker.service_type(), worker.id()), error = %error, "Discarded worker failed to shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::restart::repo::FileInstanceDirectoryRepository;
    use crate::features::worker_table::repo::InMemoryWorkerTableRepository;
    use crate::worker::testing::StubWorker;
    use crate::worker::MockWorkerFactory;
    use constellation_core::LifecycleEventRecorder;
    use std::collections::HashSet;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct Fixture {
        root: TempDir,
        table: Arc<WorkerTableService>,
        events: SharedEventRecorder,
        metrics: Arc<ObservabilityController>,
    }

    impl Fixture {
        fn new(instances: &[&str]) -> Self {
            let root = tempfile::tempdir().unwrap();
            for id in instances {
                fs::create_dir_all(root.path().join("WMS").join(id)).unwrap();
            }
            let events: SharedEventRecorder = Arc::new(Mutex::new(LifecycleEventRecorder::new()));
            let metrics = Arc::new(ObservabilityController::with_new_registry().unwrap());
            let table = Arc::new(WorkerTableService::new(
                Arc::new(InMemoryWorkerTableRepository::new()),
                events.clone(),
                metrics.clone(),
            ));
            Self {
                root,
                table,
                events,
                metrics,
            }
        }

        fn service(&self, factory: impl WorkerFactory + 'static) -> RestartService {
            RestartService::new(
                self.table.clone(),
                Arc::new(FileInstanceDirectoryRepository::new(self.root.path())),
                Arc::new(factory),
                self.events.clone(),
                self.metrics.clone(),
            )
        }

        async fn install(&self, id: &str) -> Arc<StubWorker> {
            let worker = StubWorker::started(ServiceType::Wms, id);
            self.table
                .add_service_instance(ServiceType::Wms, id, worker.clone())
                .await
                .unwrap();
            worker
        }

        async fn installed(&self, id: &str) -> Arc<dyn Worker> {
            self.table.get_worker(ServiceType::Wms, id).await.unwrap()
        }
    }

    /// Factory whose workers start unless their id is in `failing`.
    fn factory_failing_on(failing: &'static [&'static str]) -> MockWorkerFactory {
        let mut factory = MockWorkerFactory::new();
        factory
            .expect_build()
            .returning(move |service_type, id, _| -> Arc<dyn Worker> {
                if failing.contains(&id) {
                    StubWorker::failed(service_type, id, "layerContext.json missing")
                } else {
                    StubWorker::started(service_type, id)
                }
            });
        factory
    }

    #[tokio::test]
    async fn test_restart_missing_instance_fails() {
        let fixture = Fixture::new(&[]);
        let mut factory = MockWorkerFactory::new();
        factory.expect_build().never();
        let service = fixture.service(factory);

        let result = service
            .restart(RestartRequest::single(ServiceType::Wms, "ghost", true))
            .await;
        assert!(matches!(result, Err(EngineError::InstanceNotFound(ref s)) if s == "WMS/ghost"));
        assert_eq!(fixture.table.instance_size(ServiceType::Wms).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_restart_one_close_first_replaces_worker() {
        let fixture = Fixture::new(&["default"]);
        let old = fixture.install("default").await;

        let mut factory = MockWorkerFactory::new();
        factory
            .expect_build()
            .times(1)
            .withf(|service_type, id, dir| {
                *service_type == ServiceType::Wms && id == "default" && dir.ends_with("WMS/default")
            })
            .returning(|service_type, id, _| -> Arc<dyn Worker> {
                StubWorker::started(service_type, id)
            });
        let service = fixture.service(factory);

        let report = service
            .restart(RestartRequest::single(ServiceType::Wms, "default", true))
            .await
            .unwrap();
        assert_eq!(report.restarted, vec!["default"]);
        assert_eq!(old.shutdown_count(), 1);

        let current = fixture.installed("default").await;
        assert!(current.is_started());
        assert!(!old.is_started());
    }

    #[tokio::test]
    async fn test_restart_one_close_first_failure_leaves_nothing_installed() {
        let fixture = Fixture::new(&["default"]);
        let old = fixture.install("default").await;
        let service = fixture.service(factory_failing_on(&["default"]));

        let result = service
            .restart(RestartRequest::single(ServiceType::Wms, "default", true))
            .await;
        assert!(matches!(result, Err(EngineError::InstanceStartFailed(_))));
        assert_eq!(old.shutdown_count(), 1);
        assert!(!fixture
            .table
            .service_instance_exists(ServiceType::Wms, "default")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_restart_one_without_close_keeps_old_worker_on_failure() {
        let fixture = Fixture::new(&["default"]);
        let old = fixture.install("default").await;
        let service = fixture.service(factory_failing_on(&["default"]));

        let result = service
            .restart(RestartRequest::single(ServiceType::Wms, "default", false))
            .await;
        assert!(matches!(result, Err(EngineError::InstanceStartFailed(_))));
        assert_eq!(old.shutdown_count(), 0);
        assert!(fixture.installed("default").await.is_started());
    }

    #[tokio::test]
    async fn test_restart_one_without_close_swaps_after_start() {
        let fixture = Fixture::new(&["default"]);
        let old = fixture.install("default").await;
        let service = fixture.service(factory_failing_on(&[]));

        service
            .restart(RestartRequest::single(ServiceType::Wms, "default", false))
            .await
            .unwrap();
        assert_eq!(old.shutdown_count(), 1);
        assert_eq!(fixture.table.instance_size(ServiceType::Wms).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_restart_all_preserves_instance_ids() {
        let fixture = Fixture::new(&["a", "b", "c", "never-started"]);
        let mut old = Vec::new();
        for id in ["a", "b", "c"] {
            old.push(fixture.install(id).await);
        }
        let service = fixture.service(factory_failing_on(&[]));

        let report = service
            .restart(RestartRequest::all(ServiceType::Wms, true))
            .await
            .unwrap();
        assert_eq!(report.restarted, vec!["a", "b", "c"]);

        let after: HashSet<String> = fixture
            .table
            .workers_map(ServiceType::Wms)
            .await
            .unwrap()
            .into_keys()
            .collect();
        let expected: HashSet<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        assert_eq!(after, expected);
        assert!(old.iter().all(|w| w.shutdown_count() == 1));
        for id in ["a", "b", "c"] {
            assert!(fixture.installed(id).await.is_started());
        }
    }

    #[tokio::test]
    async fn test_restart_all_best_effort_reports_failures() {
        let fixture = Fixture::new(&["a", "b", "c"]);
        for id in ["a", "b", "c"] {
            fixture.install(id).await;
        }
        let service = fixture.service(factory_failing_on(&["b"]));

        let result = service
            .restart(RestartRequest::all(ServiceType::Wms, true))
            .await;
        match result {
            Err(EngineError::RestartFailed { failures, .. }) => {
                assert_eq!(failures.keys().collect::<Vec<_>>(), vec!["b"]);
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let ids: Vec<String> = fixture
            .table
            .workers_map(ServiceType::Wms)
            .await
            .unwrap()
            .into_keys()
            .collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_restart_all_atomic_rolls_back() {
        let fixture = Fixture::new(&["a", "b", "c"]);
        let mut old = Vec::new();
        for id in ["a", "b", "c"] {
            old.push(fixture.install(id).await);
        }
        let service = fixture.service(factory_failing_on(&["c"]));

        let result = service
            .restart(RestartRequest::all(ServiceType::Wms, false))
            .await;
        assert!(matches!(result, Err(EngineError::RestartFailed { .. })));
        assert!(old.iter().all(|w| w.shutdown_count() == 0 && w.is_started()));
        for (id, worker) in ["a", "b", "c"].iter().zip(&old) {
            let current = fixture.installed(id).await;
            assert_eq!(
                Arc::as_ptr(&current) as *const u8,
                Arc::as_ptr(worker) as *const u8
            );
        }
    }

    #[tokio::test]
    async fn test_restart_all_atomic_success() {
        let fixture = Fixture::new(&["a", "b"]);
        let a = fixture.install("a").await;
        let b = fixture.install("b").await;
        let service = fixture.service(factory_failing_on(&[]));

        let report = service
            .restart(RestartRequest::all(ServiceType::Wms, false))
            .await
            .unwrap();
        assert_eq!(report.restarted, vec!["a", "b"]);
        assert_eq!(a.shutdown_count(), 1);
        assert_eq!(b.shutdown_count(), 1);
    }

    #[tokio::test]
    async fn test_restart_all_vanished_directory_is_a_failure() {
        let fixture = Fixture::new(&["a", "b"]);
        let a = fixture.install("a").await;
        fixture.install("b").await;
        fs::remove_dir_all(fixture.root.path().join("WMS").join("b")).unwrap();

        let service = fixture.service(factory_failing_on(&[]));
        let result = service
            .restart(RestartRequest::all(ServiceType::Wms, false))
            .await;
        match result {
            Err(EngineError::RestartFailed { failures, .. }) => {
                assert!(failures["b"].contains("no longer exists"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(a.shutdown_count(), 0);
    }

    #[tokio::test]
    async fn test_restart_all_with_nothing_running_is_a_no_op() {
        let fixture = Fixture::new(&["a"]);
        let mut factory = MockWorkerFactory::new();
        factory.expect_build().never();
        let service = fixture.service(factory);

        let report = service
            .restart(RestartRequest::all(ServiceType::Wms, true))
            .await
            .unwrap();
        assert!(report.restarted.is_empty());
        assert_eq!(fixture.table.instance_size(ServiceType::Wms).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_start_all_installs_every_directory() {
        let fixture = Fixture::new(&["a", "broken"]);
        let service = fixture.service(factory_failing_on(&["broken"]));

        let started = service.start_all(ServiceType::Wms).await.unwrap();
        assert_eq!(started, vec!["a"]);
        assert_eq!(fixture.table.instance_size(ServiceType::Wms).await.unwrap(), 2);

        let status = fixture.table.list_status(ServiceType::Wms).await.unwrap();
        let broken = status.iter().find(|s| s.id == "broken").unwrap();
        assert_eq!(broken.start_error.as_deref(), Some("layerContext.json missing"));
    }

    #[tokio::test]
    async fn test_restart_records_events_and_metrics() {
        let fixture = Fixture::new(&["default"]);
        fixture.install("default").await;
        let service = fixture.service(factory_failing_on(&[]));

        service
            .restart(RestartRequest::single(ServiceType::Wms, "default", true))
            .await
            .unwrap();
        let _ = service
            .restart(RestartRequest::single(ServiceType::Wms, "ghost", true))
            .await;

        let events = fixture.events.lock().unwrap();
        assert!(events
            .events_for("WMS/default")
            .iter()
            .any(|e| e.event_type == LifecycleEventType::WorkerRestarted));
        assert!(events
            .events_for("WMS/ghost")
            .iter()
            .any(|e| e.event_type == LifecycleEventType::WorkerFailed));

        let rendered = fixture.metrics.render_metrics().unwrap();
        assert!(rendered.contains("outcome=\"success\""));
        assert!(rendered.contains("outcome=\"failure\""));
    }
}

pub mod features;
pub mod server;
pub mod shared;
pub mod worker;

use crate::features::admin_process::controller::ProcessController;
use crate::features::admin_process::repo::InMemoryProcessRepository;
use crate::features::admin_process::service::ProcessService;
use crate::features::observability::controller::ObservabilityController;
use crate::features::restart::controller::RestartController;
use crate::features::restart::repo::FileInstanceDirectoryRepository;
use crate::features::restart::service::RestartService;
use crate::features::worker_table::controller::WorkerTableController;
use crate::features::worker_table::repo::InMemoryWorkerTableRepository;
use crate::features::worker_table::service::WorkerTableService;
use crate::shared::config::EngineConfig;
use crate::shared::error::{EngineError, EngineResult};
use crate::shared::registries::ProviderRegistries;
use crate::worker::{DefaultWorkerFactory, WorkerFactory};
use constellation_core::{LifecycleEventRecorder, ServiceType, SharedEventRecorder};
use constellation_providers::FactoryRegistry;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// What came up at boot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BootReport {
    pub providers: usize,
    /// Started instance ids per service.
    pub workers: BTreeMap<ServiceType, Vec<String>>,
}

/// Everything one engine owns: the provider registries, the worker table,
/// restart orchestration and the administration processes.
///
/// Built once at start-up and shared by `Arc`; [`Constellation::shutdown`]
/// stops every worker and disposes every provider.
pub struct Constellation {
    config: EngineConfig,
    events: SharedEventRecorder,
    metrics: Arc<ObservabilityController>,
    registries: ProviderRegistries,
    workers: Arc<WorkerTableService>,
    restart: Arc<RestartService>,
    processes: Arc<ProcessService>,
}

impl Constellation {
    /// Engine with the built-in provider factories and default workers.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        let events: SharedEventRecorder = Arc::new(Mutex::new(
            LifecycleEventRecorder::with_capacity(config.event_capacity),
        ));
        let registries = ProviderRegistries::open(
            &config.providers_dir(),
            Arc::new(FactoryRegistry::with_defaults()),
            events.clone(),
        );
        let worker_factory = Arc::new(DefaultWorkerFactory::new(
            registries.layers().clone(),
            registries.styles().clone(),
        ));
        Self::with_parts(config, registries, worker_factory, events)
    }

    pub fn with_parts(
        config: EngineConfig,
        registries: ProviderRegistries,
        worker_factory: Arc<dyn WorkerFactory>,
        events: SharedEventRecorder,
    ) -> EngineResult<Self> {
        let metrics = Arc::new(
            ObservabilityController::with_new_registry()
                .map_err(|e| EngineError::StorageError(format!("metrics registry: {e}")))?,
        );
        let workers = Arc::new(WorkerTableService::new(
            Arc::new(InMemoryWorkerTableRepository::new()),
            events.clone(),
            metrics.clone(),
        ));
        let restart = Arc::new(RestartService::new(
            workers.clone(),
            Arc::new(FileInstanceDirectoryRepository::new(&config.config_dir)),
            worker_factory,
            events.clone(),
            metrics.clone(),
        ));
        let processes = Arc::new(ProcessService::new(
            Arc::new(InMemoryProcessRepository::with_builtin_processes()),
            registries.clone(),
            workers.clone(),
            restart.clone(),
            events.clone(),
            metrics.clone(),
        ));

        Ok(Self {
            config,
            events,
            metrics,
            registries,
            workers,
            restart,
            processes,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn events(&self) -> &SharedEventRecorder {
        &self.events
    }

    pub fn metrics(&self) -> &Arc<ObservabilityController> {
        &self.metrics
    }

    pub fn registries(&self) -> &ProviderRegistries {
        &self.registries
    }

    pub fn worker_table_controller(&self) -> WorkerTableController {
        WorkerTableController::new(self.workers.clone())
    }

    pub fn restart_controller(&self) -> RestartController {
        RestartController::new(self.restart.clone())
    }

    pub fn process_controller(&self) -> ProcessController {
        ProcessController::new(self.processes.clone())
    }

    /// Load persisted providers, then start every instance of the configured
    /// services.
    pub async fn start(&self) -> EngineResult<BootReport> {
        let providers = self.registries.load_all()?;
        self.processes.refresh_provider_gauges();

        let mut workers = BTreeMap::new();
        for &service_type in &self.config.services {
            let started = self.restart.start_all(service_type).await?;
            workers.insert(service_type, started);
        }

        info!(
            providers,
            workers = workers.values().map(Vec::len).sum::<usize>(),
            "Constellation started"
        );
        Ok(BootReport { providers, workers })
    }

    /// Stop every worker, then dispose every provider. Both steps always run.
    pub async fn shutdown(&self) -> EngineResult<()> {
        let workers = self.workers.shutdown_all().await;
        if let Err(error) = &workers {
            warn!(error = %error, "Workers did not shut down cleanly");
        }
        let providers = self.registries.shutdown();
        self.processes.refresh_provider_gauges();
        info!("Constellation shut down");

        workers?;
        providers.map_err(EngineError::from)
    }
}

use crate::features::admin_process::repo::{names, ProcessDefinition, ProcessRepository};
use crate::features::observability::controller::ObservabilityController;
use crate::features::restart::service::RestartService;
use crate::features::worker_table::service::WorkerTableService;
use crate::shared::error::{EngineError, EngineResult};
use crate::shared::registries::ProviderRegistries;
use crate::shared::types::{ProviderKind, RestartRequest, ServiceType};
use constellation_core::{DataType, LifecycleEvent, ParameterValues, SharedEventRecorder};
use constellation_providers::directory_provider::DirectoryProviderFactory;
use constellation_providers::{ProviderResource, ProviderSource};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Executes administration processes against the registries, the worker
/// table and the restart orchestration.
pub struct ProcessService {
    repo: Arc<dyn ProcessRepository>,
    registries: ProviderRegistries,
    workers: Arc<WorkerTableService>,
    restart: Arc<RestartService>,
    events: SharedEventRecorder,
    metrics: Arc<ObservabilityController>,
}

impl ProcessService {
    pub fn new(
        repo: Arc<dyn ProcessRepository>,
        registries: ProviderRegistries,
        workers: Arc<WorkerTableService>,
        restart: Arc<RestartService>,
        events: SharedEventRecorder,
        metrics: Arc<ObservabilityController>,
    ) -> Self {
        Self {
            repo,
            registries,
            workers,
            restart,
            events,
            metrics,
        }
    }

    pub async fn list_processes(&self) -> EngineResult<Vec<ProcessDefinition>> {
        self.repo.list().await
    }

    pub async fn execute(&self, name: &str, input: &Map<String, Value>) -> EngineResult<Value> {
        let definition = self
            .repo
            .get(name)
            .await?
            .ok_or_else(|| EngineError::ProcessNotFound(name.to_string()))?;
        let params = definition
            .inputs
            .validate(input)
            .map_err(|e| EngineError::InvalidRequest(e.to_string()))?;
        debug!(process = name, "Executing process");

        match name {
            names::RESTART => self.restart(&params).await,
            names::INSTANCE_LIST => {
                let statuses = self.workers.list_status(service_param(&params)?).await?;
                to_json(&statuses)
            }
            names::INSTANCE_SHUTDOWN => {
                let existed = self
                    .workers
                    .shutdown_instance(service_param(&params)?, required(&params, "identifier")?)
                    .await?;
                Ok(json!({ "shutdown": existed }))
            }
            names::PROVIDER_CREATE => {
                let document = params
                    .get_object("source")
                    .cloned()
                    .ok_or_else(|| missing("source"))?;
                let source = ProviderSource::from_value(Value::Object(document))?;
                self.create_provider(source)
            }
            names::PROVIDER_REMOVE => {
                let kind = kind_param(&params)?;
                let id = required(&params, "id")?;
                self.tracked(kind, "remove", || self.registries.get(kind).remove_provider(id))?;
                Ok(json!({ "removed": id }))
            }
            names::PROVIDER_RELOAD => {
                let kind = kind_param(&params)?;
                let id = required(&params, "id")?;
                let keys = self.tracked(kind, "reload", || {
                    self.registries.get(kind).reload_provider(id)
                })?;
                Ok(json!({ "provider_id": id, "keys": keys }))
            }
            names::PROVIDER_GET_CONFIG => {
                let kind = kind_param(&params)?;
                let source = self.registries.get(kind).source(required(&params, "id")?)?;
                to_json(&source)
            }
            names::PROVIDER_LIST => {
                let kind = kind_param(&params)?;
                let metadata: Vec<_> = self
                    .registries
                    .get(kind)
                    .providers()?
                    .iter()
                    .map(|p| p.metadata())
                    .collect();
                to_json(&metadata)
            }
            names::PROVIDER_KEYS => {
                let kind = kind_param(&params)?;
                let service = params
                    .get_str("service")
                    .map(ServiceType::from_str)
                    .transpose()
                    .map_err(|e| EngineError::InvalidRequest(e.to_string()))?;
                let keys = self.registries.get(kind).keys(service)?;
                to_json(&keys)
            }
            names::STYLE_PROVIDER_CREATE => {
                let source = ProviderSource::new(
                    required(&params, "id")?,
                    DirectoryProviderFactory::NAME,
                    ProviderKind::Style,
                )
                .with_parameter("path", required(&params, "path")?);
                self.create_provider(source)
            }
            names::STYLE_PROVIDER_SET_STYLE => {
                let provider = required(&params, "provider")?;
                let name = required(&params, "name")?;
                let body = params.get_object("body").cloned().ok_or_else(|| missing("body"))?;
                let resource = ProviderResource::new(name, DataType::Style, Value::Object(body));
                self.tracked(ProviderKind::Style, "set_style", || {
                    self.registries.styles().set_resource(provider, resource)
                })?;
                Ok(json!({ "provider_id": provider, "style": name }))
            }
            names::STYLE_PROVIDER_DELETE_STYLE => {
                let provider = required(&params, "provider")?;
                let name = required(&params, "name")?;
                self.tracked(ProviderKind::Style, "delete_style", || {
                    self.registries.styles().remove_resource(provider, name)
                })?;
                Ok(json!({ "provider_id": provider, "deleted": name }))
            }
            names::EVENTS => {
                let limit = match params.get_i64("limit") {
                    Some(limit) if limit < 0 => {
                        return Err(EngineError::InvalidRequest(
                            "limit cannot be negative".to_string(),
                        ))
                    }
                    Some(limit) => limit as usize,
                    None => usize::MAX,
                };
                let events = self.recent_events(params.get_str("subject"), limit)?;
                to_json(&events)
            }
            other => Err(EngineError::ProcessNotFound(format!(
                "{other} is registered but has no handler"
            ))),
        }
    }

    /// Refresh the provider gauges from the registries.
    pub fn refresh_provider_gauges(&self) {
        for kind in ProviderKind::ALL {
            self.refresh_provider_gauge(kind);
        }
    }

    async fn restart(&self, params: &ParameterValues) -> EngineResult<Value> {
        let request = RestartRequest {
            service_type: service_param(params)?,
            identifier: params.get_str("identifier").map(ToString::to_string),
            close_first: params.get_bool("close_first").unwrap_or(true),
        };
        let report = self.restart.restart(request).await?;
        to_json(&report)
    }

    fn recent_events(&self, subject: Option<&str>, limit: usize) -> EngineResult<Vec<LifecycleEvent>> {
        let recorder = self
            .events
            .lock()
            .map_err(|_| EngineError::StorageError("Lock poisoned".to_string()))?;
        let matching = match subject {
            Some(subject) => recorder.events_for(subject),
            None => recorder.events(),
        };
        let skip = matching.len().saturating_sub(limit);
        Ok(matching.into_iter().skip(skip).cloned().collect())
    }

    fn create_provider(&self, source: ProviderSource) -> EngineResult<Value> {
        let kind = source.kind();
        let provider = self.tracked(kind, "create", || self.registries.get(kind).create_provider(source))?;
        Ok(json!({ "provider_id": provider.id(), "kind": kind }))
    }

    /// Run a registry mutation, counting failures and refreshing the
    /// provider gauge of `kind` either way.
    fn tracked<T>(
        &self,
        kind: ProviderKind,
        operation: &str,
        run: impl FnOnce() -> constellation_core::Result<T>,
    ) -> EngineResult<T> {
        let result = run();
        if let Err(error) = &result {
            warn!(%kind, operation, error = %error, "Provider operation failed");
            self.metrics.record_provider_failure(kind, operation);
        }
        self.refresh_provider_gauge(kind);
        result.map_err(EngineError::from)
    }

    fn refresh_provider_gauge(&self, kind: ProviderKind) {
        match self.registries.get(kind).len() {
            Ok(count) => self.metrics.set_providers(kind, count),
            Err(error) => warn!(%kind, error = %error, "Cannot refresh provider gauge"),
        }
    }
}

fn missing(name: &str) -> EngineError {
    EngineError::InvalidRequest(format!("missing parameter '{name}'"))
}

fn required<'a>(params: &'a ParameterValues, name: &str) -> EngineResult<&'a str> {
    params.get_str(name).ok_or_else(|| missing(name))
}

fn service_param(params: &ParameterValues) -> EngineResult<ServiceType> {
    required(params, "service")?
        .parse()
        .map_err(|e: constellation_core::CoreError| EngineError::InvalidRequest(e.to_string()))
}

fn kind_param(params: &ParameterValues) -> EngineResult<ProviderKind> {
    required(params, "kind")?
        .parse()
        .map_err(|e: constellation_core::CoreError| EngineError::InvalidRequest(e.to_string()))
}

fn to_json<T: Serialize>(value: &T) -> EngineResult<Value> {
    serde_json::to_value(value)
        .map_err(|e| EngineError::Provider(constellation_core::CoreError::from(e)))
}

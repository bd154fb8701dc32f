use crate::features::observability::repo::ObservabilityRepository;
use crate::features::observability::service::ObservabilityService;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use constellation_core::{ProviderKind, ServiceType};
use std::sync::Arc;

pub struct ObservabilityController {
    service: ObservabilityService,
}

impl ObservabilityController {
    pub fn new(service: ObservabilityService) -> Self {
        Self { service }
    }

    /// Controller over a fresh prometheus registry.
    pub fn with_new_registry() -> Result<Self, String> {
        let repo = Arc::new(ObservabilityRepository::new()?);
        Ok(Self::new(ObservabilityService::new(repo)))
    }

    pub fn set_active_workers(&self, service: ServiceType, count: usize) {
        self.service.set_active_workers(service, count);
    }

    pub fn set_providers(&self, kind: ProviderKind, count: usize) {
        self.service.set_providers(kind, count);
    }

    pub fn record_restart(&self, service: ServiceType, succeeded: bool) {
        self.service.record_restart(service, succeeded);
    }

    pub fn record_provider_failure(&self, kind: ProviderKind, operation: &str) {
        self.service.record_provider_failure(kind, operation);
    }

    pub fn render_metrics(&self) -> Result<String, String> {
        self.service.render_metrics()
    }
}

/// Router serving the text exposition format on `/metrics`.
pub fn metrics_router(controller: Arc<ObservabilityController>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(controller)
}

async fn metrics_handler(
    State(controller): State<Arc<ObservabilityController>>,
) -> Result<String, (StatusCode, String)> {
    controller
        .render_metrics()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e))
}

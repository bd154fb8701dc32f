use crate::features::observability::repo::ObservabilityRepository;
use constellation_core::{ProviderKind, ServiceType};
use std::sync::Arc;

pub const OUTCOME_SUCCESS: &str = "success";
pub const OUTCOME_FAILURE: &str = "failure";

pub struct ObservabilityService {
    repo: Arc<ObservabilityRepository>,
}

impl ObservabilityService {
    pub fn new(repo: Arc<ObservabilityRepository>) -> Self {
        Self { repo }
    }

    pub fn set_active_workers(&self, service: ServiceType, count: usize) {
        self.repo
            .set_active_workers(service.directory_name(), count as f64);
    }

    pub fn set_providers(&self, kind: ProviderKind, count: usize) {
        self.repo.set_providers(kind.as_str(), count as f64);
    }

    pub fn record_restart(&self, service: ServiceType, succeeded: bool) {
        let outcome = if succeeded {
            OUTCOME_SUCCESS
        } else {
            OUTCOME_FAILURE
        };
        self.repo
            .inc_restart_total(service.directory_name(), outcome);
    }

    pub fn record_provider_failure(&self, kind: ProviderKind, operation: &str) {
        self.repo
            .inc_provider_failures_total(kind.as_str(), operation);
    }

    pub fn render_metrics(&self) -> Result<String, String> {
        self.repo.render_metrics()
    }
}

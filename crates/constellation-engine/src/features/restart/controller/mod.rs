use crate::features::restart::service::RestartService;
use crate::shared::types::{RestartReport, RestartRequest, ServiceType};
use constellation_core::ErrorResponse;
use std::sync::Arc;
use tracing::info;

/// Controller for instance restarts
pub struct RestartController {
    service: Arc<RestartService>,
}

impl RestartController {
    pub fn new(service: Arc<RestartService>) -> Self {
        Self { service }
    }

    /// Handle restart request
    pub async fn restart(&self, request: RestartRequest) -> Result<RestartReport, ErrorResponse> {
        info!(
            service = %request.service_type,
            instance_id = request.identifier.as_deref().unwrap_or("*"),
            close_first = request.close_first,
            "Received restart request"
        );

        self.service.restart(request).await.map_err(|e| e.into())
    }

    pub async fn start_all(&self, service_type: ServiceType) -> Result<Vec<String>, ErrorResponse> {
        self.service
            .start_all(service_type)
            .await
            .map_err(|e| e.into())
    }
}

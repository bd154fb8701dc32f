use crate::features::worker_table::service::WorkerTableService;
use crate::shared::types::{ServiceType, ShutdownInstanceRequest, WorkerStatus};
use constellation_core::ErrorResponse;
use std::sync::Arc;
use tracing::info;

/// Controller for instance listing and shutdown
pub struct WorkerTableController {
    service: Arc<WorkerTableService>,
}

impl WorkerTableController {
    pub fn new(service: Arc<WorkerTableService>) -> Self {
        Self { service }
    }

    /// Handle list instances request
    pub async fn list_instances(
        &self,
        service_type: ServiceType,
    ) -> Result<Vec<WorkerStatus>, ErrorResponse> {
        info!(service = %service_type, "Received list instances request");

        self.service
            .list_status(service_type)
            .await
            .map_err(|e| e.into())
    }

    /// Handle shutdown instance request. Returns whether the instance was running.
    pub async fn shutdown_instance(
        &self,
        request: ShutdownInstanceRequest,
    ) -> Result<bool, ErrorResponse> {
        info!(service = %request.service_type, instance_id = %request.identifier, "Received shutdown instance request");

        self.service
            .shutdown_instance(request.service_type, &request.identifier)
            .await
            .map_err(|e| e.into())
    }

    pub async fn instance_size(&self, service_type: ServiceType) -> Result<usize, ErrorResponse> {
        self.service
            .instance_size(service_type)
            .await
            .map_err(|e| e.into())
    }
}

use crate::features::admin_process::service::ProcessService;
use constellation_core::ErrorResponse;
use constellation_proto::{ExecuteProcessRequest, ExecuteProcessResponse, ProcessDescriptor};
use std::sync::Arc;
use tracing::{info, warn};

/// Controller for administration processes
pub struct ProcessController {
    service: Arc<ProcessService>,
}

impl ProcessController {
    pub fn new(service: Arc<ProcessService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Arc<ProcessService> {
        &self.service
    }

    pub async fn list_processes(&self) -> Result<Vec<ProcessDescriptor>, ErrorResponse> {
        let definitions = self.service.list_processes().await.map_err(ErrorResponse::from)?;
        Ok(definitions
            .iter()
            .map(|d| ProcessDescriptor::new(d.description.clone(), &d.inputs))
            .collect())
    }

    /// Handle execute request. Failures are reported in the response.
    pub async fn execute(&self, request: ExecuteProcessRequest) -> ExecuteProcessResponse {
        info!(process = %request.name, "Received execute process request");

        match self.service.execute(&request.name, &request.input).await {
            Ok(output) => ExecuteProcessResponse::completed(output),
            Err(error) => {
                warn!(process = %request.name, error = %error, "Process failed");
                ExecuteProcessResponse::failed(error.into())
            }
        }
    }
}

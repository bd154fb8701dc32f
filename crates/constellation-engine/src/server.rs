use crate::features::admin_process::controller::ProcessController;
use constellation_proto::v1::admin_process_service_server::AdminProcessService;
use constellation_proto::v1::{
    ExecuteProcessRequest, ExecuteProcessResponse, ListProcessesRequest, ListProcessesResponse,
};
use std::sync::Arc;
use tonic::{Request, Response, Status};

pub struct AdminProcessServer {
    process_controller: Arc<ProcessController>,
}

impl AdminProcessServer {
    pub fn new(process_controller: Arc<ProcessController>) -> Self {
        Self { process_controller }
    }
}

#[tonic::async_trait]
impl AdminProcessService for AdminProcessServer {
    async fn list_processes(
        &self,
        _request: Request<ListProcessesRequest>,
    ) -> Result<Response<ListProcessesResponse>, Status> {
        let processes = self
            .process_controller
            .list_processes()
            .await
            .map_err(|e| Status::internal(e.message))?;

        Ok(Response::new(ListProcessesResponse {
            processes: processes.into_iter().map(Into::into).collect(),
        }))
    }

    async fn execute(
        &self,
        request: Request<ExecuteProcessRequest>,
    ) -> Result<Response<ExecuteProcessResponse>, Status> {
        let req = constellation_proto::ExecuteProcessRequest::try_from(request.into_inner())
            .map_err(Status::invalid_argument)?;
        tracing::debug!(process = %req.name, "Received execute request");

        let response = self.process_controller.execute(req).await;
        Ok(Response::new(response.into()))
    }
}

use constellation_core::{CoreError, ErrorResponse};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Engine specific errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Instance not found: {0}")]
    InstanceNotFound(String),
    #[error("Instance failed to start: {0}")]
    InstanceStartFailed(String),
    #[error("Restart failed: {message}")]
    RestartFailed {
        message: String,
        /// Instance id to failure reason.
        failures: BTreeMap<String, String>,
    },
    #[error("Shutdown failed: {0}")]
    ShutdownFailed(String),
    #[error("Process not found: {0}")]
    ProcessNotFound(String),
    #[error(transparent)]
    Provider(#[from] CoreError),
    #[error("Storage error: {0}")]
    StorageError(String),
}

impl EngineError {
    pub fn restart_failed(failures: BTreeMap<String, String>) -> Self {
        let ids: Vec<&str> = failures.keys().map(String::as_str).collect();
        EngineError::RestartFailed {
            message: format!("{} instance(s) failed: {}", ids.len(), ids.join(", ")),
            failures,
        }
    }
}

impl From<EngineError> for ErrorResponse {
    fn from(err: EngineError) -> Self {
        let (code, message) = match err {
            EngineError::Provider(core) => return core.into(),
            EngineError::RestartFailed { message, failures } => {
                let details: HashMap<String, String> = failures.into_iter().collect();
                return ErrorResponse::new("RESTART_FAILED", message).with_details(details);
            }
            EngineError::InvalidRequest(msg) => ("INVALID_REQUEST", msg),
            EngineError::InstanceNotFound(msg) => ("INSTANCE_NOT_FOUND", msg),
            EngineError::InstanceStartFailed(msg) => ("INSTANCE_START_FAILED", msg),
            EngineError::ShutdownFailed(msg) => ("SHUTDOWN_FAILED", msg),
            EngineError::ProcessNotFound(msg) => ("PROCESS_NOT_FOUND", msg),
            EngineError::StorageError(msg) => ("STORAGE_ERROR", msg),
        };

        ErrorResponse::new(code, message)
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

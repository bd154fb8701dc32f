pub use constellation_core::{ProviderKind, ServiceType};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request to restart one instance, or every running instance of a service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartRequest {
    pub service_type: ServiceType,
    pub identifier: Option<String>,
    pub close_first: bool,
}

impl RestartRequest {
    pub fn all(service_type: ServiceType, close_first: bool) -> Self {
        Self {
            service_type,
            identifier: None,
            close_first,
        }
    }

    pub fn single(service_type: ServiceType, identifier: impl Into<String>, close_first: bool) -> Self {
        Self {
            service_type,
            identifier: Some(identifier.into()),
            close_first,
        }
    }
}

/// Request to shut down one instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownInstanceRequest {
    pub service_type: ServiceType,
    pub identifier: String,
}

/// Outcome of a successful restart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartReport {
    pub service_type: ServiceType,
    pub restarted: Vec<String>,
}

/// Status of one worker as reported to administrators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub id: String,
    pub service_type: ServiceType,
    pub started: bool,
    pub start_error: Option<String>,
    pub layers: Vec<String>,
    pub created_at: DateTime<Utc>,
}

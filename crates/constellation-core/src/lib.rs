pub mod parameters;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

pub use parameters::{ParameterDescriptor, ParameterDescriptorGroup, ParameterType, ParameterValues};

#[derive(Debug, Clone, Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Provider not found: {0}")]
    ProviderNotFound(String),
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),
    #[error("Duplicate provider: {0}")]
    DuplicateProvider(String),
    #[error("Provider kind mismatch: {0}")]
    KindMismatch(String),
    #[error("Provider is immutable: {0}")]
    ProviderImmutable(String),
    #[error("Provider disposed: {0}")]
    ProviderDisposed(String),
    #[error("Provider creation failed: {0}")]
    ProviderCreation(String),
    #[error("Provider disposal failed: {0}")]
    ProviderDisposal(String),
    #[error("Factory not found: {0}")]
    FactoryNotFound(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

impl CoreError {
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::Configuration(_) => "CONFIGURATION_ERROR",
            CoreError::ProviderNotFound(_) => "PROVIDER_NOT_FOUND",
            CoreError::ResourceNotFound(_) => "RESOURCE_NOT_FOUND",
            CoreError::DuplicateProvider(_) => "DUPLICATE_PROVIDER",
            CoreError::KindMismatch(_) => "KIND_MISMATCH",
            CoreError::ProviderImmutable(_) => "PROVIDER_IMMUTABLE",
            CoreError::ProviderDisposed(_) => "PROVIDER_DISPOSED",
            CoreError::ProviderCreation(_) => "PROVIDER_CREATION_FAILED",
            CoreError::ProviderDisposal(_) => "PROVIDER_DISPOSAL_FAILED",
            CoreError::FactoryNotFound(_) => "FACTORY_NOT_FOUND",
            CoreError::Io(_) => "IO_ERROR",
            CoreError::Serialization(_) => "SERIALIZATION_ERROR",
            CoreError::LockPoisoned(_) => "STORAGE_ERROR",
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

impl From<CoreError> for ErrorResponse {
    fn from(err: CoreError) -> Self {
        ErrorResponse::new(err.error_code(), err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// OGC protocol a service instance speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    Wms,
    Wcs,
    Wfs,
    Csw,
    Sos,
    Wmts,
}

impl ServiceType {
    pub const ALL: [ServiceType; 6] = [
        ServiceType::Wms,
        ServiceType::Wcs,
        ServiceType::Wfs,
        ServiceType::Csw,
        ServiceType::Sos,
        ServiceType::Wmts,
    ];

    /// Name of the directory holding this service's instances.
    pub fn directory_name(&self) -> &'static str {
        match self {
            ServiceType::Wms => "WMS",
            ServiceType::Wcs => "WCS",
            ServiceType::Wfs => "WFS",
            ServiceType::Csw => "CSW",
            ServiceType::Sos => "SOS",
            ServiceType::Wmts => "WMTS",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.directory_name())
    }
}

impl FromStr for ServiceType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        ServiceType::ALL
            .into_iter()
            .find(|t| t.directory_name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::Configuration(format!("unknown service type '{s}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Layer,
    Style,
    Data,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [ProviderKind::Layer, ProviderKind::Style, ProviderKind::Data];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Layer => "layer",
            ProviderKind::Style => "style",
            ProviderKind::Data => "data",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        ProviderKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::Configuration(format!("unknown provider kind '{s}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Vector,
    Coverage,
    Sensor,
    Metadata,
    Style,
}

impl FromStr for DataType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vector" => Ok(DataType::Vector),
            "coverage" => Ok(DataType::Coverage),
            "sensor" => Ok(DataType::Sensor),
            "metadata" => Ok(DataType::Metadata),
            "style" => Ok(DataType::Style),
            other => Err(CoreError::Configuration(format!(
                "unknown data type '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error_code: String,
    pub message: String,
    pub details: Option<HashMap<String, String>>,
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            details: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_details(mut self, details: HashMap<String, String>) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEventType {
    ProviderCreated,
    ProviderDisposed,
    ProviderReloaded,
    ProviderFailed,
    WorkerStarted,
    WorkerShutdown,
    WorkerRestarted,
    WorkerFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub event_id: String,
    pub event_type: LifecycleEventType,
    /// Provider id, or `<SERVICE>/<identifier>` for workers.
    pub subject: String,
    pub timestamp: DateTime<Utc>,
    pub details: Option<HashMap<String, String>>,
}

impl LifecycleEvent {
    pub fn new(event_type: LifecycleEventType, subject: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            event_type,
            subject: subject.into(),
            timestamp: Utc::now(),
            details: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        let mut details = HashMap::new();
        details.insert("error".to_string(), error.into());
        self.details = Some(details);
        self
    }
}

/// Subject string used for worker events.
pub fn worker_subject(service_type: ServiceType, identifier: &str) -> String {
    format!("{}/{}", service_type.directory_name(), identifier)
}

/// Events kept when no capacity is configured.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Bounded record of provider and worker lifecycle transitions. Once full,
/// the oldest event is evicted for each new one.
#[derive(Debug)]
pub struct LifecycleEventRecorder {
    events: VecDeque<LifecycleEvent>,
    capacity: usize,
}

impl Default for LifecycleEventRecorder {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }
}

impl LifecycleEventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A zero capacity is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity.min(DEFAULT_EVENT_CAPACITY)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn record_event(&mut self, event: LifecycleEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// Retained events, oldest first.
    pub fn events(&self) -> Vec<&LifecycleEvent> {
        self.events.iter().collect()
    }

    pub fn events_for(&self, subject: &str) -> Vec<&LifecycleEvent> {
        self.events.iter().filter(|e| e.subject == subject).collect()
    }
}

/// Recorder shared between the registries and the worker table.
pub type SharedEventRecorder = Arc<Mutex<LifecycleEventRecorder>>;

/// Record an event on a shared recorder. A poisoned recorder only loses the
/// event, it never fails the caller.
pub fn record_shared(recorder: &SharedEventRecorder, event: LifecycleEvent) {
    match recorder.lock() {
        Ok(mut recorder) => recorder.record_event(event),
        Err(_) => {
            tracing::warn!(subject = %event.subject, event_type = ?event.event_type, "Lifecycle recorder poisoned, event dropped");
        }
    }
}

/// Reject names that cannot be used as a file name inside a configuration
/// directory.
pub fn validate_name(kind: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(CoreError::Configuration(format!("{kind} cannot be empty")));
    }
    if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        return Err(CoreError::Configuration(format!(
            "{kind} '{name}' contains a path separator"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_type_parsing_is_case_insensitive() {
        assert_eq!("wms".parse::<ServiceType>().unwrap(), ServiceType::Wms);
        assert_eq!("WMTS".parse::<ServiceType>().unwrap(), ServiceType::Wmts);
        assert_eq!(" Csw ".parse::<ServiceType>().unwrap(), ServiceType::Csw);
        assert!("wps".parse::<ServiceType>().is_err());
    }

    #[test]
    fn test_service_type_directory_name() {
        assert_eq!(ServiceType::Wfs.directory_name(), "WFS");
        assert_eq!(ServiceType::Sos.to_string(), "SOS");
    }

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!("layer".parse::<ProviderKind>().unwrap(), ProviderKind::Layer);
        assert_eq!("Style".parse::<ProviderKind>().unwrap(), ProviderKind::Style);
        assert!("raster".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_data_type_parsing() {
        assert_eq!("coverage".parse::<DataType>().unwrap(), DataType::Coverage);
        assert!("tiles".parse::<DataType>().is_err());
    }

    #[test]
    fn test_service_type_serde_uses_lowercase() {
        let json = serde_json::to_string(&ServiceType::Wmts).unwrap();
        assert_eq!(json, "\"wmts\"");
    }

    #[test]
    fn test_error_response_from_core_error() {
        let response: ErrorResponse = CoreError::ProviderImmutable("defaults".to_string()).into();
        assert_eq!(response.error_code, "PROVIDER_IMMUTABLE");
        assert!(response.message.contains("defaults"));
    }

    #[test]
    fn test_error_response_with_details() {
        let mut details = HashMap::new();
        details.insert("field".to_string(), "identifier".to_string());
        let error = ErrorResponse::new("VALIDATION_ERROR", "Invalid input").with_details(details);
        assert_eq!(
            error.details.unwrap().get("field"),
            Some(&"identifier".to_string())
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: CoreError = io.into();
        assert_eq!(err.error_code(), "IO_ERROR");
    }

    #[test]
    fn test_recorder_filters_by_subject() {
        let mut recorder = LifecycleEventRecorder::new();
        recorder.record_event(LifecycleEvent::new(LifecycleEventType::ProviderCreated, "shapefiles"));
        recorder.record_event(LifecycleEvent::new(LifecycleEventType::WorkerStarted, "WMS/default"));
        recorder.record_event(
            LifecycleEvent::new(LifecycleEventType::ProviderFailed, "shapefiles").with_error("boom"),
        );

        let events = recorder.events_for("shapefiles");
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event_type, LifecycleEventType::ProviderFailed);
        assert_eq!(
            events[1].details.as_ref().unwrap().get("error"),
            Some(&"boom".to_string())
        );
        assert_eq!(recorder.events().len(), 3);
    }

    #[test]
    fn test_recorder_evicts_oldest_when_full() {
        let mut recorder = LifecycleEventRecorder::with_capacity(3);
        for id in ["a", "b", "c", "d", "e"] {
            recorder.record_event(LifecycleEvent::new(LifecycleEventType::ProviderCreated, id));
        }

        let subjects: Vec<&str> = recorder.events().iter().map(|e| e.subject.as_str()).collect();
        assert_eq!(subjects, vec!["c", "d", "e"]);
        assert!(recorder.events_for("a").is_empty());
        assert_eq!(LifecycleEventRecorder::with_capacity(0).capacity(), 1);
        assert_eq!(LifecycleEventRecorder::new().capacity(), DEFAULT_EVENT_CAPACITY);
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("provider id", "shapefiles").is_ok());
        assert!(validate_name("provider id", "").is_err());
        assert!(validate_name("provider id", "../etc").is_err());
        assert!(validate_name("provider id", "a\\b").is_err());
        assert!(validate_name("provider id", "..").is_err());
    }

    #[test]
    fn test_record_shared() {
        let recorder: SharedEventRecorder = Arc::new(Mutex::new(LifecycleEventRecorder::new()));
        record_shared(
            &recorder,
            LifecycleEvent::new(LifecycleEventType::WorkerStarted, "WMS/default"),
        );
        assert_eq!(recorder.lock().unwrap().events().len(), 1);
    }

    #[test]
    fn test_worker_subject_format() {
        assert_eq!(worker_subject(ServiceType::Wms, "default"), "WMS/default");
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn event_type_strategy() -> impl Strategy<Value = LifecycleEventType> {
            prop_oneof![
                Just(LifecycleEventType::ProviderCreated),
                Just(LifecycleEventType::ProviderDisposed),
                Just(LifecycleEventType::WorkerStarted),
                Just(LifecycleEventType::WorkerShutdown),
                Just(LifecycleEventType::WorkerRestarted),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(100))]

            #[test]
            fn property_recorder_preserves_order_per_subject(
                entries in prop::collection::vec((event_type_strategy(), 0usize..4), 0..50)
            ) {
                let mut recorder = LifecycleEventRecorder::new();
                for (event_type, subject) in &entries {
                    recorder.record_event(LifecycleEvent::new(*event_type, format!("subject-{subject}")));
                }

                prop_assert_eq!(recorder.events().len(), entries.len());

                for subject in 0..4 {
                    let name = format!("subject-{subject}");
                    let expected: Vec<LifecycleEventType> = entries
                        .iter()
                        .filter(|(_, s)| *s == subject)
                        .map(|(t, _)| *t)
                        .collect();
                    let actual: Vec<LifecycleEventType> = recorder
                        .events_for(&name)
                        .into_iter()
                        .map(|e| e.event_type)
                        .collect();
                    prop_assert_eq!(actual, expected);
                }
            }
        }
    }
}

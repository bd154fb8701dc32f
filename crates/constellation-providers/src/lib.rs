pub mod directory_provider;
pub mod factory;
pub mod features;
pub mod memory_provider;
pub mod source;
pub mod static_style_provider;

use constellation_core::{DataType, ProviderKind, Result, ServiceType};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use factory::{FactoryRegistry, ProviderFactory};
pub use source::ProviderSource;

/// A named source of layers, styles or data.
///
/// Providers live behind `Arc` in a registry, so every operation takes
/// `&self` and implementations keep their state behind a lock.
pub trait Provider: Send + Sync {
    fn id(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    /// Configuration the provider was built from.
    fn source(&self) -> &ProviderSource;

    fn capabilities(&self) -> &ProviderCapabilities;

    /// Keys currently exposed, ignore list already applied. Empty once disposed.
    fn keys(&self) -> Vec<String>;

    fn contains_key(&self, key: &str) -> bool {
        self.keys().iter().any(|k| k == key)
    }

    /// Resource for `key`, optionally pinned to `version`.
    /// `Ok(None)` when the provider has no such key or version.
    fn get(&self, key: &str, version: Option<&str>) -> Result<Option<ProviderResource>>;

    /// Re-read the underlying store and refresh the key set.
    fn reload(&self) -> Result<()>;

    /// Release underlying resources. Further reads fail with `ProviderDisposed`.
    fn dispose(&self) -> Result<()>;

    fn is_disposed(&self) -> bool;

    /// Mutation capability. Read-only providers return `None`.
    fn as_mutable(&self) -> Option<&dyn MutableProvider> {
        None
    }

    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            provider_id: self.id().to_string(),
            kind: self.kind(),
            factory: self.source().factory().to_string(),
            data_type: self.capabilities().data_type,
            mutable: self.as_mutable().is_some(),
            key_count: self.keys().len(),
        }
    }
}

pub trait MutableProvider: Provider {
    /// Insert or overwrite the resource named `resource.name`.
    fn set(&self, resource: ProviderResource) -> Result<()>;

    fn rename(&self, key: &str, new_key: &str) -> Result<()>;

    /// Returns whether the key existed.
    fn remove(&self, key: &str) -> Result<bool>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResource {
    pub name: String,
    pub version: Option<String>,
    pub data_type: DataType,
    pub body: Value,
}

impl ProviderResource {
    pub fn new(name: impl Into<String>, data_type: DataType, body: Value) -> Self {
        let version = body
            .get("version")
            .and_then(Value::as_str)
            .map(ToString::to_string);
        Self {
            name: name.into(),
            version,
            data_type,
            body,
        }
    }

    /// Whether this resource satisfies a version request.
    pub fn matches_version(&self, version: Option<&str>) -> bool {
        match version {
            None => true,
            Some(requested) => self.version.as_deref() == Some(requested),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    pub data_type: DataType,
    pub sensor_affectable: bool,
    /// Services allowed to publish this provider's keys. Empty means all.
    pub services: Vec<ServiceType>,
}

impl ProviderCapabilities {
    pub fn new(data_type: DataType, services: Vec<ServiceType>) -> Self {
        Self {
            data_type,
            sensor_affectable: data_type == DataType::Sensor,
            services,
        }
    }

    pub fn supports(&self, service: ServiceType) -> bool {
        self.services.is_empty() || self.services.contains(&service)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub provider_id: String,
    pub kind: ProviderKind,
    pub factory: String,
    pub data_type: DataType,
    pub mutable: bool,
    pub key_count: usize,
}

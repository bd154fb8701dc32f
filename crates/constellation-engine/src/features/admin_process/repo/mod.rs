use crate::shared::error::{EngineError, EngineResult};
use async_trait::async_trait;
use constellation_core::{ParameterDescriptor, ParameterDescriptorGroup, ParameterType};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

pub mod names {
    pub const RESTART: &str = "restart";
    pub const INSTANCE_LIST: &str = "instance.list";
    pub const INSTANCE_SHUTDOWN: &str = "instance.shutdown";
    pub const PROVIDER_CREATE: &str = "provider.create";
    pub const PROVIDER_REMOVE: &str = "provider.remove";
    pub const PROVIDER_RELOAD: &str = "provider.reload";
    pub const PROVIDER_GET_CONFIG: &str = "provider.get_config";
    pub const PROVIDER_LIST: &str = "provider.list";
    pub const PROVIDER_KEYS: &str = "provider.keys";
    pub const STYLE_PROVIDER_CREATE: &str = "style_provider.create";
    pub const STYLE_PROVIDER_SET_STYLE: &str = "style_provider.set_style";
    pub const STYLE_PROVIDER_DELETE_STYLE: &str = "style_provider.delete_style";
    pub const EVENTS: &str = "events";
}

/// A named administration process and the inputs it accepts.
/// The input group carries the process name.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessDefinition {
    pub description: String,
    pub inputs: ParameterDescriptorGroup,
}

impl ProcessDefinition {
    pub fn new(
        name: &str,
        description: impl Into<String>,
        inputs: Vec<ParameterDescriptor>,
    ) -> Self {
        Self {
            description: description.into(),
            inputs: ParameterDescriptorGroup::new(name, inputs),
        }
    }

    pub fn name(&self) -> &str {
        &self.inputs.name
    }
}

/// Repository trait for process definitions
#[async_trait]
pub trait ProcessRepository: Send + Sync {
    /// Register a definition, replacing any with the same name
    async fn save(&self, definition: ProcessDefinition) -> EngineResult<()>;

    async fn get(&self, name: &str) -> EngineResult<Option<ProcessDefinition>>;

    /// All definitions, sorted by name
    async fn list(&self) -> EngineResult<Vec<ProcessDefinition>>;
}

/// In-memory implementation of the process repository
#[derive(Clone, Default)]
pub struct InMemoryProcessRepository {
    storage: Arc<RwLock<BTreeMap<String, ProcessDefinition>>>,
}

impl InMemoryProcessRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository holding every built-in administration process
    pub fn with_builtin_processes() -> Self {
        let storage = builtin_processes()
            .into_iter()
            .map(|definition| (definition.name().to_string(), definition))
            .collect();
        Self {
            storage: Arc::new(RwLock::new(storage)),
        }
    }
}

fn poisoned() -> EngineError {
    EngineError::StorageError("Lock poisoned".to_string())
}

#[async_trait]
impl ProcessRepository for InMemoryProcessRepository {
    async fn save(&self, definition: ProcessDefinition) -> EngineResult<()> {
        let mut storage = self.storage.write().map_err(|_| poisoned())?;
        storage.insert(definition.name().to_string(), definition);
        Ok(())
    }

    async fn get(&self, name: &str) -> EngineResult<Option<ProcessDefinition>> {
        let storage = self.storage.read().map_err(|_| poisoned())?;
        Ok(storage.get(name).cloned())
    }

    async fn list(&self) -> EngineResult<Vec<ProcessDefinition>> {
        let storage = self.storage.read().map_err(|_| poisoned())?;
        Ok(storage.values().cloned().collect())
    }
}

fn service() -> ParameterDescriptor {
    ParameterDescriptor::required("service", ParameterType::String)
        .with_description("Service type: WMS, WCS, WFS, CSW, SOS or WMTS")
}

fn kind() -> ParameterDescriptor {
    ParameterDescriptor::required("kind", ParameterType::String)
        .with_description("Provider kind: layer, style or data")
}

fn provider_id(name: &str) -> ParameterDescriptor {
    ParameterDescriptor::required(name, ParameterType::String).with_description("Provider id")
}

pub fn builtin_processes() -> Vec<ProcessDefinition> {
    use names::*;

    vec![
        ProcessDefinition::new(
            RESTART,
            "Restart one instance, or every running instance of a service",
            vec![
                service(),
                ParameterDescriptor::optional("identifier", ParameterType::String)
                    .with_description("Instance to restart; all running instances when absent"),
                ParameterDescriptor::optional("close_first", ParameterType::Boolean)
                    .with_default(true)
                    .with_description("Shut the current worker down before building its replacement"),
            ],
        ),
        ProcessDefinition::new(
            INSTANCE_LIST,
            "List the workers of a service",
            vec![service()],
        ),
        ProcessDefinition::new(
            INSTANCE_SHUTDOWN,
            "Stop one worker and remove it from the table",
            vec![
                service(),
                ParameterDescriptor::required("identifier", ParameterType::String),
            ],
        ),
        ProcessDefinition::new(
            PROVIDER_CREATE,
            "Create a provider from a source document and persist it",
            vec![ParameterDescriptor::required("source", ParameterType::Object)
                .with_description("Provider source document")],
        ),
        ProcessDefinition::new(
            PROVIDER_REMOVE,
            "Remove and dispose a provider",
            vec![kind(), provider_id("id")],
        ),
        ProcessDefinition::new(
            PROVIDER_RELOAD,
            "Re-read a provider's underlying store",
            vec![kind(), provider_id("id")],
        ),
        ProcessDefinition::new(
            PROVIDER_GET_CONFIG,
            "Source document a provider was built from",
            vec![kind(), provider_id("id")],
        ),
        ProcessDefinition::new(PROVIDER_LIST, "List the providers of a registry", vec![kind()]),
        ProcessDefinition::new(
            PROVIDER_KEYS,
            "Union of the keys exported by a registry",
            vec![
                kind(),
                ParameterDescriptor::optional("service", ParameterType::String)
                    .with_description("Only providers publishable by this service"),
            ],
        ),
        ProcessDefinition::new(
            STYLE_PROVIDER_CREATE,
            "Create a directory backed style provider",
            vec![
                provider_id("id"),
                ParameterDescriptor::required("path", ParameterType::Path)
                    .with_description("Directory holding one style document per file"),
            ],
        ),
        ProcessDefinition::new(
            STYLE_PROVIDER_SET_STYLE,
            "Insert or overwrite a style",
            vec![
                provider_id("provider"),
                ParameterDescriptor::required("name", ParameterType::String),
                ParameterDescriptor::required("body", ParameterType::Object),
            ],
        ),
        ProcessDefinition::new(
            STYLE_PROVIDER_DELETE_STYLE,
            "Delete a style",
            vec![
                provider_id("provider"),
                ParameterDescriptor::required("name", ParameterType::String),
            ],
        ),
        ProcessDefinition::new(
            EVENTS,
            "Recent lifecycle events, oldest first",
            vec![
                ParameterDescriptor::optional("subject", ParameterType::String).with_description(
                    "Provider id, or SERVICE/identifier for a worker; every subject when absent",
                ),
                ParameterDescriptor::optional("limit", ParameterType::Integer)
                    .with_default(100)
                    .with_description("Most recent events to return"),
            ],
        ),
    ]
}

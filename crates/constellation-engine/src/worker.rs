//! Service workers: one running protocol-service instance bound to an
//! instance directory.

use crate::shared::error::EngineResult;
use crate::shared::types::WorkerStatus;
use chrono::{DateTime, Utc};
use constellation_core::{worker_subject, ServiceType};
use constellation_providers::features::provider_registry::service::ProviderRegistryService;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// File holding a worker's layer context inside its instance directory.
pub const LAYER_CONTEXT_FILE: &str = "layerContext.json";

pub trait Worker: Send + Sync {
    fn service_type(&self) -> ServiceType;

    fn id(&self) -> &str;

    fn config_dir(&self) -> &Path;

    fn is_started(&self) -> bool;

    /// Why the worker did not start, if it did not.
    fn start_error(&self) -> Option<String>;

    /// Names of the layers the worker publishes.
    fn layers(&self) -> Vec<String>;

    fn created_at(&self) -> DateTime<Utc>;

    /// Stop serving. Calling it on a stopped worker does nothing.
    fn shutdown(&self) -> EngineResult<()>;

    fn status(&self) -> WorkerStatus {
        WorkerStatus {
            id: self.id().to_string(),
            service_type: self.service_type(),
            started: self.is_started(),
            start_error: self.start_error(),
            layers: self.layers(),
            created_at: self.created_at(),
        }
    }
}

/// Builds workers from instance directories.
#[cfg_attr(test, mockall::automock)]
pub trait WorkerFactory: Send + Sync {
    /// Always returns a worker; one that failed to start reports it through
    /// `is_started` and `start_error`.
    fn build(&self, service_type: ServiceType, id: &str, config_dir: &Path) -> Arc<dyn Worker>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerContext {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub layers: Vec<LayerReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerReference {
    pub name: String,
    /// Provider to take the layer from. Defaults to the first provider
    /// exporting `name`.
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
}

impl LayerContext {
    pub fn from_dir(config_dir: &Path) -> Result<Self, String> {
        let path = config_dir.join(LAYER_CONTEXT_FILE);
        let raw = fs::read_to_string(&path)
            .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
        serde_json::from_str(&raw).map_err(|e| format!("malformed {}: {e}", path.display()))
    }
}

/// A layer bound to the provider serving it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLayer {
    pub name: String,
    pub provider_id: String,
    pub style: Option<String>,
}

pub struct DefaultWorker {
    service_type: ServiceType,
    id: String,
    config_dir: PathBuf,
    title: String,
    layers: Vec<ResolvedLayer>,
    start_error: Option<String>,
    started: AtomicBool,
    created_at: DateTime<Utc>,
}

impl DefaultWorker {
    /// Read the instance's layer context and bind each layer to a provider.
    pub fn start(
        service_type: ServiceType,
        id: &str,
        config_dir: &Path,
        layer_registry: &ProviderRegistryService,
        style_registry: &ProviderRegistryService,
    ) -> Self {
        let subject = worker_subject(service_type, id);
        let (title, layers, start_error) = match LayerContext::from_dir(config_dir) {
            Ok(context) => {
                let layers = context
                    .layers
                    .iter()
                    .filter_map(|layer| {
                        resolve_layer(service_type, &subject, layer, layer_registry, style_registry)
                    })
                    .collect::<Vec<_>>();
                (context.title, layers, None)
            }
            Err(error) => {
                warn!(worker = %subject, error = %error, "Worker failed to start");
                (String::new(), Vec::new(), Some(error))
            }
        };

        let started = start_error.is_none();
        if started {
            info!(worker = %subject, layers = layers.len(), "Worker started");
        }

        Self {
            service_type,
            id: id.to_string(),
            config_dir: config_dir.to_path_buf(),
            title,
            layers,
            start_error,
            started: AtomicBool::new(started),
            created_at: Utc::now(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn resolved_layers(&self) -> &[ResolvedLayer] {
        &self.layers
    }
}

fn resolve_layer(
    service_type: ServiceType,
    subject: &str,
    layer: &LayerReference,
    layer_registry: &ProviderRegistryService,
    style_registry: &ProviderRegistryService,
) -> Option<ResolvedLayer> {
    let provider = match &layer.provider {
        Some(provider_id) => layer_registry
            .get_provider(provider_id)
            .ok()
            .filter(|p| p.contains_key(&layer.name)),
        None => layer_registry.get_by_key(&layer.name).ok(),
    };
    let Some(provider) = provider else {
        warn!(worker = %subject, layer = %layer.name, provider = ?layer.provider, "Skipping unresolved layer");
        return None;
    };
    if !provider.capabilities().supports(service_type) {
        warn!(worker = %subject, layer = %layer.name, provider_id = %provider.id(), "Provider does not publish to this service, skipping layer");
        return None;
    }

    // Explicit style first, then the first style linked in the provider definition.
    let style = layer
        .style
        .clone()
        .or_else(|| provider.source().styles_for(&layer.name).first().cloned())
        .filter(|style| {
            let known = style_registry.get_by_key(style).is_ok();
            if !known {
                warn!(worker = %subject, layer = %layer.name, style = %style, "Unknown style, using the service default");
            }
            known
        });

    debug!(worker = %subject, layer = %layer.name, provider_id = %provider.id(), ?style, "Layer resolved");
    Some(ResolvedLayer {
        name: layer.name.clone(),
        provider_id: provider.id().to_string(),
        style,
    })
}

impl Worker for DefaultWorker {
    fn service_type(&self) -> ServiceType {
        self.service_type
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    fn start_error(&self) -> Option<String> {
        self.start_error.clone()
    }

    fn layers(&self) -> Vec<String> {
        self.layers.iter().map(|l| l.name.clone()).collect()
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn shutdown(&self) -> EngineResult<()> {
        if self.started.swap(false, Ordering::SeqCst) {
            info!(worker = %worker_subject(self.service_type, &self.id), "Worker shut down");
        }
        Ok(())
    }
}

/// Builds [`DefaultWorker`]s bound to the layer and style registries.
pub struct DefaultWorkerFactory {
    layer_registry: Arc<ProviderRegistryService>,
    style_registry: Arc<ProviderRegistryService>,
}

impl DefaultWorkerFactory {
    pub fn new(
        layer_registry: Arc<ProviderRegistryService>,
        style_registry: Arc<ProviderRegistryService>,
    ) -> Self {
        Self {
            layer_registry,
            style_registry,
        }
    }
}

impl WorkerFactory for DefaultWorkerFactory {
    fn build(&self, service_type: ServiceType, id: &str, config_dir: &Path) -> Arc<dyn Worker> {
        Arc::new(DefaultWorker::start(
            service_type,
            id,
            config_dir,
            &self.layer_registry,
            &self.style_registry,
        ))
    }
}

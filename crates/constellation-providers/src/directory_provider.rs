use crate::{
    MutableProvider, Provider, ProviderCapabilities, ProviderFactory, ProviderResource,
    ProviderSource,
};
use constellation_core::{
    validate_name, CoreError, DataType, ParameterDescriptor, ParameterDescriptorGroup,
    ParameterType, ParameterValues, ProviderKind, Result,
};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// Provider backed by a directory with one JSON document per resource.
/// The file stem is the key.
pub struct DirectoryProvider {
    source: ProviderSource,
    capabilities: ProviderCapabilities,
    root: PathBuf,
    extension: String,
    state: RwLock<DirectoryState>,
}

struct DirectoryState {
    keys: BTreeSet<String>,
    disposed: bool,
}

impl DirectoryProvider {
    pub fn open(
        source: ProviderSource,
        root: PathBuf,
        extension: String,
        data_type: DataType,
    ) -> Result<Self> {
        if !root.is_dir() {
            return Err(CoreError::ProviderCreation(format!(
                "provider '{}': {} is not a directory",
                source.id(),
                root.display()
            )));
        }
        let capabilities = ProviderCapabilities::new(data_type, source.services().to_vec());
        let keys = scan(&root, &extension, &source)?;
        debug!(provider_id = %source.id(), keys = keys.len(), "Opened directory provider");

        Ok(Self {
            source,
            capabilities,
            root,
            extension,
            state: RwLock::new(DirectoryState {
                keys,
                disposed: false,
            }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.{}", self.extension))
    }

    fn lock_poisoned(&self) -> CoreError {
        CoreError::LockPoisoned(format!("directory provider '{}'", self.id()))
    }

    fn live_state(&self) -> Result<std::sync::RwLockWriteGuard<'_, DirectoryState>> {
        let state = self.state.write().map_err(|_| self.lock_poisoned())?;
        if state.disposed {
            return Err(CoreError::ProviderDisposed(self.id().to_string()));
        }
        Ok(state)
    }
}

fn scan(root: &Path, extension: &str, source: &ProviderSource) -> Result<BTreeSet<String>> {
    let mut keys = BTreeSet::new();
    for entry in fs::read_dir(root)? {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            warn!(path = %path.display(), "Skipping resource with a non UTF-8 name");
            continue;
        };
        if !source.is_ignored(stem) {
            keys.insert(stem.to_string());
        }
    }
    Ok(keys)
}

impl Provider for DirectoryProvider {
    fn id(&self) -> &str {
        self.source.id()
    }

    fn kind(&self) -> ProviderKind {
        self.source.kind()
    }

    fn source(&self) -> &ProviderSource {
        &self.source
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    fn keys(&self) -> Vec<String> {
        match self.state.read() {
            Ok(state) if !state.disposed => state.keys.iter().cloned().collect(),
            _ => Vec::new(),
        }
    }

    fn get(&self, key: &str, version: Option<&str>) -> Result<Option<ProviderResource>> {
        {
            let state = self.state.read().map_err(|_| self.lock_poisoned())?;
            if state.disposed {
                return Err(CoreError::ProviderDisposed(self.id().to_string()));
            }
            if !state.keys.contains(key) {
                return Ok(None);
            }
        }

        let path = self.path_for(key);
        let document = match fs::read_to_string(&path) {
            Ok(document) => document,
            // Removed behind our back; visible as not found until the next reload.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let body: Value = serde_json::from_str(&document).map_err(|e| {
            CoreError::Serialization(format!("resource {}: {e}", path.display()))
        })?;

        let resource = ProviderResource::new(key, self.capabilities.data_type, body);
        Ok(resource.matches_version(version).then_some(resource))
    }

    fn reload(&self) -> Result<()> {
        let mut state = self.live_state()?;
        state.keys = scan(&self.root, &self.extension, &self.source)?;
        debug!(provider_id = %self.id(), keys = state.keys.len(), "Reloaded directory provider");
        Ok(())
    }

    fn dispose(&self) -> Result<()> {
        let mut state = self.state.write().map_err(|_| self.lock_poisoned())?;
        state.disposed = true;
        state.keys.clear();
        Ok(())
    }

    fn is_disposed(&self) -> bool {
        self.state.read().map(|s| s.disposed).unwrap_or(true)
    }

    fn as_mutable(&self) -> Option<&dyn MutableProvider> {
        Some(self)
    }
}

impl MutableProvider for DirectoryProvider {
    fn set(&self, resource: ProviderResource) -> Result<()> {
        validate_name("resource name", &resource.name)?;
        let mut state = self.live_state()?;
        let document = serde_json::to_string_pretty(&resource.body)?;
        fs::write(self.path_for(&resource.name), document)?;
        if !self.source.is_ignored(&resource.name) {
            state.keys.insert(resource.name);
        }
        Ok(())
    }

    fn rename(&self, key: &str, new_key: &str) -> Result<()> {
        validate_name("resource name", new_key)?;
        let mut state = self.live_state()?;
        if !state.keys.contains(key) {
            return Err(CoreError::ResourceNotFound(key.to_string()));
        }
        let target = self.path_for(new_key);
        if target.exists() {
            return Err(CoreError::Configuration(format!(
                "resource '{new_key}' already exists in provider '{}'",
                self.id()
            )));
        }
        fs::rename(self.path_for(key), target)?;
        state.keys.remove(key);
        if !self.source.is_ignored(new_key) {
            state.keys.insert(new_key.to_string());
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let mut state = self.live_state()?;
        let existed = state.keys.remove(key);
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(existed),
            Err(e) => Err(e.into()),
        }
    }
}

pub struct DirectoryProviderFactory {
    descriptor: ParameterDescriptorGroup,
}

impl DirectoryProviderFactory {
    pub const NAME: &'static str = "directory";

    pub fn new() -> Self {
        Self {
            descriptor: ParameterDescriptorGroup::new(
                Self::NAME,
                vec![
                    ParameterDescriptor::required("path", ParameterType::Path)
                        .with_description("Directory holding one document per resource"),
                    ParameterDescriptor::optional("extension", ParameterType::String)
                        .with_default("json"),
                    ParameterDescriptor::optional("data_type", ParameterType::String),
                ],
            ),
        }
    }
}

impl Default for DirectoryProviderFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderFactory for DirectoryProviderFactory {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn supports_kind(&self, _kind: ProviderKind) -> bool {
        true
    }

    fn descriptor(&self) -> &ParameterDescriptorGroup {
        &self.descriptor
    }

    fn build(&self, source: ProviderSource, params: ParameterValues) -> Result<Arc<dyn Provider>> {
        let root = PathBuf::from(params.require_str("path")?);
        let extension = params
            .require_str("extension")?
            .trim_start_matches('.')
            .to_string();
        let data_type = match params.get_str("data_type") {
            Some(data_type) => data_type.parse::<DataType>()?,
            None if source.kind() == ProviderKind::Style => DataType::Style,
            None => DataType::Vector,
        };
        Ok(Arc::new(DirectoryProvider::open(
            source, root, extension, data_type,
        )?))
    }
}

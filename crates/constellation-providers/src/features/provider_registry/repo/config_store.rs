use crate::ProviderSource;
use constellation_core::{validate_name, CoreError, ProviderKind, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::warn;

/// Persisted provider definitions.
pub trait ProviderConfigRepository: Send + Sync {
    fn save(&self, source: &ProviderSource) -> Result<()>;

    fn delete(&self, kind: ProviderKind, provider_id: &str) -> Result<bool>;

    fn get(&self, kind: ProviderKind, provider_id: &str) -> Result<Option<ProviderSource>>;

    /// Every readable definition of `kind`, sorted by id. Unreadable
    /// documents are skipped with a warning.
    fn load_all(&self, kind: ProviderKind) -> Result<Vec<ProviderSource>>;
}

/// Stores one JSON document per provider at `<root>/<kind>/<id>.json`.
#[derive(Debug, Clone)]
pub struct FileProviderConfigRepository {
    root: PathBuf,
}

impl FileProviderConfigRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn kind_dir(&self, kind: ProviderKind) -> PathBuf {
        self.root.join(kind.as_str())
    }

    fn path_for(&self, kind: ProviderKind, provider_id: &str) -> Result<PathBuf> {
        validate_name("provider id", provider_id)?;
        Ok(self.kind_dir(kind).join(format!("{provider_id}.json")))
    }
}

impl ProviderConfigRepository for FileProviderConfigRepository {
    fn save(&self, source: &ProviderSource) -> Result<()> {
        let path = self.path_for(source.kind(), source.id())?;
        fs::create_dir_all(self.kind_dir(source.kind()))?;
        // Write then rename so a crash never leaves a truncated definition.
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, source.to_json()?)?;
        fs::rename(&staging, &path)?;
        Ok(())
    }

    fn delete(&self, kind: ProviderKind, provider_id: &str) -> Result<bool> {
        match fs::remove_file(self.path_for(kind, provider_id)?) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn get(&self, kind: ProviderKind, provider_id: &str) -> Result<Option<ProviderSource>> {
        let path = self.path_for(kind, provider_id)?;
        if !path.exists() {
            return Ok(None);
        }
        ProviderSource::from_file(&path).map(Some)
    }

    fn load_all(&self, kind: ProviderKind) -> Result<Vec<ProviderSource>> {
        let dir = self.kind_dir(kind);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut sources = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match ProviderSource::from_file(&path) {
                Ok(source) if source.kind() == kind => sources.push(source),
                Ok(source) => {
                    warn!(path = %path.display(), kind = %source.kind(), expected = %kind, "Skipping provider definition filed under the wrong kind");
                }
                Err(error) => {
                    warn!(path = %path.display(), error = %error, "Skipping unreadable provider definition");
                }
            }
        }
        sources.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(sources)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryProviderConfigRepository {
    sources: Arc<RwLock<BTreeMap<(ProviderKind, String), ProviderSource>>>,
}

impl InMemoryProviderConfigRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> CoreError {
    CoreError::LockPoisoned("provider config store".to_string())
}

impl ProviderConfigRepository for InMemoryProviderConfigRepository {
    fn save(&self, source: &ProviderSource) -> Result<()> {
        let mut sources = self.sources.write().map_err(|_| poisoned())?;
        sources.insert((source.kind(), source.id().to_string()), source.clone());
        Ok(())
    }

    fn delete(&self, kind: ProviderKind, provider_id: &str) -> Result<bool> {
        let mut sources = self.sources.write().map_err(|_| poisoned())?;
        Ok(sources.remove(&(kind, provider_id.to_string())).is_some())
    }

    fn get(&self, kind: ProviderKind, provider_id: &str) -> Result<Option<ProviderSource>> {
        let sources = self.sources.read().map_err(|_| poisoned())?;
        Ok(sources.get(&(kind, provider_id.to_string())).cloned())
    }

    fn load_all(&self, kind: ProviderKind) -> Result<Vec<ProviderSource>> {
        let sources = self.sources.read().map_err(|_| poisoned())?;
        Ok(sources
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, source)| source.clone())
            .collect())
    }
}

use crate::shared::error::{EngineError, EngineResult};
use crate::shared::types::ServiceType;
use constellation_core::validate_name;
use std::fs;
use std::path::{Path, PathBuf};

/// Instance directories on disk: `<root>/<SERVICE>/<identifier>/`.
pub trait InstanceDirectoryRepository: Send + Sync {
    fn instance_dir(&self, service_type: ServiceType, id: &str) -> EngineResult<PathBuf>;

    fn exists(&self, service_type: ServiceType, id: &str) -> EngineResult<bool>;

    /// Instance identifiers present on disk, sorted.
    fn list_instances(&self, service_type: ServiceType) -> EngineResult<Vec<String>>;
}

#[derive(Debug, Clone)]
pub struct FileInstanceDirectoryRepository {
    root: PathBuf,
}

impl FileInstanceDirectoryRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn service_dir(&self, service_type: ServiceType) -> PathBuf {
        self.root.join(service_type.directory_name())
    }
}

impl InstanceDirectoryRepository for FileInstanceDirectoryRepository {
    fn instance_dir(&self, service_type: ServiceType, id: &str) -> EngineResult<PathBuf> {
        validate_name("instance identifier", id)
            .map_err(|e| EngineError::InvalidRequest(e.to_string()))?;
        Ok(self.service_dir(service_type).join(id))
    }

    fn exists(&self, service_type: ServiceType, id: &str) -> EngineResult<bool> {
        Ok(self.instance_dir(service_type, id)?.is_dir())
    }

    fn list_instances(&self, service_type: ServiceType) -> EngineResult<Vec<String>> {
        let dir = self.service_dir(service_type);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&dir)
            .map_err(|e| EngineError::StorageError(format!("{}: {e}", dir.display())))?;
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| EngineError::StorageError(e.to_string()))?;
            if !entry.path().is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                ids.push(name.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let root = tempfile::tempdir().unwrap();
        let repo = FileInstanceDirectoryRepository::new(root.path());
        fs::create_dir_all(root.path().join("WMS").join("default")).unwrap();
        fs::create_dir_all(root.path().join("WMS").join("alt")).unwrap();
        fs::write(root.path().join("WMS").join("README"), "not an instance").unwrap();

        assert_eq!(
            repo.list_instances(ServiceType::Wms).unwrap(),
            vec!["alt".to_string(), "default".to_string()]
        );
        assert!(repo.exists(ServiceType::Wms, "default").unwrap());
        assert!(!repo.exists(ServiceType::Wms, "README").unwrap());
        assert!(!repo.exists(ServiceType::Wfs, "default").unwrap());
        assert_eq!(
            repo.instance_dir(ServiceType::Wms, "default").unwrap(),
            root.path().join("WMS").join("default")
        );
    }

    #[test]
    fn test_missing_service_dir_is_empty() {
        let root = tempfile::tempdir().unwrap();
        let repo = FileInstanceDirectoryRepository::new(root.path());
        assert!(repo.list_instances(ServiceType::Csw).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_path_escape() {
        let root = tempfile::tempdir().unwrap();
        let repo = FileInstanceDirectoryRepository::new(root.path());
        assert!(matches!(
            repo.exists(ServiceType::Wms, ".."),
            Err(EngineError::InvalidRequest(_))
        ));
        assert!(repo.instance_dir(ServiceType::Wms, "a/b").is_err());
    }
}

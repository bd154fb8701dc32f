//! Provider definition documents.

use constellation_core::{validate_name, CoreError, ProviderKind, Result, ServiceType};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Immutable descriptor of one provider definition: factory parameters,
/// layers to ignore, and the styles attached to each layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSource {
    id: String,
    factory: String,
    kind: ProviderKind,
    #[serde(default)]
    parameters: Map<String, Value>,
    #[serde(default)]
    ignored: BTreeSet<String>,
    #[serde(default)]
    styles: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    services: Vec<ServiceType>,
}

impl ProviderSource {
    pub fn new(id: impl Into<String>, factory: impl Into<String>, kind: ProviderKind) -> Self {
        Self {
            id: id.into(),
            factory: factory.into(),
            kind,
            parameters: Map::new(),
            ignored: BTreeSet::new(),
            styles: BTreeMap::new(),
            services: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_ignored(mut self, name: impl Into<String>) -> Self {
        self.ignored.insert(name.into());
        self
    }

    pub fn with_styles(mut self, layer: impl Into<String>, styles: Vec<String>) -> Self {
        self.styles.insert(layer.into(), styles);
        self
    }

    pub fn with_services(mut self, services: Vec<ServiceType>) -> Self {
        self.services = services;
        self
    }

    pub fn from_json(document: &str) -> Result<Self> {
        let source: ProviderSource = serde_json::from_str(document)?;
        source.validate()?;
        Ok(source)
    }

    pub fn from_value(document: Value) -> Result<Self> {
        let source: ProviderSource = serde_json::from_value(document)?;
        source.validate()?;
        Ok(source)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let document = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Io(format!("failed to read provider source {}: {e}", path.display()))
        })?;
        Self::from_json(&document)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        validate_name("provider id", &self.id)?;
        if self.factory.trim().is_empty() {
            return Err(CoreError::Configuration(format!(
                "provider '{}' does not name a factory",
                self.id
            )));
        }
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn factory(&self) -> &str {
        &self.factory
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn parameters(&self) -> &Map<String, Value> {
        &self.parameters
    }

    pub fn ignored(&self) -> &BTreeSet<String> {
        &self.ignored
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignored.contains(name)
    }

    /// Styles linked to `layer`, in declaration order.
    pub fn styles_for(&self, layer: &str) -> &[String] {
        self.styles.get(layer).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn style_links(&self) -> &BTreeMap<String, Vec<String>> {
        &self.styles
    }

    pub fn services(&self) -> &[ServiceType] {
        &self.services
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"{
        "id": "shapefiles",
        "factory": "directory",
        "kind": "layer",
        "parameters": { "path": "/data/shp" },
        "ignored": ["tmp_layer"],
        "styles": { "roads": ["line-default", "line-bold"] },
        "services": ["wms", "wfs"]
    }"#;

    #[test]
    fn test_parse_full_document() {
        let source = ProviderSource::from_json(DOCUMENT).unwrap();
        assert_eq!(source.id(), "shapefiles");
        assert_eq!(source.factory(), "directory");
        assert_eq!(source.kind(), ProviderKind::Layer);
        assert_eq!(source.parameters().get("path").unwrap(), "/data/shp");
        assert!(source.is_ignored("tmp_layer"));
        assert!(!source.is_ignored("roads"));
        assert_eq!(source.styles_for("roads"), ["line-default", "line-bold"]);
        assert!(source.styles_for("rivers").is_empty());
        assert_eq!(source.services(), [ServiceType::Wms, ServiceType::Wfs]);
    }

    #[test]
    fn test_optional_sections_default_to_empty() {
        let source = ProviderSource::from_json(
            r#"{"id": "defaults", "factory": "static-styles", "kind": "style"}"#,
        )
        .unwrap();
        assert!(source.parameters().is_empty());
        assert!(source.ignored().is_empty());
        assert!(source.style_links().is_empty());
    }

    #[test]
    fn test_rejects_empty_id() {
        let result = ProviderSource::from_json(r#"{"id": "", "factory": "memory", "kind": "data"}"#);
        assert!(matches!(result, Err(CoreError::Configuration(_))));
    }

    #[test]
    fn test_rejects_missing_factory() {
        let result = ProviderSource::from_json(r#"{"id": "x", "factory": " ", "kind": "data"}"#);
        assert!(matches!(result, Err(CoreError::Configuration(_))));
    }

    #[test]
    fn test_rejects_path_like_id() {
        let source = ProviderSource::new("../escape", "memory", ProviderKind::Data);
        assert!(source.validate().is_err());
    }

    #[test]
    fn test_malformed_document_is_serialization_error() {
        let result = ProviderSource::from_json("{ not json");
        assert!(matches!(result, Err(CoreError::Serialization(_))));
    }

    #[test]
    fn test_builder_and_persisted_document_agree() {
        let built = ProviderSource::new("shapefiles", "directory", ProviderKind::Layer)
            .with_parameter("path", "/data/shp")
            .with_ignored("tmp_layer")
            .with_styles("roads", vec!["line-default".into(), "line-bold".into()])
            .with_services(vec![ServiceType::Wms, ServiceType::Wfs]);

        let parsed = ProviderSource::from_json(&built.to_json().unwrap()).unwrap();
        assert_eq!(parsed, ProviderSource::from_json(DOCUMENT).unwrap());
    }
}

use crate::{Provider, ProviderCapabilities, ProviderFactory, ProviderResource, ProviderSource};
use constellation_core::{
    CoreError, DataType, ParameterDescriptorGroup, ParameterValues, ProviderKind, Result,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Built-in catalogue of default styles. Read-only.
pub struct StaticStyleProvider {
    source: ProviderSource,
    capabilities: ProviderCapabilities,
    styles: BTreeMap<String, ProviderResource>,
    disposed: AtomicBool,
}

fn catalogue() -> Vec<(&'static str, Value)> {
    vec![
        (
            "default-point",
            json!({"symbolizer": "point", "mark": "circle", "fill": "#808080", "size": 6}),
        ),
        (
            "default-line",
            json!({"symbolizer": "line", "stroke": "#0000ff", "width": 1}),
        ),
        (
            "default-polygon",
            json!({"symbolizer": "polygon", "fill": "#c0c0c0", "stroke": "#000000"}),
        ),
        (
            "default-raster",
            json!({"symbolizer": "raster", "opacity": 1.0, "color_map": "grayscale"}),
        ),
        (
            "default-sensor",
            json!({"symbolizer": "point", "mark": "triangle", "fill": "#ff8800", "size": 8}),
        ),
    ]
}

impl StaticStyleProvider {
    pub fn new(source: ProviderSource) -> Self {
        let capabilities = ProviderCapabilities::new(DataType::Style, source.services().to_vec());
        let styles = catalogue()
            .into_iter()
            .filter(|(name, _)| !source.is_ignored(name))
            .map(|(name, body)| {
                (
                    name.to_string(),
                    ProviderResource::new(name, DataType::Style, body),
                )
            })
            .collect();

        Self {
            source,
            capabilities,
            styles,
            disposed: AtomicBool::new(false),
        }
    }
}

impl Provider for StaticStyleProvider {
    fn id(&self) -> &str {
        self.source.id()
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Style
    }

    fn source(&self) -> &ProviderSource {
        &self.source
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    fn keys(&self) -> Vec<String> {
        if self.is_disposed() {
            return Vec::new();
        }
        self.styles.keys().cloned().collect()
    }

    fn get(&self, key: &str, version: Option<&str>) -> Result<Option<ProviderResource>> {
        if self.is_disposed() {
            return Err(CoreError::ProviderDisposed(self.id().to_string()));
        }
        Ok(self
            .styles
            .get(key)
            .filter(|style| style.matches_version(version))
            .cloned())
    }

    fn reload(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(CoreError::ProviderDisposed(self.id().to_string()));
        }
        Ok(())
    }

    fn dispose(&self) -> Result<()> {
        self.disposed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

pub struct StaticStyleProviderFactory {
    descriptor: ParameterDescriptorGroup,
}

impl StaticStyleProviderFactory {
    pub const NAME: &'static str = "static-styles";

    pub fn new() -> Self {
        Self {
            descriptor: ParameterDescriptorGroup::new(Self::NAME, Vec::new()),
        }
    }
}

impl Default for StaticStyleProviderFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderFactory for StaticStyleProviderFactory {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn supports_kind(&self, kind: ProviderKind) -> bool {
        kind == ProviderKind::Style
    }

    fn descriptor(&self) -> &ParameterDescriptorGroup {
        &self.descriptor
    }

    fn build(&self, source: ProviderSource, _params: ParameterValues) -> Result<Arc<dyn Provider>> {
        Ok(Arc::new(StaticStyleProvider::new(source)))
    }
}

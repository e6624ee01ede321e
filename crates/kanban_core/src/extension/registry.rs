//! In-process summary plugin registry and selection.

use crate::evidence::bundle::EvidenceBundle;
use crate::extension::default_plugin::DefaultSummaryPlugin;
use crate::extension::manifest::ManifestError;
use crate::extension::plugin::{PluginError, SummaryDocument, SummaryPlugin};
use log::{info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;

/// Registration/selection errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    InvalidManifest { plugin_id: String, source: ManifestError },
    DuplicatePluginId(String),
    PluginNotFound(String),
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidManifest { plugin_id, source } => {
                write!(f, "plugin {plugin_id} has an invalid manifest: {source}")
            }
            Self::DuplicatePluginId(value) => write!(f, "plugin id already registered: {value}"),
            Self::PluginNotFound(value) => write!(f, "plugin not found: {value}"),
        }
    }
}

impl Error for RegistryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidManifest { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Summary plugins keyed by manifest id, with one active selection.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Arc<dyn SummaryPlugin>>,
    capability_index: BTreeMap<String, BTreeSet<String>>,
    active_plugin_id: Option<String>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in markdown summary, selected as active.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        let builtin: Arc<dyn SummaryPlugin> = Arc::new(DefaultSummaryPlugin::new());
        let builtin_id = builtin.manifest().id.clone();
        if registry.register(builtin).is_ok() {
            registry.active_plugin_id = Some(builtin_id);
        }
        registry
    }

    /// Registers one plugin after validating its manifest.
    pub fn register(&mut self, plugin: Arc<dyn SummaryPlugin>) -> Result<(), RegistryError> {
        let manifest = plugin.manifest();
        let plugin_id = manifest.id.trim().to_string();
        manifest
            .validate()
            .map_err(|source| RegistryError::InvalidManifest {
                plugin_id: plugin_id.clone(),
                source,
            })?;
        if self.plugins.contains_key(plugin_id.as_str()) {
            return Err(RegistryError::DuplicatePluginId(plugin_id));
        }

        for capability in &manifest.capabilities {
            self.capability_index
                .entry(capability.trim().to_string())
                .or_default()
                .insert(plugin_id.clone());
        }
        info!(
            "event=plugin_register module=extension status=ok plugin_id={} version={}",
            plugin_id, manifest.version
        );
        self.plugins.insert(plugin_id, plugin);
        Ok(())
    }

    /// Removes a plugin; clears the selection when it was active.
    pub fn unregister(&mut self, plugin_id: &str) -> bool {
        let normalized = plugin_id.trim();
        if self.plugins.remove(normalized).is_none() {
            return false;
        }
        for ids in self.capability_index.values_mut() {
            ids.remove(normalized);
        }
        self.capability_index.retain(|_, ids| !ids.is_empty());
        if self.active_plugin_id.as_deref() == Some(normalized) {
            self.active_plugin_id = None;
        }
        true
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Sorted plugin ids.
    pub fn plugin_ids(&self) -> Vec<String> {
        self.plugins.keys().cloned().collect()
    }

    /// Sorted ids of plugins declaring `capability`.
    pub fn plugins_with_capability(&self, capability: &str) -> Vec<String> {
        self.capability_index
            .get(capability.trim())
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn select_active(&mut self, plugin_id: &str) -> Result<(), RegistryError> {
        let normalized = plugin_id.trim();
        if !self.plugins.contains_key(normalized) {
            return Err(RegistryError::PluginNotFound(normalized.to_string()));
        }
        self.active_plugin_id = Some(normalized.to_string());
        Ok(())
    }

    pub fn clear_active(&mut self) {
        self.active_plugin_id = None;
    }

    pub fn active_plugin_id(&self) -> Option<&str> {
        self.active_plugin_id.as_deref()
    }

    pub fn get(&self, plugin_id: &str) -> Option<Arc<dyn SummaryPlugin>> {
        self.plugins.get(plugin_id.trim()).cloned()
    }

    /// Runs the active plugin over `bundle`. Output is returned as-is.
    pub fn summarize_active(&self, bundle: &EvidenceBundle) -> Result<SummaryDocument, PluginError> {
        let plugin = self.require_active()?;
        let plugin_id = plugin.manifest().id.clone();
        let started_at = Instant::now();
        let result = plugin.summarize(bundle);
        let duration_ms = started_at.elapsed().as_millis();
        match &result {
            Ok(document) => info!(
                "event=summary_render module=extension status=ok plugin_id={} duration_ms={} markdown_bytes={}",
                plugin_id,
                duration_ms,
                document.markdown.len()
            ),
            Err(err) => warn!(
                "event=summary_render module=extension status=error plugin_id={} duration_ms={} error_code={}",
                plugin_id, duration_ms, err.code
            ),
        }
        result
    }

    fn require_active(&self) -> Result<Arc<dyn SummaryPlugin>, PluginError> {
        self.active_plugin_id()
            .and_then(|plugin_id| self.get(plugin_id))
            .ok_or_else(|| {
                PluginError::new("registry", "plugin_not_selected", "No active plugin selected.")
            })
    }
}

#[cfg(test)]
mod tests {
    use super::{PluginRegistry, RegistryError};
    use crate::clock::DateRange;
    use crate::evidence::bundle::EvidenceBundle;
    use crate::extension::manifest::{
        PluginEntrypoints, PluginManifest, CAPABILITY_MARKDOWN_SUMMARY, CAPABILITY_WEEKLY_REVIEW,
    };
    use crate::extension::plugin::{PluginError, SummaryDocument, SummaryPlugin};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    struct EchoPlugin {
        manifest: PluginManifest,
    }

    impl EchoPlugin {
        fn new(id: &str, capabilities: &[&str]) -> Self {
            Self {
                manifest: PluginManifest {
                    id: id.to_string(),
                    version: "0.1.0".to_string(),
                    display_name: "Echo".to_string(),
                    capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
                    entrypoints: PluginEntrypoints {
                        summarize: Some("echo.summarize".to_string()),
                        health: Some("echo.health".to_string()),
                    },
                },
            }
        }
    }

    impl SummaryPlugin for EchoPlugin {
        fn manifest(&self) -> &PluginManifest {
            &self.manifest
        }

        fn summarize(&self, bundle: &EvidenceBundle) -> Result<SummaryDocument, PluginError> {
            Ok(SummaryDocument {
                markdown: format!("entries={}", bundle.history_entries.len()),
                metadata: BTreeMap::new(),
            })
        }
    }

    #[test]
    fn builtin_registry_has_active_default() {
        let registry = PluginRegistry::with_builtin();
        assert_eq!(registry.len(), 1);
        let active = registry.active_plugin_id().unwrap().to_string();
        assert_eq!(
            registry.plugins_with_capability(CAPABILITY_MARKDOWN_SUMMARY),
            vec![active]
        );
    }

    #[test]
    fn duplicate_and_invalid_plugins_are_rejected() {
        let mut registry = PluginRegistry::new();
        registry
            .register(Arc::new(EchoPlugin::new("echo", &[CAPABILITY_MARKDOWN_SUMMARY])))
            .unwrap();
        assert_eq!(
            registry
                .register(Arc::new(EchoPlugin::new("echo", &[CAPABILITY_MARKDOWN_SUMMARY])))
                .unwrap_err(),
            RegistryError::DuplicatePluginId("echo".to_string())
        );
        assert!(matches!(
            registry.register(Arc::new(EchoPlugin::new("weekly", &[CAPABILITY_WEEKLY_REVIEW]))),
            Err(RegistryError::InvalidManifest { .. })
        ));
    }

    #[test]
    fn summarize_requires_selection() {
        let mut registry = PluginRegistry::new();
        registry
            .register(Arc::new(EchoPlugin::new("echo", &[CAPABILITY_MARKDOWN_SUMMARY])))
            .unwrap();
        let bundle = EvidenceBundle::empty(DateRange::week_starting(0));
        let err = registry.summarize_active(&bundle).unwrap_err();
        assert_eq!(err.code, "plugin_not_selected");

        registry.select_active("echo").unwrap();
        let document = registry.summarize_active(&bundle).unwrap();
        assert_eq!(document.markdown, "entries=0");
    }

    #[test]
    fn unregister_clears_selection_and_index() {
        let mut registry = PluginRegistry::new();
        registry
            .register(Arc::new(EchoPlugin::new("echo", &[CAPABILITY_MARKDOWN_SUMMARY])))
            .unwrap();
        registry.select_active("echo").unwrap();
        assert!(registry.unregister("echo"));
        assert!(!registry.unregister("echo"));
        assert_eq!(registry.active_plugin_id(), None);
        assert!(registry
            .plugins_with_capability(CAPABILITY_MARKDOWN_SUMMARY)
            .is_empty());
        assert!(matches!(
            registry.select_active("echo"),
            Err(RegistryError::PluginNotFound(_))
        ));
    }
}

//! Summary plugin interface.

use crate::evidence::bundle::EvidenceBundle;
use crate::extension::manifest::PluginManifest;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Plugin output. The core passes it through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryDocument {
    pub markdown: String,
    pub metadata: BTreeMap<String, String>,
}

/// Failure reported by a plugin or by plugin selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginError {
    pub plugin_id: String,
    pub code: String,
    pub message: String,
}

impl PluginError {
    pub fn new(
        plugin_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

impl Display for PluginError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "plugin {} failed ({}): {}", self.plugin_id, self.code, self.message)
    }
}

impl Error for PluginError {}

/// Produces markdown from an evidence bundle.
pub trait SummaryPlugin: Send + Sync {
    fn manifest(&self) -> &PluginManifest;
    fn summarize(&self, bundle: &EvidenceBundle) -> Result<SummaryDocument, PluginError>;
}

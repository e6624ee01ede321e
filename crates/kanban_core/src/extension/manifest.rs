//! Summary plugin manifest declaration and validation.

use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Produces markdown from an evidence bundle.
pub const CAPABILITY_MARKDOWN_SUMMARY: &str = "markdown_summary";
/// Understands seven-day evidence windows.
pub const CAPABILITY_WEEKLY_REVIEW: &str = "weekly_review";

const SUPPORTED_CAPABILITIES: &[&str] = &[CAPABILITY_MARKDOWN_SUMMARY, CAPABILITY_WEEKLY_REVIEW];

pub fn supported_capabilities() -> &'static [&'static str] {
    SUPPORTED_CAPABILITIES
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginManifest {
    /// Stable plugin id, e.g. `builtin.summary.default`.
    pub id: String,
    /// `major.minor.patch`.
    pub version: String,
    /// Human-readable name shown by pickers.
    pub display_name: String,
    pub capabilities: Vec<String>,
    pub entrypoints: PluginEntrypoints,
}

/// Declared entrypoint identifiers. Declaration only; nothing is loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginEntrypoints {
    pub summarize: Option<String>,
    pub health: Option<String>,
}

impl PluginManifest {
    pub fn validate(&self) -> Result<(), ManifestError> {
        let id = self.id.trim();
        if id.is_empty() {
            return Err(ManifestError::EmptyId);
        }
        if !is_valid_plugin_id(id) {
            return Err(ManifestError::InvalidId(self.id.clone()));
        }
        if !is_semver_triplet(self.version.trim()) {
            return Err(ManifestError::InvalidVersion(self.version.clone()));
        }
        if self.capabilities.is_empty() {
            return Err(ManifestError::MissingCapabilities);
        }

        let mut seen = BTreeSet::new();
        for capability in &self.capabilities {
            let capability = capability.trim();
            if !supported_capabilities().contains(&capability) {
                return Err(ManifestError::UnsupportedCapability(capability.to_string()));
            }
            if !seen.insert(capability) {
                return Err(ManifestError::DuplicateCapability(capability.to_string()));
            }
        }
        if !seen.contains(CAPABILITY_MARKDOWN_SUMMARY) {
            return Err(ManifestError::MissingCapability(CAPABILITY_MARKDOWN_SUMMARY));
        }

        require_entrypoint(&self.entrypoints.summarize, "summarize")?;
        require_entrypoint(&self.entrypoints.health, "health")?;
        Ok(())
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities
            .iter()
            .any(|declared| declared.trim() == capability)
    }
}

fn require_entrypoint(value: &Option<String>, name: &'static str) -> Result<(), ManifestError> {
    match value {
        Some(raw) if !raw.trim().is_empty() => Ok(()),
        _ => Err(ManifestError::MissingEntrypoint(name)),
    }
}

/// Lowercase segments separated by single `.`, `_` or `-`.
fn is_valid_plugin_id(value: &str) -> bool {
    !value.is_empty()
        && value.split(['.', '_', '-']).all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        })
}

fn is_semver_triplet(value: &str) -> bool {
    let parts: Vec<&str> = value.split('.').collect();
    parts.len() == 3
        && parts
            .iter()
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    EmptyId,
    InvalidId(String),
    InvalidVersion(String),
    MissingCapabilities,
    MissingCapability(&'static str),
    UnsupportedCapability(String),
    DuplicateCapability(String),
    MissingEntrypoint(&'static str),
}

impl Display for ManifestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyId => write!(f, "plugin id must not be empty"),
            Self::InvalidId(value) => write!(f, "plugin id is invalid: {value}"),
            Self::InvalidVersion(value) => {
                write!(f, "plugin version is invalid: {value} (expected major.minor.patch)")
            }
            Self::MissingCapabilities => write!(f, "plugin capabilities must not be empty"),
            Self::MissingCapability(name) => write!(f, "plugin must declare capability {name}"),
            Self::UnsupportedCapability(value) => {
                write!(f, "plugin capability is unsupported: {value}")
            }
            Self::DuplicateCapability(value) => {
                write!(f, "plugin capability is duplicated: {value}")
            }
            Self::MissingEntrypoint(name) => write!(f, "plugin missing entrypoint: {name}"),
        }
    }
}

impl Error for ManifestError {}

#[cfg(test)]
mod tests {
    use super::{
        ManifestError, PluginEntrypoints, PluginManifest, CAPABILITY_MARKDOWN_SUMMARY,
        CAPABILITY_WEEKLY_REVIEW,
    };

    fn manifest() -> PluginManifest {
        PluginManifest {
            id: "team.summary-llm".to_string(),
            version: "1.2.0".to_string(),
            display_name: "LLM summary".to_string(),
            capabilities: vec![
                CAPABILITY_MARKDOWN_SUMMARY.to_string(),
                CAPABILITY_WEEKLY_REVIEW.to_string(),
            ],
            entrypoints: PluginEntrypoints {
                summarize: Some("team.summarize".to_string()),
                health: Some("team.health".to_string()),
            },
        }
    }

    #[test]
    fn accepts_complete_manifest() {
        manifest().validate().unwrap();
    }

    #[test]
    fn markdown_capability_is_mandatory() {
        let mut value = manifest();
        value.capabilities = vec![CAPABILITY_WEEKLY_REVIEW.to_string()];
        assert_eq!(
            value.validate().unwrap_err(),
            ManifestError::MissingCapability(CAPABILITY_MARKDOWN_SUMMARY)
        );
    }

    #[test]
    fn rejects_bad_ids_and_versions() {
        let mut value = manifest();
        value.id = "Team..Summary".to_string();
        assert!(matches!(value.validate(), Err(ManifestError::InvalidId(_))));

        let mut value = manifest();
        value.version = "v2".to_string();
        assert!(matches!(
            value.validate(),
            Err(ManifestError::InvalidVersion(_))
        ));
    }

    #[test]
    fn rejects_duplicate_and_unknown_capabilities() {
        let mut value = manifest();
        value
            .capabilities
            .push(CAPABILITY_WEEKLY_REVIEW.to_string());
        assert!(matches!(
            value.validate(),
            Err(ManifestError::DuplicateCapability(_))
        ));

        let mut value = manifest();
        value.capabilities.push("code_loader".to_string());
        assert!(matches!(
            value.validate(),
            Err(ManifestError::UnsupportedCapability(_))
        ));
    }

    #[test]
    fn requires_summarize_entrypoint() {
        let mut value = manifest();
        value.entrypoints.summarize = Some("  ".to_string());
        assert_eq!(
            value.validate().unwrap_err(),
            ManifestError::MissingEntrypoint("summarize")
        );
    }
}

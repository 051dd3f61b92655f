//! Artifact templates file
//!
//! ```yaml
//! version: "1.0"
//! templates:
//!   final_document:
//!     description: Final test document
//!     template: |
//!       <!-- {{subject_id}} -->
//!       {{{text}}}
//! ```

use crate::{OutError, FINAL_DOCUMENT};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

const BUILTIN: &str = include_str!("../templates/artifacts.yaml");

/// Top-level templates file structure
#[derive(Debug, Clone, Deserialize)]
pub struct TemplatesFile {
    pub version: String,
    pub templates: HashMap<String, Template>,
}

/// A single template definition
#[derive(Debug, Clone, Deserialize)]
pub struct Template {
    #[serde(default)]
    pub description: String,
    pub template: String,
}

impl TemplatesFile {
    /// Templates shipped with the crate
    pub fn builtin() -> Result<Self, OutError> {
        Self::from_yaml(BUILTIN)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, OutError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| OutError::Template(format!("failed to read {}: {}", path.as_ref().display(), e)))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, OutError> {
        serde_yaml::from_str(yaml).map_err(|e| OutError::Template(e.to_string()))
    }

    /// Built-ins overlaid with `overrides`; a template in `overrides` wins
    pub fn with_overrides(overrides: TemplatesFile) -> Result<Self, OutError> {
        let mut merged = Self::builtin()?;
        merged.version = overrides.version;
        merged.templates.extend(overrides.templates);
        Ok(merged)
    }

    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    pub fn list_templates(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Every artifact needs `final_document`
    pub fn validate(&self) -> Result<(), OutError> {
        if self.get(FINAL_DOCUMENT).is_none() {
            return Err(OutError::Template(format!("missing template '{}'", FINAL_DOCUMENT)));
        }
        Ok(())
    }
}

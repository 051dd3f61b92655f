use serde::{Deserialize, Serialize};
use testgen_core::{Material, MaterialCategory};

/// The bounded set of answers to a missing category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionChoice {
    SupplyText,
    SupplyLocator,
    Skip,
    CheckParent,
}

impl ResolutionChoice {
    /// Whether the choice carries a payload (text or locator)
    pub fn needs_payload(&self) -> bool {
        matches!(self, Self::SupplyText | Self::SupplyLocator)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingCategoryRequest {
    pub category: MaterialCategory,
    pub subject_id: String,
    pub message: String,
    pub choices: Vec<ResolutionChoice>,
}

impl MissingCategoryRequest {
    pub fn offers(&self, choice: ResolutionChoice) -> bool {
        self.choices.contains(&choice)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionOutcome {
    /// `issues` names sources that failed while others succeeded
    MaterialAdded {
        materials: Vec<Material>,
        issues: Vec<String>,
    },
    Skipped,
    /// Parent was consulted and had nothing for the category
    DeferredToParent,
}

impl ResolutionOutcome {
    pub fn added(materials: Vec<Material>) -> Self {
        Self::MaterialAdded {
            materials,
            issues: Vec::new(),
        }
    }
}

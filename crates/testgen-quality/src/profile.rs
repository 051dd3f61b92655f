//! Quality Profiles, one per document kind
//!
//! Thresholds live here rather than in the gate so they can differ per kind.
//! The shipped profiles use the same numbers for plans and cases.

use serde::{Deserialize, Serialize};
use testgen_core::{DocumentKind, IssueCategory, TestgenError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityProfile {
    /// Profile name (e.g., "test-plan@1.0")
    pub name: String,

    pub kind: DocumentKind,

    // === Decision ===

    /// At or above this score a draft is finalized without review
    pub finalize_threshold: f64,

    /// Automatic refinements allowed per run
    pub max_refinements: u32,

    /// Issue categories a regeneration can plausibly fix
    pub auto_fixable: Vec<IssueCategory>,

    // === Scoring ===

    pub issue_penalty: f64,
    pub suggestion_penalty: f64,

    // === Rating ===

    pub excellent_threshold: f64,
    pub good_threshold: f64,

    // === Content ===

    /// Minimum trimmed length in characters
    pub min_chars: usize,

    /// Matched case-insensitively as substrings
    pub required_sections: Vec<String>,

    pub placeholder_markers: Vec<String>,

    /// Placeholder occurrences tolerated before a suggestion is raised
    pub max_placeholders: usize,

    /// Minimum "test case" mentions (cases only)
    pub min_test_cases: Option<usize>,
}

impl QualityProfile {
    fn base(name: &str, kind: DocumentKind, required_sections: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            kind,
            finalize_threshold: 0.8,
            max_refinements: 2,
            auto_fixable: vec![IssueCategory::TooShort, IssueCategory::MissingSections],
            issue_penalty: 0.2,
            suggestion_penalty: 0.1,
            excellent_threshold: 0.9,
            good_threshold: 0.7,
            min_chars: 100,
            required_sections: required_sections.iter().map(|s| s.to_string()).collect(),
            placeholder_markers: ["TBD", "TODO", "[PLACEHOLDER]", "Information not found"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_placeholders: 5,
            min_test_cases: None,
        }
    }

    pub fn test_plan() -> Self {
        Self::base(
            "test-plan@1.0",
            DocumentKind::Plan,
            &[
                "Introduction",
                "Scope of Testing",
                "Test Objectives",
                "Testing Approach",
                "Test Schedule",
                "Test Environment",
            ],
        )
    }

    pub fn test_cases() -> Self {
        Self {
            min_test_cases: Some(3),
            ..Self::base(
                "test-cases@1.0",
                DocumentKind::Cases,
                &[
                    "Test Case ID",
                    "Test Case Title",
                    "Description",
                    "Preconditions",
                    "Test Steps",
                    "Expected Result",
                ],
            )
        }
    }

    pub fn for_kind(kind: DocumentKind) -> Self {
        match kind {
            DocumentKind::Plan => Self::test_plan(),
            DocumentKind::Cases => Self::test_cases(),
        }
    }

    /// Load profile from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, TestgenError> {
        let profile: Self = serde_yaml::from_str(yaml).map_err(|e| TestgenError::Config(e.to_string()))?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn validate(&self) -> Result<(), TestgenError> {
        let unit = 0.0..=1.0;
        for (name, value) in [
            ("finalize_threshold", self.finalize_threshold),
            ("excellent_threshold", self.excellent_threshold),
            ("good_threshold", self.good_threshold),
        ] {
            if !unit.contains(&value) {
                return Err(TestgenError::Config(format!("{} must lie in [0, 1], got {}", name, value)));
            }
        }
        if self.issue_penalty < 0.0 || self.suggestion_penalty < 0.0 {
            return Err(TestgenError::Config("penalties must not be negative".into()));
        }
        Ok(())
    }
}

/// The profile set a run picks from once its document kind is known
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityProfiles {
    pub test_plan: QualityProfile,
    pub test_cases: QualityProfile,
}

impl QualityProfiles {
    pub fn get(&self, kind: DocumentKind) -> &QualityProfile {
        match kind {
            DocumentKind::Plan => &self.test_plan,
            DocumentKind::Cases => &self.test_cases,
        }
    }

    /// Same profile for both kinds, with its `kind` adjusted
    pub fn uniform(profile: QualityProfile) -> Self {
        Self {
            test_plan: QualityProfile {
                kind: DocumentKind::Plan,
                required_sections: QualityProfile::test_plan().required_sections,
                min_test_cases: None,
                ..profile.clone()
            },
            test_cases: QualityProfile {
                kind: DocumentKind::Cases,
                required_sections: QualityProfile::test_cases().required_sections,
                min_test_cases: profile.min_test_cases.or(Some(3)),
                ..profile
            },
        }
    }
}

impl Default for QualityProfiles {
    fn default() -> Self {
        Self {
            test_plan: QualityProfile::test_plan(),
            test_cases: QualityProfile::test_cases(),
        }
    }
}

//! Individual draft checks
//!
//! Each check looks at the draft text alone. A `Fail` becomes an issue in
//! the ValidationResult, a `Warn` becomes a suggestion.

use crate::profile::QualityProfile;
use serde::{Deserialize, Serialize};
use testgen_core::IssueCategory;

/// Single check result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Check {
    pub name: String,
    pub category: IssueCategory,
    pub status: CheckStatus,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckStatus {
    Ok,
    Warn,
    Fail,
}

impl Check {
    fn new(name: &str, category: IssueCategory, status: CheckStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            category,
            status,
            message: message.into(),
        }
    }
}

/// Every check the profile enables, in a fixed order
pub fn run_all(profile: &QualityProfile, text: &str) -> Vec<Check> {
    let lower = text.to_lowercase();
    let mut checks = vec![
        check_not_empty(text),
        check_length(profile, text),
        check_sections(profile, &lower).0,
        check_placeholders(profile, &lower),
    ];
    if let Some(min) = profile.min_test_cases {
        checks.push(check_test_case_count(min, &lower));
    }
    checks
}

pub fn check_not_empty(text: &str) -> Check {
    if text.trim().is_empty() {
        Check::new("not_empty", IssueCategory::Empty, CheckStatus::Fail, "Document is empty")
    } else {
        Check::new("not_empty", IssueCategory::Empty, CheckStatus::Ok, "Document has content")
    }
}

pub fn check_length(profile: &QualityProfile, text: &str) -> Check {
    let chars = text.trim().chars().count();
    if chars < profile.min_chars {
        Check::new(
            "length",
            IssueCategory::TooShort,
            CheckStatus::Fail,
            format!("Content is too short: {} chars (min: {})", chars, profile.min_chars),
        )
    } else {
        Check::new("length", IssueCategory::TooShort, CheckStatus::Ok, format!("{} chars", chars))
    }
}

/// Returns the check plus the list of absent sections
pub fn check_sections(profile: &QualityProfile, lower: &str) -> (Check, Vec<String>) {
    let missing: Vec<String> = profile
        .required_sections
        .iter()
        .filter(|section| !lower.contains(&section.to_lowercase()))
        .cloned()
        .collect();

    let check = if missing.is_empty() {
        Check::new(
            "sections",
            IssueCategory::MissingSections,
            CheckStatus::Ok,
            "All required sections present",
        )
    } else {
        Check::new(
            "sections",
            IssueCategory::MissingSections,
            CheckStatus::Fail,
            format!("Missing sections: {}", missing.join(", ")),
        )
    };
    (check, missing)
}

pub fn check_placeholders(profile: &QualityProfile, lower: &str) -> Check {
    let count = count_placeholders(profile, lower);
    if count > profile.max_placeholders {
        Check::new(
            "placeholders",
            IssueCategory::Placeholders,
            CheckStatus::Warn,
            format!(
                "Document contains {} placeholders. Consider providing more specific information.",
                count
            ),
        )
    } else {
        Check::new(
            "placeholders",
            IssueCategory::Placeholders,
            CheckStatus::Ok,
            format!("{} placeholders", count),
        )
    }
}

pub fn count_placeholders(profile: &QualityProfile, lower: &str) -> usize {
    profile
        .placeholder_markers
        .iter()
        .map(|marker| lower.matches(&marker.to_lowercase()).count())
        .sum()
}

pub fn check_test_case_count(min: usize, lower: &str) -> Check {
    let found = lower.matches("test case").count();
    if found < min {
        Check::new(
            "coverage",
            IssueCategory::Coverage,
            CheckStatus::Warn,
            format!("Only {} test case mentions found (expected at least {})", found, min),
        )
    } else {
        Check::new(
            "coverage",
            IssueCategory::Coverage,
            CheckStatus::Ok,
            format!("{} test case mentions", found),
        )
    }
}

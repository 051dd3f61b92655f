//! Document metrics and quality rating
use crate::checks::count_placeholders;
use crate::profile::QualityProfile;
use serde::{Deserialize, Serialize};
use std::fmt;
use testgen_core::{DocumentKind, Draft, ValidationResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityRating {
    Excellent,
    Good,
    NeedsImprovement,
}

impl QualityRating {
    pub fn from_score(score: f64, profile: &QualityProfile) -> Self {
        if score >= profile.excellent_threshold {
            Self::Excellent
        } else if score >= profile.good_threshold {
            Self::Good
        } else {
            Self::NeedsImprovement
        }
    }
}

impl fmt::Display for QualityRating {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Excellent => "Excellent",
            Self::Good => "Good",
            Self::NeedsImprovement => "Needs Improvement",
        })
    }
}

/// Summary numbers for a draft, as shown next to the final document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetrics {
    pub kind: DocumentKind,
    pub revision: u32,
    pub word_count: usize,
    pub char_count: usize,
    /// Heading count for plans, test-case count for cases
    pub section_count: usize,
    pub placeholder_count: usize,
    pub score: f64,
    pub rating: QualityRating,
    pub issue_count: usize,
    pub suggestion_count: usize,
}

impl DocumentMetrics {
    pub fn for_draft(draft: &Draft, result: &ValidationResult, profile: &QualityProfile) -> Self {
        Self {
            kind: draft.kind,
            revision: draft.revision,
            word_count: draft.word_count,
            char_count: draft.text.chars().count(),
            section_count: draft.section_count,
            placeholder_count: count_placeholders(profile, &draft.text.to_lowercase()),
            score: result.score,
            rating: QualityRating::from_score(result.score, profile),
            issue_count: result.issues.len(),
            suggestion_count: result.suggestions.len(),
        }
    }
}

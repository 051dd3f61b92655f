//! Quality Gate evaluation for drafts
//!
//! `evaluate` is a pure function of the draft text and the profile.
//! `decide` is the single place the finalize/refine/review choice is made.

use crate::checks::{self, Check, CheckStatus};
use crate::profile::QualityProfile;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use testgen_core::{DocumentKind, Draft, Issue, Phase, ValidationResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
    AutoFinalize,
    RequestReview,
    Refine,
}

/// Quality gate bound to one profile
#[derive(Debug, Clone)]
pub struct QualityGate {
    profile: QualityProfile,
}

impl QualityGate {
    pub fn new(profile: QualityProfile) -> Self {
        Self { profile }
    }

    /// Gate with the shipped profile for `kind`
    pub fn for_kind(kind: DocumentKind) -> Self {
        Self::new(QualityProfile::for_kind(kind))
    }

    pub fn profile(&self) -> &QualityProfile {
        &self.profile
    }

    /// Raw check results, in evaluation order
    pub fn checks(&self, draft: &Draft) -> Vec<Check> {
        checks::run_all(&self.profile, &draft.text)
    }

    pub fn evaluate(&self, draft: &Draft) -> ValidationResult {
        let checks = self.checks(draft);
        let (_, missing_sections) = checks::check_sections(&self.profile, &draft.text.to_lowercase());

        let issues: Vec<Issue> = checks
            .iter()
            .filter(|c| c.status == CheckStatus::Fail)
            .map(|c| Issue::new(c.category, c.message.clone()))
            .collect();
        let suggestions: Vec<String> = checks
            .iter()
            .filter(|c| c.status == CheckStatus::Warn)
            .map(|c| c.message.clone())
            .collect();

        let score = 1.0
            - self.profile.issue_penalty * issues.len() as f64
            - self.profile.suggestion_penalty * suggestions.len() as f64;

        ValidationResult {
            score: round(score.clamp(0.0, 1.0)),
            issues,
            suggestions,
            missing_sections,
        }
    }

    /// Finalize, refine or ask for review.
    ///
    /// The refinement count is read from `attempt_counts["refining"]`.
    pub fn decide(&self, result: &ValidationResult, attempt_counts: &BTreeMap<String, u32>) -> GateDecision {
        if result.score >= self.profile.finalize_threshold {
            return GateDecision::AutoFinalize;
        }

        let refinements = attempt_counts
            .get(Phase::Refining.name())
            .copied()
            .unwrap_or(0);
        let fixable = result
            .issues
            .iter()
            .any(|issue| self.profile.auto_fixable.contains(&issue.category));

        if refinements < self.profile.max_refinements && fixable {
            GateDecision::Refine
        } else {
            GateDecision::RequestReview
        }
    }
}

impl Default for QualityGate {
    fn default() -> Self {
        Self::for_kind(DocumentKind::Cases)
    }
}

/// Penalty sums like 1 - 0.2 - 0.1 land a hair off; keep scores comparable
fn round(score: f64) -> f64 {
    (score * 1_000_000.0).round() / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use testgen_core::IssueCategory;
    use testgen_testkit::good_plan_text;

    fn counts(refinements: u32) -> BTreeMap<String, u32> {
        let mut counts = BTreeMap::new();
        counts.insert("refining".to_string(), refinements);
        counts
    }

    fn result(score: f64, categories: &[IssueCategory]) -> ValidationResult {
        ValidationResult {
            score,
            issues: categories.iter().map(|c| Issue::new(*c, "x")).collect(),
            suggestions: vec![],
            missing_sections: vec![],
        }
    }

    #[test]
    fn test_good_plan_scores_full() {
        let gate = QualityGate::for_kind(DocumentKind::Plan);
        let draft = Draft::new("ABC-1", DocumentKind::Plan, good_plan_text(), 1);
        let result = gate.evaluate(&draft);
        assert_eq!(result.score, 1.0);
        assert!(result.issues.is_empty());
        assert_eq!(gate.decide(&result, &BTreeMap::new()), GateDecision::AutoFinalize);
    }

    #[test]
    fn test_penalties() {
        let gate = QualityGate::for_kind(DocumentKind::Cases);
        // a single case: every section present, coverage suggestion only
        let single = "Test Case ID: TC-1\nTest Case Title: Login works\n\
                      Description: verify a registered user can log in\n\
                      Preconditions: account exists\n\
                      Test Steps: open the page, enter credentials, submit\n\
                      Expected Result: dashboard is shown";
        let result = gate.evaluate(&Draft::new("ABC-1", DocumentKind::Cases, single, 1));
        assert!(result.issues.is_empty());
        assert_eq!(result.suggestions.len(), 1);
        assert_eq!(result.score, 0.9);
    }

    #[test]
    fn test_short_draft_without_sections() {
        let gate = QualityGate::for_kind(DocumentKind::Plan);
        let result = gate.evaluate(&Draft::new("ABC-1", DocumentKind::Plan, "# Plan\nsoon", 1));
        assert!(result.has_category(IssueCategory::TooShort));
        assert!(result.has_category(IssueCategory::MissingSections));
        assert_eq!(result.missing_sections.len(), 6);
        assert_eq!(result.score, 0.6);
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let gate = QualityGate::for_kind(DocumentKind::Plan);
        let draft = Draft::new("ABC-1", DocumentKind::Plan, "# Plan\nTBD", 1);
        assert_eq!(gate.evaluate(&draft), gate.evaluate(&draft));
    }

    #[test]
    fn test_high_score_always_finalizes() {
        let gate = QualityGate::default();
        for refinements in 0..5 {
            for score in [0.8, 0.85, 1.0] {
                let r = result(score, &[IssueCategory::MissingSections]);
                assert_eq!(gate.decide(&r, &counts(refinements)), GateDecision::AutoFinalize);
            }
        }
    }

    #[test]
    fn test_refine_needs_fixable_issue() {
        let gate = QualityGate::default();
        assert_eq!(
            gate.decide(&result(0.6, &[IssueCategory::TooShort]), &counts(0)),
            GateDecision::Refine
        );
        assert_eq!(
            gate.decide(&result(0.8 - 0.2, &[IssueCategory::Empty]), &counts(0)),
            GateDecision::RequestReview
        );
    }

    #[test]
    fn test_refine_cap() {
        let gate = QualityGate::default();
        let r = result(0.5, &[IssueCategory::TooShort, IssueCategory::MissingSections]);
        assert_eq!(gate.decide(&r, &counts(1)), GateDecision::Refine);
        assert_eq!(gate.decide(&r, &counts(2)), GateDecision::RequestReview);
        assert_eq!(gate.decide(&r, &counts(7)), GateDecision::RequestReview);
    }

    #[test]
    fn test_custom_threshold() {
        let gate = QualityGate::new(QualityProfile {
            finalize_threshold: 0.95,
            ..QualityProfile::test_plan()
        });
        assert_eq!(gate.decide(&result(0.9, &[]), &counts(0)), GateDecision::RequestReview);
    }
}

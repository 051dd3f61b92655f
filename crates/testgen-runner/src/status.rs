use serde::{Deserialize, Serialize};
use testgen_core::{
    DocumentKind, Draft, FailureSummary, InputRequest, Phase, RunId, ValidationResult,
    WorkflowContext,
};
use testgen_quality::{DocumentMetrics, QualityProfiles};
use testgen_resolver::{MissingCategoryRequest, MissingInputResolver};

/// What a caller can see of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    pub run_id: RunId,
    pub subject_id: String,
    pub phase: Phase,
    pub document_kind: Option<DocumentKind>,
    pub quality: Option<ValidationResult>,
    /// Size, score and rating of the evaluated draft
    pub metrics: Option<DocumentMetrics>,
    pub issues: Vec<String>,
    /// Open category requests, only while in AWAITING_INPUT
    pub pending_requests: Vec<MissingCategoryRequest>,
    pub pending_input: Option<InputRequest>,
    /// Current draft, for review
    pub draft: Option<Draft>,
    pub artifact_path: Option<String>,
    pub failure: Option<FailureSummary>,
}

impl RunStatus {
    pub fn from_context(ctx: &WorkflowContext, profiles: &QualityProfiles) -> Self {
        let metrics = match (ctx.draft(), ctx.quality()) {
            (Some(draft), Some(quality)) => Some(DocumentMetrics::for_draft(draft, quality, profiles.get(draft.kind))),
            _ => None,
        };
        let pending_requests = if ctx.phase() == Phase::AwaitingInput {
            MissingInputResolver::evaluate(ctx)
        } else {
            Vec::new()
        };

        Self {
            run_id: ctx.run_id(),
            subject_id: ctx.subject_id().to_string(),
            phase: ctx.phase(),
            document_kind: ctx.document_kind(),
            quality: ctx.quality().cloned(),
            metrics,
            issues: ctx.gathering_issues().to_vec(),
            pending_requests,
            pending_input: ctx.pending_input().cloned(),
            draft: ctx.draft().cloned(),
            artifact_path: ctx.final_artifact_path().map(str::to_string),
            failure: ctx.failure().cloned(),
        }
    }

    /// Settled result of a terminal run
    pub fn outcome(&self) -> Option<RunOutcome> {
        match self.phase {
            Phase::Completed => self.artifact_path.clone().map(RunOutcome::Completed),
            Phase::Failed => self.failure.clone().map(RunOutcome::Failed),
            _ => None,
        }
    }

    /// Suspended or terminal: nothing happens until someone acts
    pub fn is_settled(&self) -> bool {
        self.phase.is_suspended() || self.phase.is_terminal()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed(String),
    Failed(FailureSummary),
}

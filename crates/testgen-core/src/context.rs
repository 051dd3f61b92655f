//! Workflow Context: state shared across one run of the pipeline
//!
//! Each field has one licensed writer per phase. The context does not know
//! who is calling, but it refuses the writes that would break its
//! invariants: illegal phase edges, a second document kind, a draft before
//! the kind is known, an artifact path outside COMPLETED.
use crate::data_model::{
    CategoryResolution, DocumentKind, Draft, InputRequest, Material, MaterialCategory,
    TicketRecord, ValidationResult,
};
use crate::error::TestgenError;
use crate::stage::Update;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RunId {
    type Err = TestgenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| TestgenError::UnknownRun(s.to_string()))
    }
}

/// Orchestrator phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Init,
    Analyzing,
    Gathering,
    AwaitingInput,
    Generating,
    AwaitingReview,
    Refining,
    Finalizing,
    Completed,
    Failed,
}

impl Phase {
    /// Lower-case name, also the key used in `attempt_counts`
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Analyzing => "analyzing",
            Self::Gathering => "gathering",
            Self::AwaitingInput => "awaiting_input",
            Self::Generating => "generating",
            Self::AwaitingReview => "awaiting_review",
            Self::Refining => "refining",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Phases that wait on an external actor rather than a collaborator
    pub fn is_suspended(&self) -> bool {
        matches!(self, Self::AwaitingInput | Self::AwaitingReview)
    }

    /// The phase edge table. Every non-terminal phase may fail.
    pub fn can_transition_to(&self, next: Phase) -> bool {
        use Phase::*;
        if next == Failed {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Init, Analyzing)
                | (Analyzing, Gathering)
                | (Gathering, AwaitingInput)
                | (Gathering, Generating)
                | (AwaitingInput, Gathering)
                | (Generating, Finalizing)
                | (Generating, Refining)
                | (Generating, AwaitingReview)
                | (Generating, AwaitingInput)
                | (Refining, Generating)
                | (AwaitingReview, Refining)
                | (AwaitingReview, Finalizing)
                | (Finalizing, Completed)
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.name().to_uppercase())
    }
}

/// Structured reason a run ended in FAILED
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureSummary {
    /// Phase the run was in when it failed
    pub phase: Phase,
    pub last_error: String,
    pub attempt_counts: BTreeMap<String, u32>,
}

#[derive(Debug, Clone)]
pub struct WorkflowContext {
    run_id: RunId,
    subject_id: String,
    created_at: DateTime<Utc>,
    phase: Phase,
    document_kind: Option<DocumentKind>,
    ticket: Option<TicketRecord>,
    parent_ticket: Option<TicketRecord>,
    gathered_materials: Vec<Material>,
    gathering_issues: Vec<String>,
    gathering_complete: bool,
    consolidated: Option<String>,
    resolutions: BTreeMap<MaterialCategory, CategoryResolution>,
    pending_input: Option<InputRequest>,
    operator_override: bool,
    draft: Option<Draft>,
    quality: Option<ValidationResult>,
    previous_quality: Option<ValidationResult>,
    feedback: Vec<String>,
    attempt_counts: BTreeMap<String, u32>,
    final_artifact_path: Option<String>,
    failure: Option<FailureSummary>,
}

impl WorkflowContext {
    pub fn new(subject_id: impl Into<String>) -> Self {
        Self::with_run_id(RunId::new(), subject_id)
    }

    pub fn with_run_id(run_id: RunId, subject_id: impl Into<String>) -> Self {
        Self {
            run_id,
            subject_id: subject_id.into(),
            created_at: Utc::now(),
            phase: Phase::Init,
            document_kind: None,
            ticket: None,
            parent_ticket: None,
            gathered_materials: Vec::new(),
            gathering_issues: Vec::new(),
            gathering_complete: false,
            consolidated: None,
            resolutions: BTreeMap::new(),
            pending_input: None,
            operator_override: false,
            draft: None,
            quality: None,
            previous_quality: None,
            feedback: Vec::new(),
            attempt_counts: BTreeMap::new(),
            final_artifact_path: None,
            failure: None,
        }
    }

    // ---- read access -------------------------------------------------------

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn document_kind(&self) -> Option<DocumentKind> {
        self.document_kind
    }

    pub fn ticket(&self) -> Option<&TicketRecord> {
        self.ticket.as_ref()
    }

    pub fn parent_ticket(&self) -> Option<&TicketRecord> {
        self.parent_ticket.as_ref()
    }

    pub fn gathered_materials(&self) -> &[Material] {
        &self.gathered_materials
    }

    pub fn gathering_issues(&self) -> &[String] {
        &self.gathering_issues
    }

    /// True once the external fetches of DocumentGathering have been merged
    pub fn gathering_complete(&self) -> bool {
        self.gathering_complete
    }

    pub fn consolidated(&self) -> Option<&str> {
        self.consolidated.as_deref()
    }

    pub fn resolutions(&self) -> &BTreeMap<MaterialCategory, CategoryResolution> {
        &self.resolutions
    }

    pub fn resolution(&self, category: MaterialCategory) -> Option<CategoryResolution> {
        self.resolutions.get(&category).copied()
    }

    pub fn pending_input(&self) -> Option<&InputRequest> {
        self.pending_input.as_ref()
    }

    pub fn operator_override(&self) -> bool {
        self.operator_override
    }

    pub fn draft(&self) -> Option<&Draft> {
        self.draft.as_ref()
    }

    pub fn quality(&self) -> Option<&ValidationResult> {
        self.quality.as_ref()
    }

    pub fn previous_quality(&self) -> Option<&ValidationResult> {
        self.previous_quality.as_ref()
    }

    pub fn feedback(&self) -> &[String] {
        &self.feedback
    }

    pub fn attempt_counts(&self) -> &BTreeMap<String, u32> {
        &self.attempt_counts
    }

    pub fn attempts(&self, key: &str) -> u32 {
        self.attempt_counts.get(key).copied().unwrap_or(0)
    }

    pub fn final_artifact_path(&self) -> Option<&str> {
        self.final_artifact_path.as_deref()
    }

    pub fn failure(&self) -> Option<&FailureSummary> {
        self.failure.as_ref()
    }

    pub fn has_material_for(&self, category: MaterialCategory) -> bool {
        self.gathered_materials
            .iter()
            .any(|m| m.category == Some(category))
    }

    // ---- orchestrator writes -----------------------------------------------

    /// Move along a phase edge. COMPLETED and FAILED are reached only
    /// through [`complete`](Self::complete) and [`fail`](Self::fail).
    pub fn transition(&mut self, next: Phase) -> Result<Phase, TestgenError> {
        if next.is_terminal() || !self.phase.can_transition_to(next) {
            return Err(TestgenError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        let previous = self.phase;
        self.phase = next;
        Ok(previous)
    }

    /// FINALIZING → COMPLETED, recording the artifact path in the same step
    pub fn complete(&mut self, artifact_path: impl Into<String>) -> Result<(), TestgenError> {
        if !self.phase.can_transition_to(Phase::Completed) {
            return Err(TestgenError::InvalidTransition {
                from: self.phase,
                to: Phase::Completed,
            });
        }
        self.final_artifact_path = Some(artifact_path.into());
        self.phase = Phase::Completed;
        Ok(())
    }

    /// Any non-terminal phase → FAILED. Partial state is kept for audit.
    pub fn fail(&mut self, last_error: impl Into<String>) -> Result<FailureSummary, TestgenError> {
        if self.phase.is_terminal() {
            return Err(TestgenError::InvalidTransition {
                from: self.phase,
                to: Phase::Failed,
            });
        }
        let summary = FailureSummary {
            phase: self.phase,
            last_error: last_error.into(),
            attempt_counts: self.attempt_counts.clone(),
        };
        self.failure = Some(summary.clone());
        self.phase = Phase::Failed;
        Ok(summary)
    }

    /// Increment and return the counter stored under `key`
    pub fn bump_attempt(&mut self, key: &str) -> u32 {
        let count = self.attempt_counts.entry(key.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Handoff: fold a task unit's update into the context
    pub fn merge(&mut self, update: Update) -> Result<(), TestgenError> {
        match update {
            Update::Analysis {
                ticket,
                parent,
                document_kind,
                notes,
            } => {
                if let Some(existing) = self.document_kind {
                    return Err(TestgenError::Merge(format!(
                        "document kind already set to {}",
                        existing
                    )));
                }
                self.document_kind = Some(document_kind);
                self.ticket = Some(ticket);
                self.parent_ticket = parent;
                self.gathering_issues.extend(notes);
            }
            Update::Gathering {
                materials,
                issues,
                consolidated,
            } => {
                self.gathered_materials = materials;
                self.gathering_issues.extend(issues);
                self.consolidated = Some(consolidated);
                self.gathering_complete = true;
            }
            Update::Generation { draft } => {
                let kind = self.document_kind.ok_or_else(|| {
                    TestgenError::Merge("draft produced before document kind was set".into())
                })?;
                if draft.kind != kind {
                    return Err(TestgenError::Merge(format!(
                        "draft kind {} does not match run kind {}",
                        draft.kind, kind
                    )));
                }
                self.draft = Some(draft);
                self.pending_input = None;
            }
        }
        Ok(())
    }

    /// Store a fresh quality assessment, keeping the prior one for audit
    pub fn record_quality(&mut self, result: ValidationResult) -> Result<(), TestgenError> {
        if self.draft.is_none() {
            return Err(TestgenError::Merge("quality evaluated without a draft".into()));
        }
        self.previous_quality = self.quality.take();
        self.quality = Some(result);
        Ok(())
    }

    // ---- resolution writes -------------------------------------------------

    pub fn add_materials(&mut self, materials: impl IntoIterator<Item = Material>) {
        self.gathered_materials.extend(materials);
    }

    pub fn record_resolution(&mut self, category: MaterialCategory, resolution: CategoryResolution) {
        self.resolutions.insert(category, resolution);
    }

    pub fn set_consolidated(&mut self, text: String) {
        self.consolidated = Some(text);
    }

    pub fn set_pending_input(&mut self, request: Option<InputRequest>) {
        self.pending_input = request;
    }

    pub fn enable_operator_override(&mut self) {
        self.operator_override = true;
        self.pending_input = None;
    }

    pub fn push_feedback(&mut self, text: impl Into<String>) {
        self.feedback.push(text.into());
    }

    pub fn push_issue(&mut self, issue: impl Into<String>) {
        self.gathering_issues.push(issue.into());
    }

    /// Serializable view for audit logging
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            run_id: self.run_id,
            subject_id: self.subject_id.clone(),
            phase: self.phase,
            document_kind: self.document_kind,
            ticket_key: self.ticket.as_ref().map(|t| t.key.clone()),
            parent_key: self.parent_ticket.as_ref().map(|t| t.key.clone()),
            materials: self
                .gathered_materials
                .iter()
                .map(|m| format!("{}:{}", m.source.label(), m.provenance))
                .collect(),
            issues: self.gathering_issues.clone(),
            resolutions: self.resolutions.clone(),
            draft_revision: self.draft.as_ref().map(|d| d.revision),
            draft_fingerprint: self.draft.as_ref().map(|d| d.fingerprint.clone()),
            quality: self.quality.clone(),
            feedback_count: self.feedback.len(),
            attempt_counts: self.attempt_counts.clone(),
            final_artifact_path: self.final_artifact_path.clone(),
            failure: self.failure.clone(),
            created_at: self.created_at,
            taken_at: Utc::now(),
        }
    }
}

/// Point-in-time copy of a context, without document bodies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub run_id: RunId,
    pub subject_id: String,
    pub phase: Phase,
    pub document_kind: Option<DocumentKind>,
    pub ticket_key: Option<String>,
    pub parent_key: Option<String>,
    pub materials: Vec<String>,
    pub issues: Vec<String>,
    pub resolutions: BTreeMap<MaterialCategory, CategoryResolution>,
    pub draft_revision: Option<u32>,
    pub draft_fingerprint: Option<String>,
    pub quality: Option<ValidationResult>,
    pub feedback_count: usize,
    pub attempt_counts: BTreeMap<String, u32>,
    pub final_artifact_path: Option<String>,
    pub failure: Option<FailureSummary>,
    pub created_at: DateTime<Utc>,
    pub taken_at: DateTime<Utc>,
}

//! Phase Orchestrator: the single writer of `phase`
//!
//! Drives task units in sequence, merges their updates, consults the
//! resolver after gathering and the quality gate after generation, and turns
//! task errors into retries or FAILED. Every transition is emitted as a
//! `PhaseChanged` hook event.

use crate::retry::RetryPolicy;
use std::sync::Arc;
use testgen_core::{
    CollaboratorError, Collaborators, HookDispatcher, HookEvent, HookScope, InputRequest,
    MaterialCategory, MissingInputPolicy, Phase, TaskError, TaskUnit, TestgenError, Update,
    WorkflowConfig, WorkflowContext,
};
use testgen_quality::{GateDecision, QualityGate, QualityProfiles};
use testgen_resolver::{apply_outcome, MissingInputResolver, ResolutionChoice, ResolutionOutcome};
use testgen_stages::{DocumentGathering, Generation, TicketAnalysis};
use tokio_util::sync::CancellationToken;

/// Answer to a draft waiting in AWAITING_REVIEW
#[derive(Debug, Clone, PartialEq)]
pub enum ReviewResponse {
    Accept,
    Feedback(String),
}

/// Why a step stopped the advance loop
enum Halt {
    Cancelled,
    NeedsInput(InputRequest),
    Failed(String),
}

impl From<TestgenError> for Halt {
    fn from(err: TestgenError) -> Self {
        Halt::Failed(err.to_string())
    }
}

pub struct PhaseOrchestrator {
    config: WorkflowConfig,
    collaborators: Collaborators,
    analysis: TicketAnalysis,
    gathering: DocumentGathering,
    generation: Generation,
    resolver: MissingInputResolver,
    profiles: QualityProfiles,
    retry: RetryPolicy,
    hooks: Arc<HookDispatcher>,
}

impl PhaseOrchestrator {
    pub fn new(collaborators: Collaborators, config: WorkflowConfig) -> Self {
        Self {
            analysis: TicketAnalysis::new(collaborators.tickets.clone(), config.min_scope_chars)
                .with_fetch_timeout(config.fetch_timeout()),
            gathering: DocumentGathering::new(collaborators.fetcher.clone(), &config),
            generation: Generation::new(collaborators.model.clone()),
            resolver: MissingInputResolver::new(
                collaborators.tickets.clone(),
                collaborators.fetcher.clone(),
                config.fetch_timeout(),
            ),
            profiles: QualityProfiles::default(),
            retry: RetryPolicy::from_config(&config),
            hooks: Arc::new(HookDispatcher::new()),
            collaborators,
            config,
        }
    }

    pub fn with_profiles(mut self, profiles: QualityProfiles) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn with_hooks(mut self, hooks: HookDispatcher) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn profiles(&self) -> &QualityProfiles {
        &self.profiles
    }

    /// Hook scope for one run; keep it for the run's lifetime so sequence
    /// numbers stay monotonic
    pub fn scope(&self, ctx: &WorkflowContext) -> HookScope {
        HookScope::new(self.hooks.clone(), ctx.run_id(), ctx.subject_id())
    }

    pub fn gate(&self, ctx: &WorkflowContext) -> Option<QualityGate> {
        ctx.document_kind()
            .map(|kind| QualityGate::new(self.profiles.get(kind).clone()))
    }

    // ---- driving -----------------------------------------------------------

    /// Run until the context suspends or terminates; returns the phase reached.
    /// `publish` sees the context after every step.
    pub async fn advance(
        &self,
        ctx: &mut WorkflowContext,
        hooks: &HookScope,
        cancel: &CancellationToken,
        publish: impl Fn(&WorkflowContext),
    ) -> Phase {
        loop {
            let phase = ctx.phase();
            if phase.is_terminal() || phase.is_suspended() {
                return phase;
            }
            if cancel.is_cancelled() {
                self.fail(ctx, hooks, format!("cancelled during {}", phase));
                publish(ctx);
                continue;
            }

            let step = match phase {
                Phase::Init => self.enter(ctx, hooks, Phase::Analyzing).map_err(Halt::from),
                Phase::Analyzing => self.analyze(ctx, hooks, cancel).await,
                Phase::Gathering => self.gather(ctx, hooks, cancel).await,
                Phase::Generating => self.generate(ctx, hooks, cancel).await,
                Phase::Refining => self.refine(ctx, hooks).map_err(Halt::from),
                Phase::Finalizing => self.finalize(ctx, hooks, cancel).await,
                _ => Ok(()),
            };

            match step {
                Ok(()) => {}
                Err(Halt::Cancelled) => self.fail(ctx, hooks, format!("cancelled during {}", phase)),
                Err(Halt::Failed(message)) => self.fail(ctx, hooks, message),
                Err(Halt::NeedsInput(request)) => {
                    if ctx.phase().can_transition_to(Phase::AwaitingInput) {
                        ctx.set_pending_input(Some(request));
                        if let Err(err) = self.enter(ctx, hooks, Phase::AwaitingInput) {
                            self.fail(ctx, hooks, err.to_string());
                        }
                    } else {
                        self.fail(ctx, hooks, format!("input requested during {}: {}", phase, request.message));
                    }
                }
            }
            publish(ctx);
        }
    }

    async fn analyze(&self, ctx: &mut WorkflowContext, hooks: &HookScope, cancel: &CancellationToken) -> Result<(), Halt> {
        let update = self.run_unit(&self.analysis, ctx, hooks, cancel).await?;
        ctx.merge(update)?;
        self.enter(ctx, hooks, Phase::Gathering)?;
        Ok(())
    }

    /// First entry fetches; later entries only re-merge what resolution added
    async fn gather(&self, ctx: &mut WorkflowContext, hooks: &HookScope, cancel: &CancellationToken) -> Result<(), Halt> {
        if !ctx.gathering_complete() {
            let update = self.run_unit(&self.gathering, ctx, hooks, cancel).await?;
            ctx.merge(update)?;
            self.apply_policy(ctx, hooks, cancel).await?;
        }
        let consolidated = self.gathering.consolidate(ctx.gathered_materials());
        ctx.set_consolidated(consolidated);

        let missing = MissingInputResolver::evaluate(ctx);
        if missing.is_empty() {
            self.enter(ctx, hooks, Phase::Generating)?;
        } else {
            tracing::info!(
                subject = ctx.subject_id(),
                missing = ?missing.iter().map(|r| r.category).collect::<Vec<_>>(),
                "waiting for missing input"
            );
            self.enter(ctx, hooks, Phase::AwaitingInput)?;
        }
        Ok(())
    }

    /// Automatic resolution before anyone is asked
    async fn apply_policy(&self, ctx: &mut WorkflowContext, hooks: &HookScope, cancel: &CancellationToken) -> Result<(), Halt> {
        let missing = MissingInputResolver::evaluate(ctx);
        match self.config.missing_input_policy {
            MissingInputPolicy::Ask => {}
            MissingInputPolicy::SkipAll => {
                for request in missing {
                    apply_outcome(ctx, request.category, ResolutionOutcome::Skipped);
                }
            }
            MissingInputPolicy::CheckParentThenAsk => {
                for request in missing {
                    if !request.offers(ResolutionChoice::CheckParent) {
                        continue;
                    }
                    let resolve = self
                        .resolver
                        .resolve(ctx, hooks, request.category, ResolutionChoice::CheckParent, None);
                    let outcome = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(Halt::Cancelled),
                        outcome = resolve => outcome,
                    };
                    match outcome {
                        Ok(outcome @ ResolutionOutcome::MaterialAdded { .. }) => {
                            apply_outcome(ctx, request.category, outcome);
                        }
                        // nothing upstream: leave it for a human
                        Ok(_) => {}
                        Err(err) => {
                            tracing::warn!(category = %request.category, error = %err, "automatic parent check failed");
                            ctx.push_issue(format!("parent check for {} failed: {}", request.category, err));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn generate(&self, ctx: &mut WorkflowContext, hooks: &HookScope, cancel: &CancellationToken) -> Result<(), Halt> {
        let update = self.run_unit(&self.generation, ctx, hooks, cancel).await?;
        ctx.merge(update)?;

        let gate = self
            .gate(ctx)
            .ok_or_else(|| Halt::Failed("document kind not set".into()))?;
        let draft = ctx
            .draft()
            .ok_or_else(|| Halt::Failed("generation produced no draft".into()))?;
        let result = gate.evaluate(draft);
        let decision = gate.decide(&result, ctx.attempt_counts());
        tracing::info!(
            subject = ctx.subject_id(),
            revision = draft.revision,
            score = result.score,
            ?decision,
            "draft evaluated"
        );
        ctx.record_quality(result)?;

        let next = match decision {
            GateDecision::AutoFinalize => Phase::Finalizing,
            GateDecision::Refine => Phase::Refining,
            GateDecision::RequestReview => Phase::AwaitingReview,
        };
        self.enter(ctx, hooks, next)?;
        Ok(())
    }

    /// Count the refinement, then hand back to generation
    fn refine(&self, ctx: &mut WorkflowContext, hooks: &HookScope) -> Result<(), TestgenError> {
        let count = ctx.bump_attempt(Phase::Refining.name());
        tracing::info!(subject = ctx.subject_id(), refinement = count, "refining draft");
        self.enter(ctx, hooks, Phase::Generating)
    }

    async fn finalize(&self, ctx: &mut WorkflowContext, hooks: &HookScope, cancel: &CancellationToken) -> Result<(), Halt> {
        let draft = ctx
            .draft()
            .cloned()
            .ok_or_else(|| Halt::Failed("nothing to persist".into()))?;
        let attempts = 1 + self.config.persistence_retries;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            ctx.bump_attempt(Phase::Finalizing.name());
            let save = hooks.call(
                "finalize",
                "artifact_store",
                format!("save {}", draft.kind.slug()),
                async {
                    let path = self
                        .collaborators
                        .store
                        .save(draft.kind, &draft.subject_id, &draft.text)
                        .await?;
                    if path.trim().is_empty() {
                        return Err(CollaboratorError::Io("store returned an empty path".into()));
                    }
                    Ok::<String, CollaboratorError>(path)
                },
            );
            let saved = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Halt::Cancelled),
                saved = save => saved,
            };

            match saved {
                Ok(path) => {
                    ctx.complete(path.clone())?;
                    hooks.emit(HookEvent::PhaseChanged {
                        from: Phase::Finalizing,
                        to: Phase::Completed,
                    });
                    tracing::info!(subject = ctx.subject_id(), path = %path, "run completed");
                    return Ok(());
                }
                Err(err) => {
                    let recoverable = attempt < attempts;
                    hooks.emit(HookEvent::ErrorRaised {
                        error: err.to_string(),
                        recoverable,
                    });
                    tracing::warn!(subject = ctx.subject_id(), attempt, error = %err, "persistence failed");
                    last_error = err.to_string();
                    if recoverable && !self.retry.pause(attempt, cancel).await {
                        return Err(Halt::Cancelled);
                    }
                }
            }
        }

        Err(Halt::Failed(format!(
            "persistence failed after {} attempts: {}",
            attempts, last_error
        )))
    }

    /// One unit, retried on transient errors within the per-phase bound
    async fn run_unit(
        &self,
        unit: &dyn TaskUnit,
        ctx: &mut WorkflowContext,
        hooks: &HookScope,
        cancel: &CancellationToken,
    ) -> Result<Update, Halt> {
        let phase = unit.phase();
        let mut attempt = 0;

        loop {
            attempt += 1;
            ctx.bump_attempt(phase.name());
            hooks.emit(HookEvent::UnitStarted {
                unit: unit.id(),
                phase,
                attempt,
            });

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    hooks.emit(HookEvent::UnitEnded {
                        unit: unit.id(),
                        phase,
                        outcome: Err("cancelled".into()),
                    });
                    return Err(Halt::Cancelled);
                }
                result = unit.run(ctx, hooks) => result,
            };

            hooks.emit(HookEvent::UnitEnded {
                unit: unit.id(),
                phase,
                outcome: result.as_ref().map(|_| ()).map_err(|e| e.to_string()),
            });

            match result {
                Ok(update) => return Ok(update),
                Err(TaskError::NeedsHumanInput(request)) => return Err(Halt::NeedsInput(request)),
                Err(err @ TaskError::Transient(_)) if self.retry.allows_retry(attempt) => {
                    hooks.emit(HookEvent::ErrorRaised {
                        error: err.to_string(),
                        recoverable: true,
                    });
                    tracing::warn!(unit = unit.id(), attempt, error = %err, "transient failure, retrying");
                    if !self.retry.pause(attempt, cancel).await {
                        return Err(Halt::Cancelled);
                    }
                }
                Err(err) => {
                    hooks.emit(HookEvent::ErrorRaised {
                        error: err.to_string(),
                        recoverable: false,
                    });
                    let message = if err.is_transient() {
                        format!("{} (gave up after {} attempts)", err, attempt)
                    } else {
                        err.to_string()
                    };
                    return Err(Halt::Failed(message));
                }
            }
        }
    }

    fn enter(&self, ctx: &mut WorkflowContext, hooks: &HookScope, next: Phase) -> Result<(), TestgenError> {
        let from = ctx.transition(next)?;
        hooks.emit(HookEvent::PhaseChanged { from, to: next });
        tracing::info!(subject = ctx.subject_id(), %from, to = %next, "phase changed");
        Ok(())
    }

    fn fail(&self, ctx: &mut WorkflowContext, hooks: &HookScope, message: String) {
        let from = ctx.phase();
        if let Ok(summary) = ctx.fail(message) {
            hooks.emit(HookEvent::PhaseChanged {
                from,
                to: Phase::Failed,
            });
            tracing::error!(
                subject = ctx.subject_id(),
                phase = %summary.phase,
                error = %summary.last_error,
                "run failed"
            );
        }
    }

    // ---- external inputs ---------------------------------------------------

    /// Answer one missing category. Leaves AWAITING_INPUT for a re-merge once
    /// nothing is pending any more. A cancellation that lands while the
    /// answer is being fetched fails the run.
    pub async fn supply_missing(
        &self,
        ctx: &mut WorkflowContext,
        hooks: &HookScope,
        cancel: &CancellationToken,
        category: MaterialCategory,
        choice: ResolutionChoice,
        payload: Option<&str>,
    ) -> Result<Phase, TestgenError> {
        expect_phase(ctx, "supply_missing", Phase::AwaitingInput)?;

        let resolve = self.resolver.resolve(ctx, hooks, category, choice, payload);
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            outcome = resolve => Some(outcome),
        };
        let Some(outcome) = outcome else {
            return self.cancel(ctx, hooks);
        };
        apply_outcome(ctx, category, outcome?);

        let blocked_on_material = ctx.pending_input().is_some()
            && ctx.gathered_materials().is_empty()
            && !ctx.operator_override();
        if MissingInputResolver::evaluate(ctx).is_empty() && !blocked_on_material {
            self.enter(ctx, hooks, Phase::Gathering)?;
        }
        Ok(ctx.phase())
    }

    /// Generate from whatever is there. Open categories are closed as skipped.
    pub fn supply_override(&self, ctx: &mut WorkflowContext, hooks: &HookScope) -> Result<Phase, TestgenError> {
        expect_phase(ctx, "supply_override", Phase::AwaitingInput)?;

        ctx.enable_operator_override();
        for request in MissingInputResolver::evaluate(ctx) {
            apply_outcome(ctx, request.category, ResolutionOutcome::Skipped);
        }
        tracing::info!(subject = ctx.subject_id(), "operator override enabled");
        self.enter(ctx, hooks, Phase::Gathering)?;
        Ok(ctx.phase())
    }

    pub fn supply_feedback(
        &self,
        ctx: &mut WorkflowContext,
        hooks: &HookScope,
        response: ReviewResponse,
    ) -> Result<Phase, TestgenError> {
        expect_phase(ctx, "supply_feedback", Phase::AwaitingReview)?;

        match response {
            ReviewResponse::Accept => self.enter(ctx, hooks, Phase::Finalizing)?,
            ReviewResponse::Feedback(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return Err(TestgenError::InvalidPayload("feedback must not be empty".into()));
                }
                ctx.push_feedback(text);
                self.enter(ctx, hooks, Phase::Refining)?;
            }
        }
        Ok(ctx.phase())
    }

    /// Fail a run that is not already terminal
    pub fn cancel(&self, ctx: &mut WorkflowContext, hooks: &HookScope) -> Result<Phase, TestgenError> {
        if ctx.phase().is_terminal() {
            return Err(TestgenError::WrongPhase {
                operation: "cancel",
                phase: ctx.phase(),
            });
        }
        let phase = ctx.phase();
        self.fail(ctx, hooks, format!("cancelled during {}", phase));
        Ok(ctx.phase())
    }
}

fn expect_phase(ctx: &WorkflowContext, operation: &'static str, phase: Phase) -> Result<(), TestgenError> {
    if ctx.phase() == phase {
        Ok(())
    } else {
        Err(TestgenError::WrongPhase {
            operation,
            phase: ctx.phase(),
        })
    }
}

use std::sync::Arc;
use testgen_core::{
    CategoryResolution, CollaboratorError, DocumentKind, HookDispatcher, HookEvent, MaterialCategory,
    MissingInputPolicy, Observer, ObserverError, EventEnvelope, Phase, PromptMode, TestgenError,
    TicketRecord, WorkflowConfig, WorkflowContext,
};
use testgen_quality::{QualityProfile, QualityProfiles};
use testgen_resolver::ResolutionChoice;
use testgen_runner::{PhaseOrchestrator, ReviewResponse};
use testgen_testkit::{
    attachment, epic, good_cases_text, good_plan_text, ticket, Fakes, MemoryStore, RecordingObserver,
    ScriptedFetcher, ScriptedModel, ScriptedTickets,
};
use tokio_util::sync::CancellationToken;

const PAGE: &str = "https://acme.atlassian.net/wiki/spaces/SHOP/pages/42/Checkout+Flow";

fn fast_config() -> WorkflowConfig {
    WorkflowConfig {
        backoff_base_ms: 1,
        backoff_max_ms: 2,
        ..WorkflowConfig::default()
    }
}

/// A story whose body, attachments and linked page cover every category
fn rich_story(key: &str) -> (TicketRecord, ScriptedFetcher) {
    let mut story = ticket(key, "Story");
    story.body = format!("Customers pay with saved cards. Flow: {}", PAGE);
    story.attachments = vec![attachment("1", "checkout-prd.pdf"), attachment("2", "checkout-hld.pdf")];
    let fetcher = ScriptedFetcher::new()
        .with_document(&story.attachments[0].locator, "requirements")
        .with_document(&story.attachments[1].locator, "design")
        .with_document(PAGE, "page");
    (story, fetcher)
}

struct Harness {
    fakes: Fakes,
    observer: Arc<RecordingObserver>,
    orchestrator: PhaseOrchestrator,
}

impl Harness {
    fn new(fakes: Fakes, config: WorkflowConfig) -> Self {
        let observer = Arc::new(RecordingObserver::new());
        let orchestrator = PhaseOrchestrator::new(fakes.collaborators(), config)
            .with_hooks(HookDispatcher::new().with(observer.clone()));
        Self {
            fakes,
            observer,
            orchestrator,
        }
    }

    fn with_profiles(mut self, profiles: QualityProfiles) -> Self {
        self.orchestrator = self.orchestrator.with_profiles(profiles);
        self
    }

    async fn advance(&self, ctx: &mut WorkflowContext) -> Phase {
        let hooks = self.orchestrator.scope(ctx);
        self.orchestrator
            .advance(ctx, &hooks, &CancellationToken::new(), |_| {})
            .await
    }

    fn transitions(&self) -> Vec<(Phase, Phase)> {
        self.observer
            .events()
            .into_iter()
            .filter_map(|e| match e {
                HookEvent::PhaseChanged { from, to } => Some((from, to)),
                _ => None,
            })
            .collect()
    }
}

fn fakes(tickets: ScriptedTickets, fetcher: ScriptedFetcher, model: ScriptedModel) -> Fakes {
    Fakes::new(tickets, fetcher, model, MemoryStore::new())
}

#[tokio::test]
async fn test_epic_without_material_waits_for_every_category() {
    let h = Harness::new(
        fakes(
            ScriptedTickets::new().with_ticket(epic("SHOP-1")),
            ScriptedFetcher::new(),
            ScriptedModel::always(good_plan_text()),
        ),
        fast_config(),
    );
    let mut ctx = WorkflowContext::new("SHOP-1");

    assert_eq!(h.advance(&mut ctx).await, Phase::AwaitingInput);
    assert_eq!(ctx.document_kind(), Some(DocumentKind::Plan));
    assert!(ctx.gathered_materials().is_empty());
    assert!(ctx.draft().is_none());

    let requests = testgen_resolver::MissingInputResolver::evaluate(&ctx);
    let categories: Vec<MaterialCategory> = requests.iter().map(|r| r.category).collect();
    assert_eq!(categories, MaterialCategory::ALL.to_vec());
    assert!(h.fakes.model.prompts().is_empty());
    assert_eq!(
        h.transitions(),
        vec![
            (Phase::Init, Phase::Analyzing),
            (Phase::Analyzing, Phase::Gathering),
            (Phase::Gathering, Phase::AwaitingInput),
        ]
    );
}

#[tokio::test]
async fn test_high_scoring_draft_completes_with_artifact_path() {
    let (story, fetcher) = rich_story("SHOP-2");
    let single_case = "Test Case ID: SHOP-2-TC-1\nTest Case Title: Pay with a saved card\n\
                       Description: a returning customer pays with a stored card\n\
                       Preconditions: customer has a saved card\n\
                       Test Steps: open cart, choose saved card, confirm\n\
                       Expected Result: order is placed";
    let h = Harness::new(
        fakes(ScriptedTickets::new().with_ticket(story), fetcher, ScriptedModel::always(single_case)),
        fast_config(),
    )
    .with_profiles(QualityProfiles::uniform(QualityProfile {
        suggestion_penalty: 0.15,
        ..QualityProfile::test_cases()
    }));
    let mut ctx = WorkflowContext::new("SHOP-2");

    assert_eq!(h.advance(&mut ctx).await, Phase::Completed);
    assert_eq!(ctx.quality().map(|q| q.score), Some(0.85));
    assert_eq!(ctx.final_artifact_path(), Some("memory://FINAL-test-cases-SHOP-2.md"));
    assert_eq!(h.fakes.store.saved().len(), 1);
    assert_eq!(
        h.transitions()[2..],
        [
            (Phase::Gathering, Phase::Generating),
            (Phase::Generating, Phase::Finalizing),
            (Phase::Finalizing, Phase::Completed),
        ]
    );
}

#[tokio::test]
async fn test_failing_source_is_recorded_and_generation_proceeds() {
    let (mut story, fetcher) = rich_story("SHOP-3");
    story.attachments.push(attachment("3", "business-requirements.pdf"));
    let fetcher = fetcher.with_error(
        &story.attachments[2].locator,
        CollaboratorError::Network("connection reset".into()),
    );
    let h = Harness::new(
        fakes(ScriptedTickets::new().with_ticket(story), fetcher, ScriptedModel::always(good_cases_text())),
        fast_config(),
    );
    let mut ctx = WorkflowContext::new("SHOP-3");

    assert_eq!(h.advance(&mut ctx).await, Phase::Completed);
    assert_eq!(ctx.gathering_issues().len(), 1);
    assert!(ctx.gathering_issues()[0].contains("business-requirements.pdf"));
    assert!(h.transitions().contains(&(Phase::Gathering, Phase::Generating)));
}

#[tokio::test]
async fn test_skipping_every_category_unblocks_awaiting_input() {
    let h = Harness::new(
        fakes(
            ScriptedTickets::new().with_ticket(epic("SHOP-4")),
            ScriptedFetcher::new(),
            ScriptedModel::always(good_plan_text()),
        ),
        fast_config(),
    );
    let mut ctx = WorkflowContext::new("SHOP-4");
    let hooks = h.orchestrator.scope(&ctx);
    assert_eq!(h.advance(&mut ctx).await, Phase::AwaitingInput);

    let phase = h
        .orchestrator
        .supply_missing(&mut ctx, &hooks, &CancellationToken::new(), MaterialCategory::Requirements, ResolutionChoice::SupplyText, Some("Users log in with SSO"))
        .await
        .unwrap();
    assert_eq!(phase, Phase::AwaitingInput);
    h.orchestrator
        .supply_missing(&mut ctx, &hooks, &CancellationToken::new(), MaterialCategory::Design, ResolutionChoice::Skip, None)
        .await
        .unwrap();
    let phase = h
        .orchestrator
        .supply_missing(&mut ctx, &hooks, &CancellationToken::new(), MaterialCategory::SupplementaryPages, ResolutionChoice::Skip, None)
        .await
        .unwrap();
    assert_eq!(phase, Phase::Gathering);

    assert_eq!(h.advance(&mut ctx).await, Phase::Completed);
    assert_eq!(ctx.resolution(MaterialCategory::Design), Some(CategoryResolution::Skipped));
    let prompt = &h.fakes.model.prompts()[0];
    assert!(prompt.source_text.contains("Users log in with SSO"));
}

#[tokio::test]
async fn test_transient_failures_are_retried_then_fail_the_run() {
    let network = || CollaboratorError::Network("connection refused".into());
    let h = Harness::new(
        fakes(
            ScriptedTickets::new()
                .with_ticket(epic("SHOP-5"))
                .failing("SHOP-5", vec![network(), network(), network()]),
            ScriptedFetcher::new(),
            ScriptedModel::always(good_plan_text()),
        ),
        fast_config(),
    );
    let mut ctx = WorkflowContext::new("SHOP-5");

    assert_eq!(h.advance(&mut ctx).await, Phase::Failed);
    let failure = ctx.failure().unwrap();
    assert_eq!(failure.phase, Phase::Analyzing);
    assert_eq!(failure.attempt_counts.get("analyzing"), Some(&3));
    assert!(failure.last_error.contains("gave up after 3 attempts"));
    assert!(ctx.final_artifact_path().is_none());

    let recoverable: Vec<bool> = h
        .observer
        .events()
        .into_iter()
        .filter_map(|e| match e {
            HookEvent::ErrorRaised { recoverable, .. } => Some(recoverable),
            _ => None,
        })
        .collect();
    assert_eq!(recoverable, vec![true, true, false]);
}

#[tokio::test]
async fn test_transient_failure_recovers_within_bound() {
    let h = Harness::new(
        fakes(
            ScriptedTickets::new()
                .with_ticket(epic("SHOP-6"))
                .failing("SHOP-6", vec![CollaboratorError::RateLimited("429".into())]),
            ScriptedFetcher::new(),
            ScriptedModel::always(good_plan_text()),
        ),
        fast_config(),
    );
    let mut ctx = WorkflowContext::new("SHOP-6");
    assert_eq!(h.advance(&mut ctx).await, Phase::AwaitingInput);
    assert_eq!(ctx.attempts("analyzing"), 2);
}

#[tokio::test]
async fn test_unknown_subject_fails_without_retry() {
    let h = Harness::new(
        fakes(ScriptedTickets::new(), ScriptedFetcher::new(), ScriptedModel::always("x")),
        fast_config(),
    );
    let mut ctx = WorkflowContext::new("NOPE-1");
    assert_eq!(h.advance(&mut ctx).await, Phase::Failed);
    assert_eq!(ctx.attempts("analyzing"), 1);
    assert!(ctx.failure().unwrap().last_error.starts_with("PERMANENT/"));
}

#[tokio::test]
async fn test_weak_drafts_refine_up_to_the_cap_then_ask_for_review() {
    let (story, fetcher) = rich_story("SHOP-7");
    let h = Harness::new(
        fakes(
            ScriptedTickets::new().with_ticket(story),
            fetcher,
            ScriptedModel::new(vec![
                Ok("# Cases\nshort".into()),
                Ok("# Cases\nstill short".into()),
                Ok("# Cases\nshort again".into()),
                Ok(good_cases_text()),
            ]),
        ),
        fast_config(),
    );
    let mut ctx = WorkflowContext::new("SHOP-7");
    let hooks = h.orchestrator.scope(&ctx);

    assert_eq!(h.advance(&mut ctx).await, Phase::AwaitingReview);
    assert_eq!(ctx.attempts("refining"), 2);
    assert_eq!(ctx.draft().map(|d| d.revision), Some(3));
    let modes: Vec<PromptMode> = h.fakes.model.prompts().iter().map(|p| p.mode).collect();
    assert_eq!(modes, vec![PromptMode::Initial, PromptMode::Refine, PromptMode::Refine]);
    assert!(ctx.previous_quality().is_some());

    let phase = h
        .orchestrator
        .supply_feedback(&mut ctx, &hooks, ReviewResponse::Feedback("Cover declined cards".into()))
        .unwrap();
    assert_eq!(phase, Phase::Refining);
    assert_eq!(h.advance(&mut ctx).await, Phase::Completed);

    let last = h.fakes.model.prompts().pop().unwrap();
    assert_eq!(last.feedback, vec!["Cover declined cards".to_string()]);
    assert_eq!(last.prior_draft.as_deref(), Some("# Cases\nshort again"));
    assert_eq!(ctx.attempts("refining"), 3);
}

#[tokio::test]
async fn test_explicit_accept_finalizes_a_reviewed_draft() {
    let (story, fetcher) = rich_story("SHOP-8");
    let h = Harness::new(
        fakes(ScriptedTickets::new().with_ticket(story), fetcher, ScriptedModel::always("# Cases\nshort")),
        fast_config(),
    );
    let mut ctx = WorkflowContext::new("SHOP-8");
    let hooks = h.orchestrator.scope(&ctx);
    assert_eq!(h.advance(&mut ctx).await, Phase::AwaitingReview);

    let empty = h
        .orchestrator
        .supply_feedback(&mut ctx, &hooks, ReviewResponse::Feedback("   ".into()));
    assert!(matches!(empty, Err(TestgenError::InvalidPayload(_))));

    h.orchestrator
        .supply_feedback(&mut ctx, &hooks, ReviewResponse::Accept)
        .unwrap();
    assert_eq!(h.advance(&mut ctx).await, Phase::Completed);
    assert_eq!(h.fakes.store.saved()[0].2, "# Cases\nshort");
}

#[tokio::test]
async fn test_persistence_is_retried_once() {
    let (story, fetcher) = rich_story("SHOP-9");
    let fakes = Fakes::new(
        ScriptedTickets::new().with_ticket(story),
        fetcher,
        ScriptedModel::always(good_cases_text()),
        MemoryStore::failing(vec![CollaboratorError::Io("disk full".into())]),
    );
    let h = Harness::new(fakes, fast_config());
    let mut ctx = WorkflowContext::new("SHOP-9");
    assert_eq!(h.advance(&mut ctx).await, Phase::Completed);
    assert_eq!(ctx.attempts("finalizing"), 2);
}

#[tokio::test]
async fn test_persistence_failing_twice_fails_the_run() {
    let (story, fetcher) = rich_story("SHOP-10");
    let io = || CollaboratorError::Io("disk full".into());
    let fakes = Fakes::new(
        ScriptedTickets::new().with_ticket(story),
        fetcher,
        ScriptedModel::always(good_cases_text()),
        MemoryStore::failing(vec![io(), io()]),
    );
    let h = Harness::new(fakes, fast_config());
    let mut ctx = WorkflowContext::new("SHOP-10");

    assert_eq!(h.advance(&mut ctx).await, Phase::Failed);
    assert_eq!(ctx.failure().unwrap().phase, Phase::Finalizing);
    assert!(ctx.final_artifact_path().is_none());
    assert!(ctx.draft().is_some());
}

#[tokio::test]
async fn test_no_material_after_skipping_needs_override() {
    let config = WorkflowConfig {
        missing_input_policy: MissingInputPolicy::SkipAll,
        ..fast_config()
    };
    let h = Harness::new(
        fakes(
            ScriptedTickets::new().with_ticket(epic("SHOP-11")),
            ScriptedFetcher::new(),
            ScriptedModel::always(good_plan_text()),
        ),
        config,
    );
    let mut ctx = WorkflowContext::new("SHOP-11");
    let hooks = h.orchestrator.scope(&ctx);

    assert_eq!(h.advance(&mut ctx).await, Phase::AwaitingInput);
    assert_eq!(ctx.pending_input().map(|p| p.reason.as_str()), Some("no_material"));
    assert!(h.transitions().contains(&(Phase::Generating, Phase::AwaitingInput)));

    let wrong = h
        .orchestrator
        .supply_feedback(&mut ctx, &hooks, ReviewResponse::Accept);
    assert!(matches!(wrong, Err(TestgenError::WrongPhase { .. })));

    assert_eq!(h.orchestrator.supply_override(&mut ctx, &hooks).unwrap(), Phase::Gathering);
    assert_eq!(h.advance(&mut ctx).await, Phase::Completed);
    assert!(ctx.pending_input().is_none());
}

#[tokio::test]
async fn test_supplied_text_satisfies_pending_input() {
    let config = WorkflowConfig {
        missing_input_policy: MissingInputPolicy::SkipAll,
        ..fast_config()
    };
    let h = Harness::new(
        fakes(
            ScriptedTickets::new().with_ticket(epic("SHOP-12")),
            ScriptedFetcher::new(),
            ScriptedModel::always(good_plan_text()),
        ),
        config,
    );
    let mut ctx = WorkflowContext::new("SHOP-12");
    let hooks = h.orchestrator.scope(&ctx);
    assert_eq!(h.advance(&mut ctx).await, Phase::AwaitingInput);

    let phase = h
        .orchestrator
        .supply_missing(&mut ctx, &hooks, &CancellationToken::new(), MaterialCategory::Requirements, ResolutionChoice::SupplyText, Some("Epic scope"))
        .await
        .unwrap();
    assert_eq!(phase, Phase::Gathering);
    assert_eq!(h.advance(&mut ctx).await, Phase::Completed);
}

#[tokio::test]
async fn test_check_parent_policy_pulls_design_from_the_epic() {
    let mut parent = epic("SHOP-20");
    parent.attachments = vec![attachment("9", "Payments HLD.pdf")];
    let mut story = ticket("SHOP-21", "Story");
    story.parent_id = Some("SHOP-20".into());
    story.body = "x".repeat(250);
    story.attachments = vec![attachment("1", "checkout-prd.pdf")];
    let fetcher = ScriptedFetcher::new()
        .with_document(&story.attachments[0].locator, "requirements")
        .with_document(&parent.attachments[0].locator, "epic design");

    let config = WorkflowConfig {
        missing_input_policy: MissingInputPolicy::CheckParentThenAsk,
        ..fast_config()
    };
    let h = Harness::new(
        fakes(
            ScriptedTickets::new().with_ticket(story).with_ticket(parent),
            fetcher,
            ScriptedModel::always(good_cases_text()),
        ),
        config,
    );
    let mut ctx = WorkflowContext::new("SHOP-21");

    assert_eq!(h.advance(&mut ctx).await, Phase::AwaitingInput);
    assert_eq!(ctx.resolution(MaterialCategory::Design), Some(CategoryResolution::Supplied));
    assert_eq!(ctx.resolution(MaterialCategory::SupplementaryPages), None);
    let pending = testgen_resolver::MissingInputResolver::evaluate(&ctx);
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].category, MaterialCategory::SupplementaryPages);
    assert!(ctx.consolidated().unwrap().contains("epic design"));
}

#[tokio::test]
async fn test_failed_automatic_parent_check_leaves_the_category_for_a_human() {
    let mut story = ticket("SHOP-22", "Story");
    story.parent_id = Some("SHOP-20".into());
    story.body = "x".repeat(250);
    story.attachments = vec![attachment("1", "checkout-prd.pdf")];
    let fetcher = ScriptedFetcher::new().with_document(&story.attachments[0].locator, "requirements");

    let config = WorkflowConfig {
        missing_input_policy: MissingInputPolicy::CheckParentThenAsk,
        ..fast_config()
    };
    let h = Harness::new(
        fakes(
            ScriptedTickets::new()
                .with_ticket(story)
                .with_ticket(epic("SHOP-20"))
                .failing("SHOP-20", vec![CollaboratorError::Network("reset".into())]),
            fetcher,
            ScriptedModel::always(good_cases_text()),
        ),
        config,
    );
    let mut ctx = WorkflowContext::new("SHOP-22");

    assert_eq!(h.advance(&mut ctx).await, Phase::AwaitingInput);
    assert_eq!(ctx.resolution(MaterialCategory::Design), None);
    let pending: Vec<MaterialCategory> = testgen_resolver::MissingInputResolver::evaluate(&ctx)
        .into_iter()
        .map(|r| r.category)
        .collect();
    assert!(pending.contains(&MaterialCategory::Design));
    assert!(ctx
        .gathering_issues()
        .iter()
        .any(|issue| issue.contains("parent check for") && issue.contains("NET/reset")));
}

#[tokio::test]
async fn test_cancellation_fails_the_run_and_keeps_partial_state() {
    let h = Harness::new(
        fakes(
            ScriptedTickets::new().with_ticket(epic("SHOP-13")),
            ScriptedFetcher::new(),
            ScriptedModel::always(good_plan_text()),
        ),
        fast_config(),
    );
    let mut ctx = WorkflowContext::new("SHOP-13");
    let hooks = h.orchestrator.scope(&ctx);
    assert_eq!(h.advance(&mut ctx).await, Phase::AwaitingInput);

    assert_eq!(h.orchestrator.cancel(&mut ctx, &hooks).unwrap(), Phase::Failed);
    assert_eq!(ctx.failure().unwrap().phase, Phase::AwaitingInput);
    assert_eq!(ctx.document_kind(), Some(DocumentKind::Plan));
    assert!(h.orchestrator.cancel(&mut ctx, &hooks).is_err());
}

#[tokio::test]
async fn test_cancelled_token_stops_an_active_run() {
    let h = Harness::new(
        fakes(
            ScriptedTickets::new().with_ticket(epic("SHOP-14")),
            ScriptedFetcher::new(),
            ScriptedModel::always(good_plan_text()),
        ),
        fast_config(),
    );
    let mut ctx = WorkflowContext::new("SHOP-14");
    let hooks = h.orchestrator.scope(&ctx);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let phase = h.orchestrator.advance(&mut ctx, &hooks, &cancel, |_| {}).await;
    assert_eq!(phase, Phase::Failed);
    assert_eq!(ctx.failure().unwrap().phase, Phase::Init);
    assert!(ctx.final_artifact_path().is_none());
}

struct Exploding;

impl Observer for Exploding {
    fn name(&self) -> &str {
        "exploding"
    }

    fn on_event(&self, envelope: &EventEnvelope) -> Result<(), ObserverError> {
        if envelope.seq % 2 == 0 {
            panic!("observer bug");
        }
        Err(ObserverError("cannot write".into()))
    }
}

#[tokio::test]
async fn test_broken_observers_never_fail_a_run() {
    let (story, fetcher) = rich_story("SHOP-15");
    let fakes = fakes(ScriptedTickets::new().with_ticket(story), fetcher, ScriptedModel::always(good_cases_text()));
    let recorder = Arc::new(RecordingObserver::new());
    let orchestrator = PhaseOrchestrator::new(fakes.collaborators(), fast_config())
        .with_hooks(HookDispatcher::new().with(Arc::new(Exploding)).with(recorder.clone()));
    let mut ctx = WorkflowContext::new("SHOP-15");
    let hooks = orchestrator.scope(&ctx);

    let phase = orchestrator
        .advance(&mut ctx, &hooks, &CancellationToken::new(), |_| {})
        .await;
    assert_eq!(phase, Phase::Completed);
    assert!(recorder.kinds().contains(&"phase_changed"));
}

#[tokio::test]
async fn test_every_unit_and_collaborator_call_is_bracketed() {
    let (story, fetcher) = rich_story("SHOP-16");
    let h = Harness::new(
        fakes(ScriptedTickets::new().with_ticket(story), fetcher, ScriptedModel::always(good_cases_text())),
        fast_config(),
    );
    let mut ctx = WorkflowContext::new("SHOP-16");
    h.advance(&mut ctx).await;

    let kinds = h.observer.kinds();
    let count = |k: &str| kinds.iter().filter(|x| **x == k).count();
    assert_eq!(count("unit_started"), 3);
    assert_eq!(count("unit_started"), count("unit_ended"));
    // ticket + two attachments + page + model + store
    assert_eq!(count("collaborator_call_started"), 6);
    assert_eq!(count("collaborator_call_started"), count("collaborator_call_ended"));
}

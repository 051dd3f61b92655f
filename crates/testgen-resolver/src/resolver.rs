use crate::request::{MissingCategoryRequest, ResolutionChoice, ResolutionOutcome};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use testgen_core::{
    CategoryResolution, CollaboratorError, DocumentFetcher, HookScope, Material, MaterialCategory,
    SourceKind, TestgenError, TicketClient, TicketRecord, WorkflowContext,
};
use testgen_stages::{locators_for, lookup_parent_epic};

pub struct MissingInputResolver {
    tickets: Arc<dyn TicketClient>,
    fetcher: Arc<dyn DocumentFetcher>,
    fetch_timeout: Duration,
}

impl MissingInputResolver {
    pub const ID: &'static str = "missing_input_resolver";

    pub fn new(tickets: Arc<dyn TicketClient>, fetcher: Arc<dyn DocumentFetcher>, fetch_timeout: Duration) -> Self {
        Self {
            tickets,
            fetcher,
            fetch_timeout,
        }
    }

    /// Categories with no material and no recorded resolution. Pure.
    pub fn evaluate(ctx: &WorkflowContext) -> Vec<MissingCategoryRequest> {
        let has_parent = ctx
            .ticket()
            .and_then(|t| t.parent_id.as_deref())
            .is_some_and(|id| !id.trim().is_empty());

        MaterialCategory::ALL
            .iter()
            .filter(|category| !ctx.has_material_for(**category) && ctx.resolution(**category).is_none())
            .map(|category| {
                let mut choices = vec![
                    ResolutionChoice::SupplyText,
                    ResolutionChoice::SupplyLocator,
                    ResolutionChoice::Skip,
                ];
                if has_parent {
                    choices.push(ResolutionChoice::CheckParent);
                }
                MissingCategoryRequest {
                    category: *category,
                    subject_id: ctx.subject_id().to_string(),
                    message: format!("No {} was found for {}.", category, ctx.subject_id()),
                    choices,
                }
            })
            .collect()
    }

    /// Answer one pending category. Reads the context, never writes it.
    ///
    /// While generation is blocked on `pending_input`, material may also be
    /// supplied for a category that was already closed.
    pub async fn resolve(
        &self,
        ctx: &WorkflowContext,
        hooks: &HookScope,
        category: MaterialCategory,
        choice: ResolutionChoice,
        payload: Option<&str>,
    ) -> Result<ResolutionOutcome, TestgenError> {
        let request = Self::evaluate(ctx).into_iter().find(|r| r.category == category);
        match request {
            Some(request) if !request.offers(choice) => {
                return Err(TestgenError::InvalidPayload(format!(
                    "{:?} is not available for {}",
                    choice, category
                )));
            }
            None if !(ctx.pending_input().is_some() && choice.needs_payload()) => {
                return Err(TestgenError::InvalidPayload(format!("{} is not awaiting input", category)));
            }
            _ => {}
        }

        let payload = payload.map(str::trim).unwrap_or_default();
        if choice.needs_payload() && payload.is_empty() {
            return Err(TestgenError::InvalidPayload(format!("{:?} requires a non-empty payload", choice)));
        }

        match choice {
            ResolutionChoice::SupplyText => Ok(ResolutionOutcome::added(vec![Material::new(
                SourceKind::UserText,
                payload,
                "user",
            )
            .with_category(category)])),
            ResolutionChoice::SupplyLocator => {
                let text = self
                    .fetch(hooks, payload)
                    .await
                    .map_err(|err| TestgenError::Task(err.into()))?;
                if text.trim().is_empty() {
                    return Err(TestgenError::InvalidPayload(format!(
                        "no text could be extracted from {}",
                        payload
                    )));
                }
                Ok(ResolutionOutcome::added(vec![Material::new(
                    SourceKind::UserLocator,
                    text,
                    payload,
                )
                .with_category(category)]))
            }
            ResolutionChoice::Skip => Ok(ResolutionOutcome::Skipped),
            ResolutionChoice::CheckParent => self.check_parent(ctx, hooks, category).await,
        }
    }

    /// A failed parent lookup, or a parent whose every source failed, is an
    /// error and leaves the category open. Partial failures become issues.
    async fn check_parent(
        &self,
        ctx: &WorkflowContext,
        hooks: &HookScope,
        category: MaterialCategory,
    ) -> Result<ResolutionOutcome, TestgenError> {
        let parent = self
            .parent_of(ctx, hooks)
            .await
            .map_err(|err| TestgenError::Task(err.into()))?;
        let Some(parent) = parent else {
            return Ok(ResolutionOutcome::DeferredToParent);
        };

        let sources = locators_for(&parent, category);
        let fetched = join_all(sources.iter().map(|(locator, _)| self.fetch(hooks, locator))).await;

        let source = match category {
            MaterialCategory::SupplementaryPages => SourceKind::LinkedPage,
            _ => SourceKind::Attachment,
        };
        let mut materials = Vec::new();
        let mut issues = Vec::new();
        let mut last_error = None;
        for ((locator, label), result) in sources.iter().zip(fetched) {
            match result {
                Ok(text) if !text.trim().is_empty() => {
                    materials.push(Material::new(source, text, locator.clone()).with_category(category));
                }
                Ok(_) => tracing::debug!(parent = %parent.key, source = %label, "parent source was empty"),
                Err(err) => {
                    tracing::warn!(parent = %parent.key, source = %label, error = %err, "parent source failed");
                    issues.push(format!("{} from parent {} failed: {}", label, parent.key, err));
                    last_error = Some(err);
                }
            }
        }

        match (materials.is_empty(), last_error) {
            (false, _) => Ok(ResolutionOutcome::MaterialAdded { materials, issues }),
            (true, Some(err)) => Err(TestgenError::Task(err.into())),
            (true, None) => Ok(ResolutionOutcome::DeferredToParent),
        }
    }

    /// Parent from analysis if known, otherwise the same one-hop lookup
    async fn parent_of(
        &self,
        ctx: &WorkflowContext,
        hooks: &HookScope,
    ) -> Result<Option<TicketRecord>, CollaboratorError> {
        if let Some(parent) = ctx.parent_ticket() {
            return Ok(Some(parent.clone()));
        }
        let Some(ticket) = ctx.ticket() else {
            return Ok(None);
        };
        lookup_parent_epic(self.tickets.as_ref(), hooks, Self::ID, ticket, self.fetch_timeout).await
    }

    async fn fetch(&self, hooks: &HookScope, locator: &str) -> Result<String, CollaboratorError> {
        let timeout = self.fetch_timeout;
        hooks
            .call(Self::ID, "document_fetcher", locator.to_string(), async {
                tokio::time::timeout(timeout, self.fetcher.fetch(locator))
                    .await
                    .unwrap_or_else(|_| {
                        Err(CollaboratorError::Timeout(format!(
                            "{} did not answer within {}ms",
                            locator,
                            timeout.as_millis()
                        )))
                    })
            })
            .await
    }
}

/// Fold a resolution into the context and record how the category closed
pub fn apply_outcome(ctx: &mut WorkflowContext, category: MaterialCategory, outcome: ResolutionOutcome) {
    let resolution = match outcome {
        ResolutionOutcome::MaterialAdded { materials, issues } => {
            ctx.add_materials(materials);
            for issue in issues {
                ctx.push_issue(issue);
            }
            CategoryResolution::Supplied
        }
        ResolutionOutcome::Skipped => CategoryResolution::Skipped,
        ResolutionOutcome::DeferredToParent => CategoryResolution::DeferredToParent,
    };
    tracing::info!(subject = ctx.subject_id(), %category, ?resolution, "category resolved");
    ctx.record_resolution(category, resolution);
}

#[cfg(test)]
mod tests {
    use super::*;
    use testgen_core::{DocumentKind, HookDispatcher, RunId, Update};
    use testgen_testkit::{attachment, epic, ticket, ScriptedFetcher, ScriptedTickets};

    fn scope() -> HookScope {
        HookScope::new(Arc::new(HookDispatcher::new()), RunId::new(), "ABC-2")
    }

    fn gathered(ticket: TicketRecord, parent: Option<TicketRecord>, materials: Vec<Material>) -> WorkflowContext {
        let mut ctx = WorkflowContext::new(ticket.key.clone());
        ctx.merge(Update::Analysis {
            document_kind: DocumentKind::from_issue_type(&ticket.issue_type),
            ticket,
            parent,
            notes: vec![],
        })
        .unwrap();
        ctx.merge(Update::Gathering {
            materials,
            issues: vec![],
            consolidated: String::new(),
        })
        .unwrap();
        ctx
    }

    fn resolver(tickets: ScriptedTickets, fetcher: ScriptedFetcher) -> MissingInputResolver {
        MissingInputResolver::new(Arc::new(tickets), Arc::new(fetcher), Duration::from_secs(1))
    }

    fn story_with_parent() -> TicketRecord {
        let mut story = ticket("ABC-2", "Story");
        story.parent_id = Some("ABC-1".into());
        story
    }

    #[test]
    fn test_all_categories_missing() {
        let ctx = gathered(epic("ABC-1"), None, vec![]);
        let requests = MissingInputResolver::evaluate(&ctx);
        let categories: Vec<MaterialCategory> = requests.iter().map(|r| r.category).collect();
        assert_eq!(categories, MaterialCategory::ALL.to_vec());
        assert!(!requests[0].offers(ResolutionChoice::CheckParent));
    }

    #[test]
    fn test_check_parent_offered_when_parent_declared() {
        let ctx = gathered(story_with_parent(), None, vec![]);
        assert!(MissingInputResolver::evaluate(&ctx)[0].offers(ResolutionChoice::CheckParent));
    }

    #[test]
    fn test_gathered_category_not_requested() {
        let prd = Material::new(SourceKind::Attachment, "prd", "prd.pdf").with_category(MaterialCategory::Requirements);
        let ctx = gathered(epic("ABC-1"), None, vec![prd]);
        let requests = MissingInputResolver::evaluate(&ctx);
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| r.category != MaterialCategory::Requirements));
    }

    #[tokio::test]
    async fn test_supply_text_then_apply() {
        let mut ctx = gathered(epic("ABC-1"), None, vec![]);
        let resolver = resolver(ScriptedTickets::new(), ScriptedFetcher::new());

        let outcome = resolver
            .resolve(&ctx, &scope(), MaterialCategory::Design, ResolutionChoice::SupplyText, Some("  the design  "))
            .await
            .unwrap();
        apply_outcome(&mut ctx, MaterialCategory::Design, outcome);

        assert!(ctx.has_material_for(MaterialCategory::Design));
        assert_eq!(ctx.gathered_materials()[0].content, "the design");
        assert_eq!(ctx.resolution(MaterialCategory::Design), Some(CategoryResolution::Supplied));
        assert_eq!(MissingInputResolver::evaluate(&ctx).len(), 2);
    }

    #[tokio::test]
    async fn test_empty_payload_rejected() {
        let ctx = gathered(epic("ABC-1"), None, vec![]);
        let resolver = resolver(ScriptedTickets::new(), ScriptedFetcher::new());
        let err = resolver
            .resolve(&ctx, &scope(), MaterialCategory::Design, ResolutionChoice::SupplyText, Some("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, TestgenError::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn test_supply_locator_fetches() {
        let ctx = gathered(epic("ABC-1"), None, vec![]);
        let fetcher = ScriptedFetcher::new().with_document("https://docs/prd", "requirements");
        let resolver = resolver(ScriptedTickets::new(), fetcher);
        let outcome = resolver
            .resolve(
                &ctx,
                &scope(),
                MaterialCategory::Requirements,
                ResolutionChoice::SupplyLocator,
                Some("https://docs/prd"),
            )
            .await
            .unwrap();
        match outcome {
            ResolutionOutcome::MaterialAdded { materials, .. } => {
                assert_eq!(materials[0].source, SourceKind::UserLocator);
                assert_eq!(materials[0].provenance, "https://docs/prd");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_locator_keeps_category_pending() {
        let ctx = gathered(epic("ABC-1"), None, vec![]);
        let resolver = resolver(ScriptedTickets::new(), ScriptedFetcher::new());
        let result = resolver
            .resolve(&ctx, &scope(), MaterialCategory::Design, ResolutionChoice::SupplyLocator, Some("nope"))
            .await;
        assert!(matches!(result, Err(TestgenError::Task(_))));
        assert_eq!(MissingInputResolver::evaluate(&ctx).len(), 3);
    }

    #[tokio::test]
    async fn test_resolved_category_cannot_be_resolved_again() {
        let mut ctx = gathered(epic("ABC-1"), None, vec![]);
        apply_outcome(&mut ctx, MaterialCategory::Design, ResolutionOutcome::Skipped);
        let resolver = resolver(ScriptedTickets::new(), ScriptedFetcher::new());
        let err = resolver
            .resolve(&ctx, &scope(), MaterialCategory::Design, ResolutionChoice::Skip, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TestgenError::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn test_pending_input_reopens_closed_category() {
        let mut ctx = gathered(epic("ABC-1"), None, vec![]);
        for category in MaterialCategory::ALL {
            apply_outcome(&mut ctx, category, ResolutionOutcome::Skipped);
        }
        ctx.set_pending_input(Some(testgen_core::InputRequest {
            reason: "no_material".into(),
            message: "nothing to generate from".into(),
        }));
        let resolver = resolver(ScriptedTickets::new(), ScriptedFetcher::new());

        let skip = resolver
            .resolve(&ctx, &scope(), MaterialCategory::Design, ResolutionChoice::Skip, None)
            .await;
        assert!(skip.is_err());
        let outcome = resolver
            .resolve(&ctx, &scope(), MaterialCategory::Design, ResolutionChoice::SupplyText, Some("notes"))
            .await
            .unwrap();
        apply_outcome(&mut ctx, MaterialCategory::Design, outcome);
        assert_eq!(ctx.resolution(MaterialCategory::Design), Some(CategoryResolution::Supplied));
    }

    #[tokio::test]
    async fn test_check_parent_finds_design() {
        let mut parent = epic("ABC-1");
        parent.attachments = vec![attachment("7", "checkout-hld.pdf"), attachment("8", "prd.pdf")];
        let fetcher = ScriptedFetcher::new().with_document(&parent.attachments[0].locator, "hld text");
        let tickets = ScriptedTickets::new().with_ticket(parent);
        let ctx = gathered(story_with_parent(), None, vec![]);

        let outcome = resolver(tickets, fetcher)
            .resolve(&ctx, &scope(), MaterialCategory::Design, ResolutionChoice::CheckParent, None)
            .await
            .unwrap();
        match outcome {
            ResolutionOutcome::MaterialAdded { materials, .. } => {
                assert_eq!(materials.len(), 1);
                assert_eq!(materials[0].category, Some(MaterialCategory::Design));
                assert_eq!(materials[0].source, SourceKind::Attachment);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_check_parent_with_nothing_defers() {
        let tickets = ScriptedTickets::new().with_ticket(epic("ABC-1"));
        let mut ctx = gathered(story_with_parent(), None, vec![]);
        let outcome = resolver(tickets, ScriptedFetcher::new())
            .resolve(&ctx, &scope(), MaterialCategory::Requirements, ResolutionChoice::CheckParent, None)
            .await
            .unwrap();
        assert_eq!(outcome, ResolutionOutcome::DeferredToParent);
        apply_outcome(&mut ctx, MaterialCategory::Requirements, outcome);
        assert_eq!(MissingInputResolver::evaluate(&ctx).len(), 2);
    }

    #[tokio::test]
    async fn test_parent_lookup_error_keeps_category_open() {
        let tickets = ScriptedTickets::new()
            .with_ticket(epic("ABC-1"))
            .failing("ABC-1", vec![CollaboratorError::Network("reset".into())]);
        let ctx = gathered(story_with_parent(), None, vec![]);

        let result = resolver(tickets, ScriptedFetcher::new())
            .resolve(&ctx, &scope(), MaterialCategory::Design, ResolutionChoice::CheckParent, None)
            .await;
        assert!(matches!(result, Err(TestgenError::Task(ref err)) if err.is_transient()));
        assert!(MissingInputResolver::evaluate(&ctx)
            .iter()
            .any(|r| r.category == MaterialCategory::Design));
    }

    #[tokio::test]
    async fn test_parent_source_failures_become_issues() {
        let mut parent = epic("ABC-1");
        parent.attachments = vec![attachment("7", "checkout-hld.pdf"), attachment("9", "api-design.pdf")];
        let fetcher = ScriptedFetcher::new()
            .with_document(&parent.attachments[0].locator, "hld text")
            .with_error(&parent.attachments[1].locator, CollaboratorError::Network("reset".into()));
        let tickets = ScriptedTickets::new().with_ticket(parent);
        let mut ctx = gathered(story_with_parent(), None, vec![]);

        let outcome = resolver(tickets, fetcher)
            .resolve(&ctx, &scope(), MaterialCategory::Design, ResolutionChoice::CheckParent, None)
            .await
            .unwrap();
        apply_outcome(&mut ctx, MaterialCategory::Design, outcome);

        assert_eq!(ctx.resolution(MaterialCategory::Design), Some(CategoryResolution::Supplied));
        assert_eq!(ctx.gathering_issues().len(), 1);
        assert!(ctx.gathering_issues()[0].contains("api-design.pdf"));
        assert!(ctx.gathering_issues()[0].contains("NET/reset"));
    }

    #[tokio::test]
    async fn test_parent_sources_all_failing_is_an_error() {
        let mut parent = epic("ABC-1");
        parent.attachments = vec![attachment("7", "checkout-hld.pdf")];
        let fetcher = ScriptedFetcher::new()
            .with_error(&parent.attachments[0].locator, CollaboratorError::Timeout("30s".into()));
        let tickets = ScriptedTickets::new().with_ticket(parent);
        let ctx = gathered(story_with_parent(), None, vec![]);

        let result = resolver(tickets, fetcher)
            .resolve(&ctx, &scope(), MaterialCategory::Design, ResolutionChoice::CheckParent, None)
            .await;
        assert!(matches!(result, Err(TestgenError::Task(_))));
        assert_eq!(MissingInputResolver::evaluate(&ctx).len(), 3);
    }

    #[tokio::test]
    async fn test_resolution_order_does_not_matter() {
        let resolver = resolver(ScriptedTickets::new(), ScriptedFetcher::new());
        let steps = [
            (MaterialCategory::Requirements, ResolutionChoice::SupplyText, Some("reqs")),
            (MaterialCategory::Design, ResolutionChoice::Skip, None),
            (MaterialCategory::SupplementaryPages, ResolutionChoice::SupplyText, Some("pages")),
        ];

        let mut forward = gathered(epic("ABC-1"), None, vec![]);
        for (category, choice, payload) in steps {
            let outcome = resolver.resolve(&forward, &scope(), category, choice, payload).await.unwrap();
            apply_outcome(&mut forward, category, outcome);
        }
        let mut backward = gathered(epic("ABC-1"), None, vec![]);
        for (category, choice, payload) in steps.into_iter().rev() {
            let outcome = resolver.resolve(&backward, &scope(), category, choice, payload).await.unwrap();
            apply_outcome(&mut backward, category, outcome);
        }

        assert!(MissingInputResolver::evaluate(&forward).is_empty());
        assert_eq!(forward.resolutions(), backward.resolutions());
    }

    #[test]
    fn test_request_serializes_choices() {
        let ctx = gathered(epic("ABC-1"), None, vec![]);
        let json = serde_json::to_value(&MissingInputResolver::evaluate(&ctx)[0]).unwrap();
        assert_eq!(json["category"], "requirements");
        assert_eq!(json["choices"][0], "supply_text");
    }
}

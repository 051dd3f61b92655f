use async_trait::async_trait;
use std::sync::Arc;
use testgen_core::{
    CollaboratorError, DocumentKind, Draft, HookScope, InputRequest, ModelClient, Phase, PromptMode,
    PromptSpec, TaskError, TaskUnit, Update, WorkflowContext,
};

/// Produces a draft from the consolidated material, or refines the prior one
pub struct Generation {
    model: Arc<dyn ModelClient>,
}

impl Generation {
    pub const ID: &'static str = "generation";

    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self { model }
    }

    /// Generation input for the current context.
    /// Refine mode as soon as a draft exists.
    pub fn prompt_for(ctx: &WorkflowContext, kind: DocumentKind) -> PromptSpec {
        let title = ctx.ticket().map(|t| t.title.clone()).unwrap_or_default();
        let source_text = ctx.consolidated().unwrap_or_default().to_string();

        match ctx.draft() {
            Some(draft) => PromptSpec {
                mode: PromptMode::Refine,
                kind,
                subject_id: ctx.subject_id().to_string(),
                title,
                source_text,
                prior_draft: Some(draft.text.clone()),
                validation: ctx.quality().cloned(),
                feedback: ctx.feedback().to_vec(),
            },
            None => PromptSpec {
                mode: PromptMode::Initial,
                kind,
                subject_id: ctx.subject_id().to_string(),
                title,
                source_text,
                prior_draft: None,
                validation: None,
                feedback: ctx.feedback().to_vec(),
            },
        }
    }
}

/// Strip a surrounding ``` fence if the model wrapped the whole document
fn normalize_output(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(inner) = trimmed.strip_prefix("```") {
        if let Some(body) = inner.strip_suffix("```") {
            // drop the info string ("markdown") on the opening line
            let body = body.split_once('\n').map(|(_, rest)| rest).unwrap_or(body);
            return body.trim();
        }
    }
    trimmed
}

#[async_trait]
impl TaskUnit for Generation {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn phase(&self) -> Phase {
        Phase::Generating
    }

    async fn run(&self, ctx: &WorkflowContext, hooks: &HookScope) -> Result<Update, TaskError> {
        let kind = ctx
            .document_kind()
            .ok_or_else(|| TaskError::Permanent("document kind not set".into()))?;

        if ctx.gathered_materials().is_empty() && !ctx.operator_override() {
            return Err(TaskError::NeedsHumanInput(InputRequest {
                reason: "no_material".into(),
                message: format!(
                    "No supporting material was gathered for {}. Supply a document or override to generate from the ticket alone.",
                    ctx.subject_id()
                ),
            }));
        }

        let prompt = Self::prompt_for(ctx, kind);
        let text = hooks
            .call(
                Self::ID,
                "model_client",
                format!("generate {} ({:?})", kind.slug(), prompt.mode),
                self.model.generate(&prompt),
            )
            .await
            .map_err(|err| match err {
                CollaboratorError::InvalidResponse(_) => TaskError::Transient(err.to_string()),
                other => other.into(),
            })?;

        let text = normalize_output(&text);
        if text.is_empty() {
            return Err(TaskError::Transient("model returned an empty document".into()));
        }

        let revision = ctx.draft().map(|d| d.revision + 1).unwrap_or(1);
        let draft = Draft::new(ctx.subject_id(), kind, text, revision);
        tracing::info!(
            subject = ctx.subject_id(),
            revision,
            words = draft.word_count,
            sections = draft.section_count,
            "draft generated"
        );
        Ok(Update::Generation { draft })
    }
}

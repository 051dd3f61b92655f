use crate::parent::lookup_parent_epic;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use testgen_core::{
    DocumentKind, HookScope, Phase, TaskError, TaskUnit, TicketClient, TicketRecord, Update,
    WorkflowContext,
};

/// Resolves the subject to a ticket and fixes the document kind
pub struct TicketAnalysis {
    tickets: Arc<dyn TicketClient>,
    min_scope_chars: usize,
    fetch_timeout: Duration,
}

impl TicketAnalysis {
    pub const ID: &'static str = "ticket_analysis";

    pub fn new(tickets: Arc<dyn TicketClient>, min_scope_chars: usize) -> Self {
        Self {
            tickets,
            min_scope_chars,
            fetch_timeout: Duration::from_millis(30_000),
        }
    }

    /// Bound on the parent-Epic lookup
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Too little body text, or nothing attached
    fn lacks_scope(&self, ticket: &TicketRecord) -> bool {
        ticket.body.trim().chars().count() < self.min_scope_chars || ticket.attachments.is_empty()
    }
}

#[async_trait]
impl TaskUnit for TicketAnalysis {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn phase(&self) -> Phase {
        Phase::Analyzing
    }

    async fn run(&self, ctx: &WorkflowContext, hooks: &HookScope) -> Result<Update, TaskError> {
        let subject = ctx.subject_id();
        let ticket = hooks
            .call(Self::ID, "ticket_client", format!("fetch {}", subject), self.tickets.fetch(subject))
            .await?;

        let document_kind = DocumentKind::from_issue_type(&ticket.issue_type);
        let mut notes = Vec::new();

        let parent = if !ticket.is_epic() && self.lacks_scope(&ticket) {
            match lookup_parent_epic(self.tickets.as_ref(), hooks, Self::ID, &ticket, self.fetch_timeout).await {
                Ok(parent) => parent,
                Err(err) => {
                    tracing::warn!(subject, error = %err, "parent lookup failed");
                    notes.push(format!("parent lookup failed: {}", err));
                    None
                }
            }
        } else {
            None
        };

        tracing::info!(
            subject,
            kind = %document_kind,
            parent = parent.as_ref().map(|p| p.key.as_str()),
            "ticket analysed"
        );

        Ok(Update::Analysis {
            ticket,
            parent,
            document_kind,
            notes,
        })
    }
}

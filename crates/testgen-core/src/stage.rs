//! Task Unit: single contract for every phase of work
use crate::context::{Phase, WorkflowContext};
use crate::data_model::{DocumentKind, Draft, Material, TicketRecord};
use crate::error::TaskError;
use crate::hooks::HookScope;
use async_trait::async_trait;

/// Fields a task unit is licensed to write, one variant per unit
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    Analysis {
        ticket: TicketRecord,
        parent: Option<TicketRecord>,
        document_kind: DocumentKind,
        /// Non-fatal observations (e.g. parent lookup failed)
        notes: Vec<String>,
    },
    Gathering {
        materials: Vec<Material>,
        /// One entry per source that failed
        issues: Vec<String>,
        consolidated: String,
    },
    Generation {
        draft: Draft,
    },
}

/// One phase's worth of work.
///
/// A unit reads the context, calls its collaborators (each call bracketed
/// through `hooks`) and returns an [`Update`]. It never writes the context.
#[async_trait]
pub trait TaskUnit: Send + Sync {
    /// Stable unit name (ex: "ticket_analysis")
    fn id(&self) -> &'static str;

    /// Phase this unit runs in
    fn phase(&self) -> Phase;

    async fn run(&self, ctx: &WorkflowContext, hooks: &HookScope) -> Result<Update, TaskError>;
}

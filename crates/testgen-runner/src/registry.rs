//! Run Registry: many independent runs, each driven on its own task
use crate::orchestrator::{PhaseOrchestrator, ReviewResponse};
use crate::status::RunStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use testgen_core::{HookScope, MaterialCategory, Phase, RunId, TestgenError, WorkflowContext};
use testgen_quality::QualityProfiles;
use testgen_resolver::ResolutionChoice;
use testgen_stages::extract_subject_key;
use tokio::sync::{watch, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

/// Returned by `start`; identifies the run in every later call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunHandle {
    pub run_id: RunId,
    pub subject_id: String,
}

struct RunSlot {
    ctx: Mutex<WorkflowContext>,
    hooks: HookScope,
    status: watch::Sender<RunStatus>,
    cancel: CancellationToken,
    profiles: QualityProfiles,
}

impl RunSlot {
    fn publish(&self, ctx: &WorkflowContext) -> RunStatus {
        let status = RunStatus::from_context(ctx, &self.profiles);
        self.status.send_replace(status.clone());
        status
    }
}

pub struct RunRegistry {
    orchestrator: Arc<PhaseOrchestrator>,
    runs: RwLock<HashMap<RunId, Arc<RunSlot>>>,
}

impl RunRegistry {
    pub fn new(orchestrator: PhaseOrchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            runs: RwLock::new(HashMap::new()),
        }
    }

    pub fn orchestrator(&self) -> &PhaseOrchestrator {
        &self.orchestrator
    }

    /// Create a run for `subject` (a ticket key or URL) and start driving it
    pub async fn start(&self, subject: &str) -> Result<RunHandle, TestgenError> {
        let raw = subject.trim();
        if raw.is_empty() {
            return Err(TestgenError::InvalidPayload("subject must not be empty".into()));
        }
        let subject_id = extract_subject_key(raw).unwrap_or_else(|| raw.to_string());

        let ctx = WorkflowContext::new(subject_id.clone());
        let run_id = ctx.run_id();
        let hooks = self.orchestrator.scope(&ctx);
        let profiles = self.orchestrator.profiles().clone();
        let (status, _) = watch::channel(RunStatus::from_context(&ctx, &profiles));
        let slot = Arc::new(RunSlot {
            ctx: Mutex::new(ctx),
            hooks,
            status,
            cancel: CancellationToken::new(),
            profiles,
        });

        self.runs.write().await.insert(run_id, slot.clone());
        tracing::info!(%run_id, subject = %subject_id, "run started");
        self.drive(slot);

        Ok(RunHandle { run_id, subject_id })
    }

    pub async fn supply_missing(
        &self,
        run_id: RunId,
        category: MaterialCategory,
        choice: ResolutionChoice,
        payload: Option<String>,
    ) -> Result<RunStatus, TestgenError> {
        let slot = self.slot(run_id).await?;
        let mut ctx = slot.ctx.lock().await;
        let phase = self
            .orchestrator
            .supply_missing(&mut ctx, &slot.hooks, &slot.cancel, category, choice, payload.as_deref())
            .await?;
        self.settle(&slot, ctx, phase)
    }

    pub async fn supply_feedback(&self, run_id: RunId, response: ReviewResponse) -> Result<RunStatus, TestgenError> {
        let slot = self.slot(run_id).await?;
        let mut ctx = slot.ctx.lock().await;
        let phase = self.orchestrator.supply_feedback(&mut ctx, &slot.hooks, response)?;
        self.settle(&slot, ctx, phase)
    }

    pub async fn supply_override(&self, run_id: RunId) -> Result<RunStatus, TestgenError> {
        let slot = self.slot(run_id).await?;
        let mut ctx = slot.ctx.lock().await;
        let phase = self.orchestrator.supply_override(&mut ctx, &slot.hooks)?;
        self.settle(&slot, ctx, phase)
    }

    /// Latest published status; never blocks on a run being driven
    pub async fn status(&self, run_id: RunId) -> Result<RunStatus, TestgenError> {
        let slot = self.slot(run_id).await?;
        let status = slot.status.borrow().clone();
        Ok(status)
    }

    /// Fail the run at its next suspension point, keeping its partial state
    pub async fn cancel(&self, run_id: RunId) -> Result<RunStatus, TestgenError> {
        let slot = self.slot(run_id).await?;
        let phase = slot.status.borrow().phase;
        if phase.is_terminal() {
            return Err(TestgenError::WrongPhase {
                operation: "cancel",
                phase,
            });
        }

        slot.cancel.cancel();
        let mut ctx = slot.ctx.lock().await;
        if !ctx.phase().is_terminal() {
            self.orchestrator.cancel(&mut ctx, &slot.hooks)?;
        }
        tracing::info!(%run_id, "run cancelled");
        Ok(slot.publish(&ctx))
    }

    /// Resolves once the run is suspended or terminal
    pub async fn wait(&self, run_id: RunId) -> Result<RunStatus, TestgenError> {
        let slot = self.slot(run_id).await?;
        let mut rx = slot.status.subscribe();
        let status = rx
            .wait_for(RunStatus::is_settled)
            .await
            .map_err(|_| TestgenError::UnknownRun(run_id.to_string()))?;
        Ok(status.clone())
    }

    pub async fn len(&self) -> usize {
        self.runs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.runs.read().await.is_empty()
    }

    async fn slot(&self, run_id: RunId) -> Result<Arc<RunSlot>, TestgenError> {
        self.runs
            .read()
            .await
            .get(&run_id)
            .cloned()
            .ok_or_else(|| TestgenError::UnknownRun(run_id.to_string()))
    }

    /// Publish after an external input and resume driving if the run woke up
    fn settle(
        &self,
        slot: &Arc<RunSlot>,
        ctx: tokio::sync::MutexGuard<'_, WorkflowContext>,
        phase: Phase,
    ) -> Result<RunStatus, TestgenError> {
        let status = slot.publish(&ctx);
        drop(ctx);
        if !phase.is_suspended() && !phase.is_terminal() {
            self.drive(slot.clone());
        }
        Ok(status)
    }

    fn drive(&self, slot: Arc<RunSlot>) {
        let orchestrator = self.orchestrator.clone();
        tokio::spawn(async move {
            let mut ctx = slot.ctx.lock().await;
            let phase = orchestrator
                .advance(&mut ctx, &slot.hooks, &slot.cancel, |c| {
                    slot.publish(c);
                })
                .await;
            slot.publish(&ctx);
            tracing::debug!(run_id = %ctx.run_id(), %phase, "run settled");
        });
    }
}

//! Testgen Runner: the phase state machine and the registry that hosts runs
//!
//! [`PhaseOrchestrator`] drives one [`WorkflowContext`] from INIT until it
//! suspends (AWAITING_INPUT, AWAITING_REVIEW) or terminates (COMPLETED,
//! FAILED). [`RunRegistry`] owns many contexts, drives each on its own tokio
//! task, and accepts the external inputs that wake suspended runs.
//!
//! ```ignore
//! let registry = RunRegistry::new(PhaseOrchestrator::new(collaborators, WorkflowConfig::default()));
//! let handle = registry.start("https://acme.atlassian.net/browse/SHOP-42").await?;
//! let status = registry.wait(handle.run_id).await?;
//! ```
//!
//! [`WorkflowContext`]: testgen_core::WorkflowContext

mod orchestrator;
mod registry;
mod retry;
mod status;

pub use orchestrator::{PhaseOrchestrator, ReviewResponse};
pub use registry::{RunHandle, RunRegistry};
pub use retry::RetryPolicy;
pub use status::{RunOutcome, RunStatus};

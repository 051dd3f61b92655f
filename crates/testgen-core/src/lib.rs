//! Testgen Core: workflow context, task-unit contract and hook dispatch
//!
//! Shared vocabulary for the test documentation pipeline. Every other crate
//! in the workspace builds on the types re-exported here.
//!
//! # Pipeline Flow
//!
//! ```text
//! INIT → ANALYZING → GATHERING ⇄ AWAITING_INPUT
//!                        ↓
//!                    GENERATING ⇄ REFINING ⇄ AWAITING_REVIEW
//!                        ↓
//!                    FINALIZING → COMPLETED        (any → FAILED)
//! ```

pub mod collaborators;
pub mod config;
pub mod context;
pub mod data_model;
pub mod error;
pub mod hooks;
pub mod stage;

pub use collaborators::{ArtifactStore, Collaborators, DocumentFetcher, ModelClient, TicketClient};
pub use config::{MissingInputPolicy, SourceSpec, WorkflowConfig};
pub use context::{ContextSnapshot, FailureSummary, Phase, RunId, WorkflowContext};
pub use data_model::{
    Attachment, CategoryResolution, DocumentKind, Draft, InputRequest, Issue, IssueCategory,
    Material, MaterialCategory, PromptMode, PromptSpec, SourceKind, TicketRecord,
    ValidationResult,
};
pub use error::{CollaboratorError, TaskError, TestgenError};
pub use hooks::{EventEnvelope, HookDispatcher, HookEvent, HookScope, Observer, ObserverError};
pub use stage::{TaskUnit, Update};

/// Engine version stamped into audit snapshots
pub const TESTGEN_VERSION: &str = "1.0.0";

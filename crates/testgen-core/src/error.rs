//! Unified Error Model
use crate::context::Phase;
use crate::data_model::InputRequest;
use thiserror::Error;

/// Failure reported by an external collaborator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollaboratorError {
    #[error("NOTFOUND/{0}")]
    NotFound(String),

    #[error("AUTH/{0}")]
    Auth(String),

    #[error("NET/{0}")]
    Network(String),

    #[error("UNSUPPORTED/{0}")]
    Unsupported(String),

    #[error("RATE/{0}")]
    RateLimited(String),

    #[error("TIMEOUT/{0}")]
    Timeout(String),

    #[error("RESPONSE/{0}")]
    InvalidResponse(String),

    #[error("IO/{0}")]
    Io(String),
}

impl CollaboratorError {
    /// Network trouble, rate limits and timeouts are worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimited(_) | Self::Timeout(_))
    }
}

/// Failure of a single task-unit invocation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    #[error("TRANSIENT/{0}")]
    Transient(String),

    #[error("PERMANENT/{0}")]
    Permanent(String),

    /// Not a failure: the unit cannot continue without a human
    #[error("INPUT/{}", .0.message)]
    NeedsHumanInput(InputRequest),
}

impl TaskError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<CollaboratorError> for TaskError {
    fn from(err: CollaboratorError) -> Self {
        if err.is_transient() {
            TaskError::Transient(err.to_string())
        } else {
            TaskError::Permanent(err.to_string())
        }
    }
}

/// Errors surfaced to callers of the workflow API
#[derive(Error, Debug)]
pub enum TestgenError {
    #[error("PHASE/illegal transition {from} -> {to}")]
    InvalidTransition { from: Phase, to: Phase },

    #[error("MERGE/{0}")]
    Merge(String),

    #[error("RUN/unknown run {0}")]
    UnknownRun(String),

    #[error("RUN/{operation} not accepted in phase {phase}")]
    WrongPhase { operation: &'static str, phase: Phase },

    #[error("PAYLOAD/{0}")]
    InvalidPayload(String),

    #[error("CONFIG/{0}")]
    Config(String),

    #[error(transparent)]
    Task(#[from] TaskError),
}

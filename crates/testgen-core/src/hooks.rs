//! Hook dispatch: lifecycle events fanned out to registered observers
//!
//! Dispatch is synchronous and follows registration order. An observer that
//! errors or panics is logged and skipped; the remaining observers and the
//! run itself are unaffected. Observers only ever see an [`EventEnvelope`],
//! never the workflow context.
use crate::context::{Phase, RunId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HookEvent {
    UnitStarted {
        unit: &'static str,
        phase: Phase,
        attempt: u32,
    },
    UnitEnded {
        unit: &'static str,
        phase: Phase,
        outcome: Result<(), String>,
    },
    CollaboratorCallStarted {
        unit: &'static str,
        collaborator: &'static str,
        operation: String,
    },
    CollaboratorCallEnded {
        unit: &'static str,
        collaborator: &'static str,
        operation: String,
        outcome: Result<(), String>,
        latency_ms: u64,
    },
    ErrorRaised {
        error: String,
        recoverable: bool,
    },
    PhaseChanged {
        from: Phase,
        to: Phase,
    },
}

impl HookEvent {
    /// Short tag, matching the serialized `event` field
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnitStarted { .. } => "unit_started",
            Self::UnitEnded { .. } => "unit_ended",
            Self::CollaboratorCallStarted { .. } => "collaborator_call_started",
            Self::CollaboratorCallEnded { .. } => "collaborator_call_ended",
            Self::ErrorRaised { .. } => "error_raised",
            Self::PhaseChanged { .. } => "phase_changed",
        }
    }
}

/// Event plus the run it belongs to
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    pub run_id: RunId,
    pub subject_id: String,
    /// Per-run sequence number, starting at 1
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub event: HookEvent,
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("OBSERVER/{0}")]
pub struct ObserverError(pub String);

/// Read-only consumer of hook events
pub trait Observer: Send + Sync {
    fn name(&self) -> &str;

    fn on_event(&self, envelope: &EventEnvelope) -> Result<(), ObserverError>;
}

#[derive(Clone, Default)]
pub struct HookDispatcher {
    observers: Vec<Arc<dyn Observer>>,
}

impl HookDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, observer: Arc<dyn Observer>) {
        self.observers.push(observer);
    }

    /// Builder form of [`register`](Self::register)
    pub fn with(mut self, observer: Arc<dyn Observer>) -> Self {
        self.register(observer);
        self
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Deliver to every observer in registration order.
    /// Returns how many observers failed.
    pub fn dispatch(&self, envelope: &EventEnvelope) -> usize {
        let mut failures = 0;
        for observer in &self.observers {
            match catch_unwind(AssertUnwindSafe(|| observer.on_event(envelope))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    failures += 1;
                    tracing::warn!(observer = observer.name(), error = %err, "observer failed");
                }
                Err(_) => {
                    failures += 1;
                    tracing::warn!(observer = observer.name(), "observer panicked");
                }
            }
        }
        failures
    }
}

impl std::fmt::Debug for HookDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("HookDispatcher")
            .field(
                "observers",
                &self.observers.iter().map(|o| o.name().to_string()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Dispatcher bound to one run; stamps envelopes with run id and sequence
pub struct HookScope {
    dispatcher: Arc<HookDispatcher>,
    run_id: RunId,
    subject_id: String,
    seq: AtomicU64,
}

impl HookScope {
    pub fn new(dispatcher: Arc<HookDispatcher>, run_id: RunId, subject_id: impl Into<String>) -> Self {
        Self {
            dispatcher,
            run_id,
            subject_id: subject_id.into(),
            seq: AtomicU64::new(0),
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn emit(&self, event: HookEvent) {
        let envelope = EventEnvelope {
            run_id: self.run_id,
            subject_id: self.subject_id.clone(),
            seq: self.seq.fetch_add(1, Ordering::SeqCst) + 1,
            at: Utc::now(),
            event,
        };
        self.dispatcher.dispatch(&envelope);
    }

    /// Bracket one collaborator call with started/ended events
    pub async fn call<T, E, F>(
        &self,
        unit: &'static str,
        collaborator: &'static str,
        operation: impl Into<String>,
        call: F,
    ) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
    {
        let operation = operation.into();
        self.emit(HookEvent::CollaboratorCallStarted {
            unit,
            collaborator,
            operation: operation.clone(),
        });

        let start = Instant::now();
        let result = call.await;

        self.emit(HookEvent::CollaboratorCallEnded {
            unit,
            collaborator,
            operation,
            outcome: result.as_ref().map(|_| ()).map_err(|e| e.to_string()),
            latency_ms: start.elapsed().as_millis() as u64,
        });
        result
    }
}

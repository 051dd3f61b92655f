//! Progress output: every hook event as a structured tracing event
use testgen_core::{EventEnvelope, HookEvent, Observer, ObserverError};

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl TracingObserver {
    pub fn new() -> Self {
        Self
    }
}

impl Observer for TracingObserver {
    fn name(&self) -> &str {
        "tracing"
    }

    fn on_event(&self, envelope: &EventEnvelope) -> Result<(), ObserverError> {
        let run_id = envelope.run_id;
        let subject = envelope.subject_id.as_str();
        let seq = envelope.seq;

        match &envelope.event {
            HookEvent::UnitStarted { unit, phase, attempt } => {
                tracing::info!(%run_id, subject, seq, unit, %phase, attempt, "unit started");
            }
            HookEvent::UnitEnded { unit, phase, outcome } => match outcome {
                Ok(()) => tracing::info!(%run_id, subject, seq, unit, %phase, "unit finished"),
                Err(err) => tracing::warn!(%run_id, subject, seq, unit, %phase, error = %err, "unit failed"),
            },
            HookEvent::CollaboratorCallStarted {
                unit,
                collaborator,
                operation,
            } => {
                tracing::debug!(%run_id, seq, unit, collaborator, operation = %operation, "call started");
            }
            HookEvent::CollaboratorCallEnded {
                unit,
                collaborator,
                operation,
                outcome,
                latency_ms,
            } => match outcome {
                Ok(()) => tracing::debug!(
                    %run_id, seq, unit, collaborator, operation = %operation, latency_ms, "call finished"
                ),
                Err(err) => tracing::warn!(
                    %run_id, seq, unit, collaborator, operation = %operation, latency_ms, error = %err, "call failed"
                ),
            },
            HookEvent::ErrorRaised { error, recoverable } => {
                if *recoverable {
                    tracing::warn!(%run_id, subject, seq, error = %error, "recoverable error");
                } else {
                    tracing::error!(%run_id, subject, seq, error = %error, "error");
                }
            }
            HookEvent::PhaseChanged { from, to } => {
                tracing::info!(%run_id, subject, seq, %from, %to, "phase {} -> {}", from, to);
            }
        }
        Ok(())
    }
}

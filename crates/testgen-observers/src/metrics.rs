//! Prometheus metrics fed from hook events
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use testgen_core::{EventEnvelope, HookEvent, Observer, ObserverError};

pub struct MetricsObserver {
    registry: Registry,
    units_started: IntCounterVec,
    units_failed: IntCounterVec,
    collaborator_calls: IntCounterVec,
    collaborator_latency: HistogramVec,
    phase_transitions: IntCounterVec,
    errors: IntCounterVec,
}

impl MetricsObserver {
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    /// Register the collectors on an existing registry
    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        let units_started = IntCounterVec::new(
            Opts::new("testgen_units_started_total", "Task unit invocations"),
            &["unit"],
        )?;
        let units_failed = IntCounterVec::new(
            Opts::new("testgen_units_failed_total", "Task unit invocations that returned an error"),
            &["unit"],
        )?;
        let collaborator_calls = IntCounterVec::new(
            Opts::new("testgen_collaborator_calls_total", "Collaborator calls by outcome"),
            &["collaborator", "outcome"],
        )?;
        let collaborator_latency = HistogramVec::new(
            HistogramOpts::new("testgen_collaborator_latency_seconds", "Collaborator call latency")
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["collaborator"],
        )?;
        let phase_transitions = IntCounterVec::new(
            Opts::new("testgen_phase_transitions_total", "Phase transitions by target phase"),
            &["to"],
        )?;
        let errors = IntCounterVec::new(
            Opts::new("testgen_errors_total", "Errors raised during runs"),
            &["recoverable"],
        )?;

        registry.register(Box::new(units_started.clone()))?;
        registry.register(Box::new(units_failed.clone()))?;
        registry.register(Box::new(collaborator_calls.clone()))?;
        registry.register(Box::new(collaborator_latency.clone()))?;
        registry.register(Box::new(phase_transitions.clone()))?;
        registry.register(Box::new(errors.clone()))?;

        Ok(Self {
            registry,
            units_started,
            units_failed,
            collaborator_calls,
            collaborator_latency,
            phase_transitions,
            errors,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition format, for `/metrics`
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }
}

impl Observer for MetricsObserver {
    fn name(&self) -> &str {
        "metrics"
    }

    fn on_event(&self, envelope: &EventEnvelope) -> Result<(), ObserverError> {
        match &envelope.event {
            HookEvent::UnitStarted { unit, .. } => {
                self.units_started.with_label_values(&[*unit]).inc();
            }
            HookEvent::UnitEnded { unit, outcome, .. } => {
                if outcome.is_err() {
                    self.units_failed.with_label_values(&[*unit]).inc();
                }
            }
            HookEvent::CollaboratorCallStarted { .. } => {}
            HookEvent::CollaboratorCallEnded {
                collaborator,
                outcome,
                latency_ms,
                ..
            } => {
                let label = if outcome.is_ok() { "ok" } else { "error" };
                self.collaborator_calls
                    .with_label_values(&[*collaborator, label])
                    .inc();
                self.collaborator_latency
                    .with_label_values(&[*collaborator])
                    .observe(*latency_ms as f64 / 1000.0);
            }
            HookEvent::ErrorRaised { recoverable, .. } => {
                let label = if *recoverable { "true" } else { "false" };
                self.errors.with_label_values(&[label]).inc();
            }
            HookEvent::PhaseChanged { to, .. } => {
                self.phase_transitions.with_label_values(&[to.name()]).inc();
            }
        }
        Ok(())
    }
}

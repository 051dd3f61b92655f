//! Audit trail of hook events
//!
//! Keeps every event of every run, newest last, for debugging and review.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use testgen_core::{EventEnvelope, HookEvent, Observer, ObserverError, Phase, RunId};

/// An audit log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique entry ID
    pub id: String,

    /// Timestamp (Unix ms)
    pub timestamp: u64,

    pub run_id: RunId,

    /// Sequence number within the run
    pub seq: u64,

    pub event_type: AuditEventType,

    /// Human readable summary of the event
    pub detail: String,

    /// Whether the event reports a failure
    #[serde(default)]
    pub failed: bool,
}

impl AuditEntry {
    pub fn from_envelope(envelope: &EventEnvelope) -> Self {
        let (event_type, detail, failed) = describe(&envelope.event);
        Self {
            id: generate_audit_id(envelope.at.timestamp_millis().max(0) as u64),
            timestamp: envelope.at.timestamp_millis().max(0) as u64,
            run_id: envelope.run_id,
            seq: envelope.seq,
            event_type,
            detail,
            failed,
        }
    }
}

/// Type of audit event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    UnitStarted,
    UnitEnded,
    CollaboratorCall,
    Error,
    PhaseChange,
}

fn describe(event: &HookEvent) -> (AuditEventType, String, bool) {
    match event {
        HookEvent::UnitStarted { unit, phase, attempt } => (
            AuditEventType::UnitStarted,
            format!("{} started in {} (attempt {})", unit, phase, attempt),
            false,
        ),
        HookEvent::UnitEnded { unit, outcome, .. } => match outcome {
            Ok(()) => (AuditEventType::UnitEnded, format!("{} succeeded", unit), false),
            Err(err) => (AuditEventType::UnitEnded, format!("{} failed: {}", unit, err), true),
        },
        // the started half carries nothing the ended half lacks
        HookEvent::CollaboratorCallStarted {
            collaborator, operation, ..
        } => (
            AuditEventType::CollaboratorCall,
            format!("{} {} started", collaborator, operation),
            false,
        ),
        HookEvent::CollaboratorCallEnded {
            collaborator,
            operation,
            outcome,
            latency_ms,
            ..
        } => match outcome {
            Ok(()) => (
                AuditEventType::CollaboratorCall,
                format!("{} {} ok in {}ms", collaborator, operation, latency_ms),
                false,
            ),
            Err(err) => (
                AuditEventType::CollaboratorCall,
                format!("{} {} failed in {}ms: {}", collaborator, operation, latency_ms, err),
                true,
            ),
        },
        HookEvent::ErrorRaised { error, recoverable } => (
            AuditEventType::Error,
            if *recoverable {
                format!("recoverable: {}", error)
            } else {
                error.clone()
            },
            true,
        ),
        HookEvent::PhaseChanged { from, to } => (
            AuditEventType::PhaseChange,
            format!("{} -> {}", from, to),
            *to == Phase::Failed,
        ),
    }
}

/// Audit log collector; register it as an observer
pub struct AuditLog {
    entries: Mutex<Vec<AuditEntry>>,
    max_entries: usize,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::with_max_entries(10_000)
    }

    /// Create with a custom max size
    pub fn with_max_entries(max: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            max_entries: max.max(1),
        }
    }

    /// Log an entry, dropping the oldest ones past the limit
    pub fn log(&self, entry: AuditEntry) -> Result<(), ObserverError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| ObserverError("audit log poisoned".into()))?;
        entries.push(entry);

        if entries.len() > self.max_entries {
            let drain_count = entries.len() - self.max_entries;
            entries.drain(0..drain_count);
        }
        Ok(())
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.read(|_| true)
    }

    /// Entries of one run, in sequence order
    pub fn entries_for_run(&self, run_id: RunId) -> Vec<AuditEntry> {
        let mut entries = self.read(|e| e.run_id == run_id);
        entries.sort_by_key(|e| e.seq);
        entries
    }

    pub fn failures(&self) -> Vec<AuditEntry> {
        self.read(|e| e.failed)
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    /// Export to JSON Lines
    pub fn to_jsonl(&self) -> String {
        self.entries()
            .iter()
            .filter_map(|e| serde_json::to_string(e).ok())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn stats(&self) -> AuditStats {
        let entries = self.entries();
        let total = entries.len();
        let failures = entries.iter().filter(|e| e.failed).count();
        let count = |t: AuditEventType| entries.iter().filter(|e| e.event_type == t).count();
        let ended = |phase: &str| {
            entries
                .iter()
                .filter(|e| e.event_type == AuditEventType::PhaseChange && e.detail.ends_with(phase))
                .count()
        };

        AuditStats {
            total,
            failures,
            collaborator_calls: entries
                .iter()
                .filter(|e| e.event_type == AuditEventType::CollaboratorCall && !e.detail.ends_with("started"))
                .count(),
            errors: count(AuditEventType::Error),
            completed_runs: ended("COMPLETED"),
            failed_runs: ended("FAILED"),
            failure_rate: if total > 0 { failures as f64 / total as f64 } else { 0.0 },
        }
    }

    fn read(&self, keep: impl Fn(&AuditEntry) -> bool) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .map(|entries| entries.iter().filter(|e| keep(e)).cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

impl Observer for AuditLog {
    fn name(&self) -> &str {
        "audit"
    }

    fn on_event(&self, envelope: &EventEnvelope) -> Result<(), ObserverError> {
        self.log(AuditEntry::from_envelope(envelope))
    }
}

/// Statistics about audit entries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditStats {
    pub total: usize,
    pub failures: usize,
    pub collaborator_calls: usize,
    pub errors: usize,
    pub completed_runs: usize,
    pub failed_runs: usize,
    pub failure_rate: f64,
}

fn generate_audit_id(timestamp: u64) -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("aud_{:x}_{:04x}", timestamp, counter % 0xFFFF)
}

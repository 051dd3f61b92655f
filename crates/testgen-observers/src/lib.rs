//! Ready-made observers for the hook event stream
//!
//! - [`AuditLog`]: bounded in-memory trail of every event, exportable as JSON Lines
//! - [`MetricsObserver`]: prometheus counters and a latency histogram
//! - [`TracingObserver`]: structured progress output through `tracing`
//!
//! Register any of them on a `HookDispatcher`; none of them can fail a run.

pub mod audit;
pub mod metrics;
pub mod progress;

pub use audit::{AuditEntry, AuditEventType, AuditLog, AuditStats};
pub use metrics::MetricsObserver;
pub use progress::TracingObserver;

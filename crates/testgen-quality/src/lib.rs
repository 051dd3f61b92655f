//! Testgen Quality Gate: draft scoring and the finalize/refine/review decision
//!
//! # Example
//!
//! ```ignore
//! use testgen_quality::{QualityGate, GateDecision};
//!
//! let gate = QualityGate::for_kind(draft.kind);
//! let result = gate.evaluate(&draft);
//!
//! match gate.decide(&result, ctx.attempt_counts()) {
//!     GateDecision::AutoFinalize => { /* persist */ }
//!     GateDecision::Refine => { /* regenerate with result folded in */ }
//!     GateDecision::RequestReview => { /* wait for a human */ }
//! }
//! ```

pub mod checks;
pub mod gate;
pub mod metrics;
pub mod profile;

pub use checks::{Check, CheckStatus};
pub use gate::{GateDecision, QualityGate};
pub use metrics::{DocumentMetrics, QualityRating};
pub use profile::{QualityProfile, QualityProfiles};

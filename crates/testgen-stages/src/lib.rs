//! Testgen Stages: the three task units of the pipeline
//!
//! # Pipeline Flow
//!
//! ```text
//! subject → TicketAnalysis → DocumentGathering → Generation → draft
//!              ↓                  ↓ (fan-out)        ↓
//!          kind + parent      materials + issues   PromptSpec → model
//! ```

mod classify;
mod document_gathering;
mod generation;
mod parent;
mod subject;
mod ticket_analysis;

pub use classify::{classify_attachment, extract_page_links, locators_for};
pub use document_gathering::DocumentGathering;
pub use generation::Generation;
pub use parent::lookup_parent_epic;
pub use subject::extract_subject_key;
pub use ticket_analysis::TicketAnalysis;

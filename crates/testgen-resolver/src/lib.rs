//! Testgen Resolver: gaps in gathered material and how a human closes them
//!
//! After gathering, every category in [`MaterialCategory::ALL`] is either
//! backed by material, resolved, or pending. Pending categories become
//! [`MissingCategoryRequest`]s; each is answered with one
//! [`ResolutionChoice`] and folded back with [`apply_outcome`].

mod request;
mod resolver;

pub use request::{MissingCategoryRequest, ResolutionChoice, ResolutionOutcome};
pub use resolver::{apply_outcome, MissingInputResolver};

#[doc(no_inline)]
pub use testgen_core::MaterialCategory;

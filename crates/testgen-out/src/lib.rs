//! Testgen Out: final artifact rendering and persistence
//!
//! The final document goes through a handlebars template (`final_document`)
//! before it is written, so deployments can wrap it in their own header or
//! footer without touching the pipeline.
//!
//! `FileArtifactStore` is the `ArtifactStore` an embedding application hands
//! to `Collaborators`; nothing in the pipeline constructs it by itself.
//!
//! ```ignore
//! use testgen_out::FileArtifactStore;
//!
//! let store = FileArtifactStore::new("documents")?;
//! let path = store.save(DocumentKind::Plan, "SHOP-1", &draft.text).await?;
//! // documents/FINAL-test-plan-SHOP-1.md
//! ```

pub mod renderer;
pub mod store;
pub mod templates;

pub use renderer::ArtifactRenderer;
pub use store::FileArtifactStore;
pub use templates::{Template, TemplatesFile};

use thiserror::Error;

/// Name of the template every stored artifact is rendered with
pub const FINAL_DOCUMENT: &str = "final_document";

#[derive(Debug, Error)]
pub enum OutError {
    #[error("TEMPLATE/{0}")]
    Template(String),
    #[error("RENDER/{0}")]
    Render(String),
    #[error("IO/{0}")]
    Io(#[from] std::io::Error),
}

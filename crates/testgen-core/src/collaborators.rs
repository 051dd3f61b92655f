//! External collaborator contracts consumed by the task units
use crate::data_model::{DocumentKind, PromptSpec, TicketRecord};
use crate::error::CollaboratorError;
use async_trait::async_trait;
use std::sync::Arc;

/// Ticket-system client
#[async_trait]
pub trait TicketClient: Send + Sync {
    /// Fails with NotFound, Auth or Network
    async fn fetch(&self, subject_id: &str) -> Result<TicketRecord, CollaboratorError>;
}

/// Page/file retrieval plus conversion to plain text
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    /// Fails with NotFound, Unsupported or Network. Empty content is `Ok("")`.
    async fn fetch(&self, locator: &str) -> Result<String, CollaboratorError>;
}

/// Generative-model client
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Fails with RateLimited, Timeout or InvalidResponse
    async fn generate(&self, prompt: &PromptSpec) -> Result<String, CollaboratorError>;
}

/// Final artifact persistence
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Returns the path of the written artifact. Fails with Io.
    async fn save(
        &self,
        kind: DocumentKind,
        subject_id: &str,
        text: &str,
    ) -> Result<String, CollaboratorError>;
}

/// The full set of collaborators a run needs
#[derive(Clone)]
pub struct Collaborators {
    pub tickets: Arc<dyn TicketClient>,
    pub fetcher: Arc<dyn DocumentFetcher>,
    pub model: Arc<dyn ModelClient>,
    pub store: Arc<dyn ArtifactStore>,
}

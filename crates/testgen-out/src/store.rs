//! File-backed artifact store
use crate::renderer::ArtifactRenderer;
use crate::templates::TemplatesFile;
use crate::{OutError, FINAL_DOCUMENT};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::path::{Path, PathBuf};
use testgen_core::{ArtifactStore, CollaboratorError, DocumentKind, WorkflowConfig};

/// Writes `FINAL-{test-plan|test-cases}-{subject}.md` under one directory
pub struct FileArtifactStore {
    dir: PathBuf,
    renderer: ArtifactRenderer,
}

impl FileArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, OutError> {
        Self::with_templates(dir, TemplatesFile::builtin()?)
    }

    pub fn with_templates(dir: impl Into<PathBuf>, templates: TemplatesFile) -> Result<Self, OutError> {
        Ok(Self {
            dir: dir.into(),
            renderer: ArtifactRenderer::new(templates)?,
        })
    }

    /// Store rooted at `artifact_dir`; `templates_path` overrides the built-ins
    pub fn from_config(config: &WorkflowConfig, templates_path: Option<&Path>) -> Result<Self, OutError> {
        let templates = match templates_path {
            Some(path) => TemplatesFile::with_overrides(TemplatesFile::load(path)?)?,
            None => TemplatesFile::builtin()?,
        };
        Self::with_templates(&config.artifact_dir, templates)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name(kind: DocumentKind, subject_id: &str) -> String {
        let subject: String = subject_id
            .trim()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        format!("FINAL-{}-{}.md", kind.slug(), subject)
    }

    pub fn render(&self, kind: DocumentKind, subject_id: &str, text: &str) -> Result<String, OutError> {
        let data = json!({
            "subject_id": subject_id,
            "kind": kind.label(),
            "slug": kind.slug(),
            "text": text,
            "generated_at": Utc::now().to_rfc3339(),
        });
        self.renderer.render(FINAL_DOCUMENT, &data)
    }

    async fn write(&self, kind: DocumentKind, subject_id: &str, text: &str) -> Result<PathBuf, OutError> {
        let rendered = self.render(kind, subject_id, text)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(Self::file_name(kind, subject_id));
        tokio::fs::write(&path, rendered).await?;
        Ok(path)
    }
}

#[async_trait]
impl ArtifactStore for FileArtifactStore {
    async fn save(&self, kind: DocumentKind, subject_id: &str, text: &str) -> Result<String, CollaboratorError> {
        let path = self
            .write(kind, subject_id, text)
            .await
            .map_err(|e| CollaboratorError::Io(e.to_string()))?;
        tracing::info!(subject = subject_id, path = %path.display(), "artifact written");
        Ok(path.display().to_string())
    }
}

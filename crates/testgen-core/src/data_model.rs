//! Data Model: tickets, gathered materials, drafts and quality results
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of test document a run produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentKind {
    /// Test plan, produced for Epics
    Plan,
    /// Test cases, produced for everything else
    Cases,
}

impl DocumentKind {
    /// Fixed rule: an Epic gets a plan, any other ticket type gets cases.
    pub fn from_issue_type(issue_type: &str) -> Self {
        if issue_type.trim().eq_ignore_ascii_case("epic") {
            Self::Plan
        } else {
            Self::Cases
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Plan => "Test Plan",
            Self::Cases => "Test Cases",
        }
    }

    /// File-name friendly form ("test-plan" / "test-cases")
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Plan => "test-plan",
            Self::Cases => "test-cases",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Where a gathered material came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    TicketBody,
    ParentTicket,
    Attachment,
    LinkedPage,
    UserText,
    UserLocator,
}

impl SourceKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::TicketBody => "Ticket",
            Self::ParentTicket => "Parent Epic",
            Self::Attachment => "Attachment",
            Self::LinkedPage => "Linked Page",
            Self::UserText => "User Input",
            Self::UserLocator => "User Document",
        }
    }

    /// Whether the material was supplied by a human during resolution
    pub fn is_user_supplied(&self) -> bool {
        matches!(self, Self::UserText | Self::UserLocator)
    }
}

/// Categories of supporting material the resolver checks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialCategory {
    /// Product requirements (PRD, functional spec, ...)
    Requirements,
    /// High/low level design documents
    Design,
    /// Linked wiki pages
    SupplementaryPages,
}

impl MaterialCategory {
    /// The fixed set, in the order requests are raised
    pub const ALL: [MaterialCategory; 3] = [
        MaterialCategory::Requirements,
        MaterialCategory::Design,
        MaterialCategory::SupplementaryPages,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Requirements => "requirements document",
            Self::Design => "design document",
            Self::SupplementaryPages => "supplementary pages",
        }
    }
}

impl fmt::Display for MaterialCategory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One piece of gathered supporting material
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub source: SourceKind,
    /// Category this material satisfies, if any (ticket bodies satisfy none)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<MaterialCategory>,
    pub content: String,
    /// Locator, ticket key or "user" describing where the text came from
    pub provenance: String,
}

impl Material {
    pub fn new(source: SourceKind, content: impl Into<String>, provenance: impl Into<String>) -> Self {
        Self {
            source,
            category: None,
            content: content.into(),
            provenance: provenance.into(),
        }
    }

    pub fn with_category(mut self, category: MaterialCategory) -> Self {
        self.category = Some(category);
        self
    }
}

/// Ticket attachment metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub filename: String,
    /// Download locator handed to the document fetcher
    pub locator: String,
    #[serde(default)]
    pub content_type: Option<String>,
}

/// Ticket as returned by the ticket client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketRecord {
    pub key: String,
    pub issue_type: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub parent_id: Option<String>,
}

impl TicketRecord {
    pub fn is_epic(&self) -> bool {
        self.issue_type.trim().eq_ignore_ascii_case("epic")
    }
}

/// A generated document. Replaced wholesale on every generation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub subject_id: String,
    pub kind: DocumentKind,
    pub text: String,
    /// 1 for the first generation, incremented on every refinement
    pub revision: u32,
    pub word_count: usize,
    /// Heading count for plans, test-case count for cases
    pub section_count: usize,
    /// blake3 of the text
    pub fingerprint: String,
}

impl Draft {
    pub fn new(subject_id: impl Into<String>, kind: DocumentKind, text: impl Into<String>, revision: u32) -> Self {
        let text = text.into();
        let word_count = text.split_whitespace().count();
        let section_count = match kind {
            DocumentKind::Plan => text
                .lines()
                .filter(|line| line.trim_start().starts_with('#'))
                .count(),
            DocumentKind::Cases => text.to_lowercase().matches("test case").count(),
        };
        let fingerprint = format!("blake3:{}", blake3::hash(text.as_bytes()));

        Self {
            subject_id: subject_id.into(),
            kind,
            text,
            revision,
            word_count,
            section_count,
            fingerprint,
        }
    }
}

/// Quality problem categories; the gate decides which are auto-fixable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    Empty,
    TooShort,
    MissingSections,
    Placeholders,
    Coverage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub category: IssueCategory,
    pub message: String,
}

impl Issue {
    pub fn new(category: IssueCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Structured quality assessment of a draft
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// 0.0 to 1.0
    pub score: f64,
    pub issues: Vec<Issue>,
    pub suggestions: Vec<String>,
    pub missing_sections: Vec<String>,
}

impl ValidationResult {
    pub fn issue_messages(&self) -> Vec<String> {
        self.issues.iter().map(|i| i.message.clone()).collect()
    }

    pub fn has_category(&self, category: IssueCategory) -> bool {
        self.issues.iter().any(|i| i.category == category)
    }
}

/// How a missing category ended up being resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryResolution {
    Supplied,
    Skipped,
    /// Parent was checked and had nothing; counts as skipped
    DeferredToParent,
}

/// Request for human input raised by a task unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputRequest {
    pub reason: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptMode {
    Initial,
    Refine,
}

/// Structured generation input handed to the model client.
///
/// Prompt wording belongs to the model client; this only carries the facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptSpec {
    pub mode: PromptMode,
    pub kind: DocumentKind,
    pub subject_id: String,
    pub title: String,
    pub source_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prior_draft: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationResult>,
    #[serde(default)]
    pub feedback: Vec<String>,
}

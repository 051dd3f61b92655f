//! Testing utilities for the testgen workspace
//!
//! Scripted collaborators, a recording observer and document fixtures.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use testgen_core::{
    ArtifactStore, Attachment, CollaboratorError, Collaborators, DocumentFetcher, DocumentKind,
    EventEnvelope, HookEvent, ModelClient, Observer, ObserverError, PromptSpec, TicketClient,
    TicketRecord,
};

// ============================================================================
// Fixtures
// ============================================================================

pub fn ticket(key: &str, issue_type: &str) -> TicketRecord {
    TicketRecord {
        key: key.to_string(),
        issue_type: issue_type.to_string(),
        title: format!("{} title", key),
        body: String::new(),
        attachments: Vec::new(),
        parent_id: None,
    }
}

pub fn epic(key: &str) -> TicketRecord {
    ticket(key, "Epic")
}

pub fn attachment(id: &str, filename: &str) -> Attachment {
    Attachment {
        id: id.to_string(),
        filename: filename.to_string(),
        locator: format!("https://files.example.com/{}/{}", id, filename),
        content_type: None,
    }
}

/// A plan that passes every default quality check
pub fn good_plan_text() -> String {
    [
        "# Introduction",
        "This plan covers the login epic end to end for web and mobile clients.",
        "## Scope of Testing",
        "Authentication, session handling and password reset flows.",
        "## Test Objectives",
        "Verify correctness, security and resilience of the login journey.",
        "## Testing Approach",
        "Risk based functional testing supported by automated regression suites.",
        "## Test Schedule",
        "Two sprints, starting after feature freeze.",
        "## Test Environment",
        "Staging cluster with production-like data and third party sandboxes.",
    ]
    .join("\n")
}

/// Test cases that pass every default quality check
pub fn good_cases_text() -> String {
    let mut out = String::from("# Test Cases\n");
    for n in 1..=3 {
        out.push_str(&format!(
            "## Test Case ID: TC-{n}\nTest Case Title: Login scenario {n}\nDescription: exercise login path {n}\n\
             Preconditions: user account exists\nTest Steps: open page, enter credentials, submit\n\
             Expected Result: user lands on dashboard\n"
        ));
    }
    out
}

// ============================================================================
// Ticket client
// ============================================================================

#[derive(Default)]
pub struct ScriptedTickets {
    tickets: Mutex<HashMap<String, TicketRecord>>,
    failures: Mutex<HashMap<String, VecDeque<CollaboratorError>>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTickets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ticket(self, ticket: TicketRecord) -> Self {
        self.tickets.lock().unwrap().insert(ticket.key.clone(), ticket);
        self
    }

    /// Fail the next fetches of `key` with these errors, in order
    pub fn failing(self, key: &str, errors: Vec<CollaboratorError>) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(key.to_string(), errors.into_iter().collect());
        self
    }

    /// Sleep before answering every fetch of `key`
    pub fn with_delay(self, key: &str, delay: Duration) -> Self {
        self.delays.lock().unwrap().insert(key.to_string(), delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TicketClient for ScriptedTickets {
    async fn fetch(&self, subject_id: &str) -> Result<TicketRecord, CollaboratorError> {
        self.calls.lock().unwrap().push(subject_id.to_string());
        let delay = self.delays.lock().unwrap().get(subject_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(queue) = self.failures.lock().unwrap().get_mut(subject_id) {
            if let Some(err) = queue.pop_front() {
                return Err(err);
            }
        }
        self.tickets
            .lock()
            .unwrap()
            .get(subject_id)
            .cloned()
            .ok_or_else(|| CollaboratorError::NotFound(subject_id.to_string()))
    }
}

// ============================================================================
// Document fetcher
// ============================================================================

#[derive(Default)]
pub struct ScriptedFetcher {
    documents: Mutex<HashMap<String, Result<String, CollaboratorError>>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(self, locator: &str, text: &str) -> Self {
        self.documents
            .lock()
            .unwrap()
            .insert(locator.to_string(), Ok(text.to_string()));
        self
    }

    pub fn with_error(self, locator: &str, err: CollaboratorError) -> Self {
        self.documents.lock().unwrap().insert(locator.to_string(), Err(err));
        self
    }

    pub fn with_delay(self, locator: &str, delay: Duration) -> Self {
        self.delays.lock().unwrap().insert(locator.to_string(), delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentFetcher for ScriptedFetcher {
    async fn fetch(&self, locator: &str) -> Result<String, CollaboratorError> {
        self.calls.lock().unwrap().push(locator.to_string());
        let delay = self.delays.lock().unwrap().get(locator).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.documents
            .lock()
            .unwrap()
            .get(locator)
            .cloned()
            .unwrap_or_else(|| Err(CollaboratorError::NotFound(locator.to_string())))
    }
}

// ============================================================================
// Model client
// ============================================================================

/// Replays responses in order; the last one repeats once the script runs out
#[derive(Default)]
pub struct ScriptedModel {
    responses: Mutex<VecDeque<Result<String, CollaboratorError>>>,
    last: Mutex<Option<Result<String, CollaboratorError>>>,
    prompts: Mutex<Vec<PromptSpec>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<Result<String, CollaboratorError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn always(text: impl Into<String>) -> Self {
        Self::new(vec![Ok(text.into())])
    }

    pub fn prompts(&self) -> Vec<PromptSpec> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn generate(&self, prompt: &PromptSpec) -> Result<String, CollaboratorError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        let next = self.responses.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        match next {
            Some(response) => {
                *last = Some(response.clone());
                response
            }
            None => last
                .clone()
                .unwrap_or_else(|| Err(CollaboratorError::InvalidResponse("no scripted response".into()))),
        }
    }
}

// ============================================================================
// Artifact store
// ============================================================================

#[derive(Default)]
pub struct MemoryStore {
    saved: Mutex<Vec<(DocumentKind, String, String)>>,
    failures: Mutex<VecDeque<CollaboratorError>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(errors: Vec<CollaboratorError>) -> Self {
        Self {
            failures: Mutex::new(errors.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn saved(&self) -> Vec<(DocumentKind, String, String)> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn save(&self, kind: DocumentKind, subject_id: &str, text: &str) -> Result<String, CollaboratorError> {
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.saved
            .lock()
            .unwrap()
            .push((kind, subject_id.to_string(), text.to_string()));
        Ok(format!("memory://FINAL-{}-{}.md", kind.slug(), subject_id))
    }
}

// ============================================================================
// Observer
// ============================================================================

#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<EventEnvelope>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<HookEvent> {
        self.events.lock().unwrap().iter().map(|e| e.event.clone()).collect()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.event.kind()).collect()
    }
}

impl Observer for RecordingObserver {
    fn name(&self) -> &str {
        "recording"
    }

    fn on_event(&self, envelope: &EventEnvelope) -> Result<(), ObserverError> {
        self.events.lock().unwrap().push(envelope.clone());
        Ok(())
    }
}

// ============================================================================
// Bundles
// ============================================================================

/// Typed handles to the fakes plus the trait-object bundle built from them
pub struct Fakes {
    pub tickets: Arc<ScriptedTickets>,
    pub fetcher: Arc<ScriptedFetcher>,
    pub model: Arc<ScriptedModel>,
    pub store: Arc<MemoryStore>,
}

impl Fakes {
    pub fn new(tickets: ScriptedTickets, fetcher: ScriptedFetcher, model: ScriptedModel, store: MemoryStore) -> Self {
        Self {
            tickets: Arc::new(tickets),
            fetcher: Arc::new(fetcher),
            model: Arc::new(model),
            store: Arc::new(store),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            tickets: self.tickets.clone(),
            fetcher: self.fetcher.clone(),
            model: self.model.clone(),
            store: self.store.clone(),
        }
    }
}

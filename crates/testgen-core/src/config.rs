//! Workflow configuration: retry policy, fetch limits, input policy
use crate::error::TestgenError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What to do with missing categories before asking a human
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingInputPolicy {
    /// Suspend in AWAITING_INPUT straight away
    Ask,
    /// Try the parent Epic for every missing category, then ask
    CheckParentThenAsk,
    /// Skip every missing category (unattended runs)
    SkipAll,
}

/// Document sources, in merge order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceSpec {
    TicketBody,
    ParentTicket,
    Attachments,
    LinkedPages,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Attempts per phase entry before a transient failure becomes fatal
    pub max_attempts_per_phase: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Per-source fetch bound; stragglers become transient failures
    pub fetch_timeout_ms: u64,
    /// Extra persistence attempts in FINALIZING
    pub persistence_retries: u32,
    /// Below this many body characters a non-Epic is enriched from its parent
    pub min_scope_chars: usize,
    pub missing_input_policy: MissingInputPolicy,
    pub artifact_dir: String,
    pub sources: Vec<SourceSpec>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_attempts_per_phase: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 8_000,
            fetch_timeout_ms: 30_000,
            persistence_retries: 1,
            min_scope_chars: 200,
            missing_input_policy: MissingInputPolicy::Ask,
            artifact_dir: "documents".to_string(),
            sources: vec![
                SourceSpec::TicketBody,
                SourceSpec::ParentTicket,
                SourceSpec::Attachments,
                SourceSpec::LinkedPages,
            ],
        }
    }
}

impl WorkflowConfig {
    /// Parse from YAML; absent keys keep their defaults
    pub fn from_yaml(yaml: &str) -> Result<Self, TestgenError> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| TestgenError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML file and apply `TESTGEN_*` environment overrides
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))?;
        let mut config = Self::from_yaml(&yaml)?;
        config.apply_env()?;
        Ok(config)
    }

    /// Override fields from `TESTGEN_MAX_ATTEMPTS`, `TESTGEN_FETCH_TIMEOUT_MS`,
    /// `TESTGEN_ARTIFACT_DIR` and `TESTGEN_MISSING_INPUT_POLICY`
    pub fn apply_env(&mut self) -> Result<(), TestgenError> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars(&mut self, get: impl Fn(&str) -> Option<String>) -> Result<(), TestgenError> {
        if let Some(v) = get("TESTGEN_MAX_ATTEMPTS") {
            self.max_attempts_per_phase = parse_var("TESTGEN_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("TESTGEN_FETCH_TIMEOUT_MS") {
            self.fetch_timeout_ms = parse_var("TESTGEN_FETCH_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("TESTGEN_ARTIFACT_DIR") {
            self.artifact_dir = v;
        }
        if let Some(v) = get("TESTGEN_MISSING_INPUT_POLICY") {
            self.missing_input_policy = serde_yaml::from_str(&v)
                .map_err(|_| TestgenError::Config(format!("unknown missing input policy '{}'", v)))?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), TestgenError> {
        if self.max_attempts_per_phase == 0 {
            return Err(TestgenError::Config("max_attempts_per_phase must be at least 1".into()));
        }
        if self.sources.is_empty() {
            return Err(TestgenError::Config("at least one document source is required".into()));
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, TestgenError> {
    value
        .trim()
        .parse()
        .map_err(|_| TestgenError::Config(format!("{} has invalid value '{}'", key, value)))
}

//! Bounded retry with exponential backoff
use std::time::Duration;
use testgen_core::WorkflowConfig;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_ms: u64,
    max_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_ms: u64, max_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_ms,
            max_ms,
        }
    }

    pub fn from_config(config: &WorkflowConfig) -> Self {
        Self::new(config.max_attempts_per_phase, config.backoff_base_ms, config.backoff_max_ms)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether another attempt may follow attempt number `attempt` (1-based)
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay before retry number `retry` (1-based), doubling up to the cap
    pub fn delay(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(16);
        let ms = self.base_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(ms.min(self.max_ms))
    }

    /// Sleep before retry `retry`. Returns false if cancelled meanwhile.
    pub async fn pause(&self, retry: u32, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.delay(retry)) => true,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&WorkflowConfig::default())
    }
}

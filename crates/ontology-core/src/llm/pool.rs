//! `Pool(Retry(Breaker(RawClient)))`: the only entry point executors use to talk to
//! an LLM. Bounds in-flight calls, retries transient failures, and refuses to call
//! the raw client at all while its breaker is open.

use crate::config::RuntimeConfig;
use crate::error::OntologyError;
use crate::llm::breaker::CircuitBreaker;
use crate::llm::client::{LlmClient, LlmRequest, LlmResponse};
use crate::llm::retry::with_retry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::info;

/// Point-in-time read of [`LlmPool`]'s counters. spec.md:92's observability
/// requirement: `{submitted, completed, tokens, retries, breakerTrips}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LlmMetricsSnapshot {
    pub submitted: u64,
    pub completed: u64,
    pub tokens: u64,
    pub retries: u64,
    pub breaker_trips: u64,
}

#[derive(Default)]
struct LlmMetrics {
    submitted: AtomicU64,
    completed: AtomicU64,
    tokens: AtomicU64,
    retries: AtomicU64,
    breaker_trips: AtomicU64,
}

pub struct LlmPool {
    client: Arc<dyn LlmClient>,
    breaker: CircuitBreaker,
    semaphore: Semaphore,
    retry_attempts: u32,
    metrics: LlmMetrics,
}

impl LlmPool {
    pub fn new(client: Arc<dyn LlmClient>, config: &RuntimeConfig) -> Self {
        Self {
            client,
            breaker: CircuitBreaker::new(
                config.circuit_breaker_threshold,
                config.circuit_breaker_cooldown(),
            ),
            semaphore: Semaphore::new(config.llm_max_concurrent as usize),
            retry_attempts: config.llm_retry_attempts,
            metrics: LlmMetrics::default(),
        }
    }

    /// Acquires a concurrency permit, checks the breaker, and retries transient
    /// failures. Returns `CircuitOpen` without touching the raw client when the
    /// breaker has tripped and the cooldown has not yet elapsed. Every call is
    /// counted into [`LlmPool::metrics`] and, when `request.workflow_id` is set,
    /// logged with it for per-run audit.
    pub async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, OntologyError> {
        self.metrics.submitted.fetch_add(1, Ordering::Relaxed);
        let workflow_id = request.workflow_id;

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| OntologyError::Cancelled)?;

        if !self.breaker.allow() {
            self.metrics.breaker_trips.fetch_add(1, Ordering::Relaxed);
            return Err(OntologyError::CircuitOpen);
        }

        let client = Arc::clone(&self.client);
        let result = with_retry(
            self.retry_attempts,
            || {
                let client = Arc::clone(&client);
                let request = request.clone();
                async move { client.complete(request).await }
            },
            || {
                self.metrics.retries.fetch_add(1, Ordering::Relaxed);
            },
        )
        .await;

        match &result {
            Ok(resp) => {
                self.breaker.on_success();
                self.metrics.completed.fetch_add(1, Ordering::Relaxed);
                self.metrics.tokens.fetch_add(resp.token_counts.total as u64, Ordering::Relaxed);
                info!(?workflow_id, tokens = resp.token_counts.total, "llm call completed");
            }
            Err(e) if e.is_retryable() => self.breaker.on_failure(),
            Err(_) => {}
        }

        result
    }

    /// Snapshot of the pool's call counters, for process-wide observability export.
    pub fn metrics(&self) -> LlmMetricsSnapshot {
        LlmMetricsSnapshot {
            submitted: self.metrics.submitted.load(Ordering::Relaxed),
            completed: self.metrics.completed.load(Ordering::Relaxed),
            tokens: self.metrics.tokens.load(Ordering::Relaxed),
            retries: self.metrics.retries.load(Ordering::Relaxed),
            breaker_trips: self.metrics.breaker_trips.load(Ordering::Relaxed),
        }
    }
}

impl Clone for LlmRequest {
    fn clone(&self) -> Self {
        Self {
            messages: self.messages.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            workflow_id: self.workflow_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::ChatMessage;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyClient {
        fail_first_n: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl LlmClient for FlakyClient {
        async fn complete(&self, _request: LlmRequest) -> Result<LlmResponse, OntologyError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first_n {
                Err(OntologyError::TransientExternal("unreachable".into()))
            } else {
                Ok(LlmResponse {
                    content: "ok".into(),
                    token_counts: crate::llm::client::TokenCounts { prompt: 10, completion: 5, total: 15 },
                })
            }
        }
    }

    fn req() -> LlmRequest {
        LlmRequest {
            messages: vec![ChatMessage::user("hi")],
            temperature: 0.0,
            max_tokens: 16,
            workflow_id: None,
        }
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let client = Arc::new(FlakyClient { fail_first_n: 2, calls: AtomicU32::new(0) });
        let config = RuntimeConfig { llm_retry_attempts: 5, ..RuntimeConfig::default() };
        let pool = LlmPool::new(client, &config);
        let resp = pool.complete(req()).await.unwrap();
        assert_eq!(resp.content, "ok");
        let m = pool.metrics();
        assert_eq!(m.submitted, 1);
        assert_eq!(m.completed, 1);
        assert_eq!(m.retries, 2);
        assert_eq!(m.tokens, 15);
    }

    #[tokio::test]
    async fn breaker_opens_after_threshold_and_rejects_without_calling_client() {
        let client = Arc::new(FlakyClient { fail_first_n: 100, calls: AtomicU32::new(0) });
        let config = RuntimeConfig {
            llm_retry_attempts: 1,
            circuit_breaker_threshold: 2,
            ..RuntimeConfig::default()
        };
        let pool = LlmPool::new(client, &config);
        assert!(pool.complete(req()).await.is_err());
        assert!(pool.complete(req()).await.is_err());
        match pool.complete(req()).await {
            Err(OntologyError::CircuitOpen) => {}
            other => panic!("expected CircuitOpen, got {other:?}"),
        }
        assert_eq!(pool.metrics().breaker_trips, 1);
    }
}

//! LLM worker pool: `Pool(Retry(Breaker(RawClient)))`.
//!
//! Executors never talk to `LlmClient` directly; they go through [`LlmPool`], which
//! bounds concurrency, retries transient failures, and trips a circuit breaker on the
//! raw client before it is allowed to make another call.

mod breaker;
mod client;
mod pool;
mod retry;

pub use breaker::{CircuitBreaker, CircuitState};
pub use client::{ChatMessage, LlmClient, LlmRequest, LlmResponse, OpenRouterClient, TokenCounts};
pub use pool::{LlmMetricsSnapshot, LlmPool};
pub use retry::with_retry;

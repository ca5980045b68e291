//! Closed error taxonomy for the ontology-extraction DAG runtime.
//!
//! Every fallible operation in this crate returns `Result<_, OntologyError>`. Callers
//! match on [`OntologyError::kind`] rather than on the concrete variant so that new
//! transient-vs-fatal distinctions can be added without breaking call sites.

use std::fmt;

/// Behavior-based classification, independent of the underlying library error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller fault; surfaced immediately, never retried.
    Validation,
    /// Requested entity does not exist.
    NotFound,
    /// Transient external failure (network, timeout, 5xx, rate limit); retried by the pool.
    TransientExternal,
    /// Permanent external failure (auth, quota, malformed response); stops the stage.
    PermanentExternal,
    /// LLM circuit breaker is open; caller should back off and re-queue.
    CircuitOpen,
    /// Cooperative cancellation; propagates unchanged.
    Cancelled,
    /// Missing provenance, missing tenant scope, or a broken invariant. Panic-equivalent.
    FatalInvariant,
}

#[derive(Debug, thiserror::Error)]
pub enum OntologyError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transient external error: {0}")]
    TransientExternal(String),

    #[error("permanent external error: {0}")]
    PermanentExternal(String),

    #[error("circuit breaker open, retry after cooldown")]
    CircuitOpen,

    #[error("operation cancelled")]
    Cancelled,

    #[error("fatal invariant violation: {0}")]
    FatalInvariant(String),
}

impl OntologyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::TransientExternal(_) => ErrorKind::TransientExternal,
            Self::PermanentExternal(_) => ErrorKind::PermanentExternal,
            Self::CircuitOpen => ErrorKind::CircuitOpen,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::FatalInvariant(_) => ErrorKind::FatalInvariant,
        }
    }

    /// Whether a worker pool should retry the call that produced this error.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::TransientExternal)
    }

    pub fn fatal_invariant(msg: impl fmt::Display) -> Self {
        Self::FatalInvariant(msg.to_string())
    }

    pub fn not_found(entity: &str, id: impl fmt::Display) -> Self {
        Self::NotFound(format!("{entity} {id}"))
    }
}

impl From<sqlx::Error> for OntologyError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("row not found".to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed => {
                Self::TransientExternal(err.to_string())
            }
            other => Self::PermanentExternal(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for OntologyError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            Self::TransientExternal(err.to_string())
        } else if let Some(status) = err.status() {
            if status.is_server_error() || status.as_u16() == 429 {
                Self::TransientExternal(err.to_string())
            } else {
                Self::PermanentExternal(err.to_string())
            }
        } else {
            Self::TransientExternal(err.to_string())
        }
    }
}

pub type OntologyResult<T> = Result<T, OntologyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_external_is_retryable() {
        assert!(OntologyError::TransientExternal("x".into()).is_retryable());
        assert!(!OntologyError::PermanentExternal("x".into()).is_retryable());
        assert!(!OntologyError::Validation("x".into()).is_retryable());
        assert!(!OntologyError::CircuitOpen.is_retryable());
    }

    #[test]
    fn not_found_formats_entity_and_id() {
        let err = OntologyError::not_found("dag", uuid::Uuid::nil());
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}

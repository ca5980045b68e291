//! The ambient request value threaded through every repository/executor call:
//! cancellation signal, optional tenant scope, optional provenance. Modeled as an
//! explicit struct passed by reference rather than thread-local state, per the
//! "ambient request value" design note.

use crate::error::OntologyError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a mutating write came from. Attached to every persistent write; missing
/// provenance on a mutating path is a [`OntologyError::FatalInvariant`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvenanceSource {
    /// Direct user action.
    Manual,
    /// Written by the DAG runtime on behalf of the triggering user.
    Inferred,
    /// Written via an MCP tool invocation.
    Mcp,
    /// Bulk-loaded.
    Import,
}

/// `{source, userID}` attached to every mutating write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    pub source: ProvenanceSource,
    pub user_id: Uuid,
}

impl Provenance {
    pub fn new(source: ProvenanceSource, user_id: Uuid) -> Self {
        Self { source, user_id }
    }

    pub fn inferred(user_id: Uuid) -> Self {
        Self::new(ProvenanceSource::Inferred, user_id)
    }

    pub fn manual(user_id: Uuid) -> Self {
        Self::new(ProvenanceSource::Manual, user_id)
    }
}

/// Per-project database connection context. A missing scope on a call that requires
/// one is a programmer error and aborts the operation as [`OntologyError::FatalInvariant`].
#[derive(Debug, Clone)]
pub struct TenantScope {
    pub project_id: Uuid,
}

impl TenantScope {
    pub fn new(project_id: Uuid) -> Self {
        Self { project_id }
    }
}

/// The concrete realization of the DAG runtime's "ambient request value": a
/// cancellation receiver plus optional tenant scope and provenance, threaded
/// explicitly through every call. Construct once per DAG run; never store in a
/// global or thread-local.
#[derive(Clone)]
pub struct RunContext {
    cancelled: tokio::sync::watch::Receiver<bool>,
    tenant_scope: Option<TenantScope>,
    provenance: Option<Provenance>,
    workflow_id: Option<Uuid>,
}

impl RunContext {
    pub fn new(cancelled: tokio::sync::watch::Receiver<bool>) -> Self {
        Self {
            cancelled,
            tenant_scope: None,
            provenance: None,
            workflow_id: None,
        }
    }

    pub fn with_tenant_scope(mut self, scope: TenantScope) -> Self {
        self.tenant_scope = Some(scope);
        self
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = Some(provenance);
        self
    }

    /// Tags this run with the DAG's id so downstream LLM calls can attach it for audit.
    pub fn with_workflow_id(mut self, workflow_id: Uuid) -> Self {
        self.workflow_id = Some(workflow_id);
        self
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    /// Suspends until cancellation is signalled. Call at suspension points (DB
    /// round-trips, LLM calls, explicit yields) to honor cooperative cancellation.
    pub async fn cancelled(&mut self) {
        let _ = self.cancelled.changed().await;
    }

    /// Returns the tenant scope or a [`OntologyError::FatalInvariant`] if the contract
    /// required one and none is present.
    pub fn require_tenant_scope(&self) -> Result<&TenantScope, OntologyError> {
        self.tenant_scope
            .as_ref()
            .ok_or_else(|| OntologyError::fatal_invariant("missing tenant scope in RunContext"))
    }

    pub fn require_provenance(&self) -> Result<&Provenance, OntologyError> {
        self.provenance
            .as_ref()
            .ok_or_else(|| OntologyError::fatal_invariant("missing provenance in RunContext"))
    }

    pub fn tenant_scope(&self) -> Option<&TenantScope> {
        self.tenant_scope.as_ref()
    }

    pub fn provenance(&self) -> Option<&Provenance> {
        self.provenance.as_ref()
    }

    pub fn workflow_id(&self) -> Option<Uuid> {
        self.workflow_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_provenance_is_fatal_invariant() {
        let (_tx, rx) = tokio::sync::watch::channel(false);
        let ctx = RunContext::new(rx);
        let err = ctx.require_provenance().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::FatalInvariant);
    }

    #[test]
    fn with_provenance_round_trips() {
        let (_tx, rx) = tokio::sync::watch::channel(false);
        let user_id = Uuid::new_v4();
        let ctx = RunContext::new(rx).with_provenance(Provenance::inferred(user_id));
        assert_eq!(ctx.require_provenance().unwrap().user_id, user_id);
    }
}

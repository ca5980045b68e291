//! Persistence traits for the DAG runtime. Two implementations: [`memory`] (dashmap,
//! used in tests and the scenario suite) and [`postgres`] (sqlx, behind the
//! `postgres-integration` feature).

pub mod memory;
#[cfg(feature = "postgres-integration")]
pub mod postgres;

use crate::error::OntologyResult;
use crate::model::{
    Dag, DagNode, KnowledgeFact, NodeName, Ontology, OntologyQuestion, PendingChange,
    Project, RelationshipCandidate, SchemaSnapshot, WorkflowEntityState,
};
use async_trait::async_trait;
use uuid::Uuid;

/// DAG lifecycle and ownership. Every write that changes who owns a DAG or what
/// state it is in goes through here so the claim CAS and the ownership invariant
/// live in one place per backend.
#[async_trait]
pub trait DagRepository: Send + Sync {
    async fn create_dag(&self, project_id: Uuid, datasource_id: Uuid) -> OntologyResult<Dag>;

    async fn get_dag(&self, dag_id: Uuid) -> OntologyResult<Dag>;

    /// The project's single running-or-pending DAG, if any (Invariant: at most one).
    async fn active_dag_for_project(&self, project_id: Uuid) -> OntologyResult<Option<Dag>>;

    async fn nodes_for_dag(&self, dag_id: Uuid) -> OntologyResult<Vec<DagNode>>;

    /// Atomic compare-and-swap: succeeds only when the DAG is unowned or its owner's
    /// heartbeat is older than `stale_after`. A losing race is not an error; callers
    /// check the returned bool. (Open Question 3: a losing CAS never retries.)
    async fn claim_ownership(
        &self,
        dag_id: Uuid,
        owner_id: Uuid,
        stale_after: chrono::Duration,
    ) -> OntologyResult<bool>;

    async fn release_ownership(&self, dag_id: Uuid, owner_id: Uuid) -> OntologyResult<()>;

    async fn refresh_heartbeat(&self, dag_id: Uuid, owner_id: Uuid) -> OntologyResult<()>;

    async fn mark_dag_running(&self, dag_id: Uuid) -> OntologyResult<()>;

    async fn mark_dag_completed(&self, dag_id: Uuid, ontology_id: Uuid) -> OntologyResult<()>;

    async fn mark_dag_failed(&self, dag_id: Uuid, error: &str) -> OntologyResult<()>;

    async fn mark_dag_cancelled(&self, dag_id: Uuid) -> OntologyResult<()>;

    async fn set_current_node(&self, dag_id: Uuid, node: NodeName) -> OntologyResult<()>;

    async fn update_node(&self, node: &DagNode) -> OntologyResult<()>;

    /// DAGs whose heartbeat has gone stale while `Running` — crash-recovery candidates.
    async fn stale_running_dags(&self, stale_after: chrono::Duration) -> OntologyResult<Vec<Dag>>;
}

/// Ontology snapshots, table/column metadata, and the review-queue entities that sit
/// on top of an ontology (questions, pending changes, workflow checkpoints).
#[async_trait]
pub trait OntologyRepository: Send + Sync {
    async fn create_draft(&self, project_id: Uuid) -> OntologyResult<Ontology>;

    async fn get(&self, ontology_id: Uuid) -> OntologyResult<Ontology>;

    async fn active_for_project(&self, project_id: Uuid) -> OntologyResult<Option<Ontology>>;

    async fn save(&self, ontology: &Ontology) -> OntologyResult<()>;

    /// Atomically flips `is_active` for exactly one ontology per project.
    async fn activate(&self, ontology_id: Uuid) -> OntologyResult<()>;

    async fn questions_for_ontology(&self, ontology_id: Uuid) -> OntologyResult<Vec<OntologyQuestion>>;

    async fn save_question(&self, question: &OntologyQuestion) -> OntologyResult<()>;

    /// Direct write performed by `OntologyQuestionService::answer` (Open Question 1):
    /// never re-triggers a DAG node.
    async fn answer_question(
        &self,
        ontology_id: Uuid,
        question_id: Uuid,
        table_name: &str,
        column_name: &str,
        answer: &str,
        provenance: crate::context::Provenance,
    ) -> OntologyResult<()>;

    async fn pending_changes_for_project(&self, project_id: Uuid) -> OntologyResult<Vec<PendingChange>>;

    async fn save_pending_change(&self, change: &PendingChange) -> OntologyResult<()>;

    async fn workflow_state(
        &self,
        project_id: Uuid,
        ontology_id: Uuid,
        workflow: &str,
    ) -> OntologyResult<Vec<WorkflowEntityState>>;

    async fn save_workflow_state(&self, state: &WorkflowEntityState) -> OntologyResult<()>;
}

/// Free-text business knowledge seeded from project overview / prior answers.
#[async_trait]
pub trait KnowledgeRepository: Send + Sync {
    async fn facts_for_project(&self, project_id: Uuid) -> OntologyResult<Vec<KnowledgeFact>>;

    /// Upserts on `(project_id, fact_type, key)`.
    async fn upsert_fact(&self, fact: &KnowledgeFact) -> OntologyResult<()>;
}

/// Relationship candidates discovered by FkDiscovery / PkMatchDiscovery.
#[async_trait]
pub trait RelationshipRepository: Send + Sync {
    async fn candidates_for_ontology(&self, ontology_id: Uuid) -> OntologyResult<Vec<RelationshipCandidate>>;

    async fn save_candidate(&self, candidate: &RelationshipCandidate) -> OntologyResult<()>;
}

/// Project and datasource schema lookups. Read-mostly; the schema snapshot itself is
/// produced by the datasource adapter (`crate::adapters`), not by the DAG runtime.
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn get(&self, project_id: Uuid) -> OntologyResult<Project>;

    async fn latest_schema_snapshot(&self, datasource_id: Uuid) -> OntologyResult<SchemaSnapshot>;
}

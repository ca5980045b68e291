//! Node executors: one struct per canonical node, dispatched through a closed
//! `NodeExecutor` enum rather than `Box<dyn>`, since the node set is fixed by
//! [`crate::model::NodeName::canonical_order`] and never loaded dynamically.
//!
//! Grounded on `orchestrator/mod.rs`'s `AgentSkill` trait (uniform `execute(ctx,
//! payload) -> Result<Value, Error>` across heterogeneous skills), generalized to a
//! closed sum type: every node already knows its own concrete input/output shape, so
//! there is no registry-by-name lookup to replicate.

mod column_enrichment;
mod column_features;
mod finalization;
mod fk_discovery;
mod knowledge_seeding;
mod pk_match;
mod table_features;

use crate::adapters::QueryExecutor;
use crate::config::RuntimeConfig;
use crate::context::RunContext;
use crate::error::OntologyResult;
use crate::llm::LlmPool;
use crate::model::{
    NodeName, NodeProgress, OntologyQuestion, OntologyQuestionStatus, QuestionPriority,
    RelationshipCandidate,
};
use crate::repository::{
    KnowledgeRepository, OntologyRepository, ProjectRepository, RelationshipRepository,
};
use std::sync::Arc;

pub use column_enrichment::ColumnEnrichmentExecutor;
pub use column_features::ColumnFeatureExtractionExecutor;
pub use finalization::OntologyFinalizationExecutor;
pub use fk_discovery::FkDiscoveryExecutor;
pub use knowledge_seeding::KnowledgeSeedingExecutor;
pub use pk_match::PkMatchDiscoveryExecutor;
pub use table_features::TableFeatureExtractionExecutor;

fn affected_columns(candidate: &RelationshipCandidate) -> Vec<String> {
    vec![
        format!("{}.{}", candidate.source_table, candidate.source_column),
        format!("{}.{}", candidate.target_table, candidate.target_column),
    ]
}

/// Builds the human review item for a relationship candidate that didn't resolve to
/// a confident accept/reject, so it surfaces as a required question gating ontology
/// activation rather than silently sitting `pending` in the relationship graph.
pub(crate) fn relationship_review_question(candidate: &RelationshipCandidate) -> OntologyQuestion {
    OntologyQuestion {
        id: uuid::Uuid::new_v4(),
        ontology_id: candidate.ontology_id,
        category: "relationship".to_string(),
        text: format!(
            "Is {}.{} a foreign key to {}.{}?",
            candidate.source_table, candidate.source_column, candidate.target_table, candidate.target_column,
        ),
        priority: QuestionPriority::Medium,
        is_required: true,
        status: OntologyQuestionStatus::Pending,
        affects_tables: vec![candidate.source_table.clone(), candidate.target_table.clone()],
        affects_columns: affected_columns(candidate),
        parent_question_id: None,
    }
}

/// True when `existing` already carries a review question for this exact candidate
/// relationship, so re-running a discovery node doesn't pile up duplicate questions
/// on every pass.
pub(crate) fn has_open_relationship_question(
    existing: &[OntologyQuestion],
    candidate: &RelationshipCandidate,
) -> bool {
    let columns = affected_columns(candidate);
    existing.iter().any(|q| q.category == "relationship" && q.affects_columns == columns)
}

/// Shared handles every executor needs: repositories, the LLM pool, and the
/// runtime's tunables. Cloned cheaply (every field is an `Arc`).
#[derive(Clone)]
pub struct ExecutorDeps {
    pub ontology_repo: Arc<dyn OntologyRepository>,
    pub knowledge_repo: Arc<dyn KnowledgeRepository>,
    pub relationship_repo: Arc<dyn RelationshipRepository>,
    pub project_repo: Arc<dyn ProjectRepository>,
    pub query_executor: Arc<dyn QueryExecutor>,
    pub llm: Arc<LlmPool>,
    pub config: Arc<RuntimeConfig>,
}

/// Invoked after each unit of work a node completes so the runtime can persist
/// `DagNode.progress` without the executor knowing about the repository layer.
pub type ProgressCallback<'a> = Box<dyn FnMut(NodeProgress) + Send + 'a>;

/// Uniform contract every canonical node implements.
#[async_trait::async_trait]
pub trait NodeExecutor: Send + Sync {
    /// Runs this node's algorithm to completion. Idempotent: re-running against the
    /// same `(project_id, ontology_id)` after a crash produces the same end state,
    /// not duplicate work.
    async fn execute(
        &self,
        ctx: &RunContext,
        project_id: uuid::Uuid,
        ontology_id: uuid::Uuid,
        datasource_id: uuid::Uuid,
        progress: ProgressCallback<'_>,
    ) -> OntologyResult<()>;
}

/// Closed sum type over the seven scheduled nodes (`Glossary` is deliberately absent
/// — see `NodeName::canonical_order`).
pub enum NodeExecutorKind {
    KnowledgeSeeding(KnowledgeSeedingExecutor),
    ColumnFeatureExtraction(ColumnFeatureExtractionExecutor),
    FkDiscovery(FkDiscoveryExecutor),
    TableFeatureExtraction(TableFeatureExtractionExecutor),
    PkMatchDiscovery(PkMatchDiscoveryExecutor),
    ColumnEnrichment(ColumnEnrichmentExecutor),
    OntologyFinalization(OntologyFinalizationExecutor),
}

impl NodeExecutorKind {
    pub fn for_node(name: NodeName, deps: ExecutorDeps) -> Option<Self> {
        Some(match name {
            NodeName::KnowledgeSeeding => Self::KnowledgeSeeding(KnowledgeSeedingExecutor::new(deps)),
            NodeName::ColumnFeatureExtraction => {
                Self::ColumnFeatureExtraction(ColumnFeatureExtractionExecutor::new(deps))
            }
            NodeName::FkDiscovery => Self::FkDiscovery(FkDiscoveryExecutor::new(deps)),
            NodeName::TableFeatureExtraction => {
                Self::TableFeatureExtraction(TableFeatureExtractionExecutor::new(deps))
            }
            NodeName::PkMatchDiscovery => Self::PkMatchDiscovery(PkMatchDiscoveryExecutor::new(deps)),
            NodeName::ColumnEnrichment => Self::ColumnEnrichment(ColumnEnrichmentExecutor::new(deps)),
            NodeName::OntologyFinalization => {
                Self::OntologyFinalization(OntologyFinalizationExecutor::new(deps))
            }
            // No executor is registered for Glossary; canonical_order never yields it.
            NodeName::Glossary => return None,
        })
    }
}

#[async_trait::async_trait]
impl NodeExecutor for NodeExecutorKind {
    async fn execute(
        &self,
        ctx: &RunContext,
        project_id: uuid::Uuid,
        ontology_id: uuid::Uuid,
        datasource_id: uuid::Uuid,
        progress: ProgressCallback<'_>,
    ) -> OntologyResult<()> {
        match self {
            Self::KnowledgeSeeding(e) => e.execute(ctx, project_id, ontology_id, datasource_id, progress).await,
            Self::ColumnFeatureExtraction(e) => {
                e.execute(ctx, project_id, ontology_id, datasource_id, progress).await
            }
            Self::FkDiscovery(e) => e.execute(ctx, project_id, ontology_id, datasource_id, progress).await,
            Self::TableFeatureExtraction(e) => {
                e.execute(ctx, project_id, ontology_id, datasource_id, progress).await
            }
            Self::PkMatchDiscovery(e) => e.execute(ctx, project_id, ontology_id, datasource_id, progress).await,
            Self::ColumnEnrichment(e) => e.execute(ctx, project_id, ontology_id, datasource_id, progress).await,
            Self::OntologyFinalization(e) => {
                e.execute(ctx, project_id, ontology_id, datasource_id, progress).await
            }
        }
    }
}

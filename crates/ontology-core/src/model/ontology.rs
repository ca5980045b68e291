//! Ontology, column/table metadata, knowledge facts, relationship candidates,
//! ontology questions, pending changes, and workflow checkpoint state.

use crate::cardinality::Cardinality;
use crate::context::ProvenanceSource;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A versioned, activatable snapshot of a project's semantic schema description.
/// Exactly one ontology per project may have `is_active = true`; activation is
/// performed atomically by [`crate::executors::finalization`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ontology {
    pub id: Uuid,
    pub project_id: Uuid,
    pub version: i32,
    pub is_active: bool,
    pub domain_summary: String,
    pub tables: Vec<TableMetadata>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityVerdict {
    pub promoted: bool,
    pub promotion_score: i32,
    pub is_hub_major: bool,
    pub is_hub_minor: bool,
    pub has_multiple_roles: bool,
    pub related_table_group: Option<String>,
    pub business_aliases: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMetadata {
    pub table_name: String,
    pub description: Option<String>,
    pub columns: Vec<ColumnMetadata>,
    pub entity_verdict: EntityVerdict,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub column_name: String,
    pub description: Option<String>,
    pub semantic_type: Option<String>,
    pub role: Option<String>,
    pub enum_labels: Vec<String>,
    /// Set to `Manual` once a human edits this column directly; ColumnEnrichment must
    /// never overwrite a manually-sourced value.
    pub source: ProvenanceSource,
}

impl ColumnMetadata {
    pub fn is_human_authored(&self) -> bool {
        matches!(self.source, ProvenanceSource::Manual)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeFactType {
    BusinessRule,
    Convention,
    Terminology,
    Overview,
}

/// `{factType, key, value, context, source}`. Unique per `(project, factType, key)`;
/// a later write updates in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeFact {
    pub id: Uuid,
    pub project_id: Uuid,
    pub fact_type: KnowledgeFactType,
    pub key: String,
    pub value: String,
    pub context: Option<String>,
    pub source: ProvenanceSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    NameInference,
    ValueMatch,
    Hybrid,
    Llm,
}

/// Proposed `(sourceColumn, targetColumn)` edge awaiting acceptance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipCandidate {
    pub id: Uuid,
    pub ontology_id: Uuid,
    pub source_table: String,
    pub source_column: String,
    pub target_table: String,
    pub target_column: String,
    pub detection_method: DetectionMethod,
    pub confidence: f64,
    pub status: RelationshipStatus,
    pub cardinality: Cardinality,
    pub join_match_rate: f64,
    pub orphan_rate: f64,
    pub llm_reasoning: Option<String>,
}

impl RelationshipCandidate {
    /// Invariant 7: accepted candidates have confidence at or above the high-confidence
    /// threshold; everything below is left pending and required for human review.
    pub fn resolve(&mut self, high_confidence_threshold: f64, llm_confirmed: bool) -> bool {
        if self.confidence >= high_confidence_threshold {
            self.status = if llm_confirmed {
                RelationshipStatus::Accepted
            } else {
                RelationshipStatus::Rejected
            };
            true
        } else {
            self.status = RelationshipStatus::Pending;
            false
        }
    }

    pub fn is_required_review(&self) -> bool {
        self.status == RelationshipStatus::Pending
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionPriority {
    Low = 1,
    Medium = 2,
    High = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OntologyQuestionStatus {
    Pending,
    Answered,
    Skipped,
    Dismissed,
    Escalated,
    Deleted,
}

/// Machine-generated review item. Pending, required questions gate ontology activation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OntologyQuestion {
    pub id: Uuid,
    pub ontology_id: Uuid,
    pub category: String,
    pub text: String,
    pub priority: QuestionPriority,
    pub is_required: bool,
    pub status: OntologyQuestionStatus,
    pub affects_tables: Vec<String>,
    pub affects_columns: Vec<String>,
    pub parent_question_id: Option<Uuid>,
}

impl OntologyQuestion {
    pub fn blocks_activation(&self) -> bool {
        self.is_required && self.status == OntologyQuestionStatus::Pending
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingChangeStatus {
    Pending,
    Resolved,
    Dismissed,
}

/// Diff row emitted by the change detector on schema refresh. Consumed by humans;
/// never feeds back into the DAG automatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingChange {
    pub id: Uuid,
    pub project_id: Uuid,
    pub change_type: String,
    pub table_name: String,
    pub column_name: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub suggested_action: String,
    pub status: PendingChangeStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowEntityType {
    Global,
    Table,
    Column,
}

/// Checkpoint grid allowing a restart to skip already-finished units of work
/// without recomputing them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEntityState {
    pub project_id: Uuid,
    pub ontology_id: Uuid,
    pub workflow: String,
    pub entity_type: WorkflowEntityType,
    pub entity_key: String,
    pub status: NodeStatusLike,
}

/// Mirrors `NodeStatus` for workflow checkpoints without creating a dependency cycle
/// between `model::dag` and `model::ontology`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatusLike {
    Pending,
    Completed,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_candidate(confidence: f64) -> RelationshipCandidate {
        RelationshipCandidate {
            id: Uuid::new_v4(),
            ontology_id: Uuid::new_v4(),
            source_table: "orders".into(),
            source_column: "user_id".into(),
            target_table: "users".into(),
            target_column: "id".into(),
            detection_method: DetectionMethod::NameInference,
            confidence,
            status: RelationshipStatus::Pending,
            cardinality: Cardinality::ManyToOne,
            join_match_rate: 0.98,
            orphan_rate: 0.01,
            llm_reasoning: None,
        }
    }

    #[test]
    fn high_confidence_confirmed_is_accepted() {
        let mut c = sample_candidate(0.9);
        assert!(c.resolve(0.85, true));
        assert_eq!(c.status, RelationshipStatus::Accepted);
        assert!(!c.is_required_review());
    }

    #[test]
    fn high_confidence_rejected_by_llm_is_rejected() {
        let mut c = sample_candidate(0.9);
        assert!(c.resolve(0.85, false));
        assert_eq!(c.status, RelationshipStatus::Rejected);
    }

    #[test]
    fn below_threshold_stays_pending_and_required() {
        let mut c = sample_candidate(0.6);
        assert!(!c.resolve(0.85, true));
        assert_eq!(c.status, RelationshipStatus::Pending);
        assert!(c.is_required_review());
    }
}

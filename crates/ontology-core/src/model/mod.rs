//! Data model: projects, schema snapshots, DAGs, ontologies, and the review-queue
//! entities (knowledge facts, relationship candidates, ontology questions, pending
//! changes, workflow entity state).

mod dag;
mod ontology;
mod project;

pub use dag::{Dag, DagNode, DagStatus, NodeName, NodeProgress, NodeStatus};
pub use ontology::{
    ColumnMetadata, DetectionMethod, EntityVerdict, KnowledgeFact, KnowledgeFactType,
    NodeStatusLike, Ontology, OntologyQuestion, OntologyQuestionStatus, PendingChange,
    PendingChangeStatus, QuestionPriority, RelationshipCandidate, RelationshipStatus,
    TableMetadata, WorkflowEntityState, WorkflowEntityType,
};
pub use project::{DatasourceRef, Project, SchemaColumn, SchemaSnapshot};

//! ontology-core: the ontology-extraction DAG runtime — scheduler, ownership and
//! heartbeat protocol, per-node execution envelope, and the LLM worker pool node
//! executors call into.

pub mod adapters;
pub mod cardinality;
pub mod change_detector;
pub mod config;
pub mod context;
pub mod error;
pub mod executors;
pub mod heartbeat;
pub mod llm;
pub mod model;
pub mod repository;
pub mod runtime;

pub use adapters::{ConnectionTester, JoinAnalysis, QueryExecutor, SchemaDiscoverer};
pub use cardinality::Cardinality;
pub use change_detector::detect_changes;
pub use config::RuntimeConfig;
pub use context::{Provenance, ProvenanceSource, RunContext, TenantScope};
pub use error::{ErrorKind, OntologyError, OntologyResult};
pub use executors::{ExecutorDeps, NodeExecutor, NodeExecutorKind, ProgressCallback};
pub use heartbeat::HeartbeatRegistry;
pub use llm::{
    ChatMessage, CircuitBreaker, CircuitState, LlmClient, LlmMetricsSnapshot, LlmPool, LlmRequest,
    LlmResponse, OpenRouterClient, TokenCounts,
};
pub use model::{
    ColumnMetadata, Dag, DagNode, DagStatus, DatasourceRef, DetectionMethod, EntityVerdict,
    KnowledgeFact, KnowledgeFactType, NodeName, NodeProgress, NodeStatus, NodeStatusLike,
    Ontology, OntologyQuestion, OntologyQuestionStatus, PendingChange, PendingChangeStatus,
    Project, QuestionPriority, RelationshipCandidate, RelationshipStatus, SchemaColumn,
    SchemaSnapshot, TableMetadata, WorkflowEntityState, WorkflowEntityType,
};
pub use repository::{
    DagRepository, KnowledgeRepository, OntologyRepository, ProjectRepository,
    RelationshipRepository,
};
pub use runtime::{ActiveDagRegistry, DagRuntime};

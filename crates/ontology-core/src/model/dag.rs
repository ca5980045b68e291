//! DAG and DAG-node entities: the state the runtime schedules and the repository
//! persists.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Canonical node names. Order is immutable and enforced by [`NodeName::canonical_order`].
///
/// `Glossary` exists as a variant so the type stays exhaustive for future scheduler
/// changes (Open Question 2), but it is never returned by `canonical_order` and the
/// executor dispatcher has no case for it — constructing a DAG never creates a
/// `Glossary` node row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeName {
    KnowledgeSeeding,
    ColumnFeatureExtraction,
    FkDiscovery,
    TableFeatureExtraction,
    PkMatchDiscovery,
    ColumnEnrichment,
    OntologyFinalization,
    Glossary,
}

impl NodeName {
    /// The fixed, ordered node list every DAG is created with.
    pub const fn canonical_order() -> [NodeName; 7] {
        [
            NodeName::KnowledgeSeeding,
            NodeName::ColumnFeatureExtraction,
            NodeName::FkDiscovery,
            NodeName::TableFeatureExtraction,
            NodeName::PkMatchDiscovery,
            NodeName::ColumnEnrichment,
            NodeName::OntologyFinalization,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KnowledgeSeeding => "knowledge_seeding",
            Self::ColumnFeatureExtraction => "column_feature_extraction",
            Self::FkDiscovery => "fk_discovery",
            Self::TableFeatureExtraction => "table_feature_extraction",
            Self::PkMatchDiscovery => "pk_match_discovery",
            Self::ColumnEnrichment => "column_enrichment",
            Self::OntologyFinalization => "ontology_finalization",
            Self::Glossary => "glossary",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DagStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// Opaque progress bag written by a node's `progressCallback`. `extra` carries
/// free-form counters (e.g. candidates found) the executor wants surfaced without
/// widening this struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeProgress {
    #[serde(default)]
    pub processed: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub phase: String,
    #[serde(default)]
    pub extra: serde_json::Value,
}

/// One run of extraction over a `(project, datasource)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dag {
    pub id: Uuid,
    pub project_id: Uuid,
    pub datasource_id: Uuid,
    pub ontology_id: Option<Uuid>,
    pub status: DagStatus,
    pub current_node: Option<NodeName>,
    pub owner_id: Option<Uuid>,
    pub heartbeat_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Dag {
    /// True when the DAG is in a status from which it can never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            DagStatus::Completed | DagStatus::Failed | DagStatus::Cancelled
        )
    }

    /// Invariant 1: a running DAG must carry an owner and a fresh heartbeat.
    pub fn is_fresh(&self, now: chrono::DateTime<chrono::Utc>, stale_after: chrono::Duration) -> bool {
        match (self.status, self.heartbeat_at) {
            (DagStatus::Running, Some(hb)) => now - hb <= stale_after,
            (DagStatus::Pending, _) => true,
            _ => false,
        }
    }
}

/// One stage of one DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DagNode {
    pub id: Uuid,
    pub dag_id: Uuid,
    pub node_name: NodeName,
    /// Position in the canonical order; enforces "nodes transition only forward".
    pub sequence: u8,
    pub status: NodeStatus,
    pub progress: NodeProgress,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl DagNode {
    pub fn new(dag_id: Uuid, node_name: NodeName, sequence: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            dag_id,
            node_name,
            sequence,
            status: NodeStatus::Pending,
            progress: NodeProgress::default(),
            error_message: None,
            retry_count: 0,
            started_at: None,
            finished_at: None,
        }
    }
}

/// Builds the canonical, ordered node rows for a freshly created DAG.
pub fn canonical_nodes(dag_id: Uuid) -> Vec<DagNode> {
    NodeName::canonical_order()
        .iter()
        .enumerate()
        .map(|(i, name)| DagNode::new(dag_id, *name, i as u8))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_order_excludes_glossary() {
        assert!(!NodeName::canonical_order().contains(&NodeName::Glossary));
        assert_eq!(NodeName::canonical_order().len(), 7);
    }

    #[test]
    fn canonical_nodes_are_sequenced_pending() {
        let dag_id = Uuid::new_v4();
        let nodes = canonical_nodes(dag_id);
        assert_eq!(nodes.len(), 7);
        for (i, node) in nodes.iter().enumerate() {
            assert_eq!(node.sequence, i as u8);
            assert_eq!(node.status, NodeStatus::Pending);
        }
        assert_eq!(nodes[0].node_name, NodeName::KnowledgeSeeding);
        assert_eq!(nodes[6].node_name, NodeName::OntologyFinalization);
    }

    #[test]
    fn running_dag_is_fresh_only_within_stale_window() {
        let now = chrono::Utc::now();
        let dag = Dag {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            datasource_id: Uuid::new_v4(),
            ontology_id: None,
            status: DagStatus::Running,
            current_node: Some(NodeName::FkDiscovery),
            owner_id: Some(Uuid::new_v4()),
            heartbeat_at: Some(now - chrono::Duration::seconds(20)),
            created_at: now,
        };
        assert!(dag.is_fresh(now, chrono::Duration::seconds(30)));
        assert!(!dag.is_fresh(now, chrono::Duration::seconds(10)));
    }
}

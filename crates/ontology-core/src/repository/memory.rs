//! In-memory repositories backed by `dashmap`. Used by the scenario test suite and
//! anywhere a Postgres instance is not available; no feature gate, always compiled.

use super::{
    DagRepository, KnowledgeRepository, OntologyRepository, ProjectRepository,
    RelationshipRepository,
};
use crate::context::Provenance;
use crate::error::{OntologyError, OntologyResult};
use crate::model::{
    canonical_nodes, Dag, DagNode, DagStatus, KnowledgeFact, NodeName, Ontology,
    OntologyQuestion, PendingChange, Project, RelationshipCandidate, SchemaSnapshot,
    WorkflowEntityState,
};
use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryStore {
    dags: DashMap<Uuid, Dag>,
    nodes: DashMap<Uuid, Vec<DagNode>>,
    ontologies: DashMap<Uuid, Ontology>,
    questions: DashMap<Uuid, Vec<OntologyQuestion>>,
    pending_changes: DashMap<Uuid, Vec<PendingChange>>,
    workflow_states: DashMap<(Uuid, Uuid, String), Vec<WorkflowEntityState>>,
    facts: DashMap<Uuid, Vec<KnowledgeFact>>,
    candidates: DashMap<Uuid, Vec<RelationshipCandidate>>,
    projects: DashMap<Uuid, Project>,
    schema_snapshots: DashMap<Uuid, SchemaSnapshot>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_project(&self, project: Project) {
        self.projects.insert(project.id, project);
    }

    pub fn seed_schema_snapshot(&self, snapshot: SchemaSnapshot) {
        self.schema_snapshots.insert(snapshot.datasource_id, snapshot);
    }
}

#[async_trait]
impl DagRepository for InMemoryStore {
    async fn create_dag(&self, project_id: Uuid, datasource_id: Uuid) -> OntologyResult<Dag> {
        let dag = Dag {
            id: Uuid::new_v4(),
            project_id,
            datasource_id,
            ontology_id: None,
            status: DagStatus::Pending,
            current_node: None,
            owner_id: None,
            heartbeat_at: None,
            created_at: chrono::Utc::now(),
        };
        self.nodes.insert(dag.id, canonical_nodes(dag.id));
        self.dags.insert(dag.id, dag.clone());
        Ok(dag)
    }

    async fn get_dag(&self, dag_id: Uuid) -> OntologyResult<Dag> {
        self.dags
            .get(&dag_id)
            .map(|d| d.clone())
            .ok_or_else(|| OntologyError::not_found("dag", dag_id))
    }

    async fn active_dag_for_project(&self, project_id: Uuid) -> OntologyResult<Option<Dag>> {
        Ok(self
            .dags
            .iter()
            .find(|d| d.project_id == project_id && !d.is_terminal())
            .map(|d| d.clone()))
    }

    async fn nodes_for_dag(&self, dag_id: Uuid) -> OntologyResult<Vec<DagNode>> {
        self.nodes
            .get(&dag_id)
            .map(|n| n.clone())
            .ok_or_else(|| OntologyError::not_found("dag", dag_id))
    }

    async fn claim_ownership(
        &self,
        dag_id: Uuid,
        owner_id: Uuid,
        stale_after: chrono::Duration,
    ) -> OntologyResult<bool> {
        let mut dag = self
            .dags
            .get_mut(&dag_id)
            .ok_or_else(|| OntologyError::not_found("dag", dag_id))?;
        let now = chrono::Utc::now();
        let claimable = match dag.owner_id {
            None => true,
            Some(_) => !dag.is_fresh(now, stale_after),
        };
        if claimable {
            dag.owner_id = Some(owner_id);
            dag.heartbeat_at = Some(now);
        }
        Ok(claimable)
    }

    async fn release_ownership(&self, dag_id: Uuid, owner_id: Uuid) -> OntologyResult<()> {
        if let Some(mut dag) = self.dags.get_mut(&dag_id) {
            if dag.owner_id == Some(owner_id) {
                dag.owner_id = None;
                dag.heartbeat_at = None;
            }
        }
        Ok(())
    }

    async fn refresh_heartbeat(&self, dag_id: Uuid, owner_id: Uuid) -> OntologyResult<()> {
        let mut dag = self
            .dags
            .get_mut(&dag_id)
            .ok_or_else(|| OntologyError::not_found("dag", dag_id))?;
        if dag.owner_id != Some(owner_id) {
            return Err(OntologyError::fatal_invariant(
                "heartbeat refresh from non-owner",
            ));
        }
        dag.heartbeat_at = Some(chrono::Utc::now());
        Ok(())
    }

    async fn mark_dag_running(&self, dag_id: Uuid) -> OntologyResult<()> {
        let mut dag = self
            .dags
            .get_mut(&dag_id)
            .ok_or_else(|| OntologyError::not_found("dag", dag_id))?;
        dag.status = DagStatus::Running;
        Ok(())
    }

    async fn mark_dag_completed(&self, dag_id: Uuid, ontology_id: Uuid) -> OntologyResult<()> {
        let mut dag = self
            .dags
            .get_mut(&dag_id)
            .ok_or_else(|| OntologyError::not_found("dag", dag_id))?;
        dag.status = DagStatus::Completed;
        dag.ontology_id = Some(ontology_id);
        dag.current_node = None;
        Ok(())
    }

    async fn mark_dag_failed(&self, dag_id: Uuid, _error: &str) -> OntologyResult<()> {
        let mut dag = self
            .dags
            .get_mut(&dag_id)
            .ok_or_else(|| OntologyError::not_found("dag", dag_id))?;
        dag.status = DagStatus::Failed;
        Ok(())
    }

    async fn mark_dag_cancelled(&self, dag_id: Uuid) -> OntologyResult<()> {
        let mut dag = self
            .dags
            .get_mut(&dag_id)
            .ok_or_else(|| OntologyError::not_found("dag", dag_id))?;
        dag.status = DagStatus::Cancelled;
        Ok(())
    }

    async fn set_current_node(&self, dag_id: Uuid, node: NodeName) -> OntologyResult<()> {
        let mut dag = self
            .dags
            .get_mut(&dag_id)
            .ok_or_else(|| OntologyError::not_found("dag", dag_id))?;
        dag.current_node = Some(node);
        Ok(())
    }

    async fn update_node(&self, node: &DagNode) -> OntologyResult<()> {
        let mut nodes = self
            .nodes
            .get_mut(&node.dag_id)
            .ok_or_else(|| OntologyError::not_found("dag", node.dag_id))?;
        if let Some(existing) = nodes.iter_mut().find(|n| n.id == node.id) {
            *existing = node.clone();
        }
        Ok(())
    }

    async fn stale_running_dags(&self, stale_after: chrono::Duration) -> OntologyResult<Vec<Dag>> {
        let now = chrono::Utc::now();
        Ok(self
            .dags
            .iter()
            .filter(|d| d.status == DagStatus::Running && !d.is_fresh(now, stale_after))
            .map(|d| d.clone())
            .collect())
    }
}

#[async_trait]
impl OntologyRepository for InMemoryStore {
    async fn create_draft(&self, project_id: Uuid) -> OntologyResult<Ontology> {
        let existing_versions = self
            .ontologies
            .iter()
            .filter(|o| o.project_id == project_id)
            .count() as i32;
        let ontology = Ontology {
            id: Uuid::new_v4(),
            project_id,
            version: existing_versions + 1,
            is_active: false,
            domain_summary: String::new(),
            tables: Vec::new(),
            created_at: chrono::Utc::now(),
        };
        self.ontologies.insert(ontology.id, ontology.clone());
        Ok(ontology)
    }

    async fn get(&self, ontology_id: Uuid) -> OntologyResult<Ontology> {
        self.ontologies
            .get(&ontology_id)
            .map(|o| o.clone())
            .ok_or_else(|| OntologyError::not_found("ontology", ontology_id))
    }

    async fn active_for_project(&self, project_id: Uuid) -> OntologyResult<Option<Ontology>> {
        Ok(self
            .ontologies
            .iter()
            .find(|o| o.project_id == project_id && o.is_active)
            .map(|o| o.clone()))
    }

    async fn save(&self, ontology: &Ontology) -> OntologyResult<()> {
        self.ontologies.insert(ontology.id, ontology.clone());
        Ok(())
    }

    async fn activate(&self, ontology_id: Uuid) -> OntologyResult<()> {
        let project_id = self
            .ontologies
            .get(&ontology_id)
            .map(|o| o.project_id)
            .ok_or_else(|| OntologyError::not_found("ontology", ontology_id))?;
        for mut entry in self.ontologies.iter_mut() {
            if entry.project_id == project_id {
                entry.is_active = entry.id == ontology_id;
            }
        }
        Ok(())
    }

    async fn questions_for_ontology(&self, ontology_id: Uuid) -> OntologyResult<Vec<OntologyQuestion>> {
        Ok(self.questions.get(&ontology_id).map(|q| q.clone()).unwrap_or_default())
    }

    async fn save_question(&self, question: &OntologyQuestion) -> OntologyResult<()> {
        let mut entry = self.questions.entry(question.ontology_id).or_default();
        if let Some(existing) = entry.iter_mut().find(|q| q.id == question.id) {
            *existing = question.clone();
        } else {
            entry.push(question.clone());
        }
        Ok(())
    }

    async fn answer_question(
        &self,
        ontology_id: Uuid,
        question_id: Uuid,
        table_name: &str,
        column_name: &str,
        answer: &str,
        provenance: Provenance,
    ) -> OntologyResult<()> {
        if !matches!(provenance.source, crate::context::ProvenanceSource::Mcp) {
            return Err(OntologyError::fatal_invariant(
                "answer_question requires Mcp provenance",
            ));
        }
        let mut ontology = self
            .ontologies
            .get_mut(&ontology_id)
            .ok_or_else(|| OntologyError::not_found("ontology", ontology_id))?;
        let table = ontology
            .tables
            .iter_mut()
            .find(|t| t.table_name == table_name)
            .ok_or_else(|| OntologyError::not_found("table", table_name))?;
        let column = table
            .columns
            .iter_mut()
            .find(|c| c.column_name == column_name)
            .ok_or_else(|| OntologyError::not_found("column", column_name))?;
        column.description = Some(answer.to_string());
        column.source = crate::context::ProvenanceSource::Mcp;
        drop(ontology);

        let mut questions = self.questions.entry(ontology_id).or_default();
        if let Some(q) = questions.iter_mut().find(|q| q.id == question_id) {
            q.status = crate::model::OntologyQuestionStatus::Answered;
        }
        Ok(())
    }

    async fn pending_changes_for_project(&self, project_id: Uuid) -> OntologyResult<Vec<PendingChange>> {
        Ok(self
            .pending_changes
            .get(&project_id)
            .map(|c| c.clone())
            .unwrap_or_default())
    }

    async fn save_pending_change(&self, change: &PendingChange) -> OntologyResult<()> {
        let mut entry = self.pending_changes.entry(change.project_id).or_default();
        if let Some(existing) = entry.iter_mut().find(|c| c.id == change.id) {
            *existing = change.clone();
        } else {
            entry.push(change.clone());
        }
        Ok(())
    }

    async fn workflow_state(
        &self,
        project_id: Uuid,
        ontology_id: Uuid,
        workflow: &str,
    ) -> OntologyResult<Vec<WorkflowEntityState>> {
        Ok(self
            .workflow_states
            .get(&(project_id, ontology_id, workflow.to_string()))
            .map(|s| s.clone())
            .unwrap_or_default())
    }

    async fn save_workflow_state(&self, state: &WorkflowEntityState) -> OntologyResult<()> {
        let key = (state.project_id, state.ontology_id, state.workflow.clone());
        let mut entry = self.workflow_states.entry(key).or_default();
        if let Some(existing) = entry
            .iter_mut()
            .find(|s| s.entity_type == state.entity_type && s.entity_key == state.entity_key)
        {
            *existing = state.clone();
        } else {
            entry.push(state.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl KnowledgeRepository for InMemoryStore {
    async fn facts_for_project(&self, project_id: Uuid) -> OntologyResult<Vec<KnowledgeFact>> {
        Ok(self.facts.get(&project_id).map(|f| f.clone()).unwrap_or_default())
    }

    async fn upsert_fact(&self, fact: &KnowledgeFact) -> OntologyResult<()> {
        let mut entry = self.facts.entry(fact.project_id).or_default();
        if let Some(existing) = entry
            .iter_mut()
            .find(|f| f.fact_type == fact.fact_type && f.key == fact.key)
        {
            *existing = fact.clone();
        } else {
            entry.push(fact.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl RelationshipRepository for InMemoryStore {
    async fn candidates_for_ontology(&self, ontology_id: Uuid) -> OntologyResult<Vec<RelationshipCandidate>> {
        Ok(self
            .candidates
            .get(&ontology_id)
            .map(|c| c.clone())
            .unwrap_or_default())
    }

    async fn save_candidate(&self, candidate: &RelationshipCandidate) -> OntologyResult<()> {
        let mut entry = self.candidates.entry(candidate.ontology_id).or_default();
        if let Some(existing) = entry.iter_mut().find(|c| c.id == candidate.id) {
            *existing = candidate.clone();
        } else {
            entry.push(candidate.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl ProjectRepository for InMemoryStore {
    async fn get(&self, project_id: Uuid) -> OntologyResult<Project> {
        self.projects
            .get(&project_id)
            .map(|p| p.clone())
            .ok_or_else(|| OntologyError::not_found("project", project_id))
    }

    async fn latest_schema_snapshot(&self, datasource_id: Uuid) -> OntologyResult<SchemaSnapshot> {
        self.schema_snapshots
            .get(&datasource_id)
            .map(|s| s.clone())
            .ok_or_else(|| OntologyError::not_found("schema_snapshot", datasource_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn claim_ownership_is_exclusive_until_stale() {
        let store = InMemoryStore::new();
        let dag = store.create_dag(Uuid::new_v4(), Uuid::new_v4()).await.unwrap();
        let owner_a = Uuid::new_v4();
        let owner_b = Uuid::new_v4();
        let stale_after = chrono::Duration::seconds(30);

        assert!(store.claim_ownership(dag.id, owner_a, stale_after).await.unwrap());
        assert!(!store.claim_ownership(dag.id, owner_b, stale_after).await.unwrap());

        let fetched = store.get_dag(dag.id).await.unwrap();
        assert_eq!(fetched.owner_id, Some(owner_a));
    }

    #[tokio::test]
    async fn only_one_ontology_per_project_is_active() {
        let store = InMemoryStore::new();
        let project_id = Uuid::new_v4();
        let v1 = store.create_draft(project_id).await.unwrap();
        let v2 = store.create_draft(project_id).await.unwrap();
        store.activate(v1.id).await.unwrap();
        store.activate(v2.id).await.unwrap();

        assert!(!store.get(v1.id).await.unwrap().is_active);
        assert!(store.get(v2.id).await.unwrap().is_active);
    }

    #[tokio::test]
    async fn active_dag_for_project_ignores_terminal_dags() {
        let store = InMemoryStore::new();
        let project_id = Uuid::new_v4();
        let dag = store.create_dag(project_id, Uuid::new_v4()).await.unwrap();
        assert!(store.active_dag_for_project(project_id).await.unwrap().is_some());
        store.mark_dag_completed(dag.id, Uuid::new_v4()).await.unwrap();
        assert!(store.active_dag_for_project(project_id).await.unwrap().is_none());
    }
}

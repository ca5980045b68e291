//! Postgres-backed repositories. One `sqlx::Transaction` per atomic operation;
//! ownership claims and activation use `SELECT ... FOR UPDATE` row locks instead of
//! the SQLite busy-retry loop this module is grounded on, since Postgres serializes
//! concurrent writers through row locks rather than a single-writer database lock.

use super::{
    DagRepository, KnowledgeRepository, OntologyRepository, ProjectRepository,
    RelationshipRepository,
};
use crate::context::Provenance;
use crate::error::{OntologyError, OntologyResult};
use crate::model::{
    Dag, DagNode, DagStatus, KnowledgeFact, NodeName, NodeStatus, Ontology, OntologyQuestion,
    PendingChange, Project, RelationshipCandidate, SchemaSnapshot, WorkflowEntityState,
};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub struct PostgresDagRepository {
    pool: PgPool,
}

impl PostgresDagRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_dag(row: &sqlx::postgres::PgRow) -> OntologyResult<Dag> {
        let status: String = row.try_get("status")?;
        let current_node: Option<String> = row.try_get("current_node")?;
        Ok(Dag {
            id: row.try_get("id")?,
            project_id: row.try_get("project_id")?,
            datasource_id: row.try_get("datasource_id")?,
            ontology_id: row.try_get("ontology_id")?,
            status: parse_dag_status(&status)?,
            current_node: current_node.map(|s| parse_node_name(&s)).transpose()?,
            owner_id: row.try_get("owner_id")?,
            heartbeat_at: row.try_get("heartbeat_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

fn parse_dag_status(s: &str) -> OntologyResult<DagStatus> {
    Ok(match s {
        "pending" => DagStatus::Pending,
        "running" => DagStatus::Running,
        "completed" => DagStatus::Completed,
        "failed" => DagStatus::Failed,
        "cancelled" => DagStatus::Cancelled,
        other => return Err(OntologyError::fatal_invariant(format!("unknown dag status {other}"))),
    })
}

fn dag_status_str(s: DagStatus) -> &'static str {
    match s {
        DagStatus::Pending => "pending",
        DagStatus::Running => "running",
        DagStatus::Completed => "completed",
        DagStatus::Failed => "failed",
        DagStatus::Cancelled => "cancelled",
    }
}

fn parse_node_name(s: &str) -> OntologyResult<NodeName> {
    Ok(match s {
        "knowledge_seeding" => NodeName::KnowledgeSeeding,
        "column_feature_extraction" => NodeName::ColumnFeatureExtraction,
        "fk_discovery" => NodeName::FkDiscovery,
        "table_feature_extraction" => NodeName::TableFeatureExtraction,
        "pk_match_discovery" => NodeName::PkMatchDiscovery,
        "column_enrichment" => NodeName::ColumnEnrichment,
        "ontology_finalization" => NodeName::OntologyFinalization,
        "glossary" => NodeName::Glossary,
        other => return Err(OntologyError::fatal_invariant(format!("unknown node name {other}"))),
    })
}

#[async_trait]
impl DagRepository for PostgresDagRepository {
    async fn create_dag(&self, project_id: Uuid, datasource_id: Uuid) -> OntologyResult<Dag> {
        let mut tx = self.pool.begin().await?;
        let id = Uuid::new_v4();
        let created_at = chrono::Utc::now();
        sqlx::query(
            "INSERT INTO dags (id, project_id, datasource_id, status, created_at)
             VALUES ($1, $2, $3, 'pending', $4)",
        )
        .bind(id)
        .bind(project_id)
        .bind(datasource_id)
        .bind(created_at)
        .execute(&mut *tx)
        .await?;

        for (i, name) in NodeName::canonical_order().iter().enumerate() {
            sqlx::query(
                "INSERT INTO dag_nodes (id, dag_id, node_name, sequence, status)
                 VALUES ($1, $2, $3, $4, 'pending')",
            )
            .bind(Uuid::new_v4())
            .bind(id)
            .bind(name.as_str())
            .bind(i as i32)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(Dag {
            id,
            project_id,
            datasource_id,
            ontology_id: None,
            status: DagStatus::Pending,
            current_node: None,
            owner_id: None,
            heartbeat_at: None,
            created_at,
        })
    }

    async fn get_dag(&self, dag_id: Uuid) -> OntologyResult<Dag> {
        let row = sqlx::query("SELECT * FROM dags WHERE id = $1")
            .bind(dag_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| OntologyError::not_found("dag", dag_id))?;
        Self::row_to_dag(&row)
    }

    async fn active_dag_for_project(&self, project_id: Uuid) -> OntologyResult<Option<Dag>> {
        let row = sqlx::query(
            "SELECT * FROM dags WHERE project_id = $1 AND status IN ('pending', 'running')
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_dag).transpose()
    }

    async fn nodes_for_dag(&self, dag_id: Uuid) -> OntologyResult<Vec<DagNode>> {
        let rows = sqlx::query("SELECT * FROM dag_nodes WHERE dag_id = $1 ORDER BY sequence")
            .bind(dag_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                let node_name: String = row.try_get("node_name")?;
                let status: String = row.try_get("status")?;
                let progress_json: serde_json::Value = row
                    .try_get::<Option<serde_json::Value>, _>("progress")?
                    .unwrap_or(serde_json::Value::Null);
                Ok(DagNode {
                    id: row.try_get("id")?,
                    dag_id: row.try_get("dag_id")?,
                    node_name: parse_node_name(&node_name)?,
                    sequence: row.try_get::<i32, _>("sequence")? as u8,
                    status: parse_node_status(&status)?,
                    progress: serde_json::from_value(progress_json).unwrap_or_default(),
                    error_message: row.try_get("error_message")?,
                    retry_count: row.try_get::<i32, _>("retry_count")? as u32,
                    started_at: row.try_get("started_at")?,
                    finished_at: row.try_get("finished_at")?,
                })
            })
            .collect()
    }

    async fn claim_ownership(
        &self,
        dag_id: Uuid,
        owner_id: Uuid,
        stale_after: chrono::Duration,
    ) -> OntologyResult<bool> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT owner_id, heartbeat_at FROM dags WHERE id = $1 FOR UPDATE")
            .bind(dag_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| OntologyError::not_found("dag", dag_id))?;

        let owner: Option<Uuid> = row.try_get("owner_id")?;
        let heartbeat_at: Option<chrono::DateTime<chrono::Utc>> = row.try_get("heartbeat_at")?;
        let now = chrono::Utc::now();
        let claimable = match (owner, heartbeat_at) {
            (None, _) => true,
            (Some(_), Some(hb)) => now - hb > stale_after,
            (Some(_), None) => true,
        };

        if claimable {
            sqlx::query("UPDATE dags SET owner_id = $1, heartbeat_at = $2 WHERE id = $3")
                .bind(owner_id)
                .bind(now)
                .bind(dag_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(claimable)
    }

    async fn release_ownership(&self, dag_id: Uuid, owner_id: Uuid) -> OntologyResult<()> {
        sqlx::query(
            "UPDATE dags SET owner_id = NULL, heartbeat_at = NULL WHERE id = $1 AND owner_id = $2",
        )
        .bind(dag_id)
        .bind(owner_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn refresh_heartbeat(&self, dag_id: Uuid, owner_id: Uuid) -> OntologyResult<()> {
        let result = sqlx::query(
            "UPDATE dags SET heartbeat_at = $1 WHERE id = $2 AND owner_id = $3",
        )
        .bind(chrono::Utc::now())
        .bind(dag_id)
        .bind(owner_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(OntologyError::fatal_invariant("heartbeat refresh from non-owner"));
        }
        Ok(())
    }

    async fn mark_dag_running(&self, dag_id: Uuid) -> OntologyResult<()> {
        sqlx::query("UPDATE dags SET status = 'running' WHERE id = $1")
            .bind(dag_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_dag_completed(&self, dag_id: Uuid, ontology_id: Uuid) -> OntologyResult<()> {
        sqlx::query(
            "UPDATE dags SET status = 'completed', ontology_id = $1, current_node = NULL WHERE id = $2",
        )
        .bind(ontology_id)
        .bind(dag_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_dag_failed(&self, dag_id: Uuid, error: &str) -> OntologyResult<()> {
        sqlx::query("UPDATE dags SET status = 'failed', last_error = $1 WHERE id = $2")
            .bind(error)
            .bind(dag_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_dag_cancelled(&self, dag_id: Uuid) -> OntologyResult<()> {
        sqlx::query("UPDATE dags SET status = 'cancelled' WHERE id = $1")
            .bind(dag_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_current_node(&self, dag_id: Uuid, node: NodeName) -> OntologyResult<()> {
        sqlx::query("UPDATE dags SET current_node = $1 WHERE id = $2")
            .bind(node.as_str())
            .bind(dag_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_node(&self, node: &DagNode) -> OntologyResult<()> {
        let progress = serde_json::to_value(&node.progress).unwrap_or(serde_json::Value::Null);
        sqlx::query(
            "UPDATE dag_nodes SET status = $1, progress = $2, error_message = $3,
             retry_count = $4, started_at = $5, finished_at = $6 WHERE id = $7",
        )
        .bind(node_status_str(node.status))
        .bind(progress)
        .bind(&node.error_message)
        .bind(node.retry_count as i32)
        .bind(node.started_at)
        .bind(node.finished_at)
        .bind(node.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn stale_running_dags(&self, stale_after: chrono::Duration) -> OntologyResult<Vec<Dag>> {
        let cutoff = chrono::Utc::now() - stale_after;
        let rows = sqlx::query(
            "SELECT * FROM dags WHERE status = 'running' AND (heartbeat_at IS NULL OR heartbeat_at < $1)",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_dag).collect()
    }
}

fn parse_node_status(s: &str) -> OntologyResult<NodeStatus> {
    Ok(match s {
        "pending" => NodeStatus::Pending,
        "running" => NodeStatus::Running,
        "completed" => NodeStatus::Completed,
        "failed" => NodeStatus::Failed,
        "skipped" => NodeStatus::Skipped,
        other => return Err(OntologyError::fatal_invariant(format!("unknown node status {other}"))),
    })
}

fn node_status_str(s: NodeStatus) -> &'static str {
    match s {
        NodeStatus::Pending => "pending",
        NodeStatus::Running => "running",
        NodeStatus::Completed => "completed",
        NodeStatus::Failed => "failed",
        NodeStatus::Skipped => "skipped",
    }
}

/// Ontology's nested table/column tree is stored as a single JSONB document rather
/// than normalized tables: the tree is always read and written as a whole (one draft
/// at a time, finalized atomically), so normalizing it would only add joins no query
/// in this crate needs.
pub struct PostgresOntologyRepository {
    pool: PgPool,
}

impl PostgresOntologyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_ontology(row: &sqlx::postgres::PgRow) -> OntologyResult<Ontology> {
        let tables_json: serde_json::Value = row.try_get("tables")?;
        Ok(Ontology {
            id: row.try_get("id")?,
            project_id: row.try_get("project_id")?,
            version: row.try_get("version")?,
            is_active: row.try_get("is_active")?,
            domain_summary: row.try_get("domain_summary")?,
            tables: serde_json::from_value(tables_json).unwrap_or_default(),
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl OntologyRepository for PostgresOntologyRepository {
    async fn create_draft(&self, project_id: Uuid) -> OntologyResult<Ontology> {
        let next_version: i32 = sqlx::query(
            "SELECT COALESCE(MAX(version), 0) + 1 AS next FROM ontologies WHERE project_id = $1",
        )
        .bind(project_id)
        .fetch_one(&self.pool)
        .await?
        .try_get("next")?;

        let ontology = Ontology {
            id: Uuid::new_v4(),
            project_id,
            version: next_version,
            is_active: false,
            domain_summary: String::new(),
            tables: Vec::new(),
            created_at: chrono::Utc::now(),
        };
        sqlx::query(
            "INSERT INTO ontologies (id, project_id, version, is_active, domain_summary, tables, created_at)
             VALUES ($1, $2, $3, false, '', '[]'::jsonb, $4)",
        )
        .bind(ontology.id)
        .bind(project_id)
        .bind(next_version)
        .bind(ontology.created_at)
        .execute(&self.pool)
        .await?;
        Ok(ontology)
    }

    async fn get(&self, ontology_id: Uuid) -> OntologyResult<Ontology> {
        let row = sqlx::query("SELECT * FROM ontologies WHERE id = $1")
            .bind(ontology_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| OntologyError::not_found("ontology", ontology_id))?;
        Self::row_to_ontology(&row)
    }

    async fn active_for_project(&self, project_id: Uuid) -> OntologyResult<Option<Ontology>> {
        let row = sqlx::query("SELECT * FROM ontologies WHERE project_id = $1 AND is_active = true")
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_ontology).transpose()
    }

    async fn save(&self, ontology: &Ontology) -> OntologyResult<()> {
        let tables = serde_json::to_value(&ontology.tables).unwrap_or(serde_json::Value::Array(vec![]));
        sqlx::query(
            "UPDATE ontologies SET domain_summary = $1, tables = $2 WHERE id = $3",
        )
        .bind(&ontology.domain_summary)
        .bind(tables)
        .bind(ontology.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn activate(&self, ontology_id: Uuid) -> OntologyResult<()> {
        let mut tx = self.pool.begin().await?;
        let project_id: Uuid = sqlx::query("SELECT project_id FROM ontologies WHERE id = $1 FOR UPDATE")
            .bind(ontology_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| OntologyError::not_found("ontology", ontology_id))?
            .try_get("project_id")?;

        sqlx::query("UPDATE ontologies SET is_active = false WHERE project_id = $1")
            .bind(project_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE ontologies SET is_active = true WHERE id = $1")
            .bind(ontology_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn questions_for_ontology(&self, ontology_id: Uuid) -> OntologyResult<Vec<OntologyQuestion>> {
        let rows = sqlx::query("SELECT payload FROM ontology_questions WHERE ontology_id = $1")
            .bind(ontology_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                let payload: serde_json::Value = row.try_get("payload")?;
                serde_json::from_value(payload)
                    .map_err(|e| OntologyError::fatal_invariant(format!("corrupt question row: {e}")))
            })
            .collect()
    }

    async fn save_question(&self, question: &OntologyQuestion) -> OntologyResult<()> {
        let payload = serde_json::to_value(question).unwrap_or(serde_json::Value::Null);
        sqlx::query(
            "INSERT INTO ontology_questions (id, ontology_id, payload) VALUES ($1, $2, $3)
             ON CONFLICT (id) DO UPDATE SET payload = EXCLUDED.payload",
        )
        .bind(question.id)
        .bind(question.ontology_id)
        .bind(payload)
        .execute(&self.pool)
        .await?;
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
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT * FROM ontologies WHERE id = $1 FOR UPDATE")
            .bind(ontology_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| OntologyError::not_found("ontology", ontology_id))?;
        let mut ontology = Self::row_to_ontology(&row)?;
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

        let tables = serde_json::to_value(&ontology.tables).unwrap_or(serde_json::Value::Array(vec![]));
        sqlx::query("UPDATE ontologies SET tables = $1 WHERE id = $2")
            .bind(tables)
            .bind(ontology_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE ontology_questions SET payload = jsonb_set(payload, '{status}', '\"answered\"') WHERE id = $1")
            .bind(question_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn pending_changes_for_project(&self, project_id: Uuid) -> OntologyResult<Vec<PendingChange>> {
        let rows = sqlx::query("SELECT payload FROM pending_changes WHERE project_id = $1")
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                let payload: serde_json::Value = row.try_get("payload")?;
                serde_json::from_value(payload)
                    .map_err(|e| OntologyError::fatal_invariant(format!("corrupt pending_change row: {e}")))
            })
            .collect()
    }

    async fn save_pending_change(&self, change: &PendingChange) -> OntologyResult<()> {
        let payload = serde_json::to_value(change).unwrap_or(serde_json::Value::Null);
        sqlx::query(
            "INSERT INTO pending_changes (id, project_id, payload) VALUES ($1, $2, $3)
             ON CONFLICT (id) DO UPDATE SET payload = EXCLUDED.payload",
        )
        .bind(change.id)
        .bind(change.project_id)
        .bind(payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn workflow_state(
        &self,
        project_id: Uuid,
        ontology_id: Uuid,
        workflow: &str,
    ) -> OntologyResult<Vec<WorkflowEntityState>> {
        let rows = sqlx::query(
            "SELECT payload FROM workflow_entity_states
             WHERE project_id = $1 AND ontology_id = $2 AND workflow = $3",
        )
        .bind(project_id)
        .bind(ontology_id)
        .bind(workflow)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                let payload: serde_json::Value = row.try_get("payload")?;
                serde_json::from_value(payload)
                    .map_err(|e| OntologyError::fatal_invariant(format!("corrupt workflow_state row: {e}")))
            })
            .collect()
    }

    async fn save_workflow_state(&self, state: &WorkflowEntityState) -> OntologyResult<()> {
        let payload = serde_json::to_value(state).unwrap_or(serde_json::Value::Null);
        sqlx::query(
            "INSERT INTO workflow_entity_states (project_id, ontology_id, workflow, entity_type, entity_key, payload)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (project_id, ontology_id, workflow, entity_type, entity_key)
             DO UPDATE SET payload = EXCLUDED.payload",
        )
        .bind(state.project_id)
        .bind(state.ontology_id)
        .bind(&state.workflow)
        .bind(serde_json::to_string(&state.entity_type).unwrap_or_default())
        .bind(&state.entity_key)
        .bind(payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

pub struct PostgresKnowledgeRepository {
    pool: PgPool,
}

impl PostgresKnowledgeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KnowledgeRepository for PostgresKnowledgeRepository {
    async fn facts_for_project(&self, project_id: Uuid) -> OntologyResult<Vec<KnowledgeFact>> {
        let rows = sqlx::query("SELECT payload FROM knowledge_facts WHERE project_id = $1")
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                let payload: serde_json::Value = row.try_get("payload")?;
                serde_json::from_value(payload)
                    .map_err(|e| OntologyError::fatal_invariant(format!("corrupt knowledge_fact row: {e}")))
            })
            .collect()
    }

    async fn upsert_fact(&self, fact: &KnowledgeFact) -> OntologyResult<()> {
        let payload = serde_json::to_value(fact).unwrap_or(serde_json::Value::Null);
        sqlx::query(
            "INSERT INTO knowledge_facts (project_id, fact_type, key, payload)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (project_id, fact_type, key) DO UPDATE SET payload = EXCLUDED.payload",
        )
        .bind(fact.project_id)
        .bind(serde_json::to_string(&fact.fact_type).unwrap_or_default())
        .bind(&fact.key)
        .bind(payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

pub struct PostgresRelationshipRepository {
    pool: PgPool,
}

impl PostgresRelationshipRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RelationshipRepository for PostgresRelationshipRepository {
    async fn candidates_for_ontology(&self, ontology_id: Uuid) -> OntologyResult<Vec<RelationshipCandidate>> {
        let rows = sqlx::query("SELECT payload FROM relationship_candidates WHERE ontology_id = $1")
            .bind(ontology_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                let payload: serde_json::Value = row.try_get("payload")?;
                serde_json::from_value(payload).map_err(|e| {
                    OntologyError::fatal_invariant(format!("corrupt relationship_candidate row: {e}"))
                })
            })
            .collect()
    }

    async fn save_candidate(&self, candidate: &RelationshipCandidate) -> OntologyResult<()> {
        let payload = serde_json::to_value(candidate).unwrap_or(serde_json::Value::Null);
        sqlx::query(
            "INSERT INTO relationship_candidates (id, ontology_id, payload) VALUES ($1, $2, $3)
             ON CONFLICT (id) DO UPDATE SET payload = EXCLUDED.payload",
        )
        .bind(candidate.id)
        .bind(candidate.ontology_id)
        .bind(payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

pub struct PostgresProjectRepository {
    pool: PgPool,
}

impl PostgresProjectRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProjectRepository for PostgresProjectRepository {
    async fn get(&self, project_id: Uuid) -> OntologyResult<Project> {
        let row = sqlx::query("SELECT id, name, overview FROM projects WHERE id = $1")
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| OntologyError::not_found("project", project_id))?;
        Ok(Project {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            overview: row.try_get("overview")?,
        })
    }

    async fn latest_schema_snapshot(&self, datasource_id: Uuid) -> OntologyResult<SchemaSnapshot> {
        let row = sqlx::query(
            "SELECT payload FROM schema_snapshots WHERE datasource_id = $1 ORDER BY taken_at DESC LIMIT 1",
        )
        .bind(datasource_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| OntologyError::not_found("schema_snapshot", datasource_id))?;
        let payload: serde_json::Value = row.try_get("payload")?;
        serde_json::from_value(payload)
            .map_err(|e| OntologyError::fatal_invariant(format!("corrupt schema_snapshot row: {e}")))
    }
}

//! OntologyFinalization: composes the domain summary from prior node outputs and
//! atomically swaps the active ontology. Failure reverts both the new draft's and
//! the previous active ontology's flags, since `activate` runs inside one transaction.

use super::{ExecutorDeps, NodeExecutor, ProgressCallback};
use crate::context::RunContext;
use crate::error::OntologyResult;
use crate::model::NodeProgress;
use uuid::Uuid;

pub struct OntologyFinalizationExecutor {
    deps: ExecutorDeps,
}

impl OntologyFinalizationExecutor {
    pub fn new(deps: ExecutorDeps) -> Self {
        Self { deps }
    }
}

#[async_trait::async_trait]
impl NodeExecutor for OntologyFinalizationExecutor {
    async fn execute(
        &self,
        _ctx: &RunContext,
        project_id: Uuid,
        ontology_id: Uuid,
        _datasource_id: Uuid,
        mut progress: ProgressCallback<'_>,
    ) -> OntologyResult<()> {
        let mut ontology = self.deps.ontology_repo.get(ontology_id).await?;
        let candidates = self.deps.relationship_repo.candidates_for_ontology(ontology_id).await?;
        let facts = self.deps.knowledge_repo.facts_for_project(project_id).await?;

        let promoted_count = ontology.tables.iter().filter(|t| t.entity_verdict.promoted).count();
        let accepted_edges = candidates
            .iter()
            .filter(|c| c.status == crate::model::RelationshipStatus::Accepted)
            .count();
        let overview = facts
            .iter()
            .find(|f| f.fact_type == crate::model::KnowledgeFactType::Overview)
            .map(|f| f.value.clone())
            .unwrap_or_default();

        ontology.domain_summary = format!(
            "{} — {} tables, {} promoted to entities, {} accepted relationships.",
            if overview.is_empty() { "Untitled domain" } else { overview.as_str() },
            ontology.tables.len(),
            promoted_count,
            accepted_edges,
        );

        progress(NodeProgress {
            processed: 1,
            total: 2,
            phase: "summary_composed".into(),
            extra: serde_json::Value::Null,
        });

        self.deps.ontology_repo.save(&ontology).await?;

        let questions = self.deps.ontology_repo.questions_for_ontology(ontology_id).await?;
        let blocking = questions.iter().filter(|q| q.blocks_activation()).count();
        if blocking > 0 {
            progress(NodeProgress {
                processed: 2,
                total: 2,
                phase: "activation_blocked".into(),
                extra: serde_json::json!({ "pending_required_questions": blocking }),
            });
            return Ok(());
        }

        self.deps.ontology_repo.activate(ontology_id).await?;

        progress(NodeProgress {
            processed: 2,
            total: 2,
            phase: "activated".into(),
            extra: serde_json::Value::Null,
        });
        Ok(())
    }
}

//! KnowledgeSeeding: one-time bootstrap of typed business-knowledge facts from the
//! project overview and the external schema.

use super::{ExecutorDeps, NodeExecutor, ProgressCallback};
use crate::context::{ProvenanceSource, RunContext};
use crate::error::OntologyResult;
use crate::llm::{ChatMessage, LlmRequest};
use crate::model::{KnowledgeFact, KnowledgeFactType, NodeProgress};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

pub struct KnowledgeSeedingExecutor {
    deps: ExecutorDeps,
}

impl KnowledgeSeedingExecutor {
    pub fn new(deps: ExecutorDeps) -> Self {
        Self { deps }
    }
}

#[derive(Deserialize)]
struct MinedFact {
    fact_type: String,
    key: String,
    value: String,
    #[serde(default)]
    context: Option<String>,
}

fn map_fact_type(raw: &str) -> Option<KnowledgeFactType> {
    match raw.to_lowercase().as_str() {
        "business_rule" | "rule" => Some(KnowledgeFactType::BusinessRule),
        "convention" | "naming_convention" => Some(KnowledgeFactType::Convention),
        "terminology" | "term" | "glossary" => Some(KnowledgeFactType::Terminology),
        "overview" | "summary" => Some(KnowledgeFactType::Overview),
        _ => None,
    }
}

#[async_trait::async_trait]
impl NodeExecutor for KnowledgeSeedingExecutor {
    async fn execute(
        &self,
        ctx: &RunContext,
        project_id: Uuid,
        _ontology_id: Uuid,
        datasource_id: Uuid,
        mut progress: ProgressCallback<'_>,
    ) -> OntologyResult<()> {
        ctx.require_provenance()?;
        let project = self.deps.project_repo.get(project_id).await?;
        let existing = self.deps.knowledge_repo.facts_for_project(project_id).await?;

        if !project.overview.trim().is_empty() {
            let fact = KnowledgeFact {
                id: Uuid::new_v4(),
                project_id,
                fact_type: KnowledgeFactType::Overview,
                key: "project_overview".into(),
                value: project.overview.clone(),
                context: None,
                source: ProvenanceSource::Inferred,
            };
            self.deps.knowledge_repo.upsert_fact(&fact).await?;
        }

        progress(NodeProgress {
            processed: 1,
            total: 2,
            phase: "overview_seeded".into(),
            extra: serde_json::Value::Null,
        });

        let already_seeded = existing.iter().any(|f| f.fact_type != KnowledgeFactType::Overview);
        if already_seeded {
            progress(NodeProgress {
                processed: 2,
                total: 2,
                phase: "skipped_already_seeded".into(),
                extra: serde_json::Value::Null,
            });
            return Ok(());
        }

        let snapshot = self.deps.project_repo.latest_schema_snapshot(datasource_id).await?;
        let schema_summary: Vec<String> = snapshot
            .tables()
            .iter()
            .map(|t| format!("{t}: {}", snapshot.columns_of(t).map(|c| c.column_name.as_str()).collect::<Vec<_>>().join(", ")))
            .collect();

        let prompt = format!(
            "Project overview:\n{}\n\nSchema:\n{}\n\n\
             Extract distinct business facts as a JSON array of objects with fields \
             fact_type (one of business_rule, convention, terminology, overview), key, value, context. \
             Only output the JSON array.",
            project.overview,
            schema_summary.join("\n"),
        );

        let response = self
            .deps
            .llm
            .complete(LlmRequest {
                messages: vec![
                    ChatMessage::system("You extract structured business knowledge from database schemas."),
                    ChatMessage::user(prompt),
                ],
                temperature: 0.1,
                max_tokens: 1024,
                workflow_id: ctx.workflow_id(),
            })
            .await?;

        let mined: Vec<MinedFact> = serde_json::from_str(&response.content).unwrap_or_default();
        let mut persisted = 0u64;
        for raw in mined {
            let Some(fact_type) = map_fact_type(&raw.fact_type) else {
                warn!(fact_type = %raw.fact_type, "unrecognized fact type, skipping");
                continue;
            };
            if raw.key.trim().is_empty() || raw.value.trim().is_empty() {
                warn!(key = %raw.key, "fact missing required field, skipping");
                continue;
            }
            let fact = KnowledgeFact {
                id: Uuid::new_v4(),
                project_id,
                fact_type,
                key: raw.key,
                value: raw.value,
                context: raw.context,
                source: ProvenanceSource::Inferred,
            };
            if let Err(e) = self.deps.knowledge_repo.upsert_fact(&fact).await {
                warn!(error = %e, "failed to persist mined fact, skipping");
                continue;
            }
            persisted += 1;
        }

        progress(NodeProgress {
            processed: 2,
            total: 2,
            phase: "llm_seeded".into(),
            extra: serde_json::json!({ "facts_persisted": persisted }),
        });
        Ok(())
    }
}

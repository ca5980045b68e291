//! ColumnEnrichment: LLM-driven description/semantic-type/role/enum-label hints for
//! promoted tables' columns, batched to bound prompt size. Never overwrites
//! human-authored column metadata.

use super::{ExecutorDeps, NodeExecutor, ProgressCallback};
use crate::context::RunContext;
use crate::error::OntologyResult;
use crate::llm::{ChatMessage, LlmRequest};
use crate::model::NodeProgress;
use serde::Deserialize;
use uuid::Uuid;

pub struct ColumnEnrichmentExecutor {
    deps: ExecutorDeps,
}

impl ColumnEnrichmentExecutor {
    pub fn new(deps: ExecutorDeps) -> Self {
        Self { deps }
    }
}

#[derive(Deserialize)]
struct ColumnEnrichmentVerdict {
    table: String,
    column: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    semantic_type: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    enum_labels: Vec<String>,
}

#[async_trait::async_trait]
impl NodeExecutor for ColumnEnrichmentExecutor {
    async fn execute(
        &self,
        ctx: &RunContext,
        _project_id: Uuid,
        ontology_id: Uuid,
        _datasource_id: Uuid,
        mut progress: ProgressCallback<'_>,
    ) -> OntologyResult<()> {
        let mut ontology = self.deps.ontology_repo.get(ontology_id).await?;
        let batch_size = self.deps.config.max_columns_depth_tables as usize;

        let promoted_names: Vec<String> = ontology
            .tables
            .iter()
            .filter(|t| t.entity_verdict.promoted)
            .map(|t| t.table_name.clone())
            .collect();

        let batches: Vec<&[String]> = promoted_names.chunks(batch_size.max(1)).collect();
        let total = batches.len() as u64;

        for (batch_idx, batch) in batches.iter().enumerate() {
            let batch_payload: Vec<serde_json::Value> = batch
                .iter()
                .filter_map(|name| ontology.tables.iter().find(|t| &t.table_name == name))
                .map(|t| {
                    serde_json::json!({
                        "table": t.table_name,
                        "columns": t.columns.iter()
                            .filter(|c| !c.is_human_authored())
                            .map(|c| serde_json::json!({"name": c.column_name, "current_type": c.semantic_type}))
                            .collect::<Vec<_>>(),
                    })
                })
                .collect();

            if batch_payload.iter().all(|t| t["columns"].as_array().map(|a| a.is_empty()).unwrap_or(true)) {
                continue;
            }

            let prompt = format!(
                "Tables and columns:\n{}\n\n\
                 For each non-human-authored column, propose description, semantic_type, role, \
                 and enum_labels (if the column is a small closed set of values). Respond with a \
                 JSON array of {{table, column, description, semantic_type, role, enum_labels}}.",
                serde_json::to_string_pretty(&batch_payload).unwrap_or_default(),
            );

            let response = self
                .deps
                .llm
                .complete(LlmRequest {
                    messages: vec![
                        ChatMessage::system("You write concise business-facing column documentation."),
                        ChatMessage::user(prompt),
                    ],
                    temperature: 0.2,
                    max_tokens: 2048,
                    workflow_id: ctx.workflow_id(),
                })
                .await?;

            let verdicts: Vec<ColumnEnrichmentVerdict> =
                serde_json::from_str(&response.content).unwrap_or_default();

            for verdict in verdicts {
                let Some(table) = ontology.tables.iter_mut().find(|t| t.table_name == verdict.table) else {
                    continue;
                };
                let Some(column) = table.columns.iter_mut().find(|c| c.column_name == verdict.column) else {
                    continue;
                };
                if column.is_human_authored() {
                    continue;
                }
                if verdict.description.is_some() {
                    column.description = verdict.description;
                }
                if verdict.semantic_type.is_some() {
                    column.semantic_type = verdict.semantic_type;
                }
                if verdict.role.is_some() {
                    column.role = verdict.role;
                }
                if !verdict.enum_labels.is_empty() {
                    column.enum_labels = verdict.enum_labels;
                }
            }

            self.deps.ontology_repo.save(&ontology).await?;
            progress(NodeProgress {
                processed: batch_idx as u64 + 1,
                total,
                phase: "batch_enriched".into(),
                extra: serde_json::Value::Null,
            });
        }

        Ok(())
    }
}

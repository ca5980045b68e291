//! FKDiscovery: enumerates FK candidates by naming pattern, probes them against the
//! live datasource for value overlap, then submits batches to the LLM pool for
//! semantic validation.

use super::{ExecutorDeps, NodeExecutor, ProgressCallback};
use crate::cardinality::Cardinality;
use crate::context::RunContext;
use crate::error::OntologyResult;
use crate::llm::{ChatMessage, LlmRequest};
use crate::model::{DetectionMethod, NodeProgress, RelationshipCandidate, RelationshipStatus};
use serde::Deserialize;
use uuid::Uuid;

pub struct FkDiscoveryExecutor {
    deps: ExecutorDeps,
}

impl FkDiscoveryExecutor {
    pub fn new(deps: ExecutorDeps) -> Self {
        Self { deps }
    }
}

/// Minimal English singularization: `categories` -> `category`, `boxes` -> `box`,
/// `orders` -> `order`. Good enough for table-name heuristics; not a full inflector.
fn singular(table: &str) -> String {
    if let Some(stem) = table.strip_suffix("ies") {
        return format!("{stem}y");
    }
    for suffix in ["ses", "xes", "zes", "ches", "shes"] {
        if let Some(stem) = table.strip_suffix(suffix) {
            return format!("{stem}{}", &suffix[..suffix.len() - 2]);
        }
    }
    table.strip_suffix('s').map(str::to_string).unwrap_or_else(|| table.to_string())
}

/// Candidate `(source_table, source_column)` -> `target_table` pairs from naming
/// convention alone: `{table}_id`, `{table}`, `{singular(table)}_id`.
pub fn name_pattern_candidates(
    source_table: &str,
    columns: &[String],
    all_tables: &[&str],
) -> Vec<(String, String)> {
    let mut found = Vec::new();
    for column in columns {
        for &target in all_tables {
            if target == source_table {
                continue;
            }
            let singular_target = singular(target);
            if column == &format!("{target}_id")
                || column == target
                || column == &format!("{singular_target}_id")
            {
                found.push((column.clone(), target.to_string()));
            }
        }
    }
    found
}

#[derive(Deserialize)]
struct LlmVerdict {
    index: usize,
    action: String,
    confidence: f64,
    #[serde(default)]
    reasoning: Option<String>,
}

#[async_trait::async_trait]
impl NodeExecutor for FkDiscoveryExecutor {
    async fn execute(
        &self,
        ctx: &RunContext,
        project_id: Uuid,
        ontology_id: Uuid,
        datasource_id: Uuid,
        mut progress: ProgressCallback<'_>,
    ) -> OntologyResult<()> {
        let snapshot = self.deps.project_repo.latest_schema_snapshot(datasource_id).await?;
        let existing = self.deps.relationship_repo.candidates_for_ontology(ontology_id).await?;
        let facts = self.deps.knowledge_repo.facts_for_project(project_id).await?;
        let tables = snapshot.tables();

        let mut candidates: Vec<RelationshipCandidate> = Vec::new();
        for &table in &tables {
            let columns: Vec<String> = snapshot.columns_of(table).map(|c| c.column_name.clone()).collect();
            for (source_column, target_table) in name_pattern_candidates(table, &columns, &tables) {
                let target_column = "id".to_string();

                if existing.iter().any(|c| {
                    c.source_table == table
                        && c.source_column == source_column
                        && c.status == RelationshipStatus::Accepted
                }) {
                    continue; // idempotence: never downgrade an already-accepted candidate
                }

                let analysis = self
                    .deps
                    .query_executor
                    .analyze_join(datasource_id, table, &source_column, &target_table, &target_column)
                    .await?;
                let cardinality = Cardinality::classify(
                    analysis.join_count,
                    analysis.source_matched,
                    analysis.target_matched,
                );

                candidates.push(RelationshipCandidate {
                    id: Uuid::new_v4(),
                    ontology_id,
                    source_table: table.to_string(),
                    source_column,
                    target_table,
                    target_column,
                    detection_method: DetectionMethod::NameInference,
                    confidence: analysis.join_match_rate(),
                    status: RelationshipStatus::Pending,
                    cardinality,
                    join_match_rate: analysis.join_match_rate(),
                    orphan_rate: analysis.orphan_rate(),
                    llm_reasoning: None,
                });
            }
        }

        progress(NodeProgress {
            processed: candidates.len() as u64,
            total: candidates.len() as u64,
            phase: "structural_candidates_enumerated".into(),
            extra: serde_json::Value::Null,
        });

        if candidates.is_empty() {
            return Ok(());
        }

        let fact_summary: Vec<String> = facts.iter().map(|f| format!("{}: {}", f.key, f.value)).collect();
        let candidate_summary: Vec<serde_json::Value> = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| {
                serde_json::json!({
                    "index": i,
                    "source": format!("{}.{}", c.source_table, c.source_column),
                    "target": format!("{}.{}", c.target_table, c.target_column),
                    "cardinality": format!("{:?}", c.cardinality),
                    "join_match_rate": c.join_match_rate,
                    "orphan_rate": c.orphan_rate,
                })
            })
            .collect();

        let prompt = format!(
            "Domain knowledge:\n{}\n\nCandidate foreign keys:\n{}\n\n\
             For each candidate, decide if it is a real foreign key. Respond with a JSON array \
             of {{index, action: \"confirm\"|\"reject\", confidence: 0..1, reasoning}}.",
            fact_summary.join("\n"),
            serde_json::to_string_pretty(&candidate_summary).unwrap_or_default(),
        );

        let response = self
            .deps
            .llm
            .complete(LlmRequest {
                messages: vec![
                    ChatMessage::system("You validate candidate foreign-key relationships in a relational schema."),
                    ChatMessage::user(prompt),
                ],
                temperature: 0.0,
                max_tokens: 2048,
                workflow_id: ctx.workflow_id(),
            })
            .await?;

        let verdicts: Vec<LlmVerdict> = serde_json::from_str(&response.content).unwrap_or_default();
        let high_confidence = self.deps.config.high_confidence_threshold;

        for verdict in &verdicts {
            let Some(candidate) = candidates.get_mut(verdict.index) else { continue };
            let llm_confirmed = verdict.action == "confirm";
            let structural_agrees = candidate.join_match_rate >= high_confidence;
            if llm_confirmed && structural_agrees {
                candidate.detection_method = DetectionMethod::Hybrid;
            }
            candidate.confidence = verdict.confidence.max(candidate.confidence);
            candidate.llm_reasoning = verdict.reasoning.clone();
            candidate.resolve(high_confidence, llm_confirmed);
        }

        // candidates the LLM did not opine on, or that stayed below the confidence
        // threshold, remain pending and require a human review question.
        let open_questions = self.deps.ontology_repo.questions_for_ontology(ontology_id).await?;
        for candidate in &candidates {
            self.deps.relationship_repo.save_candidate(candidate).await?;
            if candidate.status == RelationshipStatus::Pending
                && !super::has_open_relationship_question(&open_questions, candidate)
            {
                self.deps
                    .ontology_repo
                    .save_question(&super::relationship_review_question(candidate))
                    .await?;
            }
        }

        progress(NodeProgress {
            processed: candidates.len() as u64,
            total: candidates.len() as u64,
            phase: "llm_validated".into(),
            extra: serde_json::Value::Null,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_pattern_matches_table_id_suffix() {
        let columns = vec!["id".to_string(), "user_id".to_string(), "total".to_string()];
        let tables = vec!["orders", "users"];
        let found = name_pattern_candidates("orders", &columns, &tables);
        assert_eq!(found, vec![("user_id".to_string(), "users".to_string())]);
    }

    #[test]
    fn name_pattern_matches_singular_table_id() {
        let columns = vec!["category_id".to_string()];
        let tables = vec!["products", "categories"];
        let found = name_pattern_candidates("products", &columns, &tables);
        assert_eq!(found, vec![("category_id".to_string(), "categories".to_string())]);
    }

    #[test]
    fn self_referencing_table_is_excluded() {
        let columns = vec!["users_id".to_string()];
        let tables = vec!["users"];
        let found = name_pattern_candidates("users", &columns, &tables);
        assert!(found.is_empty());
    }
}

//! PKMatchDiscovery: probes value-set overlap between remaining non-FK unique columns
//! across tables. Same candidate pipeline as FKDiscovery, minus the name-pattern seed.

use super::{ExecutorDeps, NodeExecutor, ProgressCallback};
use crate::cardinality::Cardinality;
use crate::context::RunContext;
use crate::error::OntologyResult;
use crate::model::{DetectionMethod, NodeProgress, RelationshipCandidate, RelationshipStatus};
use uuid::Uuid;

pub struct PkMatchDiscoveryExecutor {
    deps: ExecutorDeps,
}

impl PkMatchDiscoveryExecutor {
    pub fn new(deps: ExecutorDeps) -> Self {
        Self { deps }
    }
}

fn is_unique_non_fk(column: &crate::model::SchemaColumn) -> bool {
    column.row_count > 0 && column.distinct_count == column.row_count && !column.is_primary_key
}

#[async_trait::async_trait]
impl NodeExecutor for PkMatchDiscoveryExecutor {
    async fn execute(
        &self,
        _ctx: &RunContext,
        _project_id: Uuid,
        ontology_id: Uuid,
        datasource_id: Uuid,
        mut progress: ProgressCallback<'_>,
    ) -> OntologyResult<()> {
        let snapshot = self.deps.project_repo.latest_schema_snapshot(datasource_id).await?;
        let existing = self.deps.relationship_repo.candidates_for_ontology(ontology_id).await?;
        let open_questions = self.deps.ontology_repo.questions_for_ontology(ontology_id).await?;
        let high_confidence = self.deps.config.high_confidence_threshold;
        let tables = snapshot.tables();

        let mut probed = 0u64;
        for &source_table in &tables {
            for source_column in snapshot.columns_of(source_table).filter(|c| is_unique_non_fk(c)) {
                for &target_table in &tables {
                    if target_table == source_table {
                        continue;
                    }
                    for target_column in snapshot.columns_of(target_table).filter(|c| c.is_primary_key) {
                        let already_covered = existing.iter().any(|c| {
                            c.source_table == source_table
                                && c.source_column == source_column.column_name
                                && c.target_table == target_table
                        });
                        if already_covered {
                            continue;
                        }

                        let analysis = self
                            .deps
                            .query_executor
                            .analyze_join(
                                datasource_id,
                                source_table,
                                &source_column.column_name,
                                target_table,
                                &target_column.column_name,
                            )
                            .await?;
                        probed += 1;

                        if analysis.join_match_rate() < high_confidence * 0.5 {
                            continue; // not worth proposing; too little overlap
                        }

                        let cardinality = Cardinality::classify(
                            analysis.join_count,
                            analysis.source_matched,
                            analysis.target_matched,
                        );
                        let candidate = RelationshipCandidate {
                            id: Uuid::new_v4(),
                            ontology_id,
                            source_table: source_table.to_string(),
                            source_column: source_column.column_name.clone(),
                            target_table: target_table.to_string(),
                            target_column: target_column.column_name.clone(),
                            detection_method: DetectionMethod::ValueMatch,
                            confidence: analysis.join_match_rate(),
                            status: RelationshipStatus::Pending,
                            cardinality,
                            join_match_rate: analysis.join_match_rate(),
                            orphan_rate: analysis.orphan_rate(),
                            llm_reasoning: None,
                        };
                        self.deps.relationship_repo.save_candidate(&candidate).await?;
                        // value-match candidates never auto-resolve above; every
                        // surviving one stays pending and requires a review question.
                        if !super::has_open_relationship_question(&open_questions, &candidate) {
                            self.deps
                                .ontology_repo
                                .save_question(&super::relationship_review_question(&candidate))
                                .await?;
                        }
                    }
                }
            }
            progress(NodeProgress {
                processed: probed,
                total: probed,
                phase: format!("probed:{source_table}"),
                extra: serde_json::Value::Null,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SchemaColumn;

    fn col(name: &str, rows: i64, distinct: i64, pk: bool) -> SchemaColumn {
        SchemaColumn {
            table_name: "t".into(),
            column_name: name.into(),
            ordinal_position: 1,
            data_type: "text".into(),
            is_nullable: false,
            is_primary_key: pk,
            row_count: rows,
            distinct_count: distinct,
            null_count: 0,
            sample_values: Vec::new(),
        }
    }

    #[test]
    fn unique_non_fk_requires_full_distinctness_and_not_pk() {
        assert!(is_unique_non_fk(&col("external_ref", 100, 100, false)));
        assert!(!is_unique_non_fk(&col("id", 100, 100, true)));
        assert!(!is_unique_non_fk(&col("status", 100, 4, false)));
    }
}

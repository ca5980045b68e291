//! ColumnFeatureExtraction: deterministic per-column classification from counts and
//! samples only. No LLM, no external calls.

use super::{ExecutorDeps, NodeExecutor, ProgressCallback};
use crate::context::RunContext;
use crate::error::OntologyResult;
use crate::model::{ColumnMetadata, EntityVerdict, NodeProgress, SchemaColumn, TableMetadata};
use uuid::Uuid;

pub struct ColumnFeatureExtractionExecutor {
    deps: ExecutorDeps,
}

impl ColumnFeatureExtractionExecutor {
    pub fn new(deps: ExecutorDeps) -> Self {
        Self { deps }
    }
}

/// `enum`, `id-like`, `high-null`, `free-text`, or `unclassified`. Ordering matters:
/// id-like beats enum when both thresholds are met, since a low-cardinality PK/FK
/// column should never be mistaken for an enum of business values.
pub fn classify_column(column: &SchemaColumn) -> &'static str {
    if column.row_count == 0 {
        return "unclassified";
    }
    let null_ratio = column.null_count as f64 / column.row_count as f64;
    if null_ratio >= 0.5 {
        return "high-null";
    }
    if column.is_primary_key
        || column.column_name.ends_with("_id")
        || column.distinct_count == column.row_count
    {
        return "id-like";
    }
    let distinct_ratio = column.distinct_count as f64 / column.row_count as f64;
    if column.distinct_count > 0 && column.distinct_count <= 20 && distinct_ratio < 0.05 {
        return "enum";
    }
    let avg_sample_len = if column.sample_values.is_empty() {
        0
    } else {
        column.sample_values.iter().map(|v| v.len()).sum::<usize>() / column.sample_values.len()
    };
    if avg_sample_len > 80 {
        return "free-text";
    }
    "unclassified"
}

#[async_trait::async_trait]
impl NodeExecutor for ColumnFeatureExtractionExecutor {
    async fn execute(
        &self,
        _ctx: &RunContext,
        _project_id: Uuid,
        ontology_id: Uuid,
        datasource_id: Uuid,
        mut progress: ProgressCallback<'_>,
    ) -> OntologyResult<()> {
        let snapshot = self.deps.project_repo.latest_schema_snapshot(datasource_id).await?;
        let mut ontology = self.deps.ontology_repo.get(ontology_id).await?;
        let total = snapshot.columns.len() as u64;
        let mut processed = 0u64;

        for table_name in snapshot.tables() {
            let table = match ontology.tables.iter_mut().find(|t| t.table_name == table_name) {
                Some(t) => t,
                None => {
                    ontology.tables.push(TableMetadata {
                        table_name: table_name.to_string(),
                        description: None,
                        columns: Vec::new(),
                        entity_verdict: EntityVerdict {
                            promoted: false,
                            promotion_score: 0,
                            is_hub_major: false,
                            is_hub_minor: false,
                            has_multiple_roles: false,
                            related_table_group: None,
                            business_aliases: Vec::new(),
                        },
                    });
                    ontology.tables.last_mut().unwrap()
                }
            };

            for column in snapshot.columns_of(table_name) {
                let feature = classify_column(column);
                match table.columns.iter_mut().find(|c| c.column_name == column.column_name) {
                    Some(existing) if existing.is_human_authored() => {}
                    Some(existing) => existing.semantic_type = Some(feature.to_string()),
                    None => table.columns.push(ColumnMetadata {
                        column_name: column.column_name.clone(),
                        description: None,
                        semantic_type: Some(feature.to_string()),
                        role: None,
                        enum_labels: Vec::new(),
                        source: crate::context::ProvenanceSource::Inferred,
                    }),
                }
                processed += 1;
            }
            progress(NodeProgress {
                processed,
                total,
                phase: format!("classified:{table_name}"),
                extra: serde_json::Value::Null,
            });
        }

        self.deps.ontology_repo.save(&ontology).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, rows: i64, distinct: i64, nulls: i64) -> SchemaColumn {
        SchemaColumn {
            table_name: "orders".into(),
            column_name: name.into(),
            ordinal_position: 1,
            data_type: "text".into(),
            is_nullable: true,
            is_primary_key: false,
            row_count: rows,
            distinct_count: distinct,
            null_count: nulls,
            sample_values: Vec::new(),
        }
    }

    #[test]
    fn id_like_columns_outrank_enum_threshold() {
        let c = col("user_id", 1000, 1000, 0);
        assert_eq!(classify_column(&c), "id-like");
    }

    #[test]
    fn low_cardinality_column_is_enum() {
        let c = col("status", 1000, 4, 0);
        assert_eq!(classify_column(&c), "enum");
    }

    #[test]
    fn mostly_null_column_is_high_null() {
        let c = col("cancelled_reason", 1000, 10, 600);
        assert_eq!(classify_column(&c), "high-null");
    }

    #[test]
    fn long_samples_are_free_text() {
        let mut c = col("notes", 1000, 900, 0);
        c.sample_values = vec!["x".repeat(120), "y".repeat(150)];
        assert_eq!(classify_column(&c), "free-text");
    }
}

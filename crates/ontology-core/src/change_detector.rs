//! Schema-refresh diffing: compares two `SchemaSnapshot`s and emits `PendingChange`
//! rows for a human to triage. Never touches the ontology itself.
//!
//! Grounded on `orchestrator/archetype_logic.rs`'s shape (pure function, input data
//! in, a result struct out, no side effects beyond what the caller chooses to
//! persist) generalized from one profile blob to a pair of schema snapshots.

use crate::model::{PendingChange, PendingChangeStatus, SchemaSnapshot};
use std::collections::HashMap;
use uuid::Uuid;

const ACTION_CREATE_ENTITY: &str = "create_entity";
const ACTION_REVIEW_ENTITY: &str = "review_entity";
const ACTION_CREATE_COLUMN_METADATA: &str = "create_column_metadata";
const ACTION_REVIEW_COLUMN: &str = "review_column";
const ACTION_UPDATE_COLUMN_METADATA: &str = "update_column_metadata";

/// Diffs `prior` against `current` and returns one `PendingChange` per detected
/// table/column addition, removal, or type change. Pure; callers persist the result
/// via `OntologyRepository::save_pending_change`.
pub fn detect_changes(project_id: Uuid, prior: &SchemaSnapshot, current: &SchemaSnapshot) -> Vec<PendingChange> {
    let mut changes = Vec::new();

    let prior_tables: HashMap<&str, ()> = prior.tables().into_iter().map(|t| (t, ())).collect();
    let current_tables: HashMap<&str, ()> = current.tables().into_iter().map(|t| (t, ())).collect();

    for &table in current_tables.keys() {
        if !prior_tables.contains_key(table) {
            changes.push(pending_change(
                project_id,
                "new_table",
                table,
                None,
                None,
                None,
                ACTION_CREATE_ENTITY,
            ));
        }
    }
    for &table in prior_tables.keys() {
        if !current_tables.contains_key(table) {
            changes.push(pending_change(
                project_id,
                "dropped_table",
                table,
                None,
                None,
                None,
                ACTION_REVIEW_ENTITY,
            ));
        }
    }

    for &table in current_tables.keys() {
        if !prior_tables.contains_key(table) {
            continue; // already reported as a new table; its columns aren't a separate diff
        }

        let prior_cols: HashMap<&str, &crate::model::SchemaColumn> =
            prior.columns_of(table).map(|c| (c.column_name.as_str(), c)).collect();
        let current_cols: HashMap<&str, &crate::model::SchemaColumn> =
            current.columns_of(table).map(|c| (c.column_name.as_str(), c)).collect();

        for (&name, col) in &current_cols {
            match prior_cols.get(name) {
                None => changes.push(pending_change(
                    project_id,
                    "new_column",
                    table,
                    Some(name),
                    None,
                    Some(&col.data_type),
                    ACTION_CREATE_COLUMN_METADATA,
                )),
                Some(prior_col) if prior_col.data_type != col.data_type => changes.push(pending_change(
                    project_id,
                    "column_type_change",
                    table,
                    Some(name),
                    Some(&prior_col.data_type),
                    Some(&col.data_type),
                    ACTION_UPDATE_COLUMN_METADATA,
                )),
                _ => {}
            }
        }
        for &name in prior_cols.keys() {
            if !current_cols.contains_key(name) {
                changes.push(pending_change(
                    project_id,
                    "dropped_column",
                    table,
                    Some(name),
                    None,
                    None,
                    ACTION_REVIEW_COLUMN,
                ));
            }
        }
    }

    changes
}

#[allow(clippy::too_many_arguments)]
fn pending_change(
    project_id: Uuid,
    change_type: &str,
    table_name: &str,
    column_name: Option<&str>,
    old_value: Option<&str>,
    new_value: Option<&str>,
    suggested_action: &str,
) -> PendingChange {
    PendingChange {
        id: Uuid::new_v4(),
        project_id,
        change_type: change_type.to_string(),
        table_name: table_name.to_string(),
        column_name: column_name.map(str::to_string),
        old_value: old_value.map(str::to_string),
        new_value: new_value.map(str::to_string),
        suggested_action: suggested_action.to_string(),
        status: PendingChangeStatus::Pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SchemaColumn;

    fn col(table: &str, name: &str, data_type: &str) -> SchemaColumn {
        SchemaColumn {
            table_name: table.into(),
            column_name: name.into(),
            ordinal_position: 1,
            data_type: data_type.into(),
            is_nullable: false,
            is_primary_key: false,
            row_count: 0,
            distinct_count: 0,
            null_count: 0,
            sample_values: Vec::new(),
        }
    }

    fn snapshot(columns: Vec<SchemaColumn>) -> SchemaSnapshot {
        SchemaSnapshot { datasource_id: Uuid::new_v4(), taken_at: chrono::Utc::now(), columns }
    }

    #[test]
    fn detects_new_table() {
        let prior = snapshot(vec![col("users", "id", "uuid")]);
        let current = snapshot(vec![col("users", "id", "uuid"), col("orders", "id", "uuid")]);
        let changes = detect_changes(Uuid::new_v4(), &prior, &current);
        assert!(changes.iter().any(|c| c.change_type == "new_table" && c.table_name == "orders"));
    }

    #[test]
    fn detects_dropped_column_and_type_change() {
        let prior = snapshot(vec![
            col("users", "id", "uuid"),
            col("users", "legacy_flag", "boolean"),
            col("users", "age", "integer"),
        ]);
        let current = snapshot(vec![
            col("users", "id", "uuid"),
            col("users", "age", "bigint"),
        ]);
        let changes = detect_changes(Uuid::new_v4(), &prior, &current);
        assert!(changes
            .iter()
            .any(|c| c.change_type == "dropped_column" && c.column_name.as_deref() == Some("legacy_flag")));
        assert!(changes.iter().any(|c| c.change_type == "column_type_change"
            && c.column_name.as_deref() == Some("age")
            && c.old_value.as_deref() == Some("integer")
            && c.new_value.as_deref() == Some("bigint")));
    }

    #[test]
    fn new_table_does_not_also_report_its_columns_as_new_column_changes() {
        let prior = snapshot(vec![col("users", "id", "uuid")]);
        let current = snapshot(vec![col("users", "id", "uuid"), col("orders", "id", "uuid")]);
        let changes = detect_changes(Uuid::new_v4(), &prior, &current);
        assert!(!changes.iter().any(|c| c.change_type == "new_column"));
    }
}

//! Project, datasource reference, and schema-snapshot entities.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tenant scope: all other entities belong to exactly one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    /// Free-text description used to bootstrap KnowledgeSeeding; may be empty.
    #[serde(default)]
    pub overview: String,
}

/// Connection descriptor for an external database. Credentials are never handled
/// directly by this crate; the datasource adapter factory (§6) owns the encrypted
/// blob and yields sessions this crate consumes through `adapters::QueryExecutor`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasourceRef {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub kind: String,
}

/// One `{table, column}` row observed in a datasource at refresh time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaColumn {
    pub table_name: String,
    pub column_name: String,
    pub ordinal_position: i32,
    pub data_type: String,
    pub is_nullable: bool,
    pub is_primary_key: bool,
    pub row_count: i64,
    pub distinct_count: i64,
    pub null_count: i64,
    /// Bounded sample of observed values, used for FK/PK value-overlap analysis.
    #[serde(default)]
    pub sample_values: Vec<String>,
}

/// Full set of columns observed in a datasource at one point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub datasource_id: Uuid,
    pub taken_at: chrono::DateTime<chrono::Utc>,
    pub columns: Vec<SchemaColumn>,
}

impl SchemaSnapshot {
    pub fn tables(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .columns
            .iter()
            .map(|c| c.table_name.as_str())
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    pub fn columns_of<'a>(&'a self, table: &str) -> impl Iterator<Item = &'a SchemaColumn> {
        self.columns.iter().filter(move |c| c.table_name == table)
    }
}

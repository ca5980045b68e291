//! Datasource adapter interface: the core defines the contract a connector must
//! satisfy; the connector itself (driving an actual Postgres/MySQL/etc. datasource)
//! is owned by code outside this crate, the same split `knowledge/traits.rs`'s
//! `SovereignModule` draws between the core and domain-specific verticals.

use crate::error::OntologyResult;
use crate::model::SchemaSnapshot;
use async_trait::async_trait;
use uuid::Uuid;

/// Observed join statistics for one candidate `(sourceColumn, targetColumn)` pair,
/// produced by a value-overlap probe against the live datasource.
#[derive(Debug, Clone, Copy)]
pub struct JoinAnalysis {
    pub join_count: u64,
    pub source_matched: u64,
    pub target_matched: u64,
    pub orphan_count: u64,
}

impl JoinAnalysis {
    pub fn orphan_rate(&self) -> f64 {
        if self.join_count == 0 {
            0.0
        } else {
            self.orphan_count as f64 / self.join_count as f64
        }
    }

    pub fn join_match_rate(&self) -> f64 {
        if self.join_count == 0 {
            0.0
        } else {
            let matched = self.source_matched.min(self.target_matched);
            matched as f64 / self.join_count as f64
        }
    }
}

/// Cheap reachability check before a DAG is allowed to start.
#[async_trait]
pub trait ConnectionTester: Send + Sync {
    async fn test_connection(&self, datasource_id: Uuid) -> OntologyResult<()>;
}

/// Refreshes the `SchemaSnapshot` this crate's executors read.
#[async_trait]
pub trait SchemaDiscoverer: Send + Sync {
    async fn discover_schema(&self, datasource_id: Uuid) -> OntologyResult<SchemaSnapshot>;
}

/// Runs the value-overlap probes FKDiscovery and PKMatchDiscovery need. Implemented
/// once per supported external datasource kind outside this crate.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn analyze_join(
        &self,
        datasource_id: Uuid,
        source_table: &str,
        source_column: &str,
        target_table: &str,
        target_column: &str,
    ) -> OntologyResult<JoinAnalysis>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orphan_rate_is_zero_with_no_joins() {
        let j = JoinAnalysis { join_count: 0, source_matched: 0, target_matched: 0, orphan_count: 0 };
        assert_eq!(j.orphan_rate(), 0.0);
    }

    #[test]
    fn join_match_rate_uses_the_tighter_side() {
        let j = JoinAnalysis { join_count: 100, source_matched: 100, target_matched: 40, orphan_count: 0 };
        assert!((j.join_match_rate() - 0.4).abs() < f64::EPSILON);
    }
}

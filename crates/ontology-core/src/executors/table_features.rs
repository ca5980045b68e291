//! TableFeatureExtraction: hub detection, role-polymorphism, related-table grouping,
//! and the promotion-score roll-up that decides which tables become entities.

use super::{ExecutorDeps, NodeExecutor, ProgressCallback};
use crate::context::RunContext;
use crate::error::OntologyResult;
use crate::model::{KnowledgeFact, KnowledgeFactType, NodeProgress, RelationshipCandidate, RelationshipStatus};
use std::collections::HashMap;
use uuid::Uuid;

pub struct TableFeatureExtractionExecutor {
    deps: ExecutorDeps,
}

impl TableFeatureExtractionExecutor {
    pub fn new(deps: ExecutorDeps) -> Self {
        Self { deps }
    }
}

const HUB_MAJOR_INBOUND: usize = 5;
const HUB_MINOR_INBOUND: usize = 3;

#[derive(Default, Debug, Clone)]
pub struct TableSignals {
    pub inbound_edges: usize,
    pub outbound_edges: usize,
    pub distinct_roles: usize,
    pub related_group: Option<String>,
    pub business_aliases: Vec<String>,
}

impl TableSignals {
    pub fn is_hub_major(&self) -> bool {
        self.inbound_edges >= HUB_MAJOR_INBOUND
    }

    /// A table also counts as a minor hub when it's the target of role-polymorphic
    /// references (distinct FK columns pointing at it), even with fewer raw inbound
    /// edges than `HUB_MINOR_INBOUND` — two columns each naming a distinct role is
    /// already evidence of centrality.
    pub fn is_hub_minor(&self) -> bool {
        self.inbound_edges >= HUB_MINOR_INBOUND || self.has_multiple_roles()
    }

    pub fn has_multiple_roles(&self) -> bool {
        self.distinct_roles >= 2
    }

    /// Weighted score per the promotion table; not clamped (0..=110 in practice).
    pub fn promotion_score(&self) -> i32 {
        let mut score = 0;
        if self.is_hub_major() {
            score += 30;
        } else if self.is_hub_minor() {
            score += 20;
        }
        if self.has_multiple_roles() {
            score += 25;
        }
        if self.related_group.is_some() {
            score += 10;
        }
        if !self.business_aliases.is_empty() {
            score += 15;
        }
        if self.outbound_edges >= 3 {
            score += 10;
        }
        score
    }
}

/// Groups table names sharing a `_`-delimited prefix of at least two tables, e.g.
/// `order_items` and `order_notes` both relate to a group keyed `order`.
pub fn related_table_groups<'a>(tables: &[&'a str]) -> HashMap<&'a str, String> {
    let mut prefix_counts: HashMap<&str, usize> = HashMap::new();
    let mut prefixes: HashMap<&str, &str> = HashMap::new();
    for &table in tables {
        if let Some((prefix, _)) = table.split_once('_') {
            *prefix_counts.entry(prefix).or_insert(0) += 1;
            prefixes.insert(table, prefix);
        }
    }
    prefixes
        .into_iter()
        .filter(|(_, prefix)| prefix_counts.get(prefix).copied().unwrap_or(0) >= 2)
        .map(|(table, prefix)| (table, prefix.to_string()))
        .collect()
}

/// A table's business aliases are the values of `terminology` knowledge facts keyed
/// by that table's name (case-insensitive) — e.g. a mined fact `{key: "users",
/// value: "customer"}` names `users` a business alias of "customer".
fn business_aliases_by_table(tables: &[&str], facts: &[KnowledgeFact]) -> HashMap<String, Vec<String>> {
    let mut aliases: HashMap<String, Vec<String>> = HashMap::new();
    for fact in facts {
        if fact.fact_type != KnowledgeFactType::Terminology {
            continue;
        }
        let Some(&table) = tables.iter().find(|t| t.eq_ignore_ascii_case(&fact.key)) else { continue };
        aliases.entry(table.to_string()).or_default().push(fact.value.clone());
    }
    aliases
}

/// Builds per-table signals from accepted-or-pending relationship candidates and
/// mined business-terminology facts.
pub fn compute_signals(
    tables: &[&str],
    candidates: &[RelationshipCandidate],
    facts: &[KnowledgeFact],
) -> HashMap<String, TableSignals> {
    let mut signals: HashMap<String, TableSignals> = tables
        .iter()
        .map(|t| (t.to_string(), TableSignals::default()))
        .collect();

    let mut roles_by_target: HashMap<String, Vec<String>> = HashMap::new();
    for candidate in candidates {
        if candidate.status == RelationshipStatus::Rejected {
            continue;
        }
        if let Some(s) = signals.get_mut(&candidate.source_table) {
            s.outbound_edges += 1;
        }
        if let Some(s) = signals.get_mut(&candidate.target_table) {
            s.inbound_edges += 1;
        }
        roles_by_target
            .entry(candidate.target_table.clone())
            .or_default()
            .push(candidate.source_column.clone());
    }
    for (target, roles) in &roles_by_target {
        let mut unique = roles.clone();
        unique.sort();
        unique.dedup();
        if let Some(s) = signals.get_mut(target) {
            s.distinct_roles = unique.len();
        }
    }

    let groups = related_table_groups(tables);
    for (table, prefix) in groups {
        if let Some(s) = signals.get_mut(table) {
            s.related_group = Some(prefix);
        }
    }

    for (table, values) in business_aliases_by_table(tables, facts) {
        if let Some(s) = signals.get_mut(&table) {
            s.business_aliases = values;
        }
    }

    signals
}

#[async_trait::async_trait]
impl NodeExecutor for TableFeatureExtractionExecutor {
    async fn execute(
        &self,
        _ctx: &RunContext,
        project_id: Uuid,
        ontology_id: Uuid,
        datasource_id: Uuid,
        mut progress: ProgressCallback<'_>,
    ) -> OntologyResult<()> {
        let snapshot = self.deps.project_repo.latest_schema_snapshot(datasource_id).await?;
        let candidates = self.deps.relationship_repo.candidates_for_ontology(ontology_id).await?;
        let facts = self.deps.knowledge_repo.facts_for_project(project_id).await?;
        let tables = snapshot.tables();
        let signals = compute_signals(&tables, &candidates, &facts);

        let mut ontology = self.deps.ontology_repo.get(ontology_id).await?;
        let threshold = self.deps.config.promotion_threshold;
        let total = ontology.tables.len() as u64;

        for (i, table) in ontology.tables.iter_mut().enumerate() {
            let Some(s) = signals.get(&table.table_name) else { continue };
            let score = s.promotion_score();
            table.entity_verdict.is_hub_major = s.is_hub_major();
            table.entity_verdict.is_hub_minor = s.is_hub_minor();
            table.entity_verdict.has_multiple_roles = s.has_multiple_roles();
            table.entity_verdict.related_table_group = s.related_group.clone();
            table.entity_verdict.business_aliases = s.business_aliases.clone();
            table.entity_verdict.promotion_score = score;
            table.entity_verdict.promoted = score >= threshold;

            progress(NodeProgress {
                processed: i as u64 + 1,
                total,
                phase: format!("scored:{}", table.table_name),
                extra: serde_json::json!({ "score": score }),
            });
        }

        self.deps.ontology_repo.save(&ontology).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hub_major_threshold_is_five_inbound() {
        let s = TableSignals { inbound_edges: 5, ..Default::default() };
        assert!(s.is_hub_major());
        assert_eq!(s.promotion_score(), 30);
    }

    #[test]
    fn hub_minor_below_major_threshold() {
        let s = TableSignals { inbound_edges: 3, ..Default::default() };
        assert!(s.is_hub_minor());
        assert!(!s.is_hub_major());
        assert_eq!(s.promotion_score(), 20);
    }

    #[test]
    fn combined_signals_sum_to_promotion_score() {
        let s = TableSignals {
            inbound_edges: 5,
            distinct_roles: 2,
            related_group: Some("order".into()),
            business_aliases: vec!["customer".into()],
            outbound_edges: 3,
        };
        assert_eq!(s.promotion_score(), 30 + 25 + 10 + 15 + 10);
    }

    fn terminology_fact(table: &str, alias: &str) -> KnowledgeFact {
        KnowledgeFact {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            fact_type: KnowledgeFactType::Terminology,
            key: table.to_string(),
            value: alias.to_string(),
            context: None,
            source: crate::context::ProvenanceSource::Inferred,
        }
    }

    #[test]
    fn compute_signals_collects_business_aliases_from_terminology_facts() {
        let tables = vec!["users", "orders"];
        let facts = vec![terminology_fact("users", "customer"), terminology_fact("orders", "purchase")];
        let signals = compute_signals(&tables, &[], &facts);
        assert_eq!(signals["users"].business_aliases, vec!["customer".to_string()]);
        assert_eq!(signals["orders"].business_aliases, vec!["purchase".to_string()]);
    }

    #[test]
    fn compute_signals_ignores_non_terminology_facts() {
        let tables = vec!["users"];
        let mut fact = terminology_fact("users", "customer");
        fact.fact_type = KnowledgeFactType::BusinessRule;
        let signals = compute_signals(&tables, &[], std::slice::from_ref(&fact));
        assert!(signals["users"].business_aliases.is_empty());
    }

    #[test]
    fn related_groups_require_at_least_two_tables_sharing_prefix() {
        let tables = vec!["order_items", "order_notes", "users"];
        let groups = related_table_groups(&tables);
        assert_eq!(groups.get("order_items"), Some(&"order".to_string()));
        assert_eq!(groups.get("order_notes"), Some(&"order".to_string()));
        assert!(!groups.contains_key("users"));
    }
}

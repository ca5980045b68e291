//! `DagRuntime`: claims, executes, cancels, and finalizes DAGs. The central dispatch
//! loop over the canonical node list.
//!
//! Grounded on `orchestrator/mod.rs`'s `Orchestrator::dispatch` (central loop
//! matching over a closed goal enum, delegating to per-goal handlers) and
//! `orchestrator/maintenance.rs`'s cycle loop shape (interval tick -> guarded phase
//! sequence -> telemetry event), adapted here to a per-DAG run rather than a single
//! process-wide loop. Panic isolation per node uses `tokio::spawn` + `JoinHandle`: a
//! panicking executor returns `Err(JoinError)` to the awaiting runtime instead of
//! unwinding through it, since every node executor is already async and spawned work
//! is the idiomatic tokio isolation boundary.

use crate::adapters::QueryExecutor;
use crate::config::RuntimeConfig;
use crate::context::{Provenance, RunContext, TenantScope};
use crate::error::{OntologyError, OntologyResult};
use crate::executors::{ExecutorDeps, NodeExecutor, NodeExecutorKind};
use crate::heartbeat::HeartbeatRegistry;
use crate::llm::LlmPool;
use crate::model::{
    Dag, DagStatus, KnowledgeFact, KnowledgeFactType, NodeName, NodeStatus,
};
use crate::repository::{
    DagRepository, KnowledgeRepository, OntologyRepository, ProjectRepository,
    RelationshipRepository,
};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// `dagID -> cancel` for in-flight runs, constructed once at startup and passed
/// explicitly. Pruned when a DAG reaches a terminal status.
pub type ActiveDagRegistry = Arc<DashMap<Uuid, watch::Sender<bool>>>;

pub struct DagRuntime {
    dag_repo: Arc<dyn DagRepository>,
    ontology_repo: Arc<dyn OntologyRepository>,
    knowledge_repo: Arc<dyn KnowledgeRepository>,
    relationship_repo: Arc<dyn RelationshipRepository>,
    project_repo: Arc<dyn ProjectRepository>,
    query_executor: Arc<dyn QueryExecutor>,
    llm: Arc<LlmPool>,
    config: Arc<RuntimeConfig>,
    owner_id: Uuid,
    active_dags: ActiveDagRegistry,
    heartbeats: Arc<HeartbeatRegistry>,
}

impl DagRuntime {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        dag_repo: Arc<dyn DagRepository>,
        ontology_repo: Arc<dyn OntologyRepository>,
        knowledge_repo: Arc<dyn KnowledgeRepository>,
        relationship_repo: Arc<dyn RelationshipRepository>,
        project_repo: Arc<dyn ProjectRepository>,
        query_executor: Arc<dyn QueryExecutor>,
        llm: Arc<LlmPool>,
        config: Arc<RuntimeConfig>,
    ) -> Arc<Self> {
        Arc::new(Self {
            dag_repo,
            ontology_repo,
            knowledge_repo,
            relationship_repo,
            project_repo,
            query_executor,
            llm,
            config,
            owner_id: Uuid::new_v4(),
            active_dags: Arc::new(DashMap::new()),
            heartbeats: Arc::new(HeartbeatRegistry::new()),
        })
    }

    fn executor_deps(&self) -> ExecutorDeps {
        ExecutorDeps {
            ontology_repo: Arc::clone(&self.ontology_repo),
            knowledge_repo: Arc::clone(&self.knowledge_repo),
            relationship_repo: Arc::clone(&self.relationship_repo),
            project_repo: Arc::clone(&self.project_repo),
            query_executor: Arc::clone(&self.query_executor),
            llm: Arc::clone(&self.llm),
            config: Arc::clone(&self.config),
        }
    }

    /// Starts (or reuses) a DAG for `(project_id, datasource_id)`. Returns the
    /// existing DAG if one is already `pending`/`running` with a fresh heartbeat,
    /// reclaiming it first if stale. Otherwise creates a new DAG, spawns the
    /// execution task, and returns immediately.
    #[instrument(skip(self), fields(project_id = %project_id, datasource_id = %datasource_id))]
    pub async fn start(
        self: &Arc<Self>,
        project_id: Uuid,
        datasource_id: Uuid,
        user_id: Uuid,
        project_overview: &str,
    ) -> OntologyResult<Dag> {
        if !project_overview.is_empty() {
            let fact = KnowledgeFact {
                id: Uuid::new_v4(),
                project_id,
                fact_type: KnowledgeFactType::Overview,
                key: "overview".to_string(),
                value: project_overview.to_string(),
                context: None,
                source: crate::context::ProvenanceSource::Manual,
            };
            if let Err(e) = self.knowledge_repo.upsert_fact(&fact).await {
                warn!(error = %e, "failed to seed project overview as a knowledge fact");
            }
        }

        if let Some(existing) = self.dag_repo.active_dag_for_project(project_id).await? {
            let fresh = existing.is_fresh(chrono::Utc::now(), self.config.heartbeat_stale_after_chrono());
            if fresh {
                return Ok(existing);
            }
            // Stale: reclaim the same DAG record rather than creating a second one,
            // since the "at most one pending/running DAG per project" invariant is
            // enforced here, not by the repository's `create_dag`.
            let runtime = Arc::clone(self);
            let dag_id = existing.id;
            tokio::spawn(async move {
                runtime.run(dag_id, user_id).await;
            });
            return Ok(existing);
        }

        let dag = self.dag_repo.create_dag(project_id, datasource_id).await?;
        info!(dag_id = %dag.id, "dag created");

        let runtime = Arc::clone(self);
        let dag_id = dag.id;
        tokio::spawn(async move {
            runtime.run(dag_id, user_id).await;
        });

        Ok(dag)
    }

    /// The execution task body. Never returns an error: all failure paths record
    /// themselves on the DAG/node and exit.
    #[instrument(skip(self))]
    async fn run(self: Arc<Self>, dag_id: Uuid, user_id: Uuid) {
        let stale_after = self.config.heartbeat_stale_after_chrono();
        let claimed = match self.dag_repo.claim_ownership(dag_id, self.owner_id, stale_after).await {
            Ok(true) => true,
            Ok(false) => {
                info!(%dag_id, "lost ownership claim race; another instance owns this dag");
                false
            }
            Err(e) => {
                error!(%dag_id, error = %e, "claim_ownership failed");
                false
            }
        };
        if !claimed {
            return;
        }

        let project_id = match self.dag_repo.get_dag(dag_id).await {
            Ok(dag) => dag.project_id,
            Err(e) => {
                error!(%dag_id, error = %e, "failed to load dag before run");
                let _ = self.dag_repo.release_ownership(dag_id, self.owner_id).await;
                return;
            }
        };

        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.active_dags.insert(dag_id, cancel_tx);
        self.heartbeats.start(
            dag_id,
            self.owner_id,
            Arc::clone(&self.dag_repo),
            self.config.heartbeat_interval(),
        );

        let ctx = RunContext::new(cancel_rx)
            .with_tenant_scope(TenantScope::new(project_id))
            .with_provenance(Provenance::inferred(user_id))
            .with_workflow_id(dag_id);

        let outcome = self.run_nodes(dag_id, &ctx).await;

        self.heartbeats.stop(dag_id);
        self.active_dags.remove(&dag_id);
        let _ = self.dag_repo.release_ownership(dag_id, self.owner_id).await;

        if let Err(e) = outcome {
            error!(%dag_id, error = %e, "dag run failed");
        }
    }

    async fn run_nodes(&self, dag_id: Uuid, ctx: &RunContext) -> OntologyResult<()> {
        let dag = self.dag_repo.get_dag(dag_id).await?;
        let project_id = dag.project_id;
        let datasource_id = dag.datasource_id;
        let ontology_id = match dag.ontology_id {
            Some(id) => id,
            None => {
                let draft = self.ontology_repo.create_draft(project_id).await?;
                draft.id
            }
        };

        self.dag_repo.mark_dag_running(dag_id).await?;

        for node_name in NodeName::canonical_order() {
            if ctx.is_cancelled() {
                self.cancel(dag_id).await?;
                return Ok(());
            }

            let nodes = self.dag_repo.nodes_for_dag(dag_id).await?;
            let Some(node) = nodes.into_iter().find(|n| n.node_name == node_name) else {
                continue;
            };
            if node.status == NodeStatus::Completed {
                continue;
            }

            self.dag_repo.set_current_node(dag_id, node_name).await?;
            let mut node = node;
            node.status = NodeStatus::Running;
            node.started_at = Some(chrono::Utc::now());
            self.dag_repo.update_node(&node).await?;

            let result = self.dispatch_node(node_name, ctx, project_id, ontology_id, datasource_id, dag_id).await;

            match result {
                Ok(()) => {
                    node.status = NodeStatus::Completed;
                    node.finished_at = Some(chrono::Utc::now());
                    self.dag_repo.update_node(&node).await?;
                    info!(%dag_id, node = node_name.as_str(), "node completed");
                }
                Err(e) => {
                    node.status = NodeStatus::Failed;
                    node.error_message = Some(e.to_string());
                    node.finished_at = Some(chrono::Utc::now());
                    let _ = self.dag_repo.update_node(&node).await;
                    let _ = self.dag_repo.mark_dag_failed(dag_id, &e.to_string()).await;
                    error!(%dag_id, node = node_name.as_str(), error = %e, "node failed");
                    return Err(e);
                }
            }
        }

        self.dag_repo.mark_dag_completed(dag_id, ontology_id).await?;
        info!(%dag_id, "dag completed");
        Ok(())
    }

    /// Dispatches one node inside its own spawned task so a panic becomes a
    /// `JoinError` the caller observes as `FatalInvariant`, rather than unwinding
    /// into the run loop and leaving the heartbeat/registry state half-updated.
    #[instrument(skip(self, ctx))]
    async fn dispatch_node(
        &self,
        node_name: NodeName,
        ctx: &RunContext,
        project_id: Uuid,
        ontology_id: Uuid,
        datasource_id: Uuid,
        dag_id: Uuid,
    ) -> OntologyResult<()> {
        let Some(executor) = NodeExecutorKind::for_node(node_name, self.executor_deps()) else {
            return Err(OntologyError::fatal_invariant(format!(
                "no executor registered for node {}",
                node_name.as_str()
            )));
        };
        let dag_repo = Arc::clone(&self.dag_repo);
        let ctx = ctx.clone();

        let handle = tokio::spawn(async move {
            let progress: Box<dyn FnMut(crate::model::NodeProgress) + Send> = Box::new(move |p| {
                let dag_repo = Arc::clone(&dag_repo);
                tokio::spawn(async move {
                    if let Ok(mut nodes) = dag_repo.nodes_for_dag(dag_id).await {
                        if let Some(node) = nodes.iter_mut().find(|n| n.node_name == node_name) {
                            node.progress = p;
                            let _ = dag_repo.update_node(node).await;
                        }
                    }
                });
            });
            executor.execute(&ctx, project_id, ontology_id, datasource_id, progress).await
        });

        match handle.await {
            Ok(result) => result,
            Err(join_err) => Err(OntologyError::fatal_invariant(format!(
                "node {} panicked: {join_err}",
                node_name.as_str()
            ))),
        }
    }

    /// Transitions every non-completed node to `skipped` and the DAG to `cancelled`,
    /// then signals the running executor's `RunContext` so it aborts at its next
    /// suspension point.
    #[instrument(skip(self))]
    pub async fn cancel(&self, dag_id: Uuid) -> OntologyResult<()> {
        if let Some(entry) = self.active_dags.get(&dag_id) {
            let _ = entry.send(true);
        }

        let nodes = self.dag_repo.nodes_for_dag(dag_id).await?;
        for mut node in nodes {
            if node.status != NodeStatus::Completed {
                node.status = NodeStatus::Skipped;
                self.dag_repo.update_node(&node).await?;
            }
        }
        self.dag_repo.mark_dag_cancelled(dag_id).await?;
        self.heartbeats.stop(dag_id);
        self.active_dags.remove(&dag_id);
        info!(%dag_id, "dag cancelled");
        Ok(())
    }

    /// Records a failure directly on the DAG without going through the run loop —
    /// used by callers recovering an orphaned DAG found via `stale_running_dags`.
    pub async fn mark_dag_failed(&self, dag_id: Uuid, message: &str) -> OntologyResult<()> {
        if let Ok(nodes) = self.dag_repo.nodes_for_dag(dag_id).await {
            if let Some(mut current) = nodes
                .into_iter()
                .find(|n| n.status == NodeStatus::Running)
            {
                current.status = NodeStatus::Failed;
                current.error_message = Some(message.to_string());
                let _ = self.dag_repo.update_node(&current).await;
            }
        }
        self.dag_repo.mark_dag_failed(dag_id, message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::QueryExecutor as _;
    use crate::llm::{ChatMessage, LlmClient, LlmRequest, LlmResponse};
    use crate::repository::memory::InMemoryStore;

    struct StubLlm;
    #[async_trait::async_trait]
    impl LlmClient for StubLlm {
        async fn complete(&self, _req: LlmRequest) -> OntologyResult<LlmResponse> {
            Ok(LlmResponse { content: "[]".to_string(), token_counts: Default::default() })
        }
    }

    struct StubQuery;
    #[async_trait::async_trait]
    impl QueryExecutor for StubQuery {
        async fn analyze_join(
            &self,
            _datasource_id: Uuid,
            _source_table: &str,
            _source_column: &str,
            _target_table: &str,
            _target_column: &str,
        ) -> OntologyResult<crate::adapters::JoinAnalysis> {
            Ok(crate::adapters::JoinAnalysis { join_count: 0, source_matched: 0, target_matched: 0, orphan_count: 0 })
        }
    }

    fn test_runtime() -> (Arc<DagRuntime>, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let config = Arc::new(RuntimeConfig::default());
        let llm = Arc::new(LlmPool::new(Arc::new(StubLlm), &config));
        let runtime = DagRuntime::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            Arc::new(StubQuery),
            llm,
            config,
        );
        (runtime, store)
    }

    #[tokio::test]
    async fn start_reuses_active_dag_for_same_project_and_datasource() {
        let (runtime, _store) = test_runtime();
        let project_id = Uuid::new_v4();
        let datasource_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        let first = runtime.start(project_id, datasource_id, user_id, "").await.unwrap();
        let second = runtime.start(project_id, datasource_id, user_id, "").await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn cancel_marks_pending_dag_cancelled() {
        let (runtime, store) = test_runtime();
        let dag = store.create_dag(Uuid::new_v4(), Uuid::new_v4()).await.unwrap();
        runtime.cancel(dag.id).await.unwrap();
        let reloaded = store.get_dag(dag.id).await.unwrap();
        assert_eq!(reloaded.status, DagStatus::Cancelled);
    }
}

//! Per-DAG heartbeat ticker: refreshes `DagRepository::refresh_heartbeat` every
//! `T_hb` while a DAG is running, and is guaranteed to stop on every exit path.
//!
//! Grounded on `orchestrator/maintenance.rs`'s `tokio::spawn` + `tokio::time::interval`
//! cycle loop and its `IdleTracker`'s `Arc<AtomicU64>` last-activity pattern, adapted
//! from a single process-wide ticker to one ticker per running DAG, registered in a
//! `dagID -> cancel` map so any caller can stop a specific DAG's ticker without
//! touching the others.

use crate::repository::DagRepository;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

/// `dagID -> cancel` registry. One entry per currently-running DAG's heartbeat task.
#[derive(Default)]
pub struct HeartbeatRegistry {
    cancels: DashMap<Uuid, watch::Sender<bool>>,
}

impl HeartbeatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns a ticker for `dag_id` that calls `refresh_heartbeat` every `interval`
    /// until cancelled, the owning runtime drops the registry, or the task panics
    /// (panics cannot escape the ticker: every tick is a plain repository call).
    pub fn start(
        &self,
        dag_id: Uuid,
        owner_id: Uuid,
        repo: Arc<dyn DagRepository>,
        interval: std::time::Duration,
    ) {
        let (tx, mut rx) = watch::channel(false);
        self.cancels.insert(dag_id, tx);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = repo.refresh_heartbeat(dag_id, owner_id).await {
                            warn!(%dag_id, error = %e, "heartbeat refresh failed");
                        } else {
                            debug!(%dag_id, "heartbeat refreshed");
                        }
                    }
                    _ = rx.changed() => {
                        debug!(%dag_id, "heartbeat ticker cancelled");
                        break;
                    }
                }
            }
        });
    }

    /// Stops `dag_id`'s ticker, if any. Safe to call more than once or for an
    /// unknown DAG id.
    pub fn stop(&self, dag_id: Uuid) {
        if let Some((_, tx)) = self.cancels.remove(&dag_id) {
            let _ = tx.send(true);
        }
    }

    pub fn is_running(&self, dag_id: Uuid) -> bool {
        self.cancels.contains_key(&dag_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::memory::InMemoryStore;

    #[tokio::test]
    async fn heartbeat_refreshes_until_stopped() {
        let store: Arc<dyn DagRepository> = Arc::new(InMemoryStore::new());
        let dag = store.create_dag(Uuid::new_v4(), Uuid::new_v4()).await.unwrap();
        let owner = Uuid::new_v4();
        store
            .claim_ownership(dag.id, owner, chrono::Duration::seconds(30))
            .await
            .unwrap();

        let registry = HeartbeatRegistry::new();
        registry.start(dag.id, owner, Arc::clone(&store), std::time::Duration::from_millis(10));
        assert!(registry.is_running(dag.id));

        tokio::time::sleep(std::time::Duration::from_millis(35)).await;
        registry.stop(dag.id);
        assert!(!registry.is_running(dag.id));

        let refreshed = store.get_dag(dag.id).await.unwrap();
        assert!(refreshed.heartbeat_at.is_some());
    }
}

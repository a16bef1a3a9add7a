use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::Utc;
use tokio::{sync::OwnedMutexGuard, time::timeout};
use tracing::{info, warn};

use crate::cluster::{build_clusters, ClusterOptions, Similarity, Synthesizer};
use crate::error::ServiceError;
use crate::models::ClusterSet;
use crate::store::FeedbackStore;

/// Runs clustering passes, one at a time per institute.
pub struct ClusteringEngine {
    store: Arc<dyn FeedbackStore>,
    similarity: Arc<dyn Similarity>,
    synthesizer: Arc<dyn Synthesizer>,
    options: ClusterOptions,
    run_timeout: Duration,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ClusteringEngine {
    pub fn new(
        store: Arc<dyn FeedbackStore>,
        similarity: Arc<dyn Similarity>,
        synthesizer: Arc<dyn Synthesizer>,
        options: ClusterOptions,
        run_timeout: Duration,
    ) -> Self {
        Self {
            store,
            similarity,
            synthesizer,
            options,
            run_timeout,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, institute_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(institute_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Forget an institute's lock once nothing but the map refers to it.
    fn prune(&self, institute_id: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks
            .get(institute_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(institute_id);
        }
    }

    /// Recompute and commit the institute's clusters.
    ///
    /// A second call while one is running fails with `Conflict` instead of
    /// queueing. On any failure the previously committed set stays in place.
    pub async fn process(&self, institute_id: &str) -> Result<ClusterSet, ServiceError> {
        let guard = match self.lock_for(institute_id).try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                self.prune(institute_id);
                return Err(ServiceError::Conflict(institute_id.to_string()));
            }
        };
        let _slot = RunSlot {
            engine: self,
            institute_id,
            guard: Some(guard),
        };

        match timeout(self.run_timeout, self.run(institute_id)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "Processing for {institute_id} exceeded {}s, keeping previous results",
                    self.run_timeout.as_secs()
                );
                Err(ServiceError::Timeout(self.run_timeout.as_secs()))
            }
        }
    }

    async fn run(&self, institute_id: &str) -> Result<ClusterSet, ServiceError> {
        let items = self.store.list_feedback(institute_id).await?;
        info!("Processing {} feedback items for {institute_id}", items.len());

        let clusters = build_clusters(
            institute_id,
            &items,
            self.similarity.as_ref(),
            self.synthesizer.as_ref(),
            &self.options,
        )
        .await
        .map_err(|e| {
            warn!("Processing for {institute_id} failed: {e}");
            e
        })?;

        let set = ClusterSet {
            institute_id: institute_id.to_string(),
            computed_at: Some(Utc::now()),
            clusters,
        };
        self.store.replace_clusters(&set).await?;

        info!(
            "Committed {} clusters for {institute_id}",
            set.clusters.len()
        );
        Ok(set)
    }
}

/// Holds an institute's run lock and prunes its map entry on release,
/// including when the `process` future is dropped mid-run.
struct RunSlot<'a> {
    engine: &'a ClusteringEngine,
    institute_id: &'a str,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for RunSlot<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.engine.prune(self.institute_id);
    }
}

use std::sync::Arc;

use tracing::info;

use crate::alerts::UrgencyLexicon;
use crate::cluster::KeywordSimilarity;
use crate::config::Config;
use crate::db::{self, PgStore};
use crate::engine::ClusteringEngine;
use crate::llm;
use crate::report::Reporter;
use crate::store::{FeedbackStore, MemoryStore};

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn FeedbackStore>,
    pub engine: ClusteringEngine,
    pub reporter: Reporter,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn FeedbackStore>) -> Arc<Self> {
        let engine = ClusteringEngine::new(
            store.clone(),
            Arc::new(KeywordSimilarity),
            llm::select_synthesizer(config.model.as_ref()),
            config.cluster.clone(),
            config.process_timeout,
        );
        let reporter = Reporter::new(
            store.clone(),
            UrgencyLexicon::new(&config.urgency_terms),
            config.export_dir.clone(),
        );

        Arc::new(Self {
            config,
            store,
            engine,
            reporter,
        })
    }
}

/// Postgres when `DATABASE_URL` is set, otherwise an in-memory store.
pub async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn FeedbackStore>> {
    match config.database_url.as_deref() {
        Some(url) => {
            info!("Using Postgres storage");
            let pool = db::connect(url).await?;
            db::init_db(&pool).await?;
            Ok(Arc::new(PgStore::new(pool)))
        }
        None => {
            info!("DATABASE_URL not set, using in-memory storage");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

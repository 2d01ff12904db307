use std::sync::Arc;
use tracing::info;

use crate::{
    config::Config,
    error::{AppError, AppResult},
    infrastructure::{
        database::{CommentStore, PostgresCommentStore},
        monitoring::MetricsCollector,
        sqlite_database::SqliteCommentStore,
        store_decorators::InstrumentedStore,
        traits::PostDirectory,
    },
    services::ThreadBuilder,
};

/// Storage backend selected by the `DATABASE_URL` scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Postgres,
    Sqlite,
}

impl Backend {
    pub fn from_url(url: &str) -> AppResult<Self> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(Backend::Postgres)
        } else if url.starts_with("sqlite:") {
            Ok(Backend::Sqlite)
        } else {
            Err(AppError::ConfigurationError(format!(
                "Unsupported DATABASE_URL scheme: {}",
                url
            )))
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub threads: ThreadBuilder,
    pub metrics: Arc<MetricsCollector>,
    pub config: Config,
}

impl AppState {
    /// Connect the configured store, create the schema and wire the
    /// thread builder. `posts` is the post service's existence check.
    pub async fn new(config: Config, posts: Arc<dyn PostDirectory>) -> AppResult<Self> {
        config.validate()?;
        let backend = Backend::from_url(&config.database.url)?;
        let store: Arc<dyn CommentStore> = match backend {
            Backend::Postgres => {
                let store = PostgresCommentStore::connect(&config.database).await?;
                store.initialize().await?;
                store.health_check().await?;
                Arc::new(store)
            }
            Backend::Sqlite => {
                let store = SqliteCommentStore::connect(&config.database).await?;
                store.initialize().await?;
                store.health_check().await?;
                Arc::new(store)
            }
        };

        let metrics = Arc::new(MetricsCollector::new());
        let store: Arc<dyn CommentStore> = Arc::new(InstrumentedStore::new(store, Arc::clone(&metrics)));

        let thread_config = config.effective_thread_config();
        info!(
            ?backend,
            fanout_width = thread_config.fanout_width,
            max_depth = ?thread_config.max_depth,
            "Comment threads ready"
        );

        Ok(Self {
            threads: ThreadBuilder::new(store, posts, thread_config),
            metrics,
            config,
        })
    }
}

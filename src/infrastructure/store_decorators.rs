// Store Decorators - Cross-cutting concerns layered around a CommentStore

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

use crate::core::{CommentId, PostId, UserId};
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::CommentStore;
use crate::infrastructure::monitoring::MetricsCollector;
use crate::models::Comment;

/// Metrics decorator - times every round trip, logs it and records it in a
/// shared `MetricsCollector`
pub struct InstrumentedStore {
    inner: Arc<dyn CommentStore>,
    metrics: Arc<MetricsCollector>,
}

impl InstrumentedStore {
    pub fn new(inner: Arc<dyn CommentStore>, metrics: Arc<MetricsCollector>) -> Self {
        Self { inner, metrics }
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    async fn observe<T, F>(&self, operation: &'static str, call: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>> + Send,
    {
        let in_flight = self.metrics.call_started();
        let start = Instant::now();
        let result = call.await;
        let elapsed = start.elapsed();
        self.metrics.call_finished();

        // A missing row is an answer, not a store failure
        let success = matches!(&result, Ok(_) | Err(AppError::NotFound(_)));
        self.metrics.record_request(operation, elapsed, success).await;

        match &result {
            Err(e) if !success => {
                error!(operation, elapsed_ms = elapsed.as_millis() as u64, "Store call failed: {}", e)
            }
            _ => debug!(operation, in_flight, elapsed_ms = elapsed.as_millis() as u64, "Store call"),
        }

        result
    }
}

#[async_trait]
impl CommentStore for InstrumentedStore {
    async fn insert_root(&self, post_id: PostId, author_id: UserId, body: &str) -> AppResult<Comment> {
        self.observe("insert_root", self.inner.insert_root(post_id, author_id, body))
            .await
    }

    async fn insert_reply(&self, parent_id: CommentId, author_id: UserId, body: &str) -> AppResult<Comment> {
        self.observe("insert_reply", self.inner.insert_reply(parent_id, author_id, body))
            .await
    }

    async fn children_of(&self, comment_id: CommentId) -> AppResult<Vec<Comment>> {
        self.observe("children_of", self.inner.children_of(comment_id)).await
    }

    async fn roots_of(&self, post_id: PostId) -> AppResult<Vec<Comment>> {
        self.observe("roots_of", self.inner.roots_of(post_id)).await
    }

    async fn delete_by_id(&self, comment_id: CommentId) -> AppResult<Comment> {
        self.observe("delete_by_id", self.inner.delete_by_id(comment_id)).await
    }

    async fn get(&self, comment_id: CommentId) -> AppResult<Option<Comment>> {
        self.observe("get", self.inner.get(comment_id)).await
    }

    async fn count_for_post(&self, post_id: PostId) -> AppResult<u64> {
        self.observe("count_for_post", self.inner.count_for_post(post_id)).await
    }
}

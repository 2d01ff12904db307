// Comment Store - Row-level persistence for the comments table
// This layer turns each store operation into exactly one SQL statement and
// knows nothing about tree shape

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::core::{CommentId, PostId, UserId};
use crate::error::{AppError, AppResult};
use crate::models::comment::millis_to_datetime;
use crate::models::{current_time_millis, Comment};

/// Columns selected by every query, in `Comment` field order
pub(crate) const COMMENT_COLUMNS: &str =
    "id, post_id, user_id, parent_comment_id, comment, created_at";

/// Columns written on insert; `id` is assigned by the database
pub(crate) const INSERT_COLUMNS: &str = "post_id, user_id, parent_comment_id, comment, created_at";

/// Persistence boundary for comments.
///
/// Implementations map one call to one round trip. Listing operations order
/// rows by `created_at ASC, id ASC` and return an empty vector, never an
/// error, when nothing matches.
#[async_trait]
pub trait CommentStore: Send + Sync {
    /// Insert a top-level comment. The caller has already checked the post.
    async fn insert_root(&self, post_id: PostId, author_id: UserId, body: &str) -> AppResult<Comment>;

    /// Insert a reply whose post id is copied from the parent row in the same
    /// statement. `NotFound` if the parent does not exist.
    async fn insert_reply(&self, parent_id: CommentId, author_id: UserId, body: &str) -> AppResult<Comment>;

    /// Direct children of a comment
    async fn children_of(&self, comment_id: CommentId) -> AppResult<Vec<Comment>>;

    /// Comments of a post with no parent
    async fn roots_of(&self, post_id: PostId) -> AppResult<Vec<Comment>>;

    /// Delete exactly one row and return it, or `NotFound`
    async fn delete_by_id(&self, comment_id: CommentId) -> AppResult<Comment>;

    async fn get(&self, comment_id: CommentId) -> AppResult<Option<Comment>>;

    /// All stored comments of a post, reachable from a root or not
    async fn count_for_post(&self, post_id: PostId) -> AppResult<u64>;
}

pub(crate) fn comment_not_found(comment_id: CommentId) -> AppError {
    AppError::NotFound(format!("Comment {} not found", comment_id))
}

/// PostgreSQL implementation of the comment store
pub struct PostgresCommentStore {
    pool: PgPool,
}

impl PostgresCommentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool sized from configuration
    pub async fn connect(config: &DatabaseConfig) -> AppResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .test_before_acquire(true)
            .connect(&config.url)
            .await
            .map_err(|e| AppError::StoreUnavailable(format!("Failed to connect to database: {}", e)))?;

        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Postgres comment store connected"
        );
        Ok(Self::new(pool))
    }

    /// Health check to verify database connectivity
    pub async fn health_check(&self) -> AppResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::StoreUnavailable(format!("Database health check failed: {}", e)))?;
        Ok(())
    }

    /// (idle, total) connections
    pub fn pool_stats(&self) -> (u32, u32) {
        (self.pool.num_idle() as u32, self.pool.size())
    }

    /// Create the comments table and its ordering indexes.
    ///
    /// Ids come from a sequence shared by every instance and are never
    /// reused. `parent_comment_id` has no foreign key: deleting a comment
    /// leaves its replies in place with a dangling parent reference.
    pub async fn initialize(&self) -> AppResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS comments (
                id BIGSERIAL PRIMARY KEY,
                post_id BIGINT NOT NULL,
                user_id BIGINT NOT NULL,
                parent_comment_id BIGINT,
                comment TEXT NOT NULL,
                created_at BIGINT NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::StoreUnavailable(format!("Failed to create comments table: {}", e)))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_comments_post_roots ON comments(post_id, created_at, id) WHERE parent_comment_id IS NULL",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::StoreUnavailable(format!("Failed to create root comments index: {}", e)))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_comments_parent ON comments(parent_comment_id, created_at, id)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::StoreUnavailable(format!("Failed to create replies index: {}", e)))?;

        info!("Comment tables initialized (postgres)");
        Ok(())
    }
}

fn comment_from_pg_row(row: &PgRow) -> AppResult<Comment> {
    Ok(Comment {
        id: CommentId::new(row.try_get("id")?),
        post_id: PostId::new(row.try_get("post_id")?),
        author_id: UserId::new(row.try_get("user_id")?),
        parent_id: row
            .try_get::<Option<i64>, _>("parent_comment_id")?
            .map(CommentId::new),
        body: row.try_get("comment")?,
        created_at: millis_to_datetime(row.try_get("created_at")?)?,
    })
}

#[async_trait]
impl CommentStore for PostgresCommentStore {
    async fn insert_root(&self, post_id: PostId, author_id: UserId, body: &str) -> AppResult<Comment> {
        let row = sqlx::query(&format!(
            "INSERT INTO comments ({}) VALUES ($1, $2, NULL, $3, $4) RETURNING {}",
            INSERT_COLUMNS, COMMENT_COLUMNS
        ))
        .bind(post_id.value())
        .bind(author_id.value())
        .bind(body)
        .bind(current_time_millis())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::StoreUnavailable(format!("Failed to insert comment on post {}: {}", post_id, e)))?;

        comment_from_pg_row(&row)
    }

    async fn insert_reply(&self, parent_id: CommentId, author_id: UserId, body: &str) -> AppResult<Comment> {
        let row = sqlx::query(&format!(
            "INSERT INTO comments ({}) SELECT post_id, $1, id, $2, $3 FROM comments WHERE id = $4 RETURNING {}",
            INSERT_COLUMNS, COMMENT_COLUMNS
        ))
        .bind(author_id.value())
        .bind(body)
        .bind(current_time_millis())
        .bind(parent_id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::StoreUnavailable(format!("Failed to insert reply to {}: {}", parent_id, e)))?;

        match row {
            Some(row) => comment_from_pg_row(&row),
            None => Err(AppError::NotFound(format!("Parent comment {} not found", parent_id))),
        }
    }

    async fn children_of(&self, comment_id: CommentId) -> AppResult<Vec<Comment>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM comments WHERE parent_comment_id = $1 ORDER BY created_at ASC, id ASC",
            COMMENT_COLUMNS
        ))
        .bind(comment_id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::StoreUnavailable(format!("Failed to get replies of {}: {}", comment_id, e)))?;

        rows.iter().map(comment_from_pg_row).collect()
    }

    async fn roots_of(&self, post_id: PostId) -> AppResult<Vec<Comment>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM comments WHERE post_id = $1 AND parent_comment_id IS NULL ORDER BY created_at ASC, id ASC",
            COMMENT_COLUMNS
        ))
        .bind(post_id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::StoreUnavailable(format!("Failed to get comments of post {}: {}", post_id, e)))?;

        rows.iter().map(comment_from_pg_row).collect()
    }

    async fn delete_by_id(&self, comment_id: CommentId) -> AppResult<Comment> {
        let row = sqlx::query(&format!(
            "DELETE FROM comments WHERE id = $1 RETURNING {}",
            COMMENT_COLUMNS
        ))
        .bind(comment_id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::StoreUnavailable(format!("Failed to delete comment {}: {}", comment_id, e)))?;

        match row {
            Some(row) => comment_from_pg_row(&row),
            None => Err(comment_not_found(comment_id)),
        }
    }

    async fn get(&self, comment_id: CommentId) -> AppResult<Option<Comment>> {
        let row = sqlx::query(&format!("SELECT {} FROM comments WHERE id = $1", COMMENT_COLUMNS))
            .bind(comment_id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::StoreUnavailable(format!("Failed to get comment {}: {}", comment_id, e)))?;

        row.as_ref().map(comment_from_pg_row).transpose()
    }

    async fn count_for_post(&self, post_id: PostId) -> AppResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE post_id = $1")
            .bind(post_id.value())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::StoreUnavailable(format!("Failed to count comments of post {}: {}", post_id, e)))?;

        Ok(count as u64)
    }
}

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::core::{CommentId, PostId, UserId};
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::{comment_not_found, CommentStore, COMMENT_COLUMNS, INSERT_COLUMNS};
use crate::models::comment::millis_to_datetime;
use crate::models::{current_time_millis, Comment};

/// SQLite implementation of the comment store, used for local runs and tests
pub struct SqliteCommentStore {
    pool: SqlitePool,
}

impl SqliteCommentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) a file-backed database in WAL mode
    pub async fn connect(config: &DatabaseConfig) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| AppError::ConfigurationError(format!("Invalid SQLite URL {}: {}", config.url, e)))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(config.acquire_timeout_secs));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect_with(options)
            .await
            .map_err(|e| AppError::StoreUnavailable(format!("Failed to connect to SQLite: {}", e)))?;

        info!(url = %config.url, max_connections = config.max_connections, "SQLite comment store connected");
        Ok(Self::new(pool))
    }

    /// Single-connection in-memory database; every query sees the same data
    pub async fn new_in_memory() -> AppResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| AppError::StoreUnavailable(format!("Failed to connect to in-memory SQLite: {}", e)))?;

        let store = Self::new(pool);
        store.initialize().await?;
        Ok(store)
    }

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

    /// Create the comments table. `AUTOINCREMENT` keeps deleted ids from being
    /// handed out again. No foreign key on the parent column, see
    /// `PostgresCommentStore::initialize`.
    pub async fn initialize(&self) -> AppResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS comments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                post_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                parent_comment_id INTEGER,
                comment TEXT NOT NULL,
                created_at INTEGER NOT NULL
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

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_comments_parent ON comments(parent_comment_id, created_at, id)")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::StoreUnavailable(format!("Failed to create replies index: {}", e)))?;

        info!("Comment tables initialized (sqlite)");
        Ok(())
    }
}

fn comment_from_sqlite_row(row: &SqliteRow) -> AppResult<Comment> {
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
impl CommentStore for SqliteCommentStore {
    async fn insert_root(&self, post_id: PostId, author_id: UserId, body: &str) -> AppResult<Comment> {
        let row = sqlx::query(&format!(
            "INSERT INTO comments ({}) VALUES (?, ?, NULL, ?, ?) RETURNING {}",
            INSERT_COLUMNS, COMMENT_COLUMNS
        ))
        .bind(post_id.value())
        .bind(author_id.value())
        .bind(body)
        .bind(current_time_millis())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::StoreUnavailable(format!("Failed to insert comment on post {}: {}", post_id, e)))?;

        comment_from_sqlite_row(&row)
    }

    async fn insert_reply(&self, parent_id: CommentId, author_id: UserId, body: &str) -> AppResult<Comment> {
        let row = sqlx::query(&format!(
            "INSERT INTO comments ({}) SELECT post_id, ?, id, ?, ? FROM comments WHERE id = ? RETURNING {}",
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
            Some(row) => comment_from_sqlite_row(&row),
            None => Err(AppError::NotFound(format!("Parent comment {} not found", parent_id))),
        }
    }

    async fn children_of(&self, comment_id: CommentId) -> AppResult<Vec<Comment>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM comments WHERE parent_comment_id = ? ORDER BY created_at ASC, id ASC",
            COMMENT_COLUMNS
        ))
        .bind(comment_id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::StoreUnavailable(format!("Failed to get replies of {}: {}", comment_id, e)))?;

        rows.iter().map(comment_from_sqlite_row).collect()
    }

    async fn roots_of(&self, post_id: PostId) -> AppResult<Vec<Comment>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM comments WHERE post_id = ? AND parent_comment_id IS NULL ORDER BY created_at ASC, id ASC",
            COMMENT_COLUMNS
        ))
        .bind(post_id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::StoreUnavailable(format!("Failed to get comments of post {}: {}", post_id, e)))?;

        rows.iter().map(comment_from_sqlite_row).collect()
    }

    async fn delete_by_id(&self, comment_id: CommentId) -> AppResult<Comment> {
        let row = sqlx::query(&format!("DELETE FROM comments WHERE id = ? RETURNING {}", COMMENT_COLUMNS))
            .bind(comment_id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::StoreUnavailable(format!("Failed to delete comment {}: {}", comment_id, e)))?;

        match row {
            Some(row) => comment_from_sqlite_row(&row),
            None => Err(comment_not_found(comment_id)),
        }
    }

    async fn get(&self, comment_id: CommentId) -> AppResult<Option<Comment>> {
        let row = sqlx::query(&format!("SELECT {} FROM comments WHERE id = ?", COMMENT_COLUMNS))
            .bind(comment_id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::StoreUnavailable(format!("Failed to get comment {}: {}", comment_id, e)))?;

        row.as_ref().map(comment_from_sqlite_row).transpose()
    }

    async fn count_for_post(&self, post_id: PostId) -> AppResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE post_id = ?")
            .bind(post_id.value())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::StoreUnavailable(format!("Failed to count comments of post {}: {}", post_id, e)))?;

        Ok(count as u64)
    }
}

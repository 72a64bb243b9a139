//! Feed source repository for threatwire.

use chrono::Utc;

use super::types::{FeedSource, NewFeedSource, SourceKind};
use crate::db::{parse_datetime, DbPool};
use crate::{Result, ThreatwireError};

/// Row type for a feed source from the database.
#[derive(Debug, Clone, sqlx::FromRow)]
struct FeedSourceRow {
    id: i64,
    name: String,
    url: String,
    kind: String,
    category_hint: Option<String>,
    is_active: bool,
    last_fetched_at: Option<String>,
    error_count: i32,
    last_error: Option<String>,
    created_at: String,
}

impl From<FeedSourceRow> for FeedSource {
    fn from(row: FeedSourceRow) -> Self {
        FeedSource {
            id: row.id,
            name: row.name,
            url: row.url,
            kind: SourceKind::parse(&row.kind).unwrap_or(SourceKind::Rss),
            category_hint: row.category_hint,
            is_active: row.is_active,
            last_fetched_at: row.last_fetched_at.and_then(|s| parse_datetime(&s)),
            error_count: row.error_count,
            last_error: row.last_error,
            created_at: parse_datetime(&row.created_at).unwrap_or_else(Utc::now),
        }
    }
}

const SOURCE_COLUMNS: &str = "id, name, url, kind, category_hint, is_active, \
     last_fetched_at, error_count, last_error, created_at";

/// Repository for feed source operations.
pub struct FeedSourceRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> FeedSourceRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a new source.
    pub async fn create(&self, source: &NewFeedSource) -> Result<FeedSource> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO feed_sources (name, url, kind, category_hint)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(&source.name)
        .bind(&source.url)
        .bind(source.kind.as_str())
        .bind(&source.category_hint)
        .fetch_one(self.pool)
        .await
        .map_err(|e| ThreatwireError::Database(e.to_string()))?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| ThreatwireError::NotFound("feed source".into()))
    }

    /// Get a source by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<FeedSource>> {
        let query = format!("SELECT {} FROM feed_sources WHERE id = $1", SOURCE_COLUMNS);
        let row = sqlx::query_as::<_, FeedSourceRow>(&query)
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| ThreatwireError::Database(e.to_string()))?;

        Ok(row.map(FeedSource::from))
    }

    /// Get a source by name.
    pub async fn get_by_name(&self, name: &str) -> Result<Option<FeedSource>> {
        let query = format!(
            "SELECT {} FROM feed_sources WHERE name = $1",
            SOURCE_COLUMNS
        );
        let row = sqlx::query_as::<_, FeedSourceRow>(&query)
            .bind(name)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| ThreatwireError::Database(e.to_string()))?;

        Ok(row.map(FeedSource::from))
    }

    /// List all active sources in registration order.
    pub async fn list_active(&self) -> Result<Vec<FeedSource>> {
        let query = format!(
            "SELECT {} FROM feed_sources WHERE is_active = 1 ORDER BY id ASC",
            SOURCE_COLUMNS
        );
        let rows = sqlx::query_as::<_, FeedSourceRow>(&query)
            .fetch_all(self.pool)
            .await
            .map_err(|e| ThreatwireError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(FeedSource::from).collect())
    }

    /// Record a successful fetch: stamp the time and clear the error state.
    pub async fn record_fetch_success(&self, id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE feed_sources
            SET last_fetched_at = datetime('now'),
                error_count = 0,
                last_error = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(self.pool)
        .await
        .map_err(|e| ThreatwireError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// Record a failed fetch: increment the error count, keep the message.
    pub async fn record_fetch_failure(&self, id: i64, error: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE feed_sources
            SET error_count = error_count + 1,
                last_error = $1
            WHERE id = $2
            "#,
        )
        .bind(error)
        .bind(id)
        .execute(self.pool)
        .await
        .map_err(|e| ThreatwireError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// Deactivate sources that have exceeded the error threshold.
    pub async fn deactivate_failing(&self, max_errors: i32) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE feed_sources SET is_active = 0 WHERE error_count >= $1 AND is_active = 1",
        )
        .bind(max_errors)
        .execute(self.pool)
        .await
        .map_err(|e| ThreatwireError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }
}

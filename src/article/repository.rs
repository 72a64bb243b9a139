//! Article repository for threatwire.

use chrono::{DateTime, Utc};

use super::types::{Article, Category, NewArticle, Severity};
use crate::db::{parse_datetime, DbPool};
use crate::{Result, ThreatwireError};

/// Row type for an article from the database.
#[derive(Debug, Clone, sqlx::FromRow)]
struct ArticleRow {
    id: i64,
    fingerprint: String,
    title: String,
    summary: Option<String>,
    body: Option<String>,
    link: String,
    source_refs: String,
    category: String,
    severity: String,
    cve_id: Option<String>,
    tags: String,
    technologies: String,
    published_at: String,
    ingested_at: String,
    processed: bool,
}

impl From<ArticleRow> for Article {
    fn from(row: ArticleRow) -> Self {
        Article {
            id: row.id,
            fingerprint: row.fingerprint,
            title: row.title,
            summary: row.summary,
            body: row.body,
            link: row.link,
            source_refs: serde_json::from_str(&row.source_refs).unwrap_or_default(),
            category: Category::parse(&row.category).unwrap_or(Category::General),
            severity: Severity::parse(&row.severity).unwrap_or(Severity::Low),
            cve_id: row.cve_id,
            tags: serde_json::from_str(&row.tags).unwrap_or_default(),
            technologies: serde_json::from_str(&row.technologies).unwrap_or_default(),
            published_at: parse_datetime(&row.published_at).unwrap_or_else(Utc::now),
            ingested_at: parse_datetime(&row.ingested_at).unwrap_or_else(Utc::now),
            processed: row.processed,
        }
    }
}

const ARTICLE_COLUMNS: &str = "id, fingerprint, title, summary, body, link, source_refs, \
     category, severity, cve_id, tags, technologies, published_at, ingested_at, processed";

/// Repository for article operations.
pub struct ArticleRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> ArticleRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Insert an article, ignoring it if the fingerprint already exists.
    ///
    /// The unique constraint on the fingerprint is the dedup mechanism:
    /// a conflict is an expected, silent outcome, never an error. Returns
    /// the new row id, or `None` when the article was already present.
    pub async fn upsert(&self, article: &NewArticle) -> Result<Option<i64>> {
        let result = sqlx::query(
            r#"
            INSERT INTO articles (fingerprint, title, summary, body, link, source_refs,
                                  category, severity, cve_id, tags, technologies, published_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT(fingerprint) DO NOTHING
            "#,
        )
        .bind(&article.fingerprint)
        .bind(&article.title)
        .bind(&article.summary)
        .bind(&article.body)
        .bind(&article.link)
        .bind(serde_json::to_string(&article.source_refs).unwrap_or_else(|_| "[]".into()))
        .bind(article.category.as_str())
        .bind(article.severity.as_str())
        .bind(&article.cve_id)
        .bind(serde_json::to_string(&article.tags).unwrap_or_else(|_| "[]".into()))
        .bind(serde_json::to_string(&article.technologies).unwrap_or_else(|_| "[]".into()))
        .bind(article.published_at.to_rfc3339())
        .execute(self.pool)
        .await
        .map_err(|e| ThreatwireError::Database(e.to_string()))?;

        if result.rows_affected() > 0 {
            Ok(Some(result.last_insert_rowid()))
        } else {
            Ok(None) // Already existed
        }
    }

    /// Get an article by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Article>> {
        let query = format!("SELECT {} FROM articles WHERE id = $1", ARTICLE_COLUMNS);
        let row = sqlx::query_as::<_, ArticleRow>(&query)
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| ThreatwireError::Database(e.to_string()))?;

        Ok(row.map(Article::from))
    }

    /// Get an article by fingerprint.
    pub async fn get_by_fingerprint(&self, fingerprint: &str) -> Result<Option<Article>> {
        let query = format!(
            "SELECT {} FROM articles WHERE fingerprint = $1",
            ARTICLE_COLUMNS
        );
        let row = sqlx::query_as::<_, ArticleRow>(&query)
            .bind(fingerprint)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| ThreatwireError::Database(e.to_string()))?;

        Ok(row.map(Article::from))
    }

    /// List articles published within a window (newest first).
    pub async fn list_published_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Article>> {
        let query = format!(
            r#"
            SELECT {} FROM articles
            WHERE published_at > $1 AND published_at <= $2
            ORDER BY published_at DESC, id DESC
            "#,
            ARTICLE_COLUMNS
        );
        let rows = sqlx::query_as::<_, ArticleRow>(&query)
            .bind(start.to_rfc3339())
            .bind(end.to_rfc3339())
            .fetch_all(self.pool)
            .await
            .map_err(|e| ThreatwireError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Article::from).collect())
    }

    /// List the most recent articles (newest first).
    pub async fn list_recent(&self, limit: usize, offset: usize) -> Result<Vec<Article>> {
        let query = format!(
            r#"
            SELECT {} FROM articles
            ORDER BY published_at DESC, id DESC
            LIMIT $1 OFFSET $2
            "#,
            ARTICLE_COLUMNS
        );
        let rows = sqlx::query_as::<_, ArticleRow>(&query)
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(self.pool)
            .await
            .map_err(|e| ThreatwireError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Article::from).collect())
    }

    /// Mark an article as processed by downstream enrichment.
    pub async fn mark_processed(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE articles SET processed = 1 WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| ThreatwireError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// Count all articles.
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles")
            .fetch_one(self.pool)
            .await
            .map_err(|e| ThreatwireError::Database(e.to_string()))?;

        Ok(count)
    }
}

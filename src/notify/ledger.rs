//! Notification ledger for threatwire.
//!
//! Append-only record of dispatch attempts per (subscription, article)
//! pair. A partial unique index guarantees at most one "sent" row per
//! pair ever; the ledger is consulted before every send, which makes
//! dispatch idempotent across repeated scheduler invocations.

use std::collections::HashSet;

use chrono::Utc;

use crate::article::Article;
use crate::db::{parse_datetime, DbPool};
use crate::{Result, ThreatwireError};

/// Outcome of one dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// The transport accepted the message.
    Sent,
    /// The transport failed; the error detail is recorded.
    Failed,
}

impl SendStatus {
    /// Convert to the stored string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SendStatus::Sent => "sent",
            SendStatus::Failed => "failed",
        }
    }

    /// Parse from the stored string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sent" => Some(SendStatus::Sent),
            "failed" => Some(SendStatus::Failed),
            _ => None,
        }
    }
}

/// A ledger entry.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    /// Entry ID.
    pub id: i64,
    /// Subscription the attempt was for.
    pub subscription_id: i64,
    /// Article the attempt covered.
    pub article_id: i64,
    /// Attempt outcome.
    pub status: SendStatus,
    /// Error detail for failed attempts.
    pub error: Option<String>,
    /// When the attempt was recorded.
    pub created_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct LedgerRow {
    id: i64,
    subscription_id: i64,
    article_id: i64,
    status: String,
    error: Option<String>,
    created_at: String,
}

impl From<LedgerRow> for LedgerEntry {
    fn from(row: LedgerRow) -> Self {
        LedgerEntry {
            id: row.id,
            subscription_id: row.subscription_id,
            article_id: row.article_id,
            status: SendStatus::parse(&row.status).unwrap_or(SendStatus::Failed),
            error: row.error,
            created_at: parse_datetime(&row.created_at).unwrap_or_else(Utc::now),
        }
    }
}

/// Repository over the notification ledger.
pub struct NotificationLedger<'a> {
    pool: &'a DbPool,
}

impl<'a> NotificationLedger<'a> {
    /// Create a new ledger instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Record one dispatch outcome.
    ///
    /// A second "sent" row for the same pair hits the partial unique index
    /// and is silently ignored; entries are never updated.
    pub async fn record(
        &self,
        subscription_id: i64,
        article_id: i64,
        status: SendStatus,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO notification_log (subscription_id, article_id, status, error)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(subscription_id)
        .bind(article_id)
        .bind(status.as_str())
        .bind(error)
        .execute(self.pool)
        .await
        .map_err(|e| ThreatwireError::Database(e.to_string()))?;

        Ok(())
    }

    /// Article IDs already successfully sent to a subscription.
    pub async fn sent_article_ids(&self, subscription_id: i64) -> Result<HashSet<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT article_id FROM notification_log WHERE subscription_id = $1 AND status = 'sent'",
        )
        .bind(subscription_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| ThreatwireError::Database(e.to_string()))?;

        Ok(ids.into_iter().collect())
    }

    /// Drop articles already sent to the subscription.
    ///
    /// Only "sent" entries block; a failed attempt is retried on the next
    /// run.
    pub async fn filter_unsent(
        &self,
        subscription_id: i64,
        articles: Vec<Article>,
    ) -> Result<Vec<Article>> {
        let sent = self.sent_article_ids(subscription_id).await?;
        Ok(articles
            .into_iter()
            .filter(|a| !sent.contains(&a.id))
            .collect())
    }

    /// List all entries for a subscription (oldest first).
    pub async fn list_for_subscription(&self, subscription_id: i64) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<_, LedgerRow>(
            r#"
            SELECT id, subscription_id, article_id, status, error, created_at
            FROM notification_log
            WHERE subscription_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(subscription_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| ThreatwireError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(LedgerEntry::from).collect())
    }

    /// Count entries with the given status.
    pub async fn count_by_status(&self, status: SendStatus) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM notification_log WHERE status = $1")
                .bind(status.as_str())
                .fetch_one(self.pool)
                .await
                .map_err(|e| ThreatwireError::Database(e.to_string()))?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::{ArticleRepository, NewArticle};
    use crate::subscriber::{Frequency, NewSubscription, SubscriptionRepository};
    use crate::article::Severity;
    use crate::Database;
    use chrono::Duration;

    async fn setup() -> (Database, i64, i64) {
        let db = Database::open_in_memory().await.unwrap();

        let sub = SubscriptionRepository::new(db.pool())
            .upsert(&NewSubscription::new(
                "a@example.com",
                Frequency::Daily,
                Severity::High,
                "tok",
                Utc::now() + Duration::hours(48),
            ))
            .await
            .unwrap();

        let article_id = ArticleRepository::new(db.pool())
            .upsert(&NewArticle::new(
                "fp-1",
                "Article",
                "https://example.com/1",
                Utc::now(),
            ))
            .await
            .unwrap()
            .unwrap();

        (db, sub.id, article_id)
    }

    #[tokio::test]
    async fn test_record_and_list() {
        let (db, sub_id, article_id) = setup().await;
        let ledger = NotificationLedger::new(db.pool());

        ledger
            .record(sub_id, article_id, SendStatus::Sent, None)
            .await
            .unwrap();

        let entries = ledger.list_for_subscription(sub_id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, SendStatus::Sent);
        assert!(entries[0].error.is_none());
    }

    #[tokio::test]
    async fn test_at_most_one_sent_per_pair() {
        let (db, sub_id, article_id) = setup().await;
        let ledger = NotificationLedger::new(db.pool());

        ledger
            .record(sub_id, article_id, SendStatus::Sent, None)
            .await
            .unwrap();
        // Duplicate "sent" is silently ignored, not an error
        ledger
            .record(sub_id, article_id, SendStatus::Sent, None)
            .await
            .unwrap();

        assert_eq!(ledger.count_by_status(SendStatus::Sent).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_entries_accumulate() {
        let (db, sub_id, article_id) = setup().await;
        let ledger = NotificationLedger::new(db.pool());

        ledger
            .record(sub_id, article_id, SendStatus::Failed, Some("timeout"))
            .await
            .unwrap();
        ledger
            .record(sub_id, article_id, SendStatus::Failed, Some("refused"))
            .await
            .unwrap();

        // Failed attempts are append-only history, not deduplicated
        assert_eq!(ledger.count_by_status(SendStatus::Failed).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_filter_unsent_blocks_only_sent() {
        let (db, sub_id, article_id) = setup().await;
        let ledger = NotificationLedger::new(db.pool());
        let articles_repo = ArticleRepository::new(db.pool());

        let other_id = articles_repo
            .upsert(&NewArticle::new(
                "fp-2",
                "Other",
                "https://example.com/2",
                Utc::now(),
            ))
            .await
            .unwrap()
            .unwrap();

        // A failed attempt does not block retries; a sent one does
        ledger
            .record(sub_id, article_id, SendStatus::Sent, None)
            .await
            .unwrap();
        ledger
            .record(sub_id, other_id, SendStatus::Failed, Some("timeout"))
            .await
            .unwrap();

        let candidates = vec![
            articles_repo.get_by_id(article_id).await.unwrap().unwrap(),
            articles_repo.get_by_id(other_id).await.unwrap().unwrap(),
        ];
        let unsent = ledger.filter_unsent(sub_id, candidates).await.unwrap();
        assert_eq!(unsent.len(), 1);
        assert_eq!(unsent[0].id, other_id);
    }

    #[test]
    fn test_send_status_roundtrip() {
        assert_eq!(SendStatus::parse("sent"), Some(SendStatus::Sent));
        assert_eq!(SendStatus::parse("failed"), Some(SendStatus::Failed));
        assert_eq!(SendStatus::parse("bounced"), None);
    }
}

//! Subscription repository for threatwire.

use chrono::{DateTime, Utc};

use super::types::{
    ActivityState, Frequency, NewSubscription, Subscription, VerificationState,
};
use crate::article::{Category, Severity};
use crate::db::{parse_datetime, DbPool};
use crate::{Result, ThreatwireError};

/// Row type for a subscription from the database.
#[derive(Debug, Clone, sqlx::FromRow)]
struct SubscriptionRow {
    id: i64,
    email: String,
    name: Option<String>,
    categories: String,
    technologies: String,
    frequency: String,
    min_severity: String,
    preferred_hour: i64,
    utc_offset_minutes: i64,
    preferred_weekday: i64,
    verification: String,
    activity: String,
    token: Option<String>,
    token_expires_at: Option<String>,
    last_notified_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl From<SubscriptionRow> for Subscription {
    fn from(row: SubscriptionRow) -> Self {
        let categories: Vec<String> = serde_json::from_str(&row.categories).unwrap_or_default();
        Subscription {
            id: row.id,
            email: row.email,
            name: row.name,
            categories: categories
                .iter()
                .filter_map(|c| Category::parse(c))
                .collect(),
            technologies: serde_json::from_str(&row.technologies).unwrap_or_default(),
            frequency: Frequency::parse(&row.frequency).unwrap_or(Frequency::Daily),
            min_severity: Severity::parse(&row.min_severity).unwrap_or(Severity::High),
            preferred_hour: row.preferred_hour.clamp(0, 23) as u8,
            utc_offset_minutes: row.utc_offset_minutes as i32,
            preferred_weekday: row.preferred_weekday.clamp(0, 6) as u8,
            verification: VerificationState::parse(&row.verification)
                .unwrap_or(VerificationState::Pending),
            activity: ActivityState::parse(&row.activity).unwrap_or(ActivityState::Active),
            token: row.token,
            token_expires_at: row.token_expires_at.and_then(|s| parse_datetime(&s)),
            last_notified_at: row.last_notified_at.and_then(|s| parse_datetime(&s)),
            created_at: parse_datetime(&row.created_at).unwrap_or_else(Utc::now),
            updated_at: parse_datetime(&row.updated_at).unwrap_or_else(Utc::now),
        }
    }
}

const SUBSCRIPTION_COLUMNS: &str = "id, email, name, categories, technologies, frequency, \
     min_severity, preferred_hour, utc_offset_minutes, preferred_weekday, verification, \
     activity, token, token_expires_at, last_notified_at, created_at, updated_at";

fn categories_json(categories: &[Category]) -> String {
    let names: Vec<&str> = categories.iter().map(|c| c.as_str()).collect();
    serde_json::to_string(&names).unwrap_or_else(|_| "[]".into())
}

/// Repository for subscription operations.
pub struct SubscriptionRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> SubscriptionRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Upsert a subscription on its unique contact address.
    ///
    /// Resubmission updates the preferences and reactivates an inactive
    /// record. A record that is already verified stays verified and keeps
    /// its current token; a pending record receives the fresh token.
    pub async fn upsert(&self, sub: &NewSubscription) -> Result<Subscription> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions
                (email, name, categories, technologies, frequency, min_severity,
                 preferred_hour, utc_offset_minutes, preferred_weekday,
                 token, token_expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT(email) DO UPDATE SET
                name = excluded.name,
                categories = excluded.categories,
                technologies = excluded.technologies,
                frequency = excluded.frequency,
                min_severity = excluded.min_severity,
                preferred_hour = excluded.preferred_hour,
                utc_offset_minutes = excluded.utc_offset_minutes,
                preferred_weekday = excluded.preferred_weekday,
                activity = 'active',
                token = CASE WHEN subscriptions.verification = 'verified'
                             THEN subscriptions.token ELSE excluded.token END,
                token_expires_at = CASE WHEN subscriptions.verification = 'verified'
                             THEN subscriptions.token_expires_at ELSE excluded.token_expires_at END,
                updated_at = datetime('now')
            "#,
        )
        .bind(&sub.email)
        .bind(&sub.name)
        .bind(categories_json(&sub.categories))
        .bind(serde_json::to_string(&sub.technologies).unwrap_or_else(|_| "[]".into()))
        .bind(sub.frequency.as_str())
        .bind(sub.min_severity.as_str())
        .bind(sub.preferred_hour as i64)
        .bind(sub.utc_offset_minutes as i64)
        .bind(sub.preferred_weekday as i64)
        .bind(&sub.token)
        .bind(sub.token_expires_at.to_rfc3339())
        .execute(self.pool)
        .await
        .map_err(|e| ThreatwireError::Database(e.to_string()))?;

        self.get_by_email(&sub.email)
            .await?
            .ok_or_else(|| ThreatwireError::NotFound("subscription".into()))
    }

    /// Get a subscription by contact address (case-normalized).
    pub async fn get_by_email(&self, email: &str) -> Result<Option<Subscription>> {
        let query = format!(
            "SELECT {} FROM subscriptions WHERE email = $1",
            SUBSCRIPTION_COLUMNS
        );
        let row = sqlx::query_as::<_, SubscriptionRow>(&query)
            .bind(email.trim().to_lowercase())
            .fetch_optional(self.pool)
            .await
            .map_err(|e| ThreatwireError::Database(e.to_string()))?;

        Ok(row.map(Subscription::from))
    }

    /// Get a subscription by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Subscription>> {
        let query = format!(
            "SELECT {} FROM subscriptions WHERE id = $1",
            SUBSCRIPTION_COLUMNS
        );
        let row = sqlx::query_as::<_, SubscriptionRow>(&query)
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| ThreatwireError::Database(e.to_string()))?;

        Ok(row.map(Subscription::from))
    }

    /// Rotate the single-use token for an address.
    ///
    /// Returns false when no active subscription exists for the address;
    /// callers must not leak that distinction to the requester.
    pub async fn rotate_token(
        &self,
        email: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET token = $1, token_expires_at = $2, updated_at = datetime('now')
            WHERE email = $3 AND activity = 'active'
            "#,
        )
        .bind(token)
        .bind(expires_at.to_rfc3339())
        .bind(email.trim().to_lowercase())
        .execute(self.pool)
        .await
        .map_err(|e| ThreatwireError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// Consume a valid token and mark the subscription verified.
    ///
    /// The UPDATE consumes the token in the same statement so it can only
    /// be used once even with concurrent requests. Expiry is compared
    /// against a bound timestamp in the same stored format.
    pub async fn verify_by_token(&self, token: &str) -> Result<Option<Subscription>> {
        let query = format!(
            r#"
            UPDATE subscriptions
            SET verification = 'verified',
                token = NULL,
                token_expires_at = NULL,
                updated_at = datetime('now')
            WHERE token = $1
              AND token_expires_at > $2
            RETURNING {}
            "#,
            SUBSCRIPTION_COLUMNS
        );
        let row = sqlx::query_as::<_, SubscriptionRow>(&query)
            .bind(token)
            .bind(Utc::now().to_rfc3339())
            .fetch_optional(self.pool)
            .await
            .map_err(|e| ThreatwireError::Database(e.to_string()))?;

        Ok(row.map(Subscription::from))
    }

    /// Consume a valid token and deactivate the subscription.
    pub async fn deactivate_by_token(&self, token: &str) -> Result<Option<Subscription>> {
        let query = format!(
            r#"
            UPDATE subscriptions
            SET activity = 'inactive',
                token = NULL,
                token_expires_at = NULL,
                updated_at = datetime('now')
            WHERE token = $1
              AND token_expires_at > $2
            RETURNING {}
            "#,
            SUBSCRIPTION_COLUMNS
        );
        let row = sqlx::query_as::<_, SubscriptionRow>(&query)
            .bind(token)
            .bind(Utc::now().to_rfc3339())
            .fetch_optional(self.pool)
            .await
            .map_err(|e| ThreatwireError::Database(e.to_string()))?;

        Ok(row.map(Subscription::from))
    }

    /// List deliverable (active + verified) subscriptions for a cadence.
    pub async fn list_deliverable(&self, frequency: Frequency) -> Result<Vec<Subscription>> {
        let query = format!(
            r#"
            SELECT {} FROM subscriptions
            WHERE activity = 'active'
              AND verification = 'verified'
              AND frequency = $1
            ORDER BY id ASC
            "#,
            SUBSCRIPTION_COLUMNS
        );
        let rows = sqlx::query_as::<_, SubscriptionRow>(&query)
            .bind(frequency.as_str())
            .fetch_all(self.pool)
            .await
            .map_err(|e| ThreatwireError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Subscription::from).collect())
    }

    /// Advance the last-notified timestamp after a successful send.
    pub async fn touch_last_notified(&self, id: i64, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE subscriptions SET last_notified_at = $1, updated_at = datetime('now') WHERE id = $2",
        )
        .bind(at.to_rfc3339())
        .bind(id)
        .execute(self.pool)
        .await
        .map_err(|e| ThreatwireError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// Count all subscriptions.
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subscriptions")
            .fetch_one(self.pool)
            .await
            .map_err(|e| ThreatwireError::Database(e.to_string()))?;

        Ok(count)
    }
}

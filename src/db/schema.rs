//! Database schema and migrations for threatwire.
//!
//! This module contains all database migrations that will be applied
//! sequentially when the database is first opened or upgraded.

/// Database migrations.
///
/// Each migration is a SQL script that will be executed in order.
/// The schema_version table tracks which migrations have been applied.
pub const MIGRATIONS: &[&str] = &[
    // v1: Articles table - single source of truth for ingested items
    r#"
-- Articles keyed by content fingerprint (dedup key)
CREATE TABLE articles (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    fingerprint   TEXT NOT NULL UNIQUE,
    title         TEXT NOT NULL,
    summary       TEXT,
    body          TEXT,
    link          TEXT NOT NULL,
    source_refs   TEXT NOT NULL DEFAULT '[]',   -- JSON array of URLs
    category      TEXT NOT NULL DEFAULT 'general',
    severity      TEXT NOT NULL DEFAULT 'low',  -- 'critical','high','medium','low','info'
    cve_id        TEXT,
    tags          TEXT NOT NULL DEFAULT '[]',   -- JSON array
    technologies  TEXT NOT NULL DEFAULT '[]',   -- JSON array
    published_at  TEXT NOT NULL,
    ingested_at   TEXT NOT NULL DEFAULT (datetime('now')),
    processed     INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX idx_articles_published_at ON articles(published_at);
CREATE INDEX idx_articles_severity ON articles(severity);
CREATE INDEX idx_articles_category ON articles(category);
"#,
    // v2: Subscriptions table - one active record per contact address
    r#"
-- Subscriptions keyed by case-normalized contact address
CREATE TABLE subscriptions (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    email              TEXT NOT NULL UNIQUE,
    name               TEXT,
    categories         TEXT NOT NULL DEFAULT '[]',  -- JSON set, empty = all
    technologies       TEXT NOT NULL DEFAULT '[]',  -- JSON set, optional
    frequency          TEXT NOT NULL DEFAULT 'daily',   -- 'immediate','daily','weekly'
    min_severity       TEXT NOT NULL DEFAULT 'high',
    preferred_hour     INTEGER NOT NULL DEFAULT 9,      -- 0-23, subscriber local time
    utc_offset_minutes INTEGER NOT NULL DEFAULT 0,      -- supports half-hour zones
    preferred_weekday  INTEGER NOT NULL DEFAULT 1,      -- 0-6, Sunday=0, weekly only
    verification       TEXT NOT NULL DEFAULT 'pending', -- 'pending','verified'
    activity           TEXT NOT NULL DEFAULT 'active',  -- 'active','inactive'
    token              TEXT,
    token_expires_at   TEXT,
    last_notified_at   TEXT,
    created_at         TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at         TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX idx_subscriptions_frequency ON subscriptions(frequency);
CREATE INDEX idx_subscriptions_token ON subscriptions(token);
"#,
    // v3: Notification ledger - append-only idempotency guard
    r#"
-- Dispatch outcomes per (subscription, article) pair
CREATE TABLE notification_log (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    subscription_id INTEGER NOT NULL REFERENCES subscriptions(id) ON DELETE CASCADE,
    article_id      INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
    status          TEXT NOT NULL,               -- 'sent' or 'failed'
    error           TEXT,
    created_at      TEXT NOT NULL DEFAULT (datetime('now'))
);

-- At most one successful send per pair, ever. Failed rows do not block retries.
CREATE UNIQUE INDEX idx_notification_log_sent_once
    ON notification_log(subscription_id, article_id) WHERE status = 'sent';
CREATE INDEX idx_notification_log_subscription ON notification_log(subscription_id);
"#,
    // v4: Feed sources table
    r#"
-- External feed/page sources read by the ingestion job
CREATE TABLE feed_sources (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    name            TEXT NOT NULL UNIQUE,
    url             TEXT NOT NULL,
    kind            TEXT NOT NULL DEFAULT 'rss',  -- 'rss' or 'scrape'
    category_hint   TEXT,
    is_active       INTEGER NOT NULL DEFAULT 1,
    last_fetched_at TEXT,
    error_count     INTEGER NOT NULL DEFAULT 0,
    last_error      TEXT,
    created_at      TEXT NOT NULL DEFAULT (datetime('now'))
);
"#,
    // v5: Keyword rules table with the default taxonomy
    r#"
-- Read-only classifier input: keyword -> category with a relevance weight
CREATE TABLE keyword_rules (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    keyword  TEXT NOT NULL,
    category TEXT NOT NULL,
    weight   INTEGER NOT NULL DEFAULT 1,
    UNIQUE(keyword, category)
);

INSERT INTO keyword_rules (keyword, category, weight) VALUES
    ('defi', 'defi', 3),
    ('liquidity pool', 'defi', 2),
    ('flash loan', 'defi', 3),
    ('yield farming', 'defi', 2),
    ('smart contract', 'smart-contract', 3),
    ('solidity', 'smart-contract', 2),
    ('reentrancy', 'smart-contract', 3),
    ('audit', 'smart-contract', 1),
    ('wallet', 'wallet', 3),
    ('seed phrase', 'wallet', 3),
    ('private key', 'wallet', 2),
    ('hardware wallet', 'wallet', 2),
    ('exchange', 'exchange', 3),
    ('custodial', 'exchange', 1),
    ('withdrawal freeze', 'exchange', 2),
    ('phishing', 'phishing', 3),
    ('impersonation', 'phishing', 2),
    ('fake airdrop', 'phishing', 3),
    ('social engineering', 'phishing', 2),
    ('malware', 'malware', 3),
    ('ransomware', 'malware', 3),
    ('trojan', 'malware', 2),
    ('drainer', 'malware', 3),
    ('infostealer', 'malware', 2),
    ('regulation', 'regulation', 3),
    ('compliance', 'regulation', 2),
    ('sanctions', 'regulation', 2),
    ('bridge', 'infrastructure', 2),
    ('validator', 'infrastructure', 1),
    ('rpc', 'infrastructure', 1),
    ('node', 'infrastructure', 1),
    ('protocol', 'infrastructure', 1),
    ('vulnerability', 'general', 1),
    ('exploit', 'general', 1),
    ('security', 'general', 1),
    ('breach', 'general', 1),
    ('hack', 'general', 1),
    ('cve', 'general', 1);
"#,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_not_empty() {
        assert!(!MIGRATIONS.is_empty());
    }

    #[test]
    fn test_first_migration_contains_articles_table() {
        let first = MIGRATIONS[0];
        assert!(first.contains("CREATE TABLE articles"));
        assert!(first.contains("fingerprint"));
        assert!(first.contains("UNIQUE"));
        assert!(first.contains("severity"));
    }

    #[test]
    fn test_subscriptions_migration() {
        let m = MIGRATIONS[1];
        assert!(m.contains("CREATE TABLE subscriptions"));
        assert!(m.contains("email"));
        assert!(m.contains("utc_offset_minutes"));
        assert!(m.contains("verification"));
        assert!(m.contains("activity"));
    }

    #[test]
    fn test_notification_log_sent_once_index() {
        let m = MIGRATIONS[2];
        assert!(m.contains("CREATE TABLE notification_log"));
        assert!(m.contains("idx_notification_log_sent_once"));
        assert!(m.contains("WHERE status = 'sent'"));
    }

    #[test]
    fn test_feed_sources_migration() {
        let m = MIGRATIONS[3];
        assert!(m.contains("CREATE TABLE feed_sources"));
        assert!(m.contains("kind"));
        assert!(m.contains("error_count"));
    }

    #[test]
    fn test_keyword_rules_seeded() {
        let m = MIGRATIONS[4];
        assert!(m.contains("CREATE TABLE keyword_rules"));
        assert!(m.contains("INSERT INTO keyword_rules"));
        assert!(m.contains("'defi'"));
        assert!(m.contains("'phishing'"));
    }

    #[test]
    fn test_migrations_are_valid_sql() {
        // Each migration should be non-empty and contain SQL keywords
        for migration in MIGRATIONS {
            assert!(!migration.trim().is_empty());
            assert!(
                migration.contains("CREATE TABLE")
                    || migration.contains("ALTER TABLE")
                    || migration.contains("CREATE INDEX")
            );
        }
    }
}

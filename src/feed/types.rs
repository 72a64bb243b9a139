//! Feed source and ingestion types for threatwire.

use chrono::{DateTime, Utc};

/// Maximum length for a normalized item body kept for classification.
pub const MAX_BODY_LENGTH: usize = 10000;

/// Maximum feed size in bytes (5MB).
pub const MAX_FEED_SIZE: u64 = 5 * 1024 * 1024;

/// Maximum consecutive errors before a source is considered broken.
pub const MAX_CONSECUTIVE_ERRORS: i32 = 5;

/// Kind of external source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// RSS/Atom feed endpoint.
    Rss,
    /// Page fetched through the scraping API, returned as markdown.
    Scrape,
}

impl SourceKind {
    /// Convert to the stored string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Rss => "rss",
            SourceKind::Scrape => "scrape",
        }
    }

    /// Parse from the stored string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "rss" => Some(SourceKind::Rss),
            "scrape" => Some(SourceKind::Scrape),
            _ => None,
        }
    }
}

/// A configured external source.
#[derive(Debug, Clone)]
pub struct FeedSource {
    /// Source ID.
    pub id: i64,
    /// Unique source name.
    pub name: String,
    /// Fetch endpoint.
    pub url: String,
    /// Source kind.
    pub kind: SourceKind,
    /// Default category for items whose classification is only generic.
    pub category_hint: Option<String>,
    /// Whether the source is active.
    pub is_active: bool,
    /// Last time the source was fetched.
    pub last_fetched_at: Option<DateTime<Utc>>,
    /// Number of consecutive fetch errors.
    pub error_count: i32,
    /// Last error message.
    pub last_error: Option<String>,
    /// When the source was created.
    pub created_at: DateTime<Utc>,
}

impl FeedSource {
    /// Check if the source has exceeded the error threshold.
    pub fn has_exceeded_error_threshold(&self) -> bool {
        self.error_count >= MAX_CONSECUTIVE_ERRORS
    }
}

/// New source for creation.
#[derive(Debug, Clone)]
pub struct NewFeedSource {
    /// Unique source name.
    pub name: String,
    /// Fetch endpoint.
    pub url: String,
    /// Source kind.
    pub kind: SourceKind,
    /// Default category hint.
    pub category_hint: Option<String>,
}

impl NewFeedSource {
    /// Create a new source.
    pub fn new(name: impl Into<String>, url: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            kind,
            category_hint: None,
        }
    }

    /// Set the category hint.
    pub fn with_category_hint(mut self, hint: impl Into<String>) -> Self {
        self.category_hint = Some(hint.into());
        self
    }
}

/// Item parsed from an RSS/Atom feed, markup already stripped.
#[derive(Debug, Clone)]
pub struct ParsedItem {
    /// Item title.
    pub title: String,
    /// Link to the original article.
    pub link: Option<String>,
    /// Item description/body.
    pub description: Option<String>,
    /// When the item was published.
    pub published_at: Option<DateTime<Utc>>,
}

/// A candidate item normalized from any source, ready for classification.
#[derive(Debug, Clone)]
pub struct NormalizedItem {
    /// Stable content fingerprint (dedup key).
    pub fingerprint: String,
    /// Item title.
    pub title: String,
    /// Canonical link (the source page URL for scraped sections).
    pub link: String,
    /// Free-text body.
    pub body: String,
    /// Publication timestamp; "now" when the source date was unparseable.
    pub published_at: DateTime<Utc>,
}

/// Ingestion run mode, selecting the lookback window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestMode {
    /// Regular run over live feeds.
    Live,
    /// Initial historical backfill with a wider window.
    Backfill,
}

/// Per-source statistics from one ingestion run.
#[derive(Debug, Clone, Default)]
pub struct SourceStats {
    /// Items seen in the source payload.
    pub seen: usize,
    /// Items stored as new articles.
    pub stored: usize,
    /// Items rejected as duplicates by the storage layer.
    pub duplicates: usize,
    /// Items dropped as irrelevant (no keyword match).
    pub irrelevant: usize,
    /// Items older than the lookback window.
    pub stale: usize,
}

/// Report of one ingestion run across all sources.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    /// Number of sources processed (successfully fetched).
    pub sources_processed: usize,
    /// Totals across sources.
    pub stats: SourceStats,
    /// Per-source fetch/parse failures, collected rather than raised.
    pub errors: Vec<String>,
}

impl IngestReport {
    /// Merge one source's statistics into the run totals.
    pub fn absorb(&mut self, stats: &SourceStats) {
        self.stats.seen += stats.seen;
        self.stats.stored += stats.stored;
        self.stats.duplicates += stats.duplicates;
        self.stats.irrelevant += stats.irrelevant;
        self.stats.stale += stats.stale;
    }
}

//! Feed ingestion runner for threatwire.
//!
//! Each run fetches all active sources, normalizes and classifies their
//! items, and upserts the survivors into the article store. Sources are
//! processed serially to bound outbound concurrency; a failing source is
//! collected into the run report and never aborts the batch.

use chrono::{DateTime, Duration, Utc};
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::article::{ArticleRepository, Category, NewArticle};
use crate::classify::Classifier;
use crate::config::IngestConfig;
use crate::db::Database;
use crate::feed::fetcher::FeedFetcher;
use crate::feed::normalizer::{apply_lookback, normalize_feed_item, parse_scraped_sections};
use crate::feed::repository::FeedSourceRepository;
use crate::feed::types::{
    FeedSource, IngestMode, IngestReport, NormalizedItem, SourceKind, SourceStats,
    MAX_CONSECUTIVE_ERRORS,
};
use crate::Result;

/// Feed ingestion runner.
pub struct Ingestor {
    db: Database,
    fetcher: FeedFetcher,
    lookback_days: i64,
    backfill_lookback_days: i64,
    interval_secs: u64,
}

impl Ingestor {
    /// Create a new ingestor.
    pub fn new(db: Database, config: &IngestConfig) -> Result<Self> {
        let fetcher = FeedFetcher::new(&config.scrape_endpoint, &config.scrape_api_key)?;
        Ok(Self {
            db,
            fetcher,
            lookback_days: config.lookback_days,
            backfill_lookback_days: config.backfill_lookback_days,
            interval_secs: config.interval_secs,
        })
    }

    /// Run the ingestion loop.
    ///
    /// The first run uses the backfill window when the article store is
    /// empty; subsequent runs use the live window.
    pub async fn run_loop(&self) {
        info!(
            "Ingestion loop started (interval: {} seconds)",
            self.interval_secs
        );

        let mut timer = interval(std::time::Duration::from_secs(self.interval_secs));

        loop {
            timer.tick().await;

            let mode = match ArticleRepository::new(self.db.pool()).count().await {
                Ok(0) => IngestMode::Backfill,
                Ok(_) => IngestMode::Live,
                Err(e) => {
                    warn!("Failed to count articles, assuming live mode: {}", e);
                    IngestMode::Live
                }
            };

            match self.run_once(mode).await {
                Ok(report) => {
                    info!(
                        "Ingestion run complete: {} sources, {} stored, {} duplicates, {} irrelevant, {} stale, {} errors",
                        report.sources_processed,
                        report.stats.stored,
                        report.stats.duplicates,
                        report.stats.irrelevant,
                        report.stats.stale,
                        report.errors.len()
                    );
                    for error in &report.errors {
                        warn!("Source failure: {}", error);
                    }
                }
                Err(e) => warn!("Ingestion run failed: {}", e),
            }
        }
    }

    /// Execute one ingestion run over all active sources.
    ///
    /// Per-source fetch/parse failures are collected into the report's
    /// error list; only infrastructure failures (listing sources, loading
    /// rules) abort the run.
    pub async fn run_once(&self, mode: IngestMode) -> Result<IngestReport> {
        let now = Utc::now();
        let lookback = match mode {
            IngestMode::Live => Duration::days(self.lookback_days),
            IngestMode::Backfill => Duration::days(self.backfill_lookback_days),
        };
        let cutoff = now - lookback;

        let classifier = Classifier::load(self.db.pool()).await?;
        let source_repo = FeedSourceRepository::new(self.db.pool());
        let sources = source_repo.list_active().await?;

        let mut report = IngestReport::default();

        for source in sources {
            debug!("Fetching source {} ({})", source.name, source.url);
            match self.fetch_items(&source, now).await {
                Ok(items) => {
                    let (fresh, stale) = apply_lookback(items, cutoff);
                    let mut stats = self.store_items(&source, fresh, &classifier).await?;
                    stats.stale = stale;
                    stats.seen += stale;

                    source_repo.record_fetch_success(source.id).await?;
                    report.sources_processed += 1;
                    report.absorb(&stats);
                }
                Err(e) => {
                    source_repo
                        .record_fetch_failure(source.id, &e.to_string())
                        .await?;
                    report.errors.push(format!("{}: {}", source.name, e));
                }
            }
        }

        let deactivated = source_repo
            .deactivate_failing(MAX_CONSECUTIVE_ERRORS)
            .await?;
        if deactivated > 0 {
            warn!(
                "Deactivated {} source(s) after {} consecutive errors",
                deactivated, MAX_CONSECUTIVE_ERRORS
            );
        }

        Ok(report)
    }

    /// Fetch and normalize one source's payload.
    async fn fetch_items(
        &self,
        source: &FeedSource,
        now: DateTime<Utc>,
    ) -> Result<Vec<NormalizedItem>> {
        match source.kind {
            SourceKind::Rss => {
                let parsed = self.fetcher.fetch_feed(&source.url).await?;
                Ok(parsed
                    .iter()
                    .map(|item| normalize_feed_item(item, &source.url, now))
                    .collect())
            }
            SourceKind::Scrape => {
                let markdown = self.fetcher.fetch_page(&source.url).await?;
                Ok(parse_scraped_sections(
                    &markdown,
                    &source.name,
                    &source.url,
                    now,
                ))
            }
        }
    }

    /// Classify and persist normalized items for one source.
    ///
    /// A zero-keyword-match item is dropped as irrelevant; a fingerprint
    /// conflict is counted as a duplicate. Both are expected outcomes.
    pub async fn store_items(
        &self,
        source: &FeedSource,
        items: Vec<NormalizedItem>,
        classifier: &Classifier,
    ) -> Result<SourceStats> {
        let article_repo = ArticleRepository::new(self.db.pool());
        let mut stats = SourceStats {
            seen: items.len(),
            ..SourceStats::default()
        };

        let hint_category = source.category_hint.as_deref().and_then(Category::parse);

        for item in items {
            let Some(classification) = classifier.classify(&item.title, &item.body) else {
                stats.irrelevant += 1;
                continue;
            };

            // A generic classification defers to the source's category hint
            let category = match (classification.category, hint_category) {
                (Category::General, Some(hint)) => hint,
                (category, _) => category,
            };

            let mut article = NewArticle::new(
                &item.fingerprint,
                &item.title,
                &item.link,
                item.published_at,
            )
            .with_summary(&item.body)
            .with_body(&item.body)
            .with_category(category)
            .with_severity(classification.severity)
            .with_tags(classification.tags)
            .with_technologies(classification.technologies)
            .with_source_ref(&source.url);

            if let Some(cve) = classification.cve_id {
                article = article.with_cve(cve);
            }

            match article_repo.upsert(&article).await? {
                Some(_) => stats.stored += 1,
                None => stats.duplicates += 1,
            }
        }

        Ok(stats)
    }
}

/// Start the ingestion loop as a background task.
pub fn start_ingest_loop(db: Database, config: &IngestConfig) -> Result<()> {
    let ingestor = Ingestor::new(db, config)?;
    tokio::spawn(async move {
        ingestor.run_loop().await;
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::Severity;
    use crate::feed::repository::FeedSourceRepository;
    use crate::feed::types::NewFeedSource;

    async fn setup() -> (Database, Ingestor) {
        let db = Database::open_in_memory().await.unwrap();
        let ingestor = Ingestor::new(db.clone(), &IngestConfig::default()).unwrap();
        (db, ingestor)
    }

    fn item(fingerprint: &str, title: &str, body: &str) -> NormalizedItem {
        NormalizedItem {
            fingerprint: fingerprint.into(),
            title: title.into(),
            link: "https://example.com/post".into(),
            body: body.into(),
            published_at: Utc::now(),
        }
    }

    async fn rss_source(db: &Database) -> FeedSource {
        FeedSourceRepository::new(db.pool())
            .create(&NewFeedSource::new(
                "test-feed",
                "https://example.com/feed.xml",
                SourceKind::Rss,
            ))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_store_items_classifies_and_persists() {
        let (db, ingestor) = setup().await;
        let source = rss_source(&db).await;
        let classifier = Classifier::load(db.pool()).await.unwrap();

        let stats = ingestor
            .store_items(
                &source,
                vec![item(
                    "fp-1",
                    "Critical exploit drains DeFi protocol",
                    "A defi vulnerability was exploited.",
                )],
                &classifier,
            )
            .await
            .unwrap();

        assert_eq!(stats.seen, 1);
        assert_eq!(stats.stored, 1);

        let article = ArticleRepository::new(db.pool())
            .get_by_fingerprint("fp-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(article.category, Category::Defi);
        assert_eq!(article.severity, Severity::Critical);
        assert_eq!(article.source_refs, vec!["https://example.com/feed.xml"]);
    }

    #[tokio::test]
    async fn test_store_items_twice_is_idempotent() {
        let (db, ingestor) = setup().await;
        let source = rss_source(&db).await;
        let classifier = Classifier::load(db.pool()).await.unwrap();

        let items = vec![item(
            "fp-same",
            "Wallet drainer campaign expands",
            "The malware targets wallet users.",
        )];

        let first = ingestor
            .store_items(&source, items.clone(), &classifier)
            .await
            .unwrap();
        assert_eq!(first.stored, 1);

        let second = ingestor.store_items(&source, items, &classifier).await.unwrap();
        assert_eq!(second.stored, 0);
        assert_eq!(second.duplicates, 1);

        assert_eq!(ArticleRepository::new(db.pool()).count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_store_items_drops_irrelevant() {
        let (db, ingestor) = setup().await;
        let source = rss_source(&db).await;
        let classifier = Classifier::load(db.pool()).await.unwrap();

        let stats = ingestor
            .store_items(
                &source,
                vec![item("fp-x", "Weather forecast for Tuesday", "Sunny.")],
                &classifier,
            )
            .await
            .unwrap();

        assert_eq!(stats.irrelevant, 1);
        assert_eq!(stats.stored, 0);
        assert_eq!(ArticleRepository::new(db.pool()).count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_category_hint_applies_to_generic_items() {
        let (db, ingestor) = setup().await;
        let source = FeedSourceRepository::new(db.pool())
            .create(
                &NewFeedSource::new("hinted", "https://example.com/f", SourceKind::Rss)
                    .with_category_hint("exchange"),
            )
            .await
            .unwrap();
        let classifier = Classifier::load(db.pool()).await.unwrap();

        // Only generic keywords match; the hint supplies the category
        ingestor
            .store_items(
                &source,
                vec![item("fp-h", "Security breach disclosed", "Details pending.")],
                &classifier,
            )
            .await
            .unwrap();

        let article = ArticleRepository::new(db.pool())
            .get_by_fingerprint("fp-h")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(article.category, Category::Exchange);
    }

    #[tokio::test]
    async fn test_run_once_collects_source_errors() {
        let (db, ingestor) = setup().await;

        // A source with a forbidden URL fails at fetch time
        FeedSourceRepository::new(db.pool())
            .create(&NewFeedSource::new(
                "bad-source",
                "http://localhost/feed.xml",
                SourceKind::Rss,
            ))
            .await
            .unwrap();

        let report = ingestor.run_once(IngestMode::Live).await.unwrap();
        assert_eq!(report.sources_processed, 0);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("bad-source"));

        // The failure was recorded on the source
        let source = FeedSourceRepository::new(db.pool())
            .get_by_name("bad-source")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(source.error_count, 1);
        assert!(source.last_error.is_some());
    }
}

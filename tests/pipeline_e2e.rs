//! End-to-end pipeline tests: feed text in, notified subscribers out.

use chrono::{Duration, Utc};

use threatwire::classify::Classifier;
use threatwire::config::{IngestConfig, ServerConfig};
use threatwire::feed::fetcher::parse_feed;
use threatwire::feed::normalizer::normalize_feed_item;
use threatwire::feed::{FeedSourceRepository, Ingestor, NewFeedSource, SourceKind};
use threatwire::notify::{Dispatcher, MemoryTransport, NotificationLedger, SendStatus};
use threatwire::{
    ArticleRepository, Category, Database, Frequency, NewSubscription, Severity,
    SubscriptionRepository,
};

const FEED_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Security Wire</title>
    <link>https://feeds.example.com</link>
    <item>
      <title>Critical RCE Vulnerability in Popular DeFi Protocol</title>
      <link>https://feeds.example.com/defi-rce</link>
      <guid>defi-rce</guid>
      <description>A defi protocol vulnerability is being actively exploited. Tracked as CVE-2025-31337.</description>
    </item>
    <item>
      <title>Weekend reading list</title>
      <link>https://feeds.example.com/reading</link>
      <guid>reading</guid>
      <description>Ten long-form articles about gardening.</description>
    </item>
  </channel>
</rss>"#;

async fn ingest_feed_xml(db: &Database, xml: &str) {
    let source_repo = FeedSourceRepository::new(db.pool());
    let source = match source_repo.get_by_name("security-wire").await.unwrap() {
        Some(source) => source,
        None => source_repo
            .create(&NewFeedSource::new(
                "security-wire",
                "https://feeds.example.com/rss",
                SourceKind::Rss,
            ))
            .await
            .unwrap(),
    };

    let ingestor = Ingestor::new(db.clone(), &IngestConfig::default()).unwrap();
    let classifier = Classifier::load(db.pool()).await.unwrap();
    let now = Utc::now();

    let items: Vec<_> = parse_feed(xml.as_bytes())
        .unwrap()
        .iter()
        .map(|item| normalize_feed_item(item, &source.url, now))
        .collect();

    ingestor.store_items(&source, items, &classifier).await.unwrap();
}

#[tokio::test]
async fn ingestion_classifies_and_stores_relevant_items() {
    let db = Database::open_in_memory().await.unwrap();
    ingest_feed_xml(&db, FEED_XML).await;

    let repo = ArticleRepository::new(db.pool());
    // The gardening item had zero keyword matches and was dropped
    assert_eq!(repo.count().await.unwrap(), 1);

    let articles = repo.list_recent(10, 0).await.unwrap();
    let article = &articles[0];
    assert_eq!(article.title, "Critical RCE Vulnerability in Popular DeFi Protocol");
    assert_eq!(article.category, Category::Defi);
    assert_eq!(article.severity, Severity::Critical);
    assert_eq!(article.cve_id.as_deref(), Some("CVE-2025-31337"));
    assert!(article.tags.contains(&"defi".to_string()));
}

#[tokio::test]
async fn reingesting_the_same_feed_is_idempotent() {
    let db = Database::open_in_memory().await.unwrap();
    ingest_feed_xml(&db, FEED_XML).await;
    ingest_feed_xml(&db, FEED_XML).await;

    assert_eq!(ArticleRepository::new(db.pool()).count().await.unwrap(), 1);
}

#[tokio::test]
async fn critical_alert_reaches_matching_immediate_subscriber_only() {
    let db = Database::open_in_memory().await.unwrap();
    ingest_feed_xml(&db, FEED_XML).await;

    let sub_repo = SubscriptionRepository::new(db.pool());

    // Immediate subscriber, threshold high, category defi: should receive
    sub_repo
        .upsert(
            &NewSubscription::new(
                "trader@example.com",
                Frequency::Immediate,
                Severity::High,
                "tok-trader",
                Utc::now() + Duration::hours(48),
            )
            .with_categories(vec![Category::Defi]),
        )
        .await
        .unwrap();
    sub_repo.verify_by_token("tok-trader").await.unwrap().unwrap();

    // Immediate subscriber with a disjoint category set: should not
    sub_repo
        .upsert(
            &NewSubscription::new(
                "lawyer@example.com",
                Frequency::Immediate,
                Severity::Low,
                "tok-lawyer",
                Utc::now() + Duration::hours(48),
            )
            .with_categories(vec![Category::Regulation]),
        )
        .await
        .unwrap();
    sub_repo.verify_by_token("tok-lawyer").await.unwrap().unwrap();

    let transport = MemoryTransport::new();
    let dispatcher = Dispatcher::new(&db, &transport, &ServerConfig::default());
    let report = dispatcher.run_critical_cycle(Utc::now(), 3).await.unwrap();

    assert_eq!(report.due, 2);
    assert_eq!(report.sent, 1);

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "trader@example.com");
    assert!(sent[0].subject.starts_with("Critical security alert"));
    assert!(sent[0].html.contains("DeFi Protocol"));
}

#[tokio::test]
async fn unverified_subscriber_never_receives_dispatch() {
    let db = Database::open_in_memory().await.unwrap();
    ingest_feed_xml(&db, FEED_XML).await;

    SubscriptionRepository::new(db.pool())
        .upsert(&NewSubscription::new(
            "pending@example.com",
            Frequency::Immediate,
            Severity::Low,
            "tok-pending",
            Utc::now() + Duration::hours(48),
        ))
        .await
        .unwrap();

    let transport = MemoryTransport::new();
    let dispatcher = Dispatcher::new(&db, &transport, &ServerConfig::default());
    let report = dispatcher.run_critical_cycle(Utc::now(), 3).await.unwrap();

    assert_eq!(report.due, 0);
    assert_eq!(transport.sent_count(), 0);
}

#[tokio::test]
async fn repeated_dispatch_runs_add_no_ledger_rows() {
    let db = Database::open_in_memory().await.unwrap();
    ingest_feed_xml(&db, FEED_XML).await;

    let sub_repo = SubscriptionRepository::new(db.pool());
    sub_repo
        .upsert(&NewSubscription::new(
            "a@example.com",
            Frequency::Immediate,
            Severity::High,
            "tok-a",
            Utc::now() + Duration::hours(48),
        ))
        .await
        .unwrap();
    sub_repo.verify_by_token("tok-a").await.unwrap().unwrap();

    let transport = MemoryTransport::new();
    let dispatcher = Dispatcher::new(&db, &transport, &ServerConfig::default());

    dispatcher.run_critical_cycle(Utc::now(), 3).await.unwrap();
    dispatcher.run_critical_cycle(Utc::now(), 3).await.unwrap();
    dispatcher.run_critical_cycle(Utc::now(), 3).await.unwrap();

    let ledger = NotificationLedger::new(db.pool());
    assert_eq!(ledger.count_by_status(SendStatus::Sent).await.unwrap(), 1);
    assert_eq!(transport.sent_count(), 1);
}

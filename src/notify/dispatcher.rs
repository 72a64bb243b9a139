//! Notification dispatcher for threatwire.
//!
//! Walks due subscribers, filters the article window through the matcher
//! and the ledger, renders one digest per subscriber, and records every
//! outcome before moving on. The ledger write order makes a mid-run crash
//! safe: the next run's ledger check excludes already-sent pairs.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::article::ArticleRepository;
use crate::config::{NotifyConfig, ServerConfig};
use crate::db::Database;
use crate::notify::email::{render_digest, EmailTransport};
use crate::notify::ledger::{NotificationLedger, SendStatus};
use crate::notify::matcher;
use crate::notify::scheduler;
use crate::subscriber::{Frequency, Subscription, SubscriptionRepository};
use crate::Result;

/// Report of one dispatch cycle.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// Subscribers that were due in this cycle.
    pub due: usize,
    /// Digests accepted by the transport.
    pub sent: usize,
    /// Digests the transport rejected.
    pub failed: usize,
    /// Articles covered by successful digests.
    pub articles_delivered: usize,
    /// Per-subscriber transport failures, collected rather than raised.
    pub errors: Vec<String>,
}

/// Dispatcher over due subscribers.
pub struct Dispatcher<'a> {
    db: &'a Database,
    transport: &'a dyn EmailTransport,
    base_url: String,
    timezone: String,
}

impl<'a> Dispatcher<'a> {
    /// Create a new dispatcher.
    pub fn new(db: &'a Database, transport: &'a dyn EmailTransport, server: &ServerConfig) -> Self {
        Self {
            db,
            transport,
            base_url: server.base_url.clone(),
            timezone: server.timezone.clone(),
        }
    }

    /// Run one hourly digest cycle for daily and weekly subscribers.
    pub async fn run_digest_cycle(&self, now: DateTime<Utc>) -> Result<DispatchReport> {
        let utc_hour = now.hour();
        let utc_weekday = now.weekday().num_days_from_sunday();

        let sub_repo = SubscriptionRepository::new(self.db.pool());
        let mut report = DispatchReport::default();

        for frequency in [Frequency::Daily, Frequency::Weekly] {
            for subscription in sub_repo.list_deliverable(frequency).await? {
                if !scheduler::due_digest(&subscription, utc_hour, utc_weekday) {
                    continue;
                }
                report.due += 1;
                let window_start = scheduler::window_start(&subscription, now);
                self.dispatch_to(&subscription, window_start, now, &mut report)
                    .await?;
            }
        }

        Ok(report)
    }

    /// Run one critical-alert cycle for immediate subscribers.
    ///
    /// Bypasses local-hour matching entirely; the short lookback window
    /// plus the ledger keeps repeated runs idempotent.
    pub async fn run_critical_cycle(
        &self,
        now: DateTime<Utc>,
        lookback_hours: i64,
    ) -> Result<DispatchReport> {
        let sub_repo = SubscriptionRepository::new(self.db.pool());
        let mut report = DispatchReport::default();
        let window_start = now - Duration::hours(lookback_hours);

        for subscription in sub_repo.list_deliverable(Frequency::Immediate).await? {
            report.due += 1;
            self.dispatch_to(&subscription, window_start, now, &mut report)
                .await?;
        }

        Ok(report)
    }

    /// Dispatch one subscriber's pending articles as a single digest.
    ///
    /// Ledger rows for this subscriber are written before the loop moves
    /// to the next one. A transport failure is recorded per article and
    /// never aborts the cycle.
    async fn dispatch_to(
        &self,
        subscription: &Subscription,
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
        report: &mut DispatchReport,
    ) -> Result<()> {
        let article_repo = ArticleRepository::new(self.db.pool());
        let ledger = NotificationLedger::new(self.db.pool());
        let sub_repo = SubscriptionRepository::new(self.db.pool());

        let candidates = article_repo.list_published_between(window_start, now).await?;
        let matching: Vec<_> = candidates
            .into_iter()
            .filter(|article| matcher::matches(article, subscription))
            .collect();
        let pending = ledger.filter_unsent(subscription.id, matching).await?;

        if pending.is_empty() {
            debug!("No pending articles for {}", subscription.email);
            return Ok(());
        }

        let message = render_digest(subscription, &pending, &self.base_url, &self.timezone);

        match self.transport.send(&message).await {
            Ok(()) => {
                for article in &pending {
                    ledger
                        .record(subscription.id, article.id, SendStatus::Sent, None)
                        .await?;
                }
                // Anchors the next digest's window start
                sub_repo.touch_last_notified(subscription.id, now).await?;
                report.sent += 1;
                report.articles_delivered += pending.len();
                info!(
                    "Sent digest with {} article(s) to {}",
                    pending.len(),
                    subscription.email
                );
            }
            Err(e) => {
                let detail = e.to_string();
                for article in &pending {
                    ledger
                        .record(
                            subscription.id,
                            article.id,
                            SendStatus::Failed,
                            Some(&detail),
                        )
                        .await?;
                }
                report.failed += 1;
                report.errors.push(format!("{}: {}", subscription.email, detail));
                warn!("Digest delivery failed for {}: {}", subscription.email, detail);
            }
        }

        Ok(())
    }
}

/// Start the hourly digest loop and the critical-alert loop.
pub fn start_notify_loops(
    db: Database,
    transport: Arc<dyn EmailTransport>,
    server: ServerConfig,
    notify: NotifyConfig,
) {
    {
        let db = db.clone();
        let transport = Arc::clone(&transport);
        let server = server.clone();
        tokio::spawn(async move {
            info!("Digest loop started (hourly)");
            let mut timer = interval(std::time::Duration::from_secs(3600));
            loop {
                timer.tick().await;
                let dispatcher = Dispatcher::new(&db, transport.as_ref(), &server);
                match dispatcher.run_digest_cycle(Utc::now()).await {
                    Ok(report) => log_report("digest", &report),
                    Err(e) => warn!("Digest cycle failed: {}", e),
                }
            }
        });
    }

    tokio::spawn(async move {
        info!(
            "Critical-alert loop started (every {} seconds)",
            notify.critical_interval_secs
        );
        let mut timer = interval(std::time::Duration::from_secs(notify.critical_interval_secs));
        loop {
            timer.tick().await;
            let dispatcher = Dispatcher::new(&db, transport.as_ref(), &server);
            match dispatcher
                .run_critical_cycle(Utc::now(), notify.critical_lookback_hours)
                .await
            {
                Ok(report) => log_report("critical", &report),
                Err(e) => warn!("Critical cycle failed: {}", e),
            }
        }
    });
}

fn log_report(kind: &str, report: &DispatchReport) {
    if report.due == 0 {
        debug!("{} cycle: no due subscribers", kind);
        return;
    }
    info!(
        "{} cycle: {} due, {} sent, {} failed, {} article(s) delivered",
        kind, report.due, report.sent, report.failed, report.articles_delivered
    );
    for error in &report.errors {
        warn!("{} cycle delivery failure: {}", kind, error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::{Category, NewArticle, Severity};
    use crate::notify::email::MemoryTransport;
    use crate::subscriber::NewSubscription;

    async fn setup() -> (Database, MemoryTransport, ServerConfig) {
        let db = Database::open_in_memory().await.unwrap();
        (db, MemoryTransport::new(), ServerConfig::default())
    }

    async fn add_article(db: &Database, fingerprint: &str, severity: Severity, hours_ago: i64) -> i64 {
        ArticleRepository::new(db.pool())
            .upsert(
                &NewArticle::new(
                    fingerprint,
                    format!("Article {}", fingerprint),
                    format!("https://example.com/{}", fingerprint),
                    Utc::now() - Duration::hours(hours_ago),
                )
                .with_category(Category::Defi)
                .with_severity(severity),
            )
            .await
            .unwrap()
            .unwrap()
    }

    async fn add_verified_subscriber(
        db: &Database,
        email: &str,
        frequency: Frequency,
        threshold: Severity,
        now: chrono::DateTime<Utc>,
    ) -> Subscription {
        let repo = SubscriptionRepository::new(db.pool());
        let token = format!("tok-{}", email);
        repo.upsert(
            &NewSubscription::new(email, frequency, threshold, &token, now + Duration::hours(48))
                // Preferred hour matching the cycle's UTC hour, offset 0
                .with_schedule(now.hour() as u8, 0, 0),
        )
        .await
        .unwrap();
        repo.verify_by_token(&token).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_digest_cycle_sends_single_batched_message() {
        let (db, transport, server) = setup().await;
        let now = Utc::now();
        add_article(&db, "a1", Severity::High, 2).await;
        add_article(&db, "a2", Severity::High, 3).await;
        add_verified_subscriber(&db, "a@example.com", Frequency::Daily, Severity::High, now).await;

        let dispatcher = Dispatcher::new(&db, &transport, &server);
        let report = dispatcher.run_digest_cycle(now).await.unwrap();

        assert_eq!(report.due, 1);
        assert_eq!(report.sent, 1);
        assert_eq!(report.articles_delivered, 2);
        // Two articles, one message
        assert_eq!(transport.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_is_idempotent_across_runs() {
        let (db, transport, server) = setup().await;
        let now = Utc::now();
        add_article(&db, "a1", Severity::High, 2).await;
        add_verified_subscriber(&db, "a@example.com", Frequency::Daily, Severity::High, now).await;

        let dispatcher = Dispatcher::new(&db, &transport, &server);

        let first = dispatcher.run_digest_cycle(now).await.unwrap();
        assert_eq!(first.sent, 1);

        // Second run with no new articles: the ledger excludes the pair,
        // zero additional sends
        let second = dispatcher.run_digest_cycle(now).await.unwrap();
        assert_eq!(second.sent, 0);
        assert_eq!(transport.sent_count(), 1);

        let ledger = NotificationLedger::new(db.pool());
        assert_eq!(ledger.count_by_status(SendStatus::Sent).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_recorded_and_does_not_abort() {
        let (db, transport, server) = setup().await;
        let now = Utc::now();
        add_article(&db, "a1", Severity::High, 2).await;
        let failing =
            add_verified_subscriber(&db, "bad@example.com", Frequency::Daily, Severity::High, now)
                .await;
        add_verified_subscriber(&db, "good@example.com", Frequency::Daily, Severity::High, now)
            .await;
        transport.fail_for("bad@example.com");

        let dispatcher = Dispatcher::new(&db, &transport, &server);
        let report = dispatcher.run_digest_cycle(now).await.unwrap();

        // The failure did not block the other subscriber
        assert_eq!(report.sent, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("bad@example.com"));

        // The failed pair is recorded with detail but not marked sent
        let ledger = NotificationLedger::new(db.pool());
        let entries = ledger.list_for_subscription(failing.id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, SendStatus::Failed);
        assert!(entries[0].error.as_deref().unwrap().contains("scripted failure"));
    }

    #[tokio::test]
    async fn test_failed_pair_retries_next_run() {
        let (db, transport, server) = setup().await;
        let now = Utc::now();
        add_article(&db, "a1", Severity::High, 2).await;
        add_verified_subscriber(&db, "flaky@example.com", Frequency::Daily, Severity::High, now)
            .await;
        transport.fail_for("flaky@example.com");

        let dispatcher = Dispatcher::new(&db, &transport, &server);
        let first = dispatcher.run_digest_cycle(now).await.unwrap();
        assert_eq!(first.failed, 1);

        // Transport recovers; the failed entry does not block the retry
        transport.clear_failures();
        let second = dispatcher.run_digest_cycle(now).await.unwrap();
        assert_eq!(second.sent, 1);
    }

    #[tokio::test]
    async fn test_successful_send_advances_last_notified() {
        let (db, transport, server) = setup().await;
        let now = Utc::now();
        add_article(&db, "a1", Severity::High, 2).await;
        let sub =
            add_verified_subscriber(&db, "a@example.com", Frequency::Daily, Severity::High, now)
                .await;
        assert!(sub.last_notified_at.is_none());

        let dispatcher = Dispatcher::new(&db, &transport, &server);
        dispatcher.run_digest_cycle(now).await.unwrap();

        let after = SubscriptionRepository::new(db.pool())
            .get_by_id(sub.id)
            .await
            .unwrap()
            .unwrap();
        let recorded = after.last_notified_at.unwrap();
        assert!((recorded - now).num_seconds().abs() < 2);
    }

    #[tokio::test]
    async fn test_no_send_when_nothing_matches() {
        let (db, transport, server) = setup().await;
        let now = Utc::now();
        // Low-severity article, high-threshold subscriber
        add_article(&db, "a1", Severity::Low, 2).await;
        let sub =
            add_verified_subscriber(&db, "a@example.com", Frequency::Daily, Severity::High, now)
                .await;

        let dispatcher = Dispatcher::new(&db, &transport, &server);
        let report = dispatcher.run_digest_cycle(now).await.unwrap();

        assert_eq!(report.due, 1);
        assert_eq!(report.sent, 0);
        assert_eq!(transport.sent_count(), 0);

        // No ledger noise and no last_notified advance for empty digests
        let after = SubscriptionRepository::new(db.pool())
            .get_by_id(sub.id)
            .await
            .unwrap()
            .unwrap();
        assert!(after.last_notified_at.is_none());
    }

    #[tokio::test]
    async fn test_critical_cycle_serves_immediate_subscribers() {
        let (db, transport, server) = setup().await;
        add_article(&db, "crit", Severity::Critical, 1).await;
        add_article(&db, "old-crit", Severity::Critical, 10).await;
        add_verified_subscriber(&db, "a@example.com", Frequency::Immediate, Severity::High, Utc::now())
            .await;

        let dispatcher = Dispatcher::new(&db, &transport, &server);
        let report = dispatcher.run_critical_cycle(Utc::now(), 3).await.unwrap();

        assert_eq!(report.sent, 1);
        // Only the article inside the 3h lookback is covered
        assert_eq!(report.articles_delivered, 1);
        assert!(transport.sent()[0].html.contains("Article crit"));
    }

    #[tokio::test]
    async fn test_critical_cycle_repeated_runs_are_idempotent() {
        let (db, transport, server) = setup().await;
        add_article(&db, "crit", Severity::Critical, 1).await;
        add_verified_subscriber(&db, "a@example.com", Frequency::Immediate, Severity::High, Utc::now())
            .await;

        let dispatcher = Dispatcher::new(&db, &transport, &server);
        dispatcher.run_critical_cycle(Utc::now(), 3).await.unwrap();
        let second = dispatcher.run_critical_cycle(Utc::now(), 3).await.unwrap();

        assert_eq!(second.sent, 0);
        assert_eq!(transport.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_digest_cycle_skips_not_due_subscribers() {
        let (db, transport, server) = setup().await;
        add_article(&db, "a1", Severity::High, 2).await;

        // Preferred hour two hours from now: not due
        let repo = SubscriptionRepository::new(db.pool());
        let now = Utc::now();
        let hour = (now.hour() + 2) % 24;
        repo.upsert(
            &NewSubscription::new(
                "later@example.com",
                Frequency::Daily,
                Severity::High,
                "tok-later",
                Utc::now() + Duration::hours(48),
            )
            .with_schedule(hour as u8, 0, 0),
        )
        .await
        .unwrap();
        repo.verify_by_token("tok-later").await.unwrap().unwrap();

        let dispatcher = Dispatcher::new(&db, &transport, &server);
        let report = dispatcher.run_digest_cycle(now).await.unwrap();

        assert_eq!(report.due, 0);
        assert_eq!(transport.sent_count(), 0);
    }
}

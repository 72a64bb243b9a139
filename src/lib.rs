//! threatwire - threat-intelligence feed ingestion and subscriber
//! notification service.
//!
//! Feeds are fetched, normalized, deduplicated by content fingerprint,
//! classified by severity and category, and stored; a scheduler matches
//! stored articles against per-subscriber preferences and dispatches
//! digest emails exactly once per (subscription, article) pair.

pub mod article;
pub mod classify;
pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod logging;
pub mod notify;
pub mod rate_limit;
pub mod subscriber;
pub mod web;

pub use article::{Article, ArticleRepository, Category, NewArticle, Severity};
pub use classify::{Classification, Classifier, KeywordRule, KeywordRuleRepository};
pub use config::Config;
pub use db::Database;
pub use error::{Result, ThreatwireError};
pub use feed::{FeedSource, FeedSourceRepository, IngestMode, IngestReport, Ingestor, NewFeedSource, SourceKind};
pub use notify::{
    DispatchReport, Dispatcher, EmailTransport, HttpEmailTransport, MemoryTransport,
    NotificationLedger, OutboundEmail, SendStatus,
};
pub use rate_limit::{FixedWindowLimiter, LimiterConfig, RateLimitResult, SubmissionGuard};
pub use subscriber::{
    ActivityState, Frequency, NewSubscription, SubscribeOutcome, SubscribeRequest, Subscription,
    SubscriptionRepository, SubscriberService, VerificationState,
};

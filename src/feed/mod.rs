//! Feed ingestion for threatwire.
//!
//! Fetches external sources (RSS/Atom feeds, scraped pages), normalizes
//! candidate items, and persists classified articles.

pub mod fetcher;
pub mod ingest;
pub mod normalizer;
mod repository;
mod types;

pub use fetcher::FeedFetcher;
pub use ingest::{start_ingest_loop, Ingestor};
pub use repository::FeedSourceRepository;
pub use types::{
    FeedSource, IngestMode, IngestReport, NewFeedSource, NormalizedItem, ParsedItem, SourceKind,
    SourceStats, MAX_BODY_LENGTH, MAX_CONSECUTIVE_ERRORS, MAX_FEED_SIZE,
};

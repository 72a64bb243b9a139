//! Article store for threatwire.
//!
//! Durable, upsert-based persistence keyed by content fingerprint; the
//! single source of truth consumed by the public feed API and the
//! notification pipeline.

mod repository;
mod types;

pub use repository::ArticleRepository;
pub use types::{Article, Category, NewArticle, Severity, MAX_SUMMARY_LENGTH, MAX_TAGS};

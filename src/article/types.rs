//! Article types for threatwire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum length for an article summary.
pub const MAX_SUMMARY_LENGTH: usize = 2000;

/// Maximum number of tags stored per article.
pub const MAX_TAGS: usize = 10;

/// Article category, mapped from the classifier's category-name table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    /// DeFi protocols and on-chain finance.
    Defi,
    /// Smart-contract level issues.
    SmartContract,
    /// Wallet and key management.
    Wallet,
    /// Exchanges and custodians.
    Exchange,
    /// Phishing and impersonation campaigns.
    Phishing,
    /// Malware families and delivery.
    Malware,
    /// Regulatory and compliance news.
    Regulation,
    /// Chain infrastructure: bridges, nodes, RPC.
    Infrastructure,
    /// Anything that matched only generic security terms.
    General,
}

impl Category {
    /// All categories, in display order.
    pub const ALL: &'static [Category] = &[
        Category::Defi,
        Category::SmartContract,
        Category::Wallet,
        Category::Exchange,
        Category::Phishing,
        Category::Malware,
        Category::Regulation,
        Category::Infrastructure,
        Category::General,
    ];

    /// Convert to the stored string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Defi => "defi",
            Category::SmartContract => "smart-contract",
            Category::Wallet => "wallet",
            Category::Exchange => "exchange",
            Category::Phishing => "phishing",
            Category::Malware => "malware",
            Category::Regulation => "regulation",
            Category::Infrastructure => "infrastructure",
            Category::General => "general",
        }
    }

    /// Parse from the stored string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "defi" => Some(Category::Defi),
            "smart-contract" => Some(Category::SmartContract),
            "wallet" => Some(Category::Wallet),
            "exchange" => Some(Category::Exchange),
            "phishing" => Some(Category::Phishing),
            "malware" => Some(Category::Malware),
            "regulation" => Some(Category::Regulation),
            "infrastructure" => Some(Category::Infrastructure),
            "general" => Some(Category::General),
            _ => None,
        }
    }

    /// Human-readable label for rendered digests.
    pub fn label(&self) -> &'static str {
        match self {
            Category::Defi => "DeFi",
            Category::SmartContract => "Smart Contracts",
            Category::Wallet => "Wallet Security",
            Category::Exchange => "Exchanges",
            Category::Phishing => "Phishing",
            Category::Malware => "Malware",
            Category::Regulation => "Regulation",
            Category::Infrastructure => "Infrastructure",
            Category::General => "General",
        }
    }
}

/// Article severity tier.
///
/// The rank order is total: critical(0) < high(1) < medium(2) < low(3) <
/// info(4), where a lower rank number is more severe. Threshold comparisons
/// are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    /// Rank in the severity order; lower is more severe.
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::High => 1,
            Severity::Medium => 2,
            Severity::Low => 3,
            Severity::Info => 4,
        }
    }

    /// Convert to the stored string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }

    /// Parse from the stored string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "critical" => Some(Severity::Critical),
            "high" => Some(Severity::High),
            "medium" => Some(Severity::Medium),
            "low" => Some(Severity::Low),
            "info" => Some(Severity::Info),
            _ => None,
        }
    }
}

/// A stored article.
#[derive(Debug, Clone, Serialize)]
pub struct Article {
    /// Article ID.
    pub id: i64,
    /// Content fingerprint (dedup key, immutable once assigned).
    pub fingerprint: String,
    /// Article title.
    pub title: String,
    /// Short summary.
    pub summary: Option<String>,
    /// Full body text.
    pub body: Option<String>,
    /// Canonical link.
    pub link: String,
    /// Additional source reference links.
    pub source_refs: Vec<String>,
    /// Primary category.
    pub category: Category,
    /// Severity tier.
    pub severity: Severity,
    /// CVE identifier, when one was found.
    pub cve_id: Option<String>,
    /// Matched keywords stored as tags.
    pub tags: Vec<String>,
    /// Affected technologies.
    pub technologies: Vec<String>,
    /// Publication timestamp.
    pub published_at: DateTime<Utc>,
    /// Ingestion timestamp.
    pub ingested_at: DateTime<Utc>,
    /// Whether downstream enrichment has processed this article.
    pub processed: bool,
}

/// New article for creation.
#[derive(Debug, Clone)]
pub struct NewArticle {
    /// Content fingerprint.
    pub fingerprint: String,
    /// Article title.
    pub title: String,
    /// Short summary.
    pub summary: Option<String>,
    /// Full body text.
    pub body: Option<String>,
    /// Canonical link.
    pub link: String,
    /// Additional source reference links.
    pub source_refs: Vec<String>,
    /// Primary category.
    pub category: Category,
    /// Severity tier.
    pub severity: Severity,
    /// CVE identifier.
    pub cve_id: Option<String>,
    /// Matched keywords stored as tags.
    pub tags: Vec<String>,
    /// Affected technologies.
    pub technologies: Vec<String>,
    /// Publication timestamp.
    pub published_at: DateTime<Utc>,
}

impl NewArticle {
    /// Create a new article with required fields.
    pub fn new(
        fingerprint: impl Into<String>,
        title: impl Into<String>,
        link: impl Into<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            title: title.into(),
            summary: None,
            body: None,
            link: link.into(),
            source_refs: Vec::new(),
            category: Category::General,
            severity: Severity::Low,
            cve_id: None,
            tags: Vec::new(),
            technologies: Vec::new(),
            published_at,
        }
    }

    /// Set the summary, truncating if too long.
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        let summary = summary.into();
        if summary.chars().count() > MAX_SUMMARY_LENGTH {
            self.summary = Some(summary.chars().take(MAX_SUMMARY_LENGTH).collect());
        } else {
            self.summary = Some(summary);
        }
        self
    }

    /// Set the body text.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set the category.
    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    /// Set the severity.
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Set the CVE identifier.
    pub fn with_cve(mut self, cve_id: impl Into<String>) -> Self {
        self.cve_id = Some(cve_id.into());
        self
    }

    /// Set the tags, capped at MAX_TAGS.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags.into_iter().take(MAX_TAGS).collect();
        self
    }

    /// Set the affected technologies.
    pub fn with_technologies(mut self, technologies: Vec<String>) -> Self {
        self.technologies = technologies;
        self
    }

    /// Add a source reference link.
    pub fn with_source_ref(mut self, url: impl Into<String>) -> Self {
        self.source_refs.push(url.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_rank_order() {
        assert!(Severity::Critical.rank() < Severity::High.rank());
        assert!(Severity::High.rank() < Severity::Medium.rank());
        assert!(Severity::Medium.rank() < Severity::Low.rank());
        assert!(Severity::Low.rank() < Severity::Info.rank());
    }

    #[test]
    fn test_severity_roundtrip() {
        for s in [
            Severity::Critical,
            Severity::High,
            Severity::Medium,
            Severity::Low,
            Severity::Info,
        ] {
            assert_eq!(Severity::parse(s.as_str()), Some(s));
        }
        assert_eq!(Severity::parse("catastrophic"), None);
    }

    #[test]
    fn test_category_roundtrip() {
        for c in Category::ALL {
            assert_eq!(Category::parse(c.as_str()), Some(*c));
        }
        assert_eq!(Category::parse("unknown"), None);
    }

    #[test]
    fn test_new_article_defaults() {
        let article = NewArticle::new("fp-1", "Test Article", "https://example.com/a", Utc::now());
        assert_eq!(article.fingerprint, "fp-1");
        assert_eq!(article.category, Category::General);
        assert_eq!(article.severity, Severity::Low);
        assert!(article.cve_id.is_none());
        assert!(article.tags.is_empty());
    }

    #[test]
    fn test_new_article_builder() {
        let article = NewArticle::new("fp-2", "Title", "https://example.com/b", Utc::now())
            .with_summary("A summary")
            .with_category(Category::Defi)
            .with_severity(Severity::Critical)
            .with_cve("CVE-2025-12345")
            .with_tags(vec!["defi".into(), "exploit".into()])
            .with_technologies(vec!["ethereum".into()])
            .with_source_ref("https://example.com/source");
        assert_eq!(article.summary, Some("A summary".to_string()));
        assert_eq!(article.category, Category::Defi);
        assert_eq!(article.severity, Severity::Critical);
        assert_eq!(article.cve_id, Some("CVE-2025-12345".to_string()));
        assert_eq!(article.tags.len(), 2);
        assert_eq!(article.source_refs.len(), 1);
    }

    #[test]
    fn test_tags_capped() {
        let tags: Vec<String> = (0..20).map(|i| format!("tag{}", i)).collect();
        let article =
            NewArticle::new("fp-3", "Title", "https://example.com/c", Utc::now()).with_tags(tags);
        assert_eq!(article.tags.len(), MAX_TAGS);
    }

    #[test]
    fn test_summary_truncated() {
        let long = "x".repeat(MAX_SUMMARY_LENGTH + 50);
        let article =
            NewArticle::new("fp-4", "Title", "https://example.com/d", Utc::now()).with_summary(long);
        assert_eq!(
            article.summary.unwrap().chars().count(),
            MAX_SUMMARY_LENGTH
        );
    }
}

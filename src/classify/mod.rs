//! Relevance and severity classification for threatwire.
//!
//! Scores normalized items against the keyword-rule taxonomy to decide
//! relevance and primary category, assigns a severity tier through an
//! ordered indicator list, and extracts structured fields (CVE id,
//! affected technologies, tags).

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::article::{Category, Severity, MAX_TAGS};
use crate::db::DbPool;
use crate::{Result, ThreatwireError};

/// Critical-severity indicator terms, checked first.
const CRITICAL_TERMS: &[&str] = &[
    "critical",
    "zero-day",
    "zero day",
    "0-day",
    "actively exploited",
    "in the wild",
    "emergency patch",
];

/// High-severity indicator terms.
const HIGH_TERMS: &[&str] = &[
    "exploit",
    "breach",
    "ransomware",
    "drained",
    "stolen",
    "hacked",
    "takeover",
];

/// Medium-severity indicator terms.
const MEDIUM_TERMS: &[&str] = &[
    "vulnerability",
    "patch",
    "flaw",
    "phishing",
    "scam",
    "misconfiguration",
];

/// Fixed lexicon for affected-technology extraction.
const TECHNOLOGIES: &[&str] = &[
    "ethereum",
    "bitcoin",
    "solana",
    "polygon",
    "arbitrum",
    "metamask",
    "uniswap",
    "chainlink",
    "ledger",
    "trezor",
    "chrome",
    "firefox",
    "windows",
    "macos",
    "linux",
    "android",
    "ios",
    "aws",
    "docker",
    "kubernetes",
    "wordpress",
    "github",
    "npm",
    "discord",
    "telegram",
];

/// A keyword rule: keyword -> category with a relevance weight.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct KeywordRule {
    /// Keyword matched case-insensitively as a substring.
    pub keyword: String,
    /// Category the keyword votes for.
    pub category: String,
    /// Vote weight.
    pub weight: i64,
}

/// Repository for the read-only keyword rule set.
pub struct KeywordRuleRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> KeywordRuleRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Load all rules.
    pub async fn list_all(&self) -> Result<Vec<KeywordRule>> {
        let rules = sqlx::query_as::<_, KeywordRule>(
            "SELECT keyword, category, weight FROM keyword_rules ORDER BY id ASC",
        )
        .fetch_all(self.pool)
        .await
        .map_err(|e| ThreatwireError::Database(e.to_string()))?;

        Ok(rules)
    }
}

/// Classification result for a relevant item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Primary category (highest accumulated keyword weight).
    pub category: Category,
    /// Severity tier (first matching indicator list).
    pub severity: Severity,
    /// Matched keywords kept as tags, strongest first, capped.
    pub tags: Vec<String>,
    /// First CVE identifier found, if any.
    pub cve_id: Option<String>,
    /// Technologies from the fixed lexicon found in the text.
    pub technologies: Vec<String>,
}

/// Keyword-based relevance and severity classifier.
///
/// Deterministic scoring function, not a probabilistic model: the same
/// input always produces the same classification.
pub struct Classifier {
    rules: Vec<KeywordRule>,
}

impl Classifier {
    /// Create a classifier from a rule set.
    pub fn new(rules: Vec<KeywordRule>) -> Self {
        Self { rules }
    }

    /// Load the classifier from the keyword_rules table.
    pub async fn load(pool: &DbPool) -> Result<Self> {
        let rules = KeywordRuleRepository::new(pool).list_all().await?;
        Ok(Self::new(rules))
    }

    /// Classify an item by title and body.
    ///
    /// Returns `None` when no keyword matches: the item is irrelevant and
    /// is dropped, not stored.
    pub fn classify(&self, title: &str, body: &str) -> Option<Classification> {
        let text = format!("{} {}", title, body).to_lowercase();

        // Accumulate weight per category over all matching keywords
        let mut scores: HashMap<&str, i64> = HashMap::new();
        let mut matched: Vec<(&str, i64)> = Vec::new();
        for rule in &self.rules {
            if text.contains(&rule.keyword.to_lowercase()) {
                *scores.entry(rule.category.as_str()).or_insert(0) += rule.weight;
                matched.push((rule.keyword.as_str(), rule.weight));
            }
        }

        if matched.is_empty() {
            return None;
        }

        // Highest accumulated weight wins; ties break on category name for
        // determinism
        let category_name = scores
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(name, _)| *name)?;
        let category = Category::parse(category_name).unwrap_or(Category::General);

        // Strongest keywords become tags
        matched.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        let mut tags: Vec<String> = Vec::new();
        for (keyword, _) in &matched {
            if !tags.iter().any(|t| t == keyword) {
                tags.push((*keyword).to_string());
            }
            if tags.len() == MAX_TAGS {
                break;
            }
        }

        let severity = classify_severity(title, &tags);
        let cve_id = extract_cve(&format!("{} {}", title, body));
        let technologies = extract_technologies(&text);

        Some(Classification {
            category,
            severity,
            tags,
            cve_id,
            technologies,
        })
    }
}

/// Assign severity from the ordered indicator lists, first match wins.
///
/// The order is deliberate: specific/severe terms are checked before
/// generic ones so a "critical exploit" is not under-classified as
/// merely "medium".
pub fn classify_severity(title: &str, matched_keywords: &[String]) -> Severity {
    let haystack = format!("{} {}", title.to_lowercase(), matched_keywords.join(" "));

    if CRITICAL_TERMS.iter().any(|t| haystack.contains(t)) {
        return Severity::Critical;
    }
    if HIGH_TERMS.iter().any(|t| haystack.contains(t)) {
        return Severity::High;
    }
    if MEDIUM_TERMS.iter().any(|t| haystack.contains(t)) {
        return Severity::Medium;
    }
    Severity::Low
}

fn cve_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)CVE-\d{4}-\d{4,}").unwrap())
}

/// Extract the first CVE identifier from the text, if present.
pub fn extract_cve(text: &str) -> Option<String> {
    cve_regex()
        .find(text)
        .map(|m| m.as_str().to_uppercase())
}

/// Extract affected technologies from the fixed lexicon.
///
/// `text` must already be lowercased.
fn extract_technologies(text: &str) -> Vec<String> {
    TECHNOLOGIES
        .iter()
        .filter(|tech| text.contains(*tech))
        .map(|tech| (*tech).to_string())
        .collect()
}

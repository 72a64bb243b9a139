//! Article/subscription matching for threatwire.

use crate::article::{Article, Severity};
use crate::subscriber::Subscription;

/// Decide whether an article should be included in a subscriber's
/// notification. Pure function, no side effects.
///
/// All rules must hold:
/// 1. The article's severity rank is within the subscriber's threshold
///    (inclusive: a "high" threshold also admits "critical").
/// 2. A non-empty category filter requires membership.
/// 3. A non-empty technology filter requires a case-insensitive substring
///    overlap with the article's tags — except for critical articles,
///    which always pass through. Technology filtering narrows routine
///    alerts; it is not a gate on top-severity warnings.
pub fn matches(article: &Article, subscription: &Subscription) -> bool {
    if article.severity.rank() > subscription.min_severity.rank() {
        return false;
    }

    if !subscription.categories.is_empty()
        && !subscription.categories.contains(&article.category)
    {
        return false;
    }

    if !subscription.technologies.is_empty()
        && !article.tags.is_empty()
        && article.severity != Severity::Critical
    {
        let overlap = article.tags.iter().any(|tag| {
            let tag = tag.to_lowercase();
            subscription
                .technologies
                .iter()
                .any(|tech| tag.contains(&tech.to_lowercase()))
        });
        if !overlap {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::{Category, NewArticle};
    use crate::subscriber::{
        ActivityState, Frequency, Subscription, VerificationState,
    };
    use chrono::Utc;

    fn article(severity: Severity, category: Category, tags: &[&str]) -> Article {
        let new = NewArticle::new("fp", "Title", "https://example.com", Utc::now())
            .with_category(category)
            .with_severity(severity)
            .with_tags(tags.iter().map(|t| t.to_string()).collect());
        Article {
            id: 1,
            fingerprint: new.fingerprint,
            title: new.title,
            summary: new.summary,
            body: new.body,
            link: new.link,
            source_refs: new.source_refs,
            category: new.category,
            severity: new.severity,
            cve_id: new.cve_id,
            tags: new.tags,
            technologies: new.technologies,
            published_at: new.published_at,
            ingested_at: Utc::now(),
            processed: false,
        }
    }

    fn subscription(
        threshold: Severity,
        categories: Vec<Category>,
        technologies: Vec<String>,
    ) -> Subscription {
        Subscription {
            id: 1,
            email: "a@example.com".into(),
            name: None,
            categories,
            technologies,
            frequency: Frequency::Daily,
            min_severity: threshold,
            preferred_hour: 9,
            utc_offset_minutes: 0,
            preferred_weekday: 1,
            verification: VerificationState::Verified,
            activity: ActivityState::Active,
            token: None,
            token_expires_at: None,
            last_notified_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_severity_threshold_inclusive() {
        let sub = subscription(Severity::High, vec![], vec![]);

        assert!(matches(&article(Severity::Critical, Category::Defi, &[]), &sub));
        assert!(matches(&article(Severity::High, Category::Defi, &[]), &sub));
        assert!(!matches(&article(Severity::Medium, Category::Defi, &[]), &sub));
        assert!(!matches(&article(Severity::Low, Category::Defi, &[]), &sub));
    }

    #[test]
    fn test_severity_threshold_matrix() {
        let severities = [
            Severity::Critical,
            Severity::High,
            Severity::Medium,
            Severity::Low,
            Severity::Info,
        ];
        for article_severity in severities {
            for threshold in severities {
                let sub = subscription(threshold, vec![], vec![]);
                let admitted = matches(&article(article_severity, Category::General, &[]), &sub);
                assert_eq!(
                    admitted,
                    article_severity.rank() <= threshold.rank(),
                    "severity={:?} threshold={:?}",
                    article_severity,
                    threshold
                );
            }
        }
    }

    #[test]
    fn test_spec_example_high_article() {
        // Article severity=high: threshold=critical excludes, high and
        // medium include
        let a = article(Severity::High, Category::General, &[]);
        assert!(!matches(&a, &subscription(Severity::Critical, vec![], vec![])));
        assert!(matches(&a, &subscription(Severity::High, vec![], vec![])));
        assert!(matches(&a, &subscription(Severity::Medium, vec![], vec![])));
    }

    #[test]
    fn test_empty_category_filter_admits_all() {
        let sub = subscription(Severity::Low, vec![], vec![]);
        assert!(matches(&article(Severity::Low, Category::Phishing, &[]), &sub));
        assert!(matches(&article(Severity::Low, Category::Defi, &[]), &sub));
    }

    #[test]
    fn test_category_filter_membership() {
        let sub = subscription(Severity::Low, vec![Category::Defi, Category::Wallet], vec![]);
        assert!(matches(&article(Severity::Low, Category::Defi, &[]), &sub));
        assert!(!matches(&article(Severity::Low, Category::Phishing, &[]), &sub));
    }

    #[test]
    fn test_technology_filter_substring_case_insensitive() {
        let sub = subscription(Severity::Low, vec![], vec!["ethereum".into()]);
        // Tag "Ethereum bridge" contains the filter technology
        assert!(matches(
            &article(Severity::Medium, Category::Defi, &["Ethereum bridge"]),
            &sub
        ));
        assert!(!matches(
            &article(Severity::Medium, Category::Defi, &["solana"]),
            &sub
        ));
    }

    #[test]
    fn test_technology_filter_bypass_for_critical() {
        let sub = subscription(Severity::Low, vec![], vec!["ethereum".into()]);

        // No tag overlap: medium is filtered out, critical passes through
        let medium = article(Severity::Medium, Category::Defi, &["solana"]);
        let critical = article(Severity::Critical, Category::Defi, &["solana"]);
        assert!(!matches(&medium, &sub));
        assert!(matches(&critical, &sub));
    }

    #[test]
    fn test_technology_filter_skipped_without_tags() {
        let sub = subscription(Severity::Low, vec![], vec!["ethereum".into()]);
        // Article has no tags: the technology filter is not applied
        assert!(matches(&article(Severity::Medium, Category::Defi, &[]), &sub));
    }

    #[test]
    fn test_all_rules_must_hold() {
        let sub = subscription(
            Severity::High,
            vec![Category::Defi],
            vec!["ethereum".into()],
        );
        // Category mismatch fails even though severity and tech would pass
        assert!(!matches(
            &article(Severity::Critical, Category::Phishing, &["ethereum"]),
            &sub
        ));
    }
}

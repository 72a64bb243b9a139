//! Item normalization and deduplication for threatwire.
//!
//! Turns heterogeneous source payloads (feed entries, scraped markdown
//! sections) into `NormalizedItem`s carrying a stable content fingerprint.
//! Deduplication itself happens at the storage layer through the
//! fingerprint's unique constraint; this module only computes the key.

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::feed::types::{NormalizedItem, ParsedItem};

/// Compute the content fingerprint for a feed item.
///
/// Deterministic sha256 over title and canonical link. Immutable once
/// assigned: two items with the same (title, link) are the same logical
/// article regardless of which source delivered them.
pub fn fingerprint(title: &str, link: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"\n");
    hasher.update(link.as_bytes());
    hex_encode(&hasher.finalize())
}

/// Compute the content fingerprint for a scraped incident section.
///
/// Scraped sections have no per-item canonical link, so identity is
/// title + section date + source name.
pub fn fingerprint_scraped(title: &str, date: &str, source_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"\n");
    hasher.update(date.as_bytes());
    hasher.update(b"\n");
    hasher.update(source_name.as_bytes());
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// Parse a publication date from the known formats, oldest-first attempts.
///
/// Returns `None` when no format matches; callers fall back to "now".
pub fn parse_published(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    None
}

/// Normalize a parsed feed item.
///
/// Items without a link fall back to the source page URL, which keeps the
/// fingerprint stable for feeds that omit per-item links.
pub fn normalize_feed_item(item: &ParsedItem, source_url: &str, now: DateTime<Utc>) -> NormalizedItem {
    let link = item
        .link
        .clone()
        .unwrap_or_else(|| source_url.to_string());
    NormalizedItem {
        fingerprint: fingerprint(&item.title, &link),
        title: item.title.clone(),
        link,
        body: item.description.clone().unwrap_or_default(),
        published_at: item.published_at.unwrap_or(now),
    }
}

fn date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{4}-\d{2}-\d{2}").unwrap())
}

/// Split a scraped markdown page into normalized incident sections.
///
/// A section starts at an `## ` heading; its body runs until the next
/// heading. The first `YYYY-MM-DD` date in the section supplies the
/// publication date, falling back to `now` when none is present.
pub fn parse_scraped_sections(
    markdown: &str,
    source_name: &str,
    source_url: &str,
    now: DateTime<Utc>,
) -> Vec<NormalizedItem> {
    let mut items = Vec::new();
    let mut current_title: Option<String> = None;
    let mut current_body: Vec<&str> = Vec::new();

    let flush = |title: Option<String>, body: &[&str], items: &mut Vec<NormalizedItem>| {
        let Some(title) = title else { return };
        let title = title.trim().to_string();
        if title.is_empty() {
            return;
        }
        let body_text = body.join("\n").trim().to_string();
        let date_str = date_regex()
            .find(&body_text)
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| now.format("%Y-%m-%d").to_string());
        let published_at = parse_published(&date_str).unwrap_or(now);

        items.push(NormalizedItem {
            fingerprint: fingerprint_scraped(&title, &date_str, source_name),
            title,
            link: source_url.to_string(),
            body: body_text,
            published_at,
        });
    };

    for line in markdown.lines() {
        if let Some(heading) = line.strip_prefix("## ") {
            flush(current_title.take(), &current_body, &mut items);
            current_body.clear();
            current_title = Some(heading.to_string());
        } else if current_title.is_some() {
            current_body.push(line);
        }
    }
    flush(current_title.take(), &current_body, &mut items);

    items
}

/// Discard items older than the lookback cutoff.
///
/// Prevents unbounded backfill and stale-alert spam; applied before
/// persistence.
pub fn apply_lookback(items: Vec<NormalizedItem>, cutoff: DateTime<Utc>) -> (Vec<NormalizedItem>, usize) {
    let before = items.len();
    let kept: Vec<NormalizedItem> = items
        .into_iter()
        .filter(|item| item.published_at >= cutoff)
        .collect();
    let stale = before - kept.len();
    (kept, stale)
}

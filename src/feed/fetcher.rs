//! Feed and page fetcher with security measures.
//!
//! This module fetches RSS/Atom feeds and scraped pages with SSRF
//! protection and resource limits.

use std::net::IpAddr;
use std::time::Duration;

use feed_rs::parser;
use reqwest::Client;

use crate::error::{Result, ThreatwireError};
use crate::feed::types::{ParsedItem, MAX_BODY_LENGTH, MAX_FEED_SIZE};

/// Connect timeout in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Read timeout in seconds.
const READ_TIMEOUT_SECS: u64 = 20;

/// Total timeout in seconds.
const TOTAL_TIMEOUT_SECS: u64 = 30;

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 5;

/// User agent string for outbound fetches.
const USER_AGENT: &str = "threatwire/0.1 (threat feed ingestion)";

/// Fetcher for external feed and page sources.
pub struct FeedFetcher {
    client: Client,
    scrape_endpoint: String,
    scrape_api_key: String,
}

impl FeedFetcher {
    /// Create a new fetcher.
    pub fn new(scrape_endpoint: impl Into<String>, scrape_api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .read_timeout(Duration::from_secs(READ_TIMEOUT_SECS))
            .timeout(Duration::from_secs(TOTAL_TIMEOUT_SECS))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ThreatwireError::Feed(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            scrape_endpoint: scrape_endpoint.into(),
            scrape_api_key: scrape_api_key.into(),
        })
    }

    /// Fetch and parse a feed from the given URL.
    pub async fn fetch_feed(&self, url: &str) -> Result<Vec<ParsedItem>> {
        validate_url(url)?;
        let bytes = self.fetch_bytes(url).await?;
        parse_feed(&bytes)
    }

    /// Fetch a page through the scraping API, returning markdown text.
    ///
    /// The scraping API takes the target URL as a path suffix and returns
    /// the page content rendered to markdown.
    pub async fn fetch_page(&self, url: &str) -> Result<String> {
        validate_url(url)?;

        let scrape_url = format!("{}/{}", self.scrape_endpoint.trim_end_matches('/'), url);
        let mut request = self.client.get(&scrape_url);
        if !self.scrape_api_key.is_empty() {
            request = request.bearer_auth(&self.scrape_api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ThreatwireError::Feed(format!("failed to fetch page: {}", e)))?;

        if !response.status().is_success() {
            return Err(ThreatwireError::Feed(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| ThreatwireError::Feed(format!("failed to read response: {}", e)))?;

        if text.len() as u64 > MAX_FEED_SIZE {
            return Err(ThreatwireError::Feed(format!(
                "page too large: {} bytes (max {} bytes)",
                text.len(),
                MAX_FEED_SIZE
            )));
        }

        Ok(text)
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ThreatwireError::Feed(format!("failed to fetch feed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ThreatwireError::Feed(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        if let Some(content_length) = response.content_length() {
            if content_length > MAX_FEED_SIZE {
                return Err(ThreatwireError::Feed(format!(
                    "feed too large: {} bytes (max {} bytes)",
                    content_length, MAX_FEED_SIZE
                )));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ThreatwireError::Feed(format!("failed to read response: {}", e)))?;

        if bytes.len() as u64 > MAX_FEED_SIZE {
            return Err(ThreatwireError::Feed(format!(
                "feed too large: {} bytes (max {} bytes)",
                bytes.len(),
                MAX_FEED_SIZE
            )));
        }

        Ok(bytes.to_vec())
    }
}

/// Validate a URL for SSRF protection.
///
/// This function checks that:
/// - The URL uses http or https scheme
/// - The host is not a private/loopback address
/// - The host is not a reserved hostname
pub fn validate_url(url: &str) -> Result<()> {
    let parsed =
        url::Url::parse(url).map_err(|e| ThreatwireError::Feed(format!("invalid URL: {}", e)))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(ThreatwireError::Feed(format!(
                "unsupported URL scheme: {}",
                scheme
            )));
        }
    }

    let host = parsed
        .host()
        .ok_or_else(|| ThreatwireError::Feed("URL has no host".to_string()))?;

    match host {
        url::Host::Domain(domain) => {
            if is_forbidden_hostname(domain) {
                return Err(ThreatwireError::Feed(format!("forbidden host: {}", domain)));
            }
        }
        url::Host::Ipv4(ipv4) => {
            let ip = IpAddr::V4(ipv4);
            if is_private_ip(&ip) {
                return Err(ThreatwireError::Feed(format!(
                    "private IP address not allowed: {}",
                    ip
                )));
            }
        }
        url::Host::Ipv6(ipv6) => {
            let ip = IpAddr::V6(ipv6);
            if is_private_ip(&ip) {
                return Err(ThreatwireError::Feed(format!(
                    "private IP address not allowed: {}",
                    ip
                )));
            }
        }
    }

    Ok(())
}

/// Check if a hostname is forbidden.
fn is_forbidden_hostname(host: &str) -> bool {
    let host_lower = host.to_lowercase();

    if host_lower == "localhost" {
        return true;
    }

    let forbidden_suffixes = [
        ".local",
        ".localhost",
        ".internal",
        ".intranet",
        ".corp",
        ".home",
        ".lan",
    ];

    forbidden_suffixes
        .iter()
        .any(|suffix| host_lower.ends_with(suffix))
}

/// Check if an IP address is private/reserved.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            if ipv4.is_loopback() || ipv4.is_broadcast() || ipv4.is_unspecified() {
                return true;
            }

            let octets = ipv4.octets();

            // Private: 10.0.0.0/8
            if octets[0] == 10 {
                return true;
            }

            // Private: 172.16.0.0/12
            if octets[0] == 172 && (16..=31).contains(&octets[1]) {
                return true;
            }

            // Private: 192.168.0.0/16
            if octets[0] == 192 && octets[1] == 168 {
                return true;
            }

            // Link-local: 169.254.0.0/16
            if octets[0] == 169 && octets[1] == 254 {
                return true;
            }

            // Documentation ranges
            if (octets[0] == 192 && octets[1] == 0 && octets[2] == 2)
                || (octets[0] == 198 && octets[1] == 51 && octets[2] == 100)
                || (octets[0] == 203 && octets[1] == 0 && octets[2] == 113)
            {
                return true;
            }

            false
        }
        IpAddr::V6(ipv6) => {
            if ipv6.is_loopback() || ipv6.is_unspecified() {
                return true;
            }

            let segments = ipv6.segments();

            // Unique local: fc00::/7
            if (segments[0] & 0xfe00) == 0xfc00 {
                return true;
            }

            // Link-local: fe80::/10
            if (segments[0] & 0xffc0) == 0xfe80 {
                return true;
            }

            false
        }
    }
}

/// Parse feed bytes into candidate items.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<ParsedItem>> {
    let feed = parser::parse(bytes)
        .map_err(|e| ThreatwireError::Feed(format!("failed to parse feed: {}", e)))?;

    let items = feed
        .entries
        .into_iter()
        .map(|entry| {
            let title = entry
                .title
                .map(|t| strip_html(&t.content))
                .unwrap_or_else(|| "Untitled".to_string());
            let link = entry.links.first().map(|l| l.href.clone());
            let description = entry
                .summary
                .map(|t| t.content)
                .or(entry.content.and_then(|c| c.body))
                .map(|d| truncate_body(&strip_html(&d)));
            let published_at = entry.published.or(entry.updated);

            ParsedItem {
                title,
                link,
                description,
                published_at,
            }
        })
        .collect();

    Ok(items)
}

/// Strip HTML tags and CDATA wrappers from text, decoding common entities.
pub fn strip_html(html: &str) -> String {
    let html = html
        .replace("<![CDATA[", "")
        .replace("]]>", "");

    let mut result = String::with_capacity(html.len());
    let mut in_tag = false;
    let mut in_entity = false;
    let mut entity = String::new();

    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            '&' if !in_tag => {
                in_entity = true;
                entity.clear();
            }
            ';' if in_entity => {
                in_entity = false;
                match entity.as_str() {
                    "amp" => result.push('&'),
                    "lt" => result.push('<'),
                    "gt" => result.push('>'),
                    "quot" => result.push('"'),
                    "apos" => result.push('\''),
                    "nbsp" => result.push(' '),
                    _ if entity.starts_with('#') => {
                        if let Some(code) = parse_numeric_entity(&entity) {
                            if let Some(c) = char::from_u32(code) {
                                result.push(c);
                            }
                        }
                    }
                    _ => {
                        // Unknown entity, keep as-is
                        result.push('&');
                        result.push_str(&entity);
                        result.push(';');
                    }
                }
            }
            _ if in_entity => {
                entity.push(ch);
            }
            _ if !in_tag => {
                result.push(ch);
            }
            _ => {}
        }
    }

    let result: String = result.split_whitespace().collect::<Vec<&str>>().join(" ");

    result.trim().to_string()
}

/// Parse a numeric HTML entity (e.g., "#123" or "#x7B").
fn parse_numeric_entity(entity: &str) -> Option<u32> {
    if entity.starts_with("#x") || entity.starts_with("#X") {
        u32::from_str_radix(&entity[2..], 16).ok()
    } else if entity.starts_with('#') {
        entity[1..].parse().ok()
    } else {
        None
    }
}

/// Truncate body text to the maximum kept length.
fn truncate_body(text: &str) -> String {
    if text.len() <= MAX_BODY_LENGTH {
        text.to_string()
    } else {
        text.chars().take(MAX_BODY_LENGTH).collect()
    }
}

//! Email transport and message rendering for threatwire.
//!
//! The transport is a seam: the production implementation posts JSON to a
//! hosted email API; tests substitute an in-memory recorder.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use reqwest::Client;
use serde_json::json;

use crate::article::{Article, Severity};
use crate::config::EmailConfig;
use crate::error::{Result, ThreatwireError};
use crate::subscriber::Subscription;

/// Request timeout for the email API in seconds.
const SEND_TIMEOUT_SECS: u64 = 15;

/// An outbound message handed to the transport.
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// HTML body.
    pub html: String,
    /// Plain-text body.
    pub text: String,
    /// Custom headers (one-click unsubscribe for compliance).
    pub headers: Vec<(String, String)>,
}

/// Email delivery seam.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    /// Deliver one message; an error carries the transport's failure detail.
    async fn send(&self, message: &OutboundEmail) -> Result<()>;
}

/// Transport that posts JSON to a hosted email API.
pub struct HttpEmailTransport {
    client: Client,
    endpoint: String,
    api_key: String,
    from: String,
}

impl HttpEmailTransport {
    /// Create a transport from the email configuration.
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(SEND_TIMEOUT_SECS))
            .build()
            .map_err(|e| ThreatwireError::Email(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            from: format!("{} <{}>", config.from_name, config.from_address),
        })
    }
}

#[async_trait]
impl EmailTransport for HttpEmailTransport {
    async fn send(&self, message: &OutboundEmail) -> Result<()> {
        let headers: serde_json::Map<String, serde_json::Value> = message
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), json!(v)))
            .collect();

        let payload = json!({
            "from": self.from,
            "to": [message.to],
            "subject": message.subject,
            "html": message.html,
            "text": message.text,
            "headers": headers,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ThreatwireError::Email(format!("send request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(ThreatwireError::Email(format!(
                "provider returned {}: {}",
                status, detail
            )));
        }

        Ok(())
    }
}

/// In-memory transport for tests: records messages, optionally failing
/// for scripted recipients.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    sent: Mutex<Vec<OutboundEmail>>,
    fail_for: Mutex<HashSet<String>>,
}

impl MemoryTransport {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sends to this recipient fail.
    pub fn fail_for(&self, recipient: impl Into<String>) {
        self.fail_for.lock().unwrap().insert(recipient.into());
    }

    /// Clear all scripted failures.
    pub fn clear_failures(&self) {
        self.fail_for.lock().unwrap().clear();
    }

    /// Messages accepted so far.
    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().unwrap().clone()
    }

    /// Number of messages accepted so far.
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl EmailTransport for MemoryTransport {
    async fn send(&self, message: &OutboundEmail) -> Result<()> {
        if self.fail_for.lock().unwrap().contains(&message.to) {
            return Err(ThreatwireError::Email(format!(
                "scripted failure for {}",
                message.to
            )));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// Format a timestamp in the configured display timezone.
fn format_timestamp(dt: &DateTime<Utc>, timezone: &str) -> String {
    let format = "%Y-%m-%d %H:%M %Z";
    match timezone.parse::<Tz>() {
        Ok(tz) => dt.with_timezone(&tz).format(format).to_string(),
        Err(_) => dt.format(format).to_string(),
    }
}

fn manage_url(base_url: &str, email: &str) -> String {
    format!(
        "{}/manage?email={}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(email)
    )
}

/// Standard footer headers: one-click unsubscribe for compliance.
fn unsubscribe_headers(base_url: &str, email: &str) -> Vec<(String, String)> {
    vec![
        (
            "List-Unsubscribe".to_string(),
            format!("<{}>", manage_url(base_url, email)),
        ),
        (
            "List-Unsubscribe-Post".to_string(),
            "List-Unsubscribe=One-Click".to_string(),
        ),
    ]
}

/// Render all of one subscriber's due articles into a single digest.
///
/// Batching bounds email volume: one message per subscriber per window,
/// never one message per article. Articles are grouped by severity,
/// most severe first.
pub fn render_digest(
    subscription: &Subscription,
    articles: &[Article],
    base_url: &str,
    timezone: &str,
) -> OutboundEmail {
    let mut sorted: Vec<&Article> = articles.iter().collect();
    sorted.sort_by_key(|a| (a.severity.rank(), std::cmp::Reverse(a.published_at)));

    let has_critical = sorted
        .iter()
        .any(|a| a.severity == Severity::Critical);
    let subject = if has_critical {
        format!(
            "Critical security alert: {} new item(s)",
            sorted.len()
        )
    } else {
        format!("Security digest: {} new alert(s)", sorted.len())
    };

    let greeting = subscription
        .name
        .as_deref()
        .map(|n| format!("Hi {},", n))
        .unwrap_or_else(|| "Hi,".to_string());

    let mut html = format!(
        "<p>{}</p><p>Here are the security alerts matching your preferences:</p>",
        greeting
    );
    let mut text = format!(
        "{}\n\nHere are the security alerts matching your preferences:\n",
        greeting
    );

    let mut current_severity: Option<Severity> = None;
    for article in &sorted {
        if current_severity != Some(article.severity) {
            current_severity = Some(article.severity);
            let label = article.severity.as_str().to_uppercase();
            html.push_str(&format!("<h2>{}</h2>", label));
            text.push_str(&format!("\n== {} ==\n", label));
        }

        let when = format_timestamp(&article.published_at, timezone);
        html.push_str(&format!(
            "<h3><a href=\"{}\">{}</a></h3>",
            article.link, article.title
        ));
        html.push_str(&format!("<p><em>{} · {}</em></p>", when, article.category.label()));
        if let Some(cve) = &article.cve_id {
            html.push_str(&format!("<p><strong>{}</strong></p>", cve));
        }
        if let Some(summary) = &article.summary {
            html.push_str(&format!("<p>{}</p>", summary));
        }
        for source in &article.source_refs {
            html.push_str(&format!(
                "<p><a href=\"{}\">source</a></p>",
                source
            ));
        }

        text.push_str(&format!("\n* {} ({})\n  {}\n", article.title, when, article.link));
        if let Some(cve) = &article.cve_id {
            text.push_str(&format!("  {}\n", cve));
        }
        if let Some(summary) = &article.summary {
            text.push_str(&format!("  {}\n", summary));
        }
    }

    let manage = manage_url(base_url, &subscription.email);
    html.push_str(&format!(
        "<hr><p><a href=\"{}\">Manage your subscription or unsubscribe</a></p>",
        manage
    ));
    text.push_str(&format!("\n--\nManage your subscription: {}\n", manage));

    OutboundEmail {
        to: subscription.email.clone(),
        subject,
        html,
        text,
        headers: unsubscribe_headers(base_url, &subscription.email),
    }
}

/// Render the address-verification message for a new subscription.
pub fn render_verification(
    email: &str,
    name: Option<&str>,
    token: &str,
    base_url: &str,
) -> OutboundEmail {
    let link = format!(
        "{}/verify?token={}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(token)
    );
    let greeting = name.map(|n| format!("Hi {},", n)).unwrap_or_else(|| "Hi,".to_string());

    OutboundEmail {
        to: email.to_string(),
        subject: "Confirm your security alert subscription".to_string(),
        html: format!(
            "<p>{}</p><p>Confirm your subscription to start receiving alerts:</p>\
             <p><a href=\"{}\">Verify my address</a></p>\
             <p>If you did not request this, you can ignore this message.</p>",
            greeting, link
        ),
        text: format!(
            "{}\n\nConfirm your subscription to start receiving alerts:\n{}\n\n\
             If you did not request this, you can ignore this message.\n",
            greeting, link
        ),
        headers: unsubscribe_headers(base_url, email),
    }
}

/// Render the notice sent when an already-verified address resubmits.
pub fn render_already_subscribed(email: &str, base_url: &str) -> OutboundEmail {
    let manage = manage_url(base_url, email);
    OutboundEmail {
        to: email.to_string(),
        subject: "You are already subscribed".to_string(),
        html: format!(
            "<p>This address is already subscribed; your preferences have been updated.</p>\
             <p><a href=\"{}\">Manage your subscription</a></p>",
            manage
        ),
        text: format!(
            "This address is already subscribed; your preferences have been updated.\n\
             Manage your subscription: {}\n",
            manage
        ),
        headers: unsubscribe_headers(base_url, email),
    }
}

/// Render the single-use management link message.
pub fn render_management_link(email: &str, token: &str, base_url: &str) -> OutboundEmail {
    let link = format!(
        "{}/manage/confirm?token={}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(token)
    );
    OutboundEmail {
        to: email.to_string(),
        subject: "Your subscription management link".to_string(),
        html: format!(
            "<p>Use this single-use link to manage your subscription. It expires shortly:</p>\
             <p><a href=\"{}\">Manage subscription</a></p>",
            link
        ),
        text: format!(
            "Use this single-use link to manage your subscription. It expires shortly:\n{}\n",
            link
        ),
        headers: unsubscribe_headers(base_url, email),
    }
}

//! Subscription flows for threatwire.
//!
//! High-level operations over the subscription repository: subscribe
//! (upsert + verification or already-subscribed notice), management-link
//! issuance, verification, and unsubscribe. Outbound messages go through
//! the email transport seam; admin notifications are fire-and-forget.

use chrono::{Duration, Utc};
use tracing::warn;
use uuid::Uuid;

use super::repository::SubscriptionRepository;
use super::types::{
    Frequency, NewSubscription, Subscription, VerificationState, MANAGEMENT_TOKEN_TTL_HOURS,
    VERIFICATION_TOKEN_TTL_HOURS,
};
use crate::article::{Category, Severity};
use crate::config::{EmailConfig, ServerConfig};
use crate::db::Database;
use crate::notify::email::{
    render_already_subscribed, render_management_link, render_verification, EmailTransport,
};
use crate::{Result, ThreatwireError};

/// Maximum accepted contact address length.
const MAX_EMAIL_LENGTH: usize = 320;

/// Subscription request, validated at the web layer and re-checked here.
#[derive(Debug, Clone)]
pub struct SubscribeRequest {
    /// Contact address.
    pub email: String,
    /// Display name.
    pub name: Option<String>,
    /// Category filter; empty = all.
    pub categories: Vec<Category>,
    /// Technology filter; empty = no narrowing.
    pub technologies: Vec<String>,
    /// Delivery cadence.
    pub frequency: Frequency,
    /// Minimum severity threshold.
    pub min_severity: Severity,
    /// Preferred local hour (0-23).
    pub preferred_hour: u8,
    /// UTC offset in minutes.
    pub utc_offset_minutes: i32,
    /// Preferred local weekday (0-6, Sunday=0).
    pub preferred_weekday: u8,
}

/// Outcome of a subscribe call, selecting which notice was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// New or still-pending address: a verification link was sent.
    VerificationSent,
    /// Already-verified address: preferences updated, notice sent.
    AlreadySubscribed,
}

/// Service for subscription flows.
pub struct SubscriberService<'a> {
    db: &'a Database,
    transport: &'a dyn EmailTransport,
    base_url: String,
    admin_relay_url: String,
}

impl<'a> SubscriberService<'a> {
    /// Create a new service instance.
    pub fn new(
        db: &'a Database,
        transport: &'a dyn EmailTransport,
        server: &ServerConfig,
        email: &EmailConfig,
    ) -> Self {
        Self {
            db,
            transport,
            base_url: server.base_url.clone(),
            admin_relay_url: email.admin_relay_url.clone(),
        }
    }

    /// Subscribe or update an existing subscription.
    ///
    /// Upserts on the contact address, rotating in a fresh verification
    /// token for pending records, then sends either the verification link
    /// or an already-subscribed notice depending on prior verified state.
    pub async fn subscribe(&self, request: &SubscribeRequest) -> Result<SubscribeOutcome> {
        validate_email(&request.email)?;

        let repo = SubscriptionRepository::new(self.db.pool());
        let was_verified = repo
            .get_by_email(&request.email)
            .await?
            .map(|s| s.verification == VerificationState::Verified)
            .unwrap_or(false);

        let token = Uuid::new_v4().to_string();
        let new_sub = NewSubscription::new(
            &request.email,
            request.frequency,
            request.min_severity,
            &token,
            Utc::now() + Duration::hours(VERIFICATION_TOKEN_TTL_HOURS),
        )
        .with_categories(request.categories.clone())
        .with_technologies(request.technologies.clone())
        .with_schedule(
            request.preferred_hour,
            request.utc_offset_minutes,
            request.preferred_weekday,
        );
        let new_sub = match &request.name {
            Some(name) => new_sub.with_name(name),
            None => new_sub,
        };

        let stored = repo.upsert(&new_sub).await?;

        let outcome = if was_verified {
            let message = render_already_subscribed(&stored.email, &self.base_url);
            self.transport.send(&message).await?;
            SubscribeOutcome::AlreadySubscribed
        } else {
            let message = render_verification(
                &stored.email,
                stored.name.as_deref(),
                &token,
                &self.base_url,
            );
            self.transport.send(&message).await?;
            SubscribeOutcome::VerificationSent
        };

        self.notify_admin(serde_json::json!({
            "kind": "subscription",
            "email": stored.email,
            "frequency": stored.frequency.as_str(),
        }));

        Ok(outcome)
    }

    /// Issue a fresh single-use management link.
    ///
    /// The token is rotated on every request. The outcome is identical
    /// whether or not the address exists; delivery failures are logged
    /// only, so nothing about this call reveals a match.
    pub async fn request_management_link(&self, email: &str) -> Result<()> {
        validate_email(email)?;

        let repo = SubscriptionRepository::new(self.db.pool());
        let token = Uuid::new_v4().to_string();
        let rotated = repo
            .rotate_token(
                email,
                &token,
                Utc::now() + Duration::hours(MANAGEMENT_TOKEN_TTL_HOURS),
            )
            .await?;

        if rotated {
            let message = render_management_link(
                &email.trim().to_lowercase(),
                &token,
                &self.base_url,
            );
            if let Err(e) = self.transport.send(&message).await {
                warn!("Failed to deliver management link: {}", e);
            }
        }

        Ok(())
    }

    /// Verify an address through its single-use token.
    pub async fn verify(&self, token: &str) -> Result<Option<Subscription>> {
        SubscriptionRepository::new(self.db.pool())
            .verify_by_token(token)
            .await
    }

    /// Unsubscribe through a single-use token.
    pub async fn unsubscribe(&self, token: &str) -> Result<Option<Subscription>> {
        SubscriptionRepository::new(self.db.pool())
            .deactivate_by_token(token)
            .await
    }

    /// Forward a contact-form submission to the admin relay.
    pub fn relay_contact(&self, name: &str, email: &str, message: &str) {
        self.notify_admin(serde_json::json!({
            "kind": "contact",
            "name": name,
            "email": email,
            "message": message,
        }));
    }

    /// Fire-and-forget admin notification; failures are logged only.
    fn notify_admin(&self, payload: serde_json::Value) {
        if self.admin_relay_url.is_empty() {
            return;
        }
        let url = self.admin_relay_url.clone();
        tokio::spawn(async move {
            let client = reqwest::Client::new();
            match client.post(&url).json(&payload).send().await {
                Ok(response) if !response.status().is_success() => {
                    warn!("Admin relay returned {}", response.status());
                }
                Err(e) => warn!("Admin relay failed: {}", e),
                _ => {}
            }
        });
    }
}

/// Validate a contact address: bounded length, one '@' with a dotted
/// domain, no whitespace. Rejections are specific, never coerced.
pub fn validate_email(email: &str) -> Result<()> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ThreatwireError::Validation(
            "contact address is required".into(),
        ));
    }
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(ThreatwireError::Validation(
            "contact address too long".into(),
        ));
    }
    if email.chars().any(|c| c.is_whitespace()) {
        return Err(ThreatwireError::Validation(
            "contact address must not contain whitespace".into(),
        ));
    }
    let Some((local, domain)) = email.split_once('@') else {
        return Err(ThreatwireError::Validation(
            "invalid contact address format".into(),
        ));
    };
    if local.is_empty() || domain.is_empty() || !domain.contains('.') || domain.contains('@') {
        return Err(ThreatwireError::Validation(
            "invalid contact address format".into(),
        ));
    }
    Ok(())
}

//! Request/response DTOs and validation for the threatwire web surface.

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::article::{Article, Category, Severity};
use crate::subscriber::{Frequency, SubscribeRequest};
use crate::web::error::ApiError;

/// A JSON extractor that validates the request body.
///
/// Deserializes the body and runs `validator` checks; failures come back
/// as a field-level 422 rather than being silently coerced.
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid JSON: {}", e)))?;

        value.validate().map_err(ApiError::from_validation_errors)?;

        Ok(ValidatedJson(value))
    }
}

/// Standard success envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    /// Response payload.
    pub data: T,
}

impl<T> ApiResponse<T> {
    /// Wrap a payload.
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Public submission payload: either a contact message or a subscription.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SubmissionRequest {
    /// Contact-form message, relayed to the admin channel.
    Contact(ContactPayload),
    /// Subscription creation or preference update.
    Subscription(SubscriptionPayload),
}

impl Validate for SubmissionRequest {
    fn validate(&self) -> Result<(), validator::ValidationErrors> {
        match self {
            SubmissionRequest::Contact(payload) => payload.validate(),
            SubmissionRequest::Subscription(payload) => payload.validate(),
        }
    }
}

impl SubmissionRequest {
    /// Contact address of either payload kind, for rate-limit keying.
    pub fn email(&self) -> &str {
        match self {
            SubmissionRequest::Contact(payload) => &payload.email,
            SubmissionRequest::Subscription(payload) => &payload.email,
        }
    }
}

/// Contact-form payload.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ContactPayload {
    /// Sender name.
    #[validate(length(min = 1, max = 100, message = "name must be 1-100 characters"))]
    pub name: String,
    /// Sender address.
    #[validate(
        email(message = "invalid contact address format"),
        length(max = 320, message = "contact address too long")
    )]
    pub email: String,
    /// Message body.
    #[validate(length(min = 1, max = 5000, message = "message must be 1-5000 characters"))]
    pub message: String,
}

/// Subscription payload.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubscriptionPayload {
    /// Contact address.
    #[validate(
        email(message = "invalid contact address format"),
        length(max = 320, message = "contact address too long")
    )]
    pub email: String,
    /// Display name.
    #[validate(length(max = 100, message = "name too long"))]
    pub name: Option<String>,
    /// Category filter names; empty = all.
    #[serde(default)]
    #[validate(
        length(max = 9, message = "too many categories"),
        custom(function = validate_category_names)
    )]
    pub categories: Vec<String>,
    /// Technology filter; empty = no narrowing.
    #[serde(default)]
    #[validate(
        length(max = 20, message = "too many technologies"),
        custom(function = validate_technology_names)
    )]
    pub technologies: Vec<String>,
    /// Delivery cadence: immediate, daily, or weekly.
    #[validate(custom(function = validate_frequency_name))]
    pub frequency: String,
    /// Minimum severity threshold.
    #[validate(custom(function = validate_severity_name))]
    pub min_severity: String,
    /// Preferred local delivery hour.
    #[validate(range(min = 0, max = 23, message = "hour must be 0-23"))]
    #[serde(default = "default_preferred_hour")]
    pub preferred_hour: u8,
    /// UTC offset in minutes (half-hour zones supported).
    #[validate(range(min = -720, max = 840, message = "offset must be -720..=840 minutes"))]
    #[serde(default)]
    pub utc_offset_minutes: i32,
    /// Preferred local weekday (0-6, Sunday=0), used for weekly cadence.
    #[validate(range(min = 0, max = 6, message = "weekday must be 0-6"))]
    #[serde(default = "default_preferred_weekday")]
    pub preferred_weekday: u8,
}

fn default_preferred_hour() -> u8 {
    9
}

fn default_preferred_weekday() -> u8 {
    1
}

fn validate_category_names(categories: &Vec<String>) -> Result<(), ValidationError> {
    for name in categories {
        if Category::parse(name).is_none() {
            return Err(ValidationError::new("unknown_category")
                .with_message(format!("unknown category: {}", name).into()));
        }
    }
    Ok(())
}

fn validate_technology_names(technologies: &Vec<String>) -> Result<(), ValidationError> {
    for name in technologies {
        if name.is_empty() || name.len() > 50 {
            return Err(ValidationError::new("technology_length")
                .with_message("technology names must be 1-50 characters".into()));
        }
    }
    Ok(())
}

fn validate_frequency_name(frequency: &str) -> Result<(), ValidationError> {
    if Frequency::parse(frequency).is_none() {
        return Err(ValidationError::new("unknown_frequency")
            .with_message("frequency must be immediate, daily, or weekly".into()));
    }
    Ok(())
}

fn validate_severity_name(severity: &str) -> Result<(), ValidationError> {
    if Severity::parse(severity).is_none() {
        return Err(ValidationError::new("unknown_severity")
            .with_message("severity must be critical, high, medium, low, or info".into()));
    }
    Ok(())
}

impl SubscriptionPayload {
    /// Convert a validated payload into the service request.
    pub fn into_request(self) -> SubscribeRequest {
        SubscribeRequest {
            email: self.email,
            name: self.name,
            categories: self
                .categories
                .iter()
                .filter_map(|c| Category::parse(c))
                .collect(),
            technologies: self.technologies,
            frequency: Frequency::parse(&self.frequency).unwrap_or(Frequency::Daily),
            min_severity: Severity::parse(&self.min_severity).unwrap_or(Severity::High),
            preferred_hour: self.preferred_hour,
            utc_offset_minutes: self.utc_offset_minutes,
            preferred_weekday: self.preferred_weekday,
        }
    }
}

/// Management-link request.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ManageLinkRequest {
    /// Contact address to send the link to.
    #[validate(
        email(message = "invalid contact address format"),
        length(max = 320, message = "contact address too long")
    )]
    pub email: String,
}

/// Token-bearing request for verify/unsubscribe.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TokenRequest {
    /// Single-use token from the emailed link.
    #[validate(length(min = 1, max = 64, message = "token must be 1-64 characters"))]
    pub token: String,
}

// ============================================================================
// Responses
// ============================================================================

/// Submission outcome.
#[derive(Debug, Serialize)]
pub struct SubmissionResponse {
    /// What happened: verification_sent, already_subscribed, or received.
    pub status: &'static str,
}

/// Simple message response.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    /// Human-readable message.
    pub message: String,
}

/// Article as rendered for the public feed.
#[derive(Debug, Serialize)]
pub struct ArticleView {
    /// Article ID.
    pub id: i64,
    /// Title.
    pub title: String,
    /// Summary.
    pub summary: Option<String>,
    /// Canonical link.
    pub link: String,
    /// Primary category.
    pub category: &'static str,
    /// Severity tier.
    pub severity: &'static str,
    /// CVE identifier, when found.
    pub cve_id: Option<String>,
    /// Tags.
    pub tags: Vec<String>,
    /// Affected technologies.
    pub technologies: Vec<String>,
    /// Publication timestamp.
    pub published_at: DateTime<Utc>,
}

impl From<Article> for ArticleView {
    fn from(article: Article) -> Self {
        ArticleView {
            id: article.id,
            title: article.title,
            summary: article.summary,
            link: article.link,
            category: article.category.as_str(),
            severity: article.severity.as_str(),
            cve_id: article.cve_id,
            tags: article.tags,
            technologies: article.technologies,
            published_at: article.published_at,
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: &'static str,
    /// Number of stored articles (doubles as a DB liveness probe).
    pub articles: i64,
}

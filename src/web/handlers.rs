//! Request handlers for the threatwire web surface.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use crate::article::ArticleRepository;
use crate::config::Config;
use crate::db::Database;
use crate::notify::email::EmailTransport;
use crate::rate_limit::{RateLimitResult, SubmissionGuard};
use crate::subscriber::SubscriberService;
use crate::web::dto::{
    ApiResponse, ArticleView, HealthResponse, ManageLinkRequest, MessageResponse,
    SubmissionRequest, SubmissionResponse, TokenRequest, ValidatedJson,
};
use crate::web::error::ApiError;

/// Default page size for the public article feed.
const DEFAULT_ARTICLE_LIMIT: usize = 20;

/// Maximum page size for the public article feed.
const MAX_ARTICLE_LIMIT: usize = 100;

/// Application state shared across handlers.
pub struct AppState {
    /// Database handle.
    pub db: Database,
    /// Email transport seam.
    pub transport: Arc<dyn EmailTransport>,
    /// Dual-key rate limiter for the public endpoints.
    pub guard: SubmissionGuard,
    /// Service configuration.
    pub config: Config,
}

impl AppState {
    fn service(&self) -> SubscriberService<'_> {
        SubscriberService::new(
            &self.db,
            self.transport.as_ref(),
            &self.config.server,
            &self.config.email,
        )
    }
}

/// The request origin used as the second rate-limit key.
///
/// The service runs behind a proxy, so the client network identifier is
/// the first hop in X-Forwarded-For; "unknown" groups direct requests.
fn request_origin(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn enforce_rate_limit(
    guard: &SubmissionGuard,
    address: &str,
    origin: &str,
) -> Result<(), ApiError> {
    match guard.check_and_record(address, origin) {
        RateLimitResult::Allowed => Ok(()),
        RateLimitResult::Denied { retry_after } => {
            Err(ApiError::too_many_requests(retry_after.as_secs()))
        }
    }
}

/// POST /api/submissions - contact message or subscription upsert.
pub async fn submit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ValidatedJson(request): ValidatedJson<SubmissionRequest>,
) -> Result<Json<ApiResponse<SubmissionResponse>>, ApiError> {
    let origin = request_origin(&headers);
    enforce_rate_limit(&state.guard, request.email(), &origin)?;

    let service = state.service();
    let status = match request {
        SubmissionRequest::Contact(payload) => {
            service.relay_contact(&payload.name, &payload.email, &payload.message);
            "received"
        }
        SubmissionRequest::Subscription(payload) => {
            let outcome = service.subscribe(&payload.into_request()).await?;
            match outcome {
                crate::subscriber::SubscribeOutcome::VerificationSent => "verification_sent",
                crate::subscriber::SubscribeOutcome::AlreadySubscribed => "already_subscribed",
            }
        }
    };

    Ok(Json(ApiResponse::new(SubmissionResponse { status })))
}

/// POST /api/manage/link - request a fresh single-use management link.
///
/// The response is identical whether or not the address is subscribed.
pub async fn manage_link(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ValidatedJson(request): ValidatedJson<ManageLinkRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let origin = request_origin(&headers);
    enforce_rate_limit(&state.guard, &request.email, &origin)?;

    state.service().request_management_link(&request.email).await?;

    Ok(Json(ApiResponse::new(MessageResponse {
        message: "If that address is subscribed, a management link is on its way.".to_string(),
    })))
}

/// POST /api/manage/verify - confirm an address via its token.
pub async fn verify(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<TokenRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    match state.service().verify(&request.token).await? {
        Some(_) => Ok(Json(ApiResponse::new(MessageResponse {
            message: "Subscription verified. Alerts are on the way.".to_string(),
        }))),
        None => Err(ApiError::not_found("verification link invalid or expired")),
    }
}

/// POST /api/manage/unsubscribe - deactivate via a management token.
pub async fn unsubscribe(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<TokenRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    match state.service().unsubscribe(&request.token).await? {
        Some(_) => Ok(Json(ApiResponse::new(MessageResponse {
            message: "You have been unsubscribed.".to_string(),
        }))),
        None => Err(ApiError::not_found("management link invalid or expired")),
    }
}

/// Query parameters for the article feed.
#[derive(Debug, Deserialize)]
pub struct ArticleQuery {
    /// Page size, capped.
    pub limit: Option<usize>,
    /// Page offset.
    pub offset: Option<usize>,
}

/// GET /api/articles - recent stored articles for the public feed.
pub async fn list_articles(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ArticleQuery>,
) -> Result<Json<ApiResponse<Vec<ArticleView>>>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_ARTICLE_LIMIT)
        .min(MAX_ARTICLE_LIMIT);
    let offset = query.offset.unwrap_or(0);

    let articles = ArticleRepository::new(state.db.pool())
        .list_recent(limit, offset)
        .await?;

    Ok(Json(ApiResponse::new(
        articles.into_iter().map(ArticleView::from).collect(),
    )))
}

/// GET /api/health - liveness plus a DB probe.
pub async fn health(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthResponse>, ApiError> {
    let articles = ArticleRepository::new(state.db.pool()).count().await?;
    Ok(Json(HealthResponse {
        status: "ok",
        articles,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_request_origin_from_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(request_origin(&headers), "203.0.113.7");
    }

    #[test]
    fn test_request_origin_fallback() {
        assert_eq!(request_origin(&HeaderMap::new()), "unknown");

        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(""));
        assert_eq!(request_origin(&headers), "unknown");
    }
}

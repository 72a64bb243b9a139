//! Router assembly for the threatwire web surface.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::web::handlers::{
    health, list_articles, manage_link, submit, unsubscribe, verify, AppState,
};

/// Build the application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/submissions", post(submit))
        .route("/api/manage/link", post(manage_link))
        .route("/api/manage/verify", post(verify))
        .route("/api/manage/unsubscribe", post(unsubscribe))
        .route("/api/articles", get(list_articles))
        .route("/api/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

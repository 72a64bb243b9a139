//! Web surface for threatwire.
//!
//! Public submission and management endpoints plus the article feed API.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod router;

pub use handlers::AppState;
pub use router::build_router;

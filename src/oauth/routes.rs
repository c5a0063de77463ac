//! OAuth routes

use axum::{routing::post, Router};

use super::handlers;

/// Creates and returns the OAuth router
///
/// # Routes
/// - `POST /api/auth/oauth/:provider` - Authorization-code callback
/// - `POST /api/auth/oauth/:provider/refresh` - Lazy provider-token refresh
pub fn oauth_routes() -> Router {
    Router::new()
        .route(
            "/api/auth/oauth/:provider",
            post(handlers::oauth_callback_handler),
        )
        .route(
            "/api/auth/oauth/:provider/refresh",
            post(handlers::oauth_refresh_handler),
        )
}

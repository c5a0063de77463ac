//! Authentication routes

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers;

/// Creates and returns the authentication router
///
/// # Routes
/// - `POST /api/auth/login` - Email/password authentication
/// - `POST /api/auth/refresh` - Refresh token rotation
/// - `POST /api/auth/logout` - Token revocation
/// - `POST /api/auth/forgot-password` - Start password reset
/// - `POST /api/auth/reset-password` - Consume reset token
/// - `GET /api/me` - Current account information
pub fn auth_routes() -> Router {
    Router::new()
        .route("/api/auth/login", post(handlers::login_handler))
        .route("/api/auth/refresh", post(handlers::refresh_handler))
        .route("/api/auth/logout", post(handlers::logout_handler))
        .route(
            "/api/auth/forgot-password",
            post(handlers::forgot_password_handler),
        )
        .route(
            "/api/auth/reset-password",
            post(handlers::reset_password_handler),
        )
        .route("/api/me", get(handlers::me_handler))
}

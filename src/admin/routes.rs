//! Admin routes (admin role required, enforced by the AdminUser extractor)

use axum::{
    routing::{delete, get, post},
    Router,
};

use super::handlers;

/// Creates and returns the admin router
///
/// # Routes
/// - `POST /api/admin/abuse/allowlist` - Allow-list an IP
/// - `POST /api/admin/abuse/blocklist` - Block-list an IP
/// - `DELETE /api/admin/abuse/:ip/history` - Clear an IP's behavior record
/// - `GET /api/admin/abuse/:ip/reputation` - Reputation snapshot
/// - `GET /api/admin/abuse/:ip/audit` - Operator audit trail for an IP
pub fn admin_routes() -> Router {
    Router::new()
        .route(
            "/api/admin/abuse/allowlist",
            post(handlers::allowlist_handler),
        )
        .route(
            "/api/admin/abuse/blocklist",
            post(handlers::blocklist_handler),
        )
        .route(
            "/api/admin/abuse/:ip/history",
            delete(handlers::clear_history_handler),
        )
        .route(
            "/api/admin/abuse/:ip/reputation",
            get(handlers::reputation_handler),
        )
        .route("/api/admin/abuse/:ip/audit", get(handlers::audit_handler))
}

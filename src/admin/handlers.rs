//! Admin handlers for abuse-mitigation list management
//!
//! Every mutation here is an idempotent upsert/delete against the list
//! tables and lands on the durable audit trail with the acting operator's
//! identity.

use axum::extract::{Extension, Json, Path};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use super::models::{AllowListPayload, AuditEntry, BlockListPayload};
use crate::auth::extractors::AdminUser;
use crate::common::{ApiError, ApiResponse, AppState};

fn validate_ip(ip: &str) -> Result<(), ApiError> {
    ip.parse::<std::net::IpAddr>()
        .map(|_| ())
        .map_err(|_| ApiError::ValidationError(format!("invalid ip address: {}", ip)))
}

/// POST /api/admin/abuse/allowlist
/// Allow-listed IPs bypass throttling and pattern blocking unconditionally.
pub async fn allowlist_handler(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    admin: AdminUser,
    Json(payload): Json<AllowListPayload>,
) -> Result<Json<ApiResponse>, ApiError> {
    validate_ip(&payload.ip)?;
    let state = state_lock.read().await.clone();

    state
        .abuse_engine
        .whitelist(&payload.ip, &admin.0.email)
        .await?;

    info!(actor = %admin.0.email, ip = %payload.ip, "IP allow-listed");
    Ok(ApiResponse::success(
        "ip allow-listed",
        serde_json::json!({ "ip": payload.ip }),
    ))
}

/// POST /api/admin/abuse/blocklist
/// Block-listed IPs are denied unconditionally until the entry's TTL lapses
/// or history is cleared.
pub async fn blocklist_handler(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    admin: AdminUser,
    Json(payload): Json<BlockListPayload>,
) -> Result<Json<ApiResponse>, ApiError> {
    validate_ip(&payload.ip)?;
    if payload.reason.trim().is_empty() {
        return Err(ApiError::ValidationError("reason is required".to_string()));
    }
    let state = state_lock.read().await.clone();

    state
        .abuse_engine
        .blacklist(&payload.ip, payload.reason.trim(), &admin.0.email)
        .await?;

    info!(actor = %admin.0.email, ip = %payload.ip, "IP block-listed");
    Ok(ApiResponse::success(
        "ip block-listed",
        serde_json::json!({ "ip": payload.ip }),
    ))
}

/// DELETE /api/admin/abuse/:ip/history
/// Wipes counters, reputation, and list entries for an IP.
pub async fn clear_history_handler(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    admin: AdminUser,
    Path(ip): Path<String>,
) -> Result<Json<ApiResponse>, ApiError> {
    validate_ip(&ip)?;
    let state = state_lock.read().await.clone();

    state.abuse_engine.clear_history(&ip, &admin.0.email).await?;

    info!(actor = %admin.0.email, ip = %ip, "IP history cleared");
    Ok(ApiResponse::success(
        "ip history cleared",
        serde_json::json!({ "ip": ip }),
    ))
}

/// GET /api/admin/abuse/:ip/audit
/// Recent operator actions recorded against an IP, newest first.
pub async fn audit_handler(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    _admin: AdminUser,
    Path(ip): Path<String>,
) -> Result<Json<ApiResponse>, ApiError> {
    validate_ip(&ip)?;
    let state = state_lock.read().await.clone();

    let entries = sqlx::query_as::<_, AuditEntry>(
        "SELECT * FROM audit_log WHERE ip = ? ORDER BY created_at DESC LIMIT 50",
    )
    .bind(&ip)
    .fetch_all(&state.db)
    .await?;

    Ok(ApiResponse::success(
        "ok",
        serde_json::json!({ "ip": ip, "entries": entries }),
    ))
}

/// GET /api/admin/abuse/:ip/reputation
pub async fn reputation_handler(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    _admin: AdminUser,
    Path(ip): Path<String>,
) -> Result<Json<ApiResponse>, ApiError> {
    validate_ip(&ip)?;
    let state = state_lock.read().await.clone();

    let reputation = state.abuse_engine.check_ip_reputation(&ip).await?;

    Ok(ApiResponse::success(
        "ok",
        serde_json::to_value(reputation)
            .map_err(|e| ApiError::InternalServer(e.to_string()))?,
    ))
}

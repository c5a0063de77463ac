//! Authentication handlers

use axum::extract::{Extension, Json};
use axum::http::HeaderMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::extractors::AuthedUser;
use super::models::{
    AccountStatus, ForgotPasswordPayload, LoginPayload, LogoutPayload, RefreshPayload,
    ResetPasswordPayload,
};
use crate::common::validation::validate_email;
use crate::common::{safe_email_log, ApiError, ApiResponse, AppState};

/// POST /api/auth/login
/// Authenticates an email/password pair and issues a token pair
///
/// # Request Body
/// ```json
/// {
///   "email": "user@example.com",
///   "password": "..."
/// }
/// ```
///
/// # Response
/// ```json
/// {
///   "status": "success",
///   "message": "authenticated",
///   "data": { "access_token": "...", "refresh_token": "...", "account": { ... } }
/// }
/// ```
pub async fn login_handler(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Json(payload): Json<LoginPayload>,
) -> Result<Json<ApiResponse>, ApiError> {
    let state = state_lock.read().await.clone();

    let account = state
        .credentials
        .verify_password(&payload.email, &payload.password)
        .await?
        .ok_or_else(|| {
            warn!(
                email = %safe_email_log(&payload.email),
                "Login failed: unknown email or wrong password"
            );
            ApiError::AuthenticationFailed
        })?;

    if account.status != AccountStatus::Active {
        return Err(ApiError::AccountInactive);
    }

    state.credentials.update_last_login(&account.id).await?;
    let pair = state.tokens.issue_pair(&account)?;

    info!(
        account_id = %account.id,
        email = %safe_email_log(&account.email),
        "Login successful"
    );

    Ok(ApiResponse::success(
        "authenticated",
        serde_json::json!({
            "access_token": pair.access_token,
            "refresh_token": pair.refresh_token,
            "account": account,
        }),
    ))
}

/// POST /api/auth/refresh
/// Exchanges a refresh token for a fresh pair. The consumed refresh token is
/// revoked so it cannot be replayed.
pub async fn refresh_handler(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Json(payload): Json<RefreshPayload>,
) -> Result<Json<ApiResponse>, ApiError> {
    let state = state_lock.read().await.clone();

    let claims = state.tokens.verify_refresh(&payload.refresh_token).await?;

    let account = state
        .credentials
        .find_by_id(&claims.sub)
        .await?
        .ok_or(ApiError::AuthenticationFailed)?;

    if account.status != AccountStatus::Active {
        return Err(ApiError::AccountInactive);
    }

    let pair = state.tokens.rotate(&claims, &account).await?;

    info!(account_id = %account.id, "Token pair rotated");

    Ok(ApiResponse::success(
        "token refreshed",
        serde_json::json!({
            "access_token": pair.access_token,
            "refresh_token": pair.refresh_token,
        }),
    ))
}

/// POST /api/auth/logout
/// Revokes the presented access token (and refresh token, when supplied).
/// Revoked jtis stay on the denylist until the tokens would have expired
/// naturally.
pub async fn logout_handler(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    headers: HeaderMap,
    payload: Option<Json<LogoutPayload>>,
) -> Result<Json<ApiResponse>, ApiError> {
    let state = state_lock.read().await.clone();

    if let Some(token) = bearer_from_headers(&headers) {
        if let Err(e) = state.tokens.revoke(&token).await {
            // A bad token on logout is not worth failing the request over
            warn!(error = %e, "Access token revocation on logout failed");
        }
    }

    if let Some(Json(body)) = payload {
        if let Some(refresh_token) = body.refresh_token {
            if let Err(e) = state.tokens.revoke(&refresh_token).await {
                warn!(error = %e, "Refresh token revocation on logout failed");
            }
        }
    }

    info!("Logout successful");
    Ok(ApiResponse::message_only("logout successful"))
}

/// GET /api/me
/// Returns the current authenticated account's information
pub async fn me_handler(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
) -> Result<Json<ApiResponse>, ApiError> {
    let state = state_lock.read().await.clone();

    let account = state
        .credentials
        .find_by_id(&authed.id)
        .await?
        .ok_or(ApiError::AuthenticationFailed)?;

    Ok(ApiResponse::success(
        "ok",
        serde_json::json!({
            "account": account,
            "is_admin": authed.is_admin,
        }),
    ))
}

/// POST /api/auth/forgot-password
/// Starts the reset flow. The response is identical whether or not the email
/// maps to an account, so this endpoint cannot confirm account existence.
pub async fn forgot_password_handler(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Json(payload): Json<ForgotPasswordPayload>,
) -> Result<Json<ApiResponse>, ApiError> {
    // Structural check only; the response below never depends on whether the
    // address maps to an account
    if !validate_email(&payload.email).is_valid {
        return Err(ApiError::ValidationError("invalid email address".to_string()));
    }

    let state = state_lock.read().await.clone();

    state.reset_service.request_reset(&payload.email).await?;

    Ok(ApiResponse::message_only(
        "If the account exists, a reset link has been sent",
    ))
}

/// POST /api/auth/reset-password
/// Consumes a single-use reset token and sets the new password.
pub async fn reset_password_handler(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Json(payload): Json<ResetPasswordPayload>,
) -> Result<Json<ApiResponse>, ApiError> {
    let state = state_lock.read().await.clone();

    state
        .reset_service
        .consume_reset(&payload.token, &payload.new_password)
        .await?;

    Ok(ApiResponse::message_only("password updated"))
}

fn bearer_from_headers(headers: &HeaderMap) -> Option<String> {
    let raw = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())?;
    Some(match raw.strip_prefix("Bearer ") {
        Some(rest) => rest.to_string(),
        None => raw.to_string(),
    })
}

//! OAuth callback handlers

use axum::extract::{Extension, Json, Path};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::models::OAuthCallbackPayload;
use crate::auth::extractors::AuthedUser;
use crate::auth::models::AccountStatus;
use crate::common::{safe_email_log, ApiError, ApiResponse, AppState};
use crate::services::identity::RefreshOutcome;
use crate::services::provider::Provider;

/// POST /api/auth/oauth/:provider
/// Exchanges an authorization code, links (or updates) the external
/// identity, and issues a local token pair.
///
/// Two concurrent callbacks for the same external identity converge on one
/// stored identity; the storage layer's unique constraint guarantees it.
pub async fn oauth_callback_handler(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Path(provider): Path<String>,
    Json(payload): Json<OAuthCallbackPayload>,
) -> Result<Json<ApiResponse>, ApiError> {
    let state = state_lock.read().await.clone();

    let provider = Provider::from_str(&provider)
        .map_err(|_| ApiError::BadRequest(format!("unsupported provider: {}", provider)))?;

    let redirect_uri = payload.redirect_uri.unwrap_or_else(|| {
        std::env::var("OAUTH_REDIRECT_URI")
            .unwrap_or_else(|_| "http://localhost:8080/auth/callback".to_string())
    });

    let grant = state
        .identity_service
        .exchange_code(provider, &payload.code, &redirect_uri)
        .await?;

    let account = state
        .identity_service
        .resolve_account(state.credentials.as_ref(), provider, &grant)
        .await?;

    if account.status != AccountStatus::Active {
        return Err(ApiError::AccountInactive);
    }

    let identity = state
        .identity_service
        .link_or_update(provider, &grant.provider_uid, &grant, &account.id)
        .await?;

    state.credentials.update_last_login(&account.id).await?;
    let pair = state.tokens.issue_pair(&account)?;

    info!(
        account_id = %account.id,
        email = %safe_email_log(&account.email),
        provider = provider.as_str(),
        "Account authenticated via OAuth callback"
    );

    Ok(ApiResponse::success(
        "authenticated",
        serde_json::json!({
            "access_token": pair.access_token,
            "refresh_token": pair.refresh_token,
            "account": account,
            "identity": identity,
        }),
    ))
}

/// POST /api/auth/oauth/:provider/refresh
/// Lazily refreshes the caller's stored provider tokens. Provider problems
/// degrade to a `reauth_required` signal; they never fail the request.
pub async fn oauth_refresh_handler(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Path(provider): Path<String>,
    authed: AuthedUser,
) -> Result<Json<ApiResponse>, ApiError> {
    let state = state_lock.read().await.clone();

    let provider = Provider::from_str(&provider)
        .map_err(|_| ApiError::BadRequest(format!("unsupported provider: {}", provider)))?;

    let identity = state
        .identity_service
        .find_by_account(&authed.id, provider)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!("no {} identity linked", provider.as_str()))
        })?;

    let outcome = state.identity_service.refresh_if_needed(identity).await?;

    let (status, reauth_required) = match &outcome {
        RefreshOutcome::Fresh(_) => ("fresh", false),
        RefreshOutcome::Refreshed(_) => ("refreshed", false),
        RefreshOutcome::ReauthRequired => {
            warn!(
                account_id = %authed.id,
                provider = provider.as_str(),
                "Provider tokens stale, re-authentication required"
            );
            ("stale", true)
        }
    };

    Ok(ApiResponse::success(
        "ok",
        serde_json::json!({
            "provider": provider.as_str(),
            "status": status,
            "reauth_required": reauth_required,
        }),
    ))
}

//! Authentication extractors for Axum

use async_trait::async_trait;
use axum::{
    extract::{Extension, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::models::{AccountStatus, Role, TokenKind};
use crate::common::{safe_email_log, ApiError, AppState};

/// Authenticated account extractor
///
/// Validates the bearer access token (signature, expiry, revocation) and
/// loads the account behind it. Only active accounts pass.
#[derive(Debug)]
pub struct AuthedUser {
    pub id: String,
    pub email: String,
    pub is_admin: bool,
}

/// Pull the bearer token out of the Authorization header. Accepts both
/// "Bearer <token>" and a raw token.
pub fn bearer_token(parts: &Parts) -> Option<String> {
    let raw = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())?;

    Some(match raw.strip_prefix("Bearer ") {
        Some(rest) => rest.to_string(),
        None => raw.to_string(),
    })
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Extension(state_lock): Extension<Arc<RwLock<AppState>>> =
            Extension::from_request_parts(parts, state)
                .await
                .map_err(|_| ApiError::InternalServer("missing app state".to_string()))?;

        let app_state = state_lock.read().await.clone();

        let token = match bearer_token(parts) {
            Some(t) => t,
            None => {
                warn!("Authentication failed: missing Authorization header");
                return Err(ApiError::AuthenticationFailed);
            }
        };

        let claims = app_state
            .tokens
            .verify_kind(&token, TokenKind::Access)
            .await?;

        let account = app_state
            .credentials
            .find_by_id(&claims.sub)
            .await?
            .ok_or_else(|| {
                warn!(account_id = %claims.sub, "Authentication failed: account not found");
                ApiError::AuthenticationFailed
            })?;

        if account.status != AccountStatus::Active {
            return Err(ApiError::AccountInactive);
        }

        debug!(
            account_id = %account.id,
            email = %safe_email_log(&account.email),
            role = ?account.role,
            "Account authentication successful via extractor"
        );

        Ok(AuthedUser {
            id: account.id,
            email: account.email,
            is_admin: account.role == Role::Admin,
        })
    }
}

/// Extractor for operator-only routes. Wraps `AuthedUser` and requires the
/// admin role.
#[derive(Debug)]
pub struct AdminUser(pub AuthedUser);

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let authed = AuthedUser::from_request_parts(parts, state).await?;
        if !authed.is_admin {
            warn!(account_id = %authed.id, "Non-admin account attempted operator action");
            return Err(ApiError::Forbidden("admin role required".to_string()));
        }
        Ok(AdminUser(authed))
    }
}

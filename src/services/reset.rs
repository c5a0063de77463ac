// src/services/reset.rs
//! Single-use password reset tokens
//!
//! `request_reset` deliberately behaves identically whether or not the email
//! maps to an account, so the endpoint cannot be used to enumerate accounts.
//! Consumption is exactly-once: the token row is claimed with a conditional
//! UPDATE before the password changes hands.

use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, SqlitePool};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::common::error::ApiError;
use crate::common::validation::validate_password;
use crate::common::{generate_raw_id, safe_email_log};

use super::credentials::CredentialStore;
use super::notifier::{self, NotificationKind, Notifier};
use super::password;

/// Token length in Crockford Base32 characters (5 bits each, 200 bits total).
const RESET_TOKEN_LENGTH: usize = 40;

#[derive(Debug, Error, PartialEq)]
pub enum ResetError {
    #[error("reset token not found")]
    TokenNotFound,

    #[error("reset token expired")]
    TokenExpired,

    #[error("reset token already used")]
    TokenAlreadyUsed,

    #[error("weak password: {0}")]
    WeakPassword(String),

    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for ResetError {
    fn from(e: sqlx::Error) -> Self {
        ResetError::Database(e.to_string())
    }
}

impl From<ResetError> for ApiError {
    fn from(e: ResetError) -> Self {
        match e {
            // Externally collapsed: not-found, expired, and already-used all
            // produce the same response
            ResetError::TokenNotFound
            | ResetError::TokenExpired
            | ResetError::TokenAlreadyUsed => ApiError::ResetTokenInvalid,
            ResetError::WeakPassword(msg) => ApiError::ValidationError(msg),
            ResetError::Database(msg) => ApiError::InternalServer(msg),
        }
    }
}

#[derive(FromRow, Debug, Clone)]
pub struct PasswordResetToken {
    pub token: String,
    pub account_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

pub struct PasswordResetService {
    db: SqlitePool,
    credentials: Arc<dyn CredentialStore>,
    notifier: Arc<dyn Notifier>,
    reset_base_url: String,
    token_ttl: Duration,
}

impl PasswordResetService {
    pub fn new(
        db: SqlitePool,
        credentials: Arc<dyn CredentialStore>,
        notifier: Arc<dyn Notifier>,
        reset_base_url: String,
    ) -> Self {
        Self {
            db,
            credentials,
            notifier,
            reset_base_url,
            token_ttl: Duration::hours(1),
        }
    }

    /// Issue a reset token for the account behind `email`, if one exists.
    ///
    /// Returns `Ok(())` either way; the caller's response must not depend on
    /// whether anything happened.
    pub async fn request_reset(&self, email: &str) -> Result<(), ResetError> {
        let Some(account) = self.credentials.find_by_email(email).await? else {
            debug!(
                email = %safe_email_log(email),
                "Reset requested for unknown email, responding generically"
            );
            return Ok(());
        };

        let token = generate_raw_id(RESET_TOKEN_LENGTH);
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO password_reset_tokens (token, account_id, issued_at, expires_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(&token)
        .bind(&account.id)
        .bind(now)
        .bind(now + self.token_ttl)
        .execute(&self.db)
        .await?;

        let reset_url = format!("{}?token={}", self.reset_base_url, token);
        notifier::dispatch(
            self.notifier.clone(),
            account.id.clone(),
            NotificationKind::PasswordReset,
            serde_json::json!({
                "email": account.email,
                "reset_url": reset_url,
                "html_body": notifier::generate_password_reset_email(&reset_url),
            }),
        );

        info!(account_id = %account.id, "Password reset token issued");
        Ok(())
    }

    /// Consume a reset token and set the new password.
    ///
    /// Already-used wins over expired: a consumed token reports
    /// `TokenAlreadyUsed` regardless of elapsed time. The consumed claim is a
    /// conditional UPDATE, so two racing calls cannot both succeed.
    pub async fn consume_reset(&self, token: &str, new_password: &str) -> Result<(), ResetError> {
        let check = validate_password(new_password);
        if !check.is_valid {
            let detail = check
                .errors
                .first()
                .map(|e| format!("{} {}", e.field, e.message))
                .unwrap_or_else(|| "invalid password".to_string());
            return Err(ResetError::WeakPassword(detail));
        }

        let row = sqlx::query_as::<_, PasswordResetToken>(
            "SELECT * FROM password_reset_tokens WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(&self.db)
        .await?
        .ok_or(ResetError::TokenNotFound)?;

        if row.consumed_at.is_some() {
            return Err(ResetError::TokenAlreadyUsed);
        }
        if row.expires_at <= Utc::now() {
            return Err(ResetError::TokenExpired);
        }

        // Claim the token before touching the password; the second of two
        // racing consumers matches zero rows here
        let claimed = sqlx::query(
            "UPDATE password_reset_tokens SET consumed_at = ? \
             WHERE token = ? AND consumed_at IS NULL",
        )
        .bind(Utc::now())
        .bind(&row.token)
        .execute(&self.db)
        .await?;

        if claimed.rows_affected() == 0 {
            return Err(ResetError::TokenAlreadyUsed);
        }

        let hash = password::hash_password(new_password)
            .map_err(|e| ResetError::Database(e.to_string()))?;
        self.credentials.set_password(&row.account_id, &hash).await?;

        info!(account_id = %row.account_id, "Password reset completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::migrations;
    use crate::services::credentials::{CredentialStore as _, SqlCredentialStore};
    use crate::services::notifier::LogNotifier;

    async fn make_service() -> (PasswordResetService, Arc<SqlCredentialStore>, SqlitePool) {
        // Single connection: a pooled :memory: database is per-connection
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let credentials = Arc::new(SqlCredentialStore::new(pool.clone()));
        let service = PasswordResetService::new(
            pool.clone(),
            credentials.clone(),
            Arc::new(LogNotifier),
            "https://app.example.com/reset".to_string(),
        );
        (service, credentials, pool)
    }

    async fn issued_token(pool: &SqlitePool, account_id: &str) -> String {
        let row: (String,) = sqlx::query_as(
            "SELECT token FROM password_reset_tokens WHERE account_id = ? ORDER BY issued_at DESC",
        )
        .bind(account_id)
        .fetch_one(pool)
        .await
        .unwrap();
        row.0
    }

    #[tokio::test]
    async fn test_request_reset_is_silent_for_unknown_email() {
        let (service, _, pool) = make_service().await;

        // Same Ok(()) as the known-account path, and nothing persisted
        service.request_reset("ghost@example.com").await.unwrap();
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM password_reset_tokens")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn test_request_reset_persists_unguessable_token() {
        let (service, credentials, pool) = make_service().await;
        let account = credentials.create_account("reset@example.com").await.unwrap();

        service.request_reset("reset@example.com").await.unwrap();
        let token = issued_token(&pool, &account.id).await;
        assert_eq!(token.len(), RESET_TOKEN_LENGTH);

        let row = sqlx::query_as::<_, PasswordResetToken>(
            "SELECT * FROM password_reset_tokens WHERE token = ?",
        )
        .bind(&token)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(row.consumed_at.is_none());
        assert_eq!((row.expires_at - row.issued_at).num_hours(), 1);
    }

    #[tokio::test]
    async fn test_consume_sets_password_and_burns_token() {
        let (service, credentials, pool) = make_service().await;
        credentials.create_account("burn@example.com").await.unwrap();
        service.request_reset("burn@example.com").await.unwrap();
        let account = credentials
            .find_by_email("burn@example.com")
            .await
            .unwrap()
            .unwrap();
        let token = issued_token(&pool, &account.id).await;

        service
            .consume_reset(&token, "brand-new-password")
            .await
            .unwrap();

        // New password works
        let verified = credentials
            .verify_password("burn@example.com", "brand-new-password")
            .await
            .unwrap();
        assert!(verified.is_some());

        // Second consumption fails as already-used, regardless of expiry
        let err = service
            .consume_reset(&token, "another-password")
            .await
            .unwrap_err();
        assert_eq!(err, ResetError::TokenAlreadyUsed);
    }

    #[tokio::test]
    async fn test_consume_unknown_token() {
        let (service, _, _) = make_service().await;
        let err = service
            .consume_reset("NOSUCHTOKEN", "valid-password-1")
            .await
            .unwrap_err();
        assert_eq!(err, ResetError::TokenNotFound);
    }

    #[tokio::test]
    async fn test_consume_expired_token() {
        let (service, credentials, pool) = make_service().await;
        let account = credentials.create_account("late@example.com").await.unwrap();

        let now = Utc::now();
        sqlx::query(
            "INSERT INTO password_reset_tokens (token, account_id, issued_at, expires_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind("EXPIREDTOKEN")
        .bind(&account.id)
        .bind(now - Duration::hours(2))
        .bind(now - Duration::hours(1))
        .execute(&pool)
        .await
        .unwrap();

        let err = service
            .consume_reset("EXPIREDTOKEN", "valid-password-1")
            .await
            .unwrap_err();
        assert_eq!(err, ResetError::TokenExpired);
    }

    #[tokio::test]
    async fn test_weak_password_rejected_before_token_lookup() {
        let (service, _, _) = make_service().await;
        let err = service.consume_reset("whatever", "short").await.unwrap_err();
        assert!(matches!(err, ResetError::WeakPassword(_)));
    }
}

// src/services/identity.rs
//! Federated identity linking
//!
//! Deduplicates external-provider identities on (provider, provider_uid) and
//! keeps their provider tokens current. Dedup is enforced by the storage
//! layer's unique constraint with an atomic upsert, not by check-then-act:
//! two concurrent callbacks for the same external identity converge on one
//! row with the later tokens.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::auth::models::Account;
use crate::common::error::ApiError;
use crate::common::{generate_identity_id, safe_email_log};

use super::credentials::CredentialStore;
use super::encryption::EncryptionService;
use super::provider::{OAuthProviderClient, Provider, ProviderGrant};

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("no local account could be resolved for identity")]
    AccountResolution,
}

impl From<IdentityError> for ApiError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::Database(err) => ApiError::DatabaseError(err),
            IdentityError::AccountResolution => ApiError::AuthenticationFailed,
        }
    }
}

/// A linked external identity row. Provider tokens are decrypted before the
/// struct leaves this module and never serialized outward.
#[derive(FromRow, Serialize, Debug, Clone)]
pub struct ExternalIdentity {
    pub id: String,
    pub account_id: String,
    pub provider: Provider,
    pub provider_uid: String,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of a lazy token refresh.
#[derive(Debug)]
pub enum RefreshOutcome {
    /// Tokens were still valid; nothing to do.
    Fresh(ExternalIdentity),
    /// Provider returned new tokens and they were persisted.
    Refreshed(ExternalIdentity),
    /// No refresh token, or the provider was unreachable: the caller must
    /// send the user back through the provider's flow.
    ReauthRequired,
}

pub struct IdentityService {
    db: SqlitePool,
    provider_client: Arc<dyn OAuthProviderClient>,
    encryption: Option<Arc<EncryptionService>>,
}

impl IdentityService {
    pub fn new(
        db: SqlitePool,
        provider_client: Arc<dyn OAuthProviderClient>,
        encryption: Option<Arc<EncryptionService>>,
    ) -> Self {
        Self {
            db,
            provider_client,
            encryption,
        }
    }

    /// Atomic find-or-create keyed by (provider, provider_uid).
    ///
    /// An existing row keeps its account binding and gets fresh tokens; a
    /// missing refresh token in the update preserves the stored one (most
    /// providers only hand the refresh token out once). A new row is bound
    /// to `account_id`.
    pub async fn link_or_update(
        &self,
        provider: Provider,
        provider_uid: &str,
        grant: &ProviderGrant,
        account_id: &str,
    ) -> Result<ExternalIdentity, IdentityError> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO external_identities
                (id, account_id, provider, provider_uid, access_token, refresh_token,
                 expires_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(provider, provider_uid) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = COALESCE(excluded.refresh_token, external_identities.refresh_token),
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(generate_identity_id())
        .bind(account_id)
        .bind(provider)
        .bind(provider_uid)
        .bind(self.seal(Some(grant.access_token.as_str())))
        .bind(self.seal(grant.refresh_token.as_deref()))
        .bind(grant.expires_at)
        .bind(now)
        .bind(now)
        .execute(&self.db)
        .await?;

        let identity = self
            .find_by_provider(provider, provider_uid)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;

        debug!(
            identity_id = %identity.id,
            provider = provider.as_str(),
            account_id = %identity.account_id,
            "Linked or updated external identity"
        );

        Ok(identity)
    }

    /// Exchange an authorization code through the provider client.
    pub async fn exchange_code(
        &self,
        provider: Provider,
        code: &str,
        redirect_uri: &str,
    ) -> Result<ProviderGrant, super::provider::ProviderError> {
        self.provider_client
            .exchange_code(provider, code, redirect_uri)
            .await
    }

    pub async fn find_by_account(
        &self,
        account_id: &str,
        provider: Provider,
    ) -> Result<Option<ExternalIdentity>, IdentityError> {
        let row = sqlx::query_as::<_, ExternalIdentity>(
            "SELECT * FROM external_identities WHERE account_id = ? AND provider = ?",
        )
        .bind(account_id)
        .bind(provider)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|identity| self.open(identity)))
    }

    pub async fn find_by_provider(
        &self,
        provider: Provider,
        provider_uid: &str,
    ) -> Result<Option<ExternalIdentity>, IdentityError> {
        let row = sqlx::query_as::<_, ExternalIdentity>(
            "SELECT * FROM external_identities WHERE provider = ? AND provider_uid = ?",
        )
        .bind(provider)
        .bind(provider_uid)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|identity| self.open(identity)))
    }

    /// True when the identity's provider tokens have a known expiry that has
    /// passed.
    pub fn is_expired(&self, identity: &ExternalIdentity) -> bool {
        identity
            .expires_at
            .map(|at| at <= Utc::now())
            .unwrap_or(false)
    }

    /// Refresh the provider tokens when expired. Fails closed: any provider
    /// problem degrades to `ReauthRequired` rather than erroring out of the
    /// request.
    pub async fn refresh_if_needed(
        &self,
        identity: ExternalIdentity,
    ) -> Result<RefreshOutcome, IdentityError> {
        if !self.is_expired(&identity) {
            return Ok(RefreshOutcome::Fresh(identity));
        }

        let Some(refresh_token) = identity.refresh_token.clone() else {
            info!(
                identity_id = %identity.id,
                provider = identity.provider.as_str(),
                "Identity expired with no refresh token, re-authentication required"
            );
            return Ok(RefreshOutcome::ReauthRequired);
        };

        match self
            .provider_client
            .refresh_token(identity.provider, &refresh_token)
            .await
        {
            Ok(tokens) => {
                let now = Utc::now();
                sqlx::query(
                    "UPDATE external_identities \
                     SET access_token = ?, refresh_token = COALESCE(?, refresh_token), \
                         expires_at = ?, updated_at = ? \
                     WHERE id = ?",
                )
                .bind(self.seal(Some(tokens.access_token.as_str())))
                .bind(self.seal(tokens.refresh_token.as_deref()))
                .bind(tokens.expires_at)
                .bind(now)
                .bind(&identity.id)
                .execute(&self.db)
                .await?;

                let mut refreshed = identity;
                refreshed.refresh_token = tokens.refresh_token.or(refreshed.refresh_token);
                refreshed.access_token = Some(tokens.access_token);
                refreshed.expires_at = tokens.expires_at;
                refreshed.updated_at = now;
                debug!(identity_id = %refreshed.id, "Provider tokens refreshed");
                Ok(RefreshOutcome::Refreshed(refreshed))
            }
            Err(e) => {
                // Provider unavailability is recoverable by re-auth; it must
                // never take down the request pipeline
                warn!(
                    identity_id = %identity.id,
                    provider = identity.provider.as_str(),
                    error = %e,
                    "Provider refresh failed, falling back to re-authentication"
                );
                Ok(RefreshOutcome::ReauthRequired)
            }
        }
    }

    /// Resolve the local account for a provider grant: an already-linked
    /// identity wins, then an existing account with the provider's email,
    /// then a newly provisioned account. Account creation retries through
    /// the unique constraint so concurrent first-callbacks for the same
    /// email converge.
    pub async fn resolve_account(
        &self,
        credentials: &dyn CredentialStore,
        provider: Provider,
        grant: &ProviderGrant,
    ) -> Result<Account, IdentityError> {
        if let Some(identity) = self.find_by_provider(provider, &grant.provider_uid).await? {
            if let Some(account) = credentials.find_by_id(&identity.account_id).await? {
                return Ok(account);
            }
            warn!(
                identity_id = %identity.id,
                account_id = %identity.account_id,
                "Linked identity points at missing account"
            );
            return Err(IdentityError::AccountResolution);
        }

        let Some(email) = grant.email.as_deref() else {
            warn!(
                provider = provider.as_str(),
                "Provider grant carried no email, cannot provision account"
            );
            return Err(IdentityError::AccountResolution);
        };

        if let Some(account) = credentials.find_by_email(email).await? {
            return Ok(account);
        }

        match credentials.create_account(email).await {
            Ok(account) => {
                info!(
                    account_id = %account.id,
                    email = %safe_email_log(email),
                    provider = provider.as_str(),
                    "Provisioned account for federated identity"
                );
                Ok(account)
            }
            Err(e) => {
                // Lost a race with a concurrent callback for the same email:
                // the unique constraint fired, the winner's row is the account
                if let Some(account) = credentials.find_by_email(email).await? {
                    debug!(
                        email = %safe_email_log(email),
                        "Account creation conflicted, using existing row"
                    );
                    return Ok(account);
                }
                Err(IdentityError::Database(e))
            }
        }
    }

    fn seal(&self, token: Option<&str>) -> Option<String> {
        let token = token?;
        match &self.encryption {
            Some(service) => match service.encrypt(token) {
                Ok(sealed) => Some(sealed),
                Err(e) => {
                    warn!(error = %e, "Token encryption failed, storing plaintext");
                    Some(token.to_string())
                }
            },
            None => Some(token.to_string()),
        }
    }

    fn open(&self, mut identity: ExternalIdentity) -> ExternalIdentity {
        if let Some(service) = &self.encryption {
            identity.access_token = identity
                .access_token
                .map(|t| service.decrypt(&t).unwrap_or(t));
            identity.refresh_token = identity
                .refresh_token
                .map(|t| service.decrypt(&t).unwrap_or(t));
        }
        identity
    }
}

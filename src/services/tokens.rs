// src/services/tokens.rs
//! Signed access/refresh token issuance, verification, and revocation

use chrono::{DateTime, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::models::{Account, Claims, TokenKind};
use crate::common::config::AuthConfig;
use crate::common::error::ApiError;
use crate::common::safe_token_log;

use super::revocation::RevocationList;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token malformed")]
    Malformed,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("token expired")]
    Expired,

    #[error("token revoked")]
    Revoked,

    #[error("token encoding failed: {0}")]
    Encoding(jsonwebtoken::errors::Error),
}

impl From<TokenError> for ApiError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Malformed | TokenError::InvalidSignature => ApiError::TokenMalformed,
            TokenError::Expired => ApiError::TokenExpired,
            TokenError::Revoked => ApiError::TokenRevoked,
            TokenError::Encoding(err) => ApiError::InternalServer(format!("jwt error: {}", err)),
        }
    }
}

/// A freshly minted access/refresh pair.
#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
    revocation: RevocationList,
}

impl TokenService {
    pub fn new(config: &AuthConfig, revocation: RevocationList) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            access_ttl_secs: config.access_ttl_secs,
            refresh_ttl_secs: config.refresh_ttl_secs,
            revocation,
        }
    }

    /// Mint a 1-hour access token carrying the account's email claim.
    pub fn issue_access_token(&self, account: &Account) -> Result<String, TokenError> {
        self.mint(account, TokenKind::Access)
    }

    /// Mint a 7-day refresh token. Carries no email claim.
    pub fn issue_refresh_token(&self, account: &Account) -> Result<String, TokenError> {
        self.mint(account, TokenKind::Refresh)
    }

    pub fn issue_pair(&self, account: &Account) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access_token: self.issue_access_token(account)?,
            refresh_token: self.issue_refresh_token(account)?,
        })
    }

    fn mint(&self, account: &Account, kind: TokenKind) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl_secs,
            TokenKind::Refresh => self.refresh_ttl_secs,
        };
        let claims = Claims {
            sub: account.id.clone(),
            email: match kind {
                TokenKind::Access => Some(account.email.clone()),
                TokenKind::Refresh => None,
            },
            iat: now as usize,
            exp: (now + ttl) as usize,
            jti: Uuid::new_v4().to_string(),
            kind,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(TokenError::Encoding)
    }

    /// Decode and validate a token: signature, expiry (zero leeway), then the
    /// revocation list by jti. A revoked jti fails even before natural expiry.
    pub async fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = self.decode_checked(token, true)?;
        if self.revocation.is_revoked(&claims.jti).await {
            warn!(jti = %claims.jti, token = %safe_token_log(token), "Rejected revoked token");
            return Err(TokenError::Revoked);
        }
        Ok(claims)
    }

    /// Verify a token and require a specific kind. A kind mismatch is treated
    /// as malformed: an access token is never a valid refresh token.
    pub async fn verify_kind(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        let claims = self.verify(token).await?;
        if claims.kind != kind {
            return Err(TokenError::Malformed);
        }
        Ok(claims)
    }

    pub async fn verify_refresh(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_kind(token, TokenKind::Refresh).await
    }

    /// Exchange a verified refresh token's claims for a fresh pair, revoking
    /// the consumed refresh token so it cannot be replayed.
    pub async fn rotate(&self, consumed: &Claims, account: &Account) -> Result<TokenPair, TokenError> {
        self.revocation
            .add(&consumed.jti, expiry_of(consumed))
            .await;
        debug!(jti = %consumed.jti, account_id = %account.id, "Rotated refresh token");
        self.issue_pair(account)
    }

    /// Add the token's jti to the denylist, with the entry expiring when the
    /// token itself would. The signature must still check out: only tokens we
    /// actually issued can be revoked.
    pub async fn revoke(&self, token: &str) -> Result<(), TokenError> {
        let claims = self.decode_checked(token, false)?;
        self.revocation.add(&claims.jti, expiry_of(&claims)).await;
        Ok(())
    }

    fn decode_checked(&self, token: &str, validate_exp: bool) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = validate_exp;
        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                _ => TokenError::Malformed,
            }
        })?;
        Ok(data.claims)
    }
}

fn expiry_of(claims: &Claims) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(claims.exp as i64, 0).unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::{AccountStatus, Role};
    use crate::services::store::MemoryStore;
    use std::sync::Arc;

    fn make_service() -> TokenService {
        let config = AuthConfig {
            jwt_secret: "test_secret_key".to_string(),
            ..AuthConfig::default()
        };
        TokenService::new(&config, RevocationList::new(Arc::new(MemoryStore::new())))
    }

    fn make_account() -> Account {
        Account {
            id: "U_TESTACCT".to_string(),
            email: "test@example.com".to_string(),
            password_hash: None,
            status: AccountStatus::Active,
            role: Role::Customer,
            last_login_at: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_issue_then_verify_roundtrips_claims() {
        let service = make_service();
        let account = make_account();

        let token = service.issue_access_token(&account).unwrap();
        let claims = service.verify(&token).await.unwrap();

        assert_eq!(claims.sub, account.id);
        assert_eq!(claims.email, Some(account.email.clone()));
        assert_eq!(claims.kind, TokenKind::Access);
        assert_eq!(claims.exp - claims.iat, 3600);

        let refresh = service.issue_refresh_token(&account).unwrap();
        let claims = service.verify_refresh(&refresh).await.unwrap();
        assert_eq!(claims.sub, account.id);
        assert_eq!(claims.email, None);
        assert_eq!(claims.exp - claims.iat, 7 * 86_400);
    }

    #[tokio::test]
    async fn test_fresh_jti_per_token() {
        let service = make_service();
        let account = make_account();

        let a = service.issue_access_token(&account).unwrap();
        let b = service.issue_access_token(&account).unwrap();
        let ja = service.verify(&a).await.unwrap().jti;
        let jb = service.verify(&b).await.unwrap().jti;
        assert_ne!(ja, jb);
    }

    #[tokio::test]
    async fn test_expired_token_fails_with_expired() {
        let config = AuthConfig {
            jwt_secret: "test_secret_key".to_string(),
            access_ttl_secs: -10,
            ..AuthConfig::default()
        };
        let service =
            TokenService::new(&config, RevocationList::new(Arc::new(MemoryStore::new())));
        let token = service.issue_access_token(&make_account()).unwrap();

        let err = service.verify(&token).await.unwrap_err();
        assert!(matches!(err, TokenError::Expired));
    }

    #[tokio::test]
    async fn test_wrong_secret_fails_with_invalid_signature() {
        let service = make_service();
        let other = TokenService::new(
            &AuthConfig {
                jwt_secret: "a_different_secret".to_string(),
                ..AuthConfig::default()
            },
            RevocationList::new(Arc::new(MemoryStore::new())),
        );

        let token = other.issue_access_token(&make_account()).unwrap();
        let err = service.verify(&token).await.unwrap_err();
        assert!(matches!(err, TokenError::InvalidSignature));
    }

    #[tokio::test]
    async fn test_garbage_fails_with_malformed() {
        let service = make_service();
        let err = service.verify("not.a.token").await.unwrap_err();
        assert!(matches!(err, TokenError::Malformed));
    }

    #[tokio::test]
    async fn test_revoked_token_fails_before_natural_expiry() {
        let service = make_service();
        let token = service.issue_access_token(&make_account()).unwrap();

        assert!(service.verify(&token).await.is_ok());
        service.revoke(&token).await.unwrap();
        let err = service.verify(&token).await.unwrap_err();
        assert!(matches!(err, TokenError::Revoked));
    }

    #[tokio::test]
    async fn test_access_token_is_not_a_refresh_token() {
        let service = make_service();
        let token = service.issue_access_token(&make_account()).unwrap();
        let err = service.verify_refresh(&token).await.unwrap_err();
        assert!(matches!(err, TokenError::Malformed));
    }

    #[tokio::test]
    async fn test_rotate_revokes_consumed_refresh_token() {
        let service = make_service();
        let account = make_account();
        let refresh = service.issue_refresh_token(&account).unwrap();

        let claims = service.verify_refresh(&refresh).await.unwrap();
        let pair = service.rotate(&claims, &account).await.unwrap();

        // Old refresh token can no longer be replayed
        let err = service.verify_refresh(&refresh).await.unwrap_err();
        assert!(matches!(err, TokenError::Revoked));

        // New pair verifies
        assert!(service.verify(&pair.access_token).await.is_ok());
        assert!(service.verify_refresh(&pair.refresh_token).await.is_ok());
    }
}

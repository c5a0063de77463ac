//! Tests for auth module
//!
//! These tests verify core authentication functionality including:
//! - Claims structure and serialization
//! - Account model enum round-trips
//! - The login → verify → logout lifecycle at the service level

#[cfg(test)]
mod tests {
    use super::super::models::*;
    use crate::common::config::AuthConfig;
    use crate::common::migrations;
    use crate::services::credentials::{CredentialStore, SqlCredentialStore};
    use crate::services::password;
    use crate::services::revocation::RevocationList;
    use crate::services::store::MemoryStore;
    use crate::services::tokens::{TokenError, TokenService};
    use std::sync::Arc;

    #[test]
    fn test_claims_structure() {
        let claims = Claims {
            sub: "U_TESTACCT".to_string(),
            email: Some("test@example.com".to_string()),
            iat: 1_700_000_000,
            exp: 1_700_003_600,
            jti: "a-jti".to_string(),
            kind: TokenKind::Access,
        };

        assert_eq!(claims.sub, "U_TESTACCT");
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_claims_serialization_omits_missing_email() {
        let claims = Claims {
            sub: "U_TESTACCT".to_string(),
            email: None,
            iat: 1,
            exp: 2,
            jti: "j".to_string(),
            kind: TokenKind::Refresh,
        };

        let json = serde_json::to_value(&claims).unwrap();
        assert!(json.get("email").is_none());
        assert_eq!(json["kind"], "refresh");
    }

    #[test]
    fn test_status_and_role_serde() {
        assert_eq!(
            serde_json::to_value(AccountStatus::Suspended).unwrap(),
            "suspended"
        );
        assert_eq!(serde_json::to_value(Role::Moderator).unwrap(), "moderator");
        let role: Role = serde_json::from_value(serde_json::json!("admin")).unwrap();
        assert_eq!(role, Role::Admin);
    }

    #[test]
    fn test_account_serialization_hides_password_hash() {
        let account = Account {
            id: "U_TESTACCT".to_string(),
            email: "test@example.com".to_string(),
            password_hash: Some("$argon2id$secret".to_string()),
            status: AccountStatus::Active,
            role: Role::Customer,
            last_login_at: None,
            created_at: chrono::Utc::now(),
        };

        let json = serde_json::to_value(&account).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["email"], "test@example.com");
    }

    #[tokio::test]
    async fn test_login_verify_logout_lifecycle() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap();
        migrations::run_migrations(&pool).await.unwrap();

        let credentials = SqlCredentialStore::new(pool.clone());
        let tokens = TokenService::new(
            &AuthConfig {
                jwt_secret: "lifecycle_test_secret".to_string(),
                ..AuthConfig::default()
            },
            RevocationList::new(Arc::new(MemoryStore::new())),
        );

        // Seed an account with a password
        let account = credentials.create_account("flow@example.com").await.unwrap();
        let hash = password::hash_password("a-long-password").unwrap();
        credentials.set_password(&account.id, &hash).await.unwrap();

        // Login path: verify credentials, bump last_login, issue pair
        let account = credentials
            .verify_password("flow@example.com", "a-long-password")
            .await
            .unwrap()
            .expect("credentials should verify");
        credentials.update_last_login(&account.id).await.unwrap();
        let pair = tokens.issue_pair(&account).unwrap();

        // Access token authenticates
        let claims = tokens
            .verify_kind(&pair.access_token, TokenKind::Access)
            .await
            .unwrap();
        assert_eq!(claims.sub, account.id);

        // Logout path: revoke both tokens
        tokens.revoke(&pair.access_token).await.unwrap();
        tokens.revoke(&pair.refresh_token).await.unwrap();

        let err = tokens.verify(&pair.access_token).await.unwrap_err();
        assert!(matches!(err, TokenError::Revoked));
        let err = tokens.verify(&pair.refresh_token).await.unwrap_err();
        assert!(matches!(err, TokenError::Revoked));
    }
}

// src/services/credentials.rs
//! Credential store
//!
//! Account storage is an external collaborator; this core talks to it
//! through the `CredentialStore` trait. `SqlCredentialStore` is the concrete
//! implementation over the shared pool.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::auth::models::Account;
use crate::common::{generate_account_id, safe_email_log};

use super::password;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Verify an email/password pair. Returns the account on a hash match
    /// regardless of status; callers decide what an inactive account means.
    /// Returns `None` for unknown email or wrong password, without
    /// distinguishing the two.
    async fn verify_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<Account>, sqlx::Error>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Account>, sqlx::Error>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, sqlx::Error>;

    async fn update_last_login(&self, id: &str) -> Result<(), sqlx::Error>;

    /// Replace the account's password hash. Used by the reset flow.
    async fn set_password(&self, id: &str, password_hash: &str) -> Result<(), sqlx::Error>;

    /// Provision a minimal active customer account for a federated identity
    /// that has no local account yet. No password hash: the account can only
    /// sign in through its provider until a password is set via reset.
    async fn create_account(&self, email: &str) -> Result<Account, sqlx::Error>;
}

pub struct SqlCredentialStore {
    db: SqlitePool,
    // Verified against when the email is unknown, so lookup misses cost the
    // same as hash mismatches
    dummy_hash: String,
}

impl SqlCredentialStore {
    pub fn new(db: SqlitePool) -> Self {
        let dummy_hash = password::hash_password("dummy-timing-equalizer")
            .unwrap_or_else(|_| String::new());
        Self { db, dummy_hash }
    }
}

#[async_trait]
impl CredentialStore for SqlCredentialStore {
    async fn verify_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<Account>, sqlx::Error> {
        let account = self.find_by_email(email).await?;

        match account {
            Some(account) => {
                let Some(hash) = account.password_hash.as_deref() else {
                    debug!(
                        email = %safe_email_log(email),
                        "Password login attempted against OAuth-only account"
                    );
                    return Ok(None);
                };
                if password::verify_password(hash, password) {
                    Ok(Some(account))
                } else {
                    Ok(None)
                }
            }
            None => {
                password::verify_password(&self.dummy_hash, password);
                Ok(None)
            }
        }
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Account>, sqlx::Error> {
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, sqlx::Error> {
        // Emails are stored lowercase; normalize the probe
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE email = ?")
            .bind(email.trim().to_lowercase())
            .fetch_optional(&self.db)
            .await
    }

    async fn update_last_login(&self, id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE accounts SET last_login_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn set_password(&self, id: &str, password_hash: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE accounts SET password_hash = ? WHERE id = ?")
            .bind(password_hash)
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn create_account(&self, email: &str) -> Result<Account, sqlx::Error> {
        let id = generate_account_id();
        let email = email.trim().to_lowercase();

        sqlx::query(
            "INSERT INTO accounts (id, email, password_hash, status, role, created_at) \
             VALUES (?, ?, NULL, 'active', 'customer', ?)",
        )
        .bind(&id)
        .bind(&email)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        match self.find_by_id(&id).await? {
            Some(account) => Ok(account),
            None => {
                warn!(account_id = %id, "Created account row missing on readback");
                Err(sqlx::Error::RowNotFound)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::{AccountStatus, Role};
    use crate::common::migrations;

    async fn make_store() -> SqlCredentialStore {
        // Single connection: a pooled :memory: database is per-connection
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        SqlCredentialStore::new(pool)
    }

    async fn seed_account(store: &SqlCredentialStore, email: &str, pass: &str) -> Account {
        let account = store.create_account(email).await.unwrap();
        let hash = password::hash_password(pass).unwrap();
        store.set_password(&account.id, &hash).await.unwrap();
        store.find_by_id(&account.id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_verify_password_matches() {
        let store = make_store().await;
        seed_account(&store, "alice@example.com", "hunter2hunter2").await;

        let found = store
            .verify_password("alice@example.com", "hunter2hunter2")
            .await
            .unwrap();
        assert!(found.is_some());
        let account = found.unwrap();
        assert_eq!(account.email, "alice@example.com");
        assert_eq!(account.status, AccountStatus::Active);
        assert_eq!(account.role, Role::Customer);
    }

    #[tokio::test]
    async fn test_verify_password_is_case_insensitive_on_email() {
        let store = make_store().await;
        seed_account(&store, "Alice@Example.COM", "hunter2hunter2").await;

        let found = store
            .verify_password("ALICE@example.com", "hunter2hunter2")
            .await
            .unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_email_look_identical() {
        let store = make_store().await;
        seed_account(&store, "bob@example.com", "correct-horse").await;

        let wrong = store
            .verify_password("bob@example.com", "battery-staple")
            .await
            .unwrap();
        let unknown = store
            .verify_password("nobody@example.com", "battery-staple")
            .await
            .unwrap();
        assert!(wrong.is_none());
        assert!(unknown.is_none());
    }

    #[tokio::test]
    async fn test_oauth_only_account_rejects_password_login() {
        let store = make_store().await;
        store.create_account("carol@example.com").await.unwrap();

        let found = store
            .verify_password("carol@example.com", "anything-at-all")
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_update_last_login() {
        let store = make_store().await;
        let account = seed_account(&store, "dave@example.com", "hunter2hunter2").await;
        assert!(account.last_login_at.is_none());

        store.update_last_login(&account.id).await.unwrap();
        let account = store.find_by_id(&account.id).await.unwrap().unwrap();
        assert!(account.last_login_at.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected_by_constraint() {
        let store = make_store().await;
        store.create_account("dup@example.com").await.unwrap();
        let err = store.create_account("dup@example.com").await;
        assert!(err.is_err());
    }
}

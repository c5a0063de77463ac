// Application state shared across all modules

use sqlx::SqlitePool;
use std::sync::Arc;

use crate::services::{
    AbuseEngine, CredentialStore, IdentityService, PasswordResetService, TokenService,
};

/// Application state containing database pool and the trust & access
/// control services
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub credentials: Arc<dyn CredentialStore>,
    pub tokens: Arc<TokenService>,
    pub identity_service: Arc<IdentityService>,
    pub reset_service: Arc<PasswordResetService>,
    pub abuse_engine: Arc<AbuseEngine>,
}

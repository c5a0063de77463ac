// src/main.rs
use axum::{extract::Extension, middleware, Router};
use dotenv::dotenv;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use std::{net::SocketAddr, str::FromStr, sync::Arc};
use tokio::{net::TcpListener, sync::RwLock};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// ============================================================================
// MODULE IMPORTS
// ============================================================================

mod abuse_middleware;
mod admin;
mod auth;
mod common;
mod oauth;
mod services;

// ============================================================================
// COMMON IMPORTS
// ============================================================================

use abuse_middleware::abuse_middleware;
use common::config::{print_profile_status, AbuseConfig, AuthConfig, Profile};
use common::AppState;
use services::encryption::EncryptionService;
use services::store::start_prune_task;
use services::{
    AbuseEngine, HttpProviderClient, IdentityService, LogNotifier, MemoryStore,
    PasswordResetService, RevocationList, SqlCredentialStore, TokenService,
};

// ============================================================================
// MAIN APPLICATION ENTRY POINT
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // ========================================================================
    // ENVIRONMENT CONFIGURATION
    // ========================================================================

    let database_url =
        env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://authgate.db".to_string());
    let reset_base_url = env::var("RESET_BASE_URL")
        .unwrap_or_else(|_| "http://localhost:3000/reset-password".to_string());

    let profile = Profile::from_env();
    let auth_config = AuthConfig::from_env();
    let abuse_config = AbuseConfig::from_env(profile);

    if profile.is_production() && auth_config.jwt_secret == AuthConfig::default().jwt_secret {
        warn!("JWT_SECRET is unset in production; tokens are signed with the default secret");
    }

    print_profile_status(profile, &abuse_config);

    // ========================================================================
    // DATABASE SETUP
    // ========================================================================

    if let Some(path_part) = database_url.strip_prefix("sqlite://") {
        let path_without_params = path_part.split('?').next().unwrap_or("");
        if !path_without_params.is_empty() && !path_without_params.starts_with(':') {
            let db_path = PathBuf::from(path_without_params);
            if let Some(parent) = db_path.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
        }
    }

    let connect_options = SqliteConnectOptions::from_str(&database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .connect_with(connect_options)
        .await?;

    common::migrations::run_migrations(&pool).await?;

    // ========================================================================
    // SERVICE INITIALIZATION
    // ========================================================================

    let store = Arc::new(MemoryStore::new());
    info!("In-memory TTL store initialized");

    let revocation = RevocationList::new(store.clone());
    let tokens = Arc::new(TokenService::new(&auth_config, revocation));
    info!("TokenService initialized");

    let credentials = Arc::new(SqlCredentialStore::new(pool.clone()));
    info!("CredentialStore initialized");

    let encryption = match EncryptionService::from_env() {
        Ok(service) => {
            info!("Provider-token encryption enabled");
            Some(Arc::new(service))
        }
        Err(e) => {
            warn!("Provider-token encryption unavailable: {}. Tokens stored as-is.", e);
            None
        }
    };

    let provider_client = Arc::new(HttpProviderClient::from_env());
    let identity_service = Arc::new(IdentityService::new(
        pool.clone(),
        provider_client,
        encryption,
    ));
    info!("IdentityService initialized");

    let notifier = Arc::new(LogNotifier);
    let reset_service = Arc::new(PasswordResetService::new(
        pool.clone(),
        credentials.clone(),
        notifier.clone(),
        reset_base_url,
    ));
    info!("PasswordResetService initialized");

    let abuse_engine = Arc::new(AbuseEngine::new(
        abuse_config,
        pool.clone(),
        store.clone(),
    ));
    info!("AbuseEngine initialized");

    // Periodic low-priority sweep of expired revocations, counters, and
    // reputation records
    start_prune_task(store, Duration::from_secs(300));
    info!("Store maintenance task started");

    // ========================================================================
    // APPLICATION STATE
    // ========================================================================

    let app_state = AppState {
        db: pool,
        credentials,
        tokens,
        identity_service,
        reset_service,
        abuse_engine: abuse_engine.clone(),
    };

    let shared = Arc::new(RwLock::new(app_state));

    // ========================================================================
    // ROUTER COMPOSITION
    // ========================================================================

    let app = Router::new()
        // ====================================================================
        // AUTHENTICATION ROUTES
        // ====================================================================
        .merge(auth::auth_routes())
        // ====================================================================
        // OAUTH ROUTES
        // ====================================================================
        .merge(oauth::oauth_routes())
        // ====================================================================
        // ADMIN ROUTES (abuse list management)
        // ====================================================================
        .merge(admin::admin_routes())
        // ====================================================================
        // MIDDLEWARE AND LAYERS
        // ====================================================================
        // The abuse gate is the innermost layer: it runs before any handler
        .layer(middleware::from_fn(abuse_middleware))
        .layer(Extension(abuse_engine))
        .layer(Extension(shared.clone()))
        .layer({
            let cors_origins = std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:3000,http://localhost:5173".to_string());

            let origins: Vec<axum::http::HeaderValue> = cors_origins
                .split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect();

            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::PUT,
                    axum::http::Method::DELETE,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([
                    axum::http::header::CONTENT_TYPE,
                    axum::http::header::AUTHORIZATION,
                ])
                .allow_credentials(true)
        })
        .layer(TraceLayer::new_for_http());

    // ========================================================================
    // SERVER STARTUP
    // ========================================================================

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

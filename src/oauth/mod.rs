//! # OAuth Module
//!
//! Federated login over the supported identity providers:
//! - Authorization-code callback handling and identity linking
//! - Lazy provider-token refresh with fail-closed degradation

pub mod handlers;
pub mod models;
pub mod routes;

pub use routes::oauth_routes;

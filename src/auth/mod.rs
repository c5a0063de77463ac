//! # Auth Module
//!
//! This module handles all authentication-related functionality including:
//! - Email/password authentication and token pair issuance
//! - Refresh token rotation and revocation on logout
//! - Password reset request/consume endpoints
//! - AuthedUser/AdminUser extractors for protected routes

pub mod extractors;
pub mod handlers;
pub mod models;
pub mod routes;

#[cfg(test)]
mod tests;

pub use extractors::{AdminUser, AuthedUser};
pub use models::Account;
pub use routes::auth_routes;

// Error handling types for the API

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::fmt;
use tracing::{error, warn};

/// API error types
///
/// Authentication and token failures are deliberately collapsed to a single
/// generic 401 body so the response never distinguishes bad-credentials from
/// inactive-account from revoked-token. The precise variant is still logged.
#[derive(Debug)]
pub enum ApiError {
    AuthenticationFailed,
    AccountInactive,
    TokenExpired,
    TokenRevoked,
    TokenMalformed,
    ResetTokenInvalid,
    RateLimited { retry_after: u64 },
    ForbiddenPattern,
    Forbidden(String),
    ProviderUnavailable(String),
    NotFound(String),
    BadRequest(String),
    ValidationError(String),
    DatabaseError(sqlx::Error),
    InternalServer(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::AuthenticationFailed => write!(f, "Authentication failed"),
            ApiError::AccountInactive => write!(f, "Account inactive"),
            ApiError::TokenExpired => write!(f, "Token expired"),
            ApiError::TokenRevoked => write!(f, "Token revoked"),
            ApiError::TokenMalformed => write!(f, "Token malformed"),
            ApiError::ResetTokenInvalid => write!(f, "Reset token invalid"),
            ApiError::RateLimited { retry_after } => {
                write!(f, "Rate limited, retry after {}s", retry_after)
            }
            ApiError::ForbiddenPattern => write!(f, "Forbidden request pattern"),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::ProviderUnavailable(msg) => write!(f, "Provider unavailable: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            ApiError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            ApiError::ValidationError(msg) => write!(f, "Validation Error: {}", msg),
            ApiError::DatabaseError(e) => write!(f, "Database Error: {}", e),
            ApiError::InternalServer(msg) => write!(f, "Internal Server Error: {}", msg),
        }
    }
}

/// JSON response envelope for all auth endpoints
#[derive(Serialize)]
pub struct ApiResponse {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl ApiResponse {
    pub fn success(message: &str, data: serde_json::Value) -> Json<Self> {
        Json(Self {
            status: "success",
            message: message.to_string(),
            data: Some(data),
            errors: None,
        })
    }

    pub fn message_only(message: &str) -> Json<Self> {
        Json(Self {
            status: "success",
            message: message.to_string(),
            data: None,
            errors: None,
        })
    }

    fn error(message: &str, errors: Option<Vec<String>>) -> Self {
        Self {
            status: "error",
            message: message.to_string(),
            data: None,
            errors,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match &self {
            // Collapsed auth group: one externally-visible body for all of them
            ApiError::AuthenticationFailed
            | ApiError::AccountInactive
            | ApiError::TokenExpired
            | ApiError::TokenRevoked
            | ApiError::TokenMalformed => {
                warn!(cause = %self, "Authentication rejected");
                (
                    StatusCode::UNAUTHORIZED,
                    ApiResponse::error("authentication failed", None),
                )
            }
            // Collapsed reset group: not-found / expired / already-used look identical
            ApiError::ResetTokenInvalid => (
                StatusCode::BAD_REQUEST,
                ApiResponse::error("invalid or expired reset token", None),
            ),
            ApiError::RateLimited { retry_after } => {
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(serde_json::json!({
                        "error": "rate_limit_exceeded",
                        "retry_after": retry_after,
                    })),
                )
                    .into_response();
                if let Ok(v) = axum::http::HeaderValue::from_str(&retry_after.to_string()) {
                    response.headers_mut().insert("retry-after", v);
                }
                return response;
            }
            ApiError::ForbiddenPattern => {
                return (
                    StatusCode::FORBIDDEN,
                    Json(serde_json::json!({ "error": "forbidden" })),
                )
                    .into_response();
            }
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, ApiResponse::error(msg, None)),
            ApiError::ProviderUnavailable(msg) => {
                error!(error = %msg, "Identity provider unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ApiResponse::error("identity provider unavailable", None),
                )
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, ApiResponse::error(msg, None)),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ApiResponse::error(msg, None)),
            ApiError::ValidationError(msg) => (
                StatusCode::BAD_REQUEST,
                ApiResponse::error("validation failed", Some(vec![msg.clone()])),
            ),
            ApiError::DatabaseError(e) => {
                error!(error = %e, "Database error occurred");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiResponse::error("internal error", None),
                )
            }
            ApiError::InternalServer(msg) => {
                error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiResponse::error("internal error", None),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        ApiError::DatabaseError(e)
    }
}

// abuse_middleware.rs
//! Ingress gate: every request passes through the abuse engine before any
//! handler or authentication logic runs.

use crate::common::ApiError;
use crate::services::abuse::{AbuseEngine, AccessDecision};
use axum::{
    extract::{ConnectInfo, Extension, Request},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Extract IP address from request
fn extract_ip_address(
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
) -> Option<String> {
    // Try X-Forwarded-For header first (for proxied requests)
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            // Take the first IP in the chain
            if let Some(first_ip) = forwarded_str.split(',').next() {
                let trimmed = first_ip.trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
            }
        }
    }

    // Try X-Real-IP header
    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            return Some(ip_str.to_string());
        }
    }

    // Fall back to connection info
    connect_info.map(|info| info.0.ip().to_string())
}

/// Abuse-gate middleware
pub async fn abuse_middleware(
    Extension(engine): Extension<Arc<AbuseEngine>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    let headers = request.headers().clone();
    let ip = extract_ip_address(&headers, connect_info.as_ref())
        .unwrap_or_else(|| "unknown".to_string());

    let user_agent = headers
        .get("user-agent")
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);

    let path = request.uri().path().to_string();
    let query = request.uri().query().map(str::to_string);

    match engine
        .check_request(&ip, &path, query.as_deref(), user_agent.as_deref())
        .await
    {
        Ok(AccessDecision::Bypass) | Ok(AccessDecision::Pass) => {
            debug!(ip = %ip, path = %path, "Request passed abuse gate");
            Ok(next.run(request).await)
        }
        Ok(AccessDecision::Throttled { limit, retry_after, reset }) => {
            warn!(
                ip = %ip,
                path = %path,
                retry_after = retry_after,
                "Request throttled by abuse gate"
            );

            // Body and Retry-After come from the error taxonomy; the
            // X-RateLimit family is gate-specific
            let mut response = ApiError::RateLimited { retry_after }.into_response();
            let response_headers = response.headers_mut();
            if let Ok(v) = HeaderValue::from_str(&limit.to_string()) {
                response_headers.insert("x-ratelimit-limit", v);
            }
            response_headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
            if let Ok(v) = HeaderValue::from_str(&reset.to_string()) {
                response_headers.insert("x-ratelimit-reset", v);
            }

            Err(response)
        }
        Ok(AccessDecision::Blocked { reason }) => {
            warn!(ip = %ip, path = %path, reason = ?reason, "Request blocked by abuse gate");
            Err(ApiError::ForbiddenPattern.into_response())
        }
        Err(e) => {
            // Infrastructure failure in the gate itself: log loudly and let
            // the request through rather than taking the API down
            warn!(error = %e, ip = %ip, "Abuse gate errored, allowing request");
            Ok(next.run(request).await)
        }
    }
}

// src/services/provider.rs
//! External OAuth provider client
//!
//! Wraps the provider token endpoints behind a trait so the identity linker
//! can be tested without network access. All calls run against a client with
//! a hard 5-second timeout; a slow provider degrades to re-authentication,
//! never a stalled request pipeline.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

use crate::common::error::ApiError;

const PROVIDER_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider {0} not configured")]
    NotConfigured(&'static str),

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("provider returned malformed response: {0}")]
    MalformedResponse(String),
}

impl From<ProviderError> for ApiError {
    fn from(e: ProviderError) -> Self {
        ApiError::ProviderUnavailable(e.to_string())
    }
}

/// Supported identity providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Facebook,
    Github,
    Twitter,
    Linkedin,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Facebook => "facebook",
            Provider::Github => "github",
            Provider::Twitter => "twitter",
            Provider::Linkedin => "linkedin",
        }
    }

    pub const ALL: [Provider; 5] = [
        Provider::Google,
        Provider::Facebook,
        Provider::Github,
        Provider::Twitter,
        Provider::Linkedin,
    ];

    fn token_endpoint(&self) -> &'static str {
        match self {
            Provider::Google => "https://oauth2.googleapis.com/token",
            Provider::Facebook => "https://graph.facebook.com/v18.0/oauth/access_token",
            Provider::Github => "https://github.com/login/oauth/access_token",
            Provider::Twitter => "https://api.twitter.com/2/oauth2/token",
            Provider::Linkedin => "https://www.linkedin.com/oauth/v2/accessToken",
        }
    }

    fn userinfo_endpoint(&self) -> &'static str {
        match self {
            Provider::Google => "https://openidconnect.googleapis.com/v1/userinfo",
            Provider::Facebook => "https://graph.facebook.com/me?fields=id,email",
            Provider::Github => "https://api.github.com/user",
            Provider::Twitter => "https://api.twitter.com/2/users/me",
            Provider::Linkedin => "https://api.linkedin.com/v2/userinfo",
        }
    }
}

impl FromStr for Provider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "google" => Ok(Provider::Google),
            "facebook" => Ok(Provider::Facebook),
            "github" => Ok(Provider::Github),
            "twitter" => Ok(Provider::Twitter),
            "linkedin" => Ok(Provider::Linkedin),
            _ => Err(()),
        }
    }
}

/// Result of an authorization-code exchange: tokens plus the provider's
/// subject identifier for the user.
#[derive(Debug, Clone)]
pub struct ProviderGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub provider_uid: String,
    pub email: Option<String>,
}

/// Result of a refresh-token call.
#[derive(Debug, Clone)]
pub struct ProviderTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait OAuthProviderClient: Send + Sync {
    async fn exchange_code(
        &self,
        provider: Provider,
        code: &str,
        redirect_uri: &str,
    ) -> Result<ProviderGrant, ProviderError>;

    async fn refresh_token(
        &self,
        provider: Provider,
        refresh_token: &str,
    ) -> Result<ProviderTokens, ProviderError>;
}

#[derive(Debug, Clone)]
struct ProviderCredentials {
    client_id: String,
    client_secret: String,
}

pub struct HttpProviderClient {
    client: Client,
    credentials: HashMap<Provider, ProviderCredentials>,
}

impl HttpProviderClient {
    /// Credentials come from `<PROVIDER>_CLIENT_ID` / `<PROVIDER>_CLIENT_SECRET`
    /// env pairs; providers without both are simply not configured.
    pub fn from_env() -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(PROVIDER_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| Client::new());

        let mut credentials = HashMap::new();
        for provider in Provider::ALL {
            let prefix = provider.as_str().to_uppercase();
            if let (Ok(client_id), Ok(client_secret)) = (
                env::var(format!("{}_CLIENT_ID", prefix)),
                env::var(format!("{}_CLIENT_SECRET", prefix)),
            ) {
                credentials.insert(
                    provider,
                    ProviderCredentials {
                        client_id,
                        client_secret,
                    },
                );
            }
        }

        debug!(configured = credentials.len(), "OAuth provider credentials loaded");
        Self { client, credentials }
    }

    fn creds(&self, provider: Provider) -> Result<&ProviderCredentials, ProviderError> {
        self.credentials
            .get(&provider)
            .ok_or(ProviderError::NotConfigured(provider.as_str()))
    }

    async fn token_request(
        &self,
        provider: Provider,
        form: &[(&str, &str)],
    ) -> Result<serde_json::Value, ProviderError> {
        let response = self
            .client
            .post(provider.token_endpoint())
            .header("accept", "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| {
                warn!(provider = provider.as_str(), error = %e, "Token endpoint unreachable");
                ProviderError::Unavailable(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                provider = provider.as_str(),
                http_status = %status,
                "Token endpoint rejected request"
            );
            return Err(ProviderError::Unavailable(format!("http {}", status)));
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))
    }

    fn parse_tokens(body: &serde_json::Value) -> Result<ProviderTokens, ProviderError> {
        let access_token = body
            .get("access_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProviderError::MalformedResponse("missing access_token".into()))?
            .to_string();

        let refresh_token = body
            .get("refresh_token")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let expires_at = body
            .get("expires_in")
            .and_then(|v| v.as_i64())
            .map(|secs| Utc::now() + Duration::seconds(secs));

        Ok(ProviderTokens {
            access_token,
            refresh_token,
            expires_at,
        })
    }

    async fn fetch_user_info(
        &self,
        provider: Provider,
        access_token: &str,
    ) -> Result<(String, Option<String>), ProviderError> {
        let response = self
            .client
            .get(provider.userinfo_endpoint())
            .bearer_auth(access_token)
            .header("user-agent", "authgate")
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::Unavailable(format!(
                "userinfo http {}",
                response.status()
            )));
        }

        let body = response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        // Twitter nests the object under "data"; the rest are flat
        let body = body.get("data").unwrap_or(&body);

        let uid = body
            .get("sub")
            .or_else(|| body.get("id"))
            .and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .ok_or_else(|| ProviderError::MalformedResponse("missing subject id".into()))?;

        let email = body
            .get("email")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        Ok((uid, email))
    }
}

#[async_trait]
impl OAuthProviderClient for HttpProviderClient {
    async fn exchange_code(
        &self,
        provider: Provider,
        code: &str,
        redirect_uri: &str,
    ) -> Result<ProviderGrant, ProviderError> {
        let creds = self.creds(provider)?;

        let body = self
            .token_request(
                provider,
                &[
                    ("grant_type", "authorization_code"),
                    ("code", code),
                    ("redirect_uri", redirect_uri),
                    ("client_id", &creds.client_id),
                    ("client_secret", &creds.client_secret),
                ],
            )
            .await?;

        let tokens = Self::parse_tokens(&body)?;
        let (provider_uid, email) = self.fetch_user_info(provider, &tokens.access_token).await?;

        debug!(
            provider = provider.as_str(),
            provider_uid = %provider_uid,
            "Authorization code exchanged"
        );

        Ok(ProviderGrant {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at: tokens.expires_at,
            provider_uid,
            email,
        })
    }

    async fn refresh_token(
        &self,
        provider: Provider,
        refresh_token: &str,
    ) -> Result<ProviderTokens, ProviderError> {
        let creds = self.creds(provider)?;

        let body = self
            .token_request(
                provider,
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token),
                    ("client_id", &creds.client_id),
                    ("client_secret", &creds.client_secret),
                ],
            )
            .await?;

        Self::parse_tokens(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_from_str() {
        assert_eq!(Provider::from_str("google"), Ok(Provider::Google));
        assert_eq!(Provider::from_str("GitHub"), Ok(Provider::Github));
        assert!(Provider::from_str("myspace").is_err());
    }

    #[test]
    fn test_parse_tokens_full_response() {
        let body = serde_json::json!({
            "access_token": "at-123",
            "refresh_token": "rt-456",
            "expires_in": 3600,
            "token_type": "Bearer"
        });
        let tokens = HttpProviderClient::parse_tokens(&body).unwrap();
        assert_eq!(tokens.access_token, "at-123");
        assert_eq!(tokens.refresh_token, Some("rt-456".to_string()));
        assert!(tokens.expires_at.is_some());
    }

    #[test]
    fn test_parse_tokens_without_refresh() {
        let body = serde_json::json!({ "access_token": "at-only" });
        let tokens = HttpProviderClient::parse_tokens(&body).unwrap();
        assert_eq!(tokens.refresh_token, None);
        assert_eq!(tokens.expires_at, None);
    }

    #[test]
    fn test_parse_tokens_missing_access_token() {
        let body = serde_json::json!({ "error": "invalid_grant" });
        assert!(matches!(
            HttpProviderClient::parse_tokens(&body),
            Err(ProviderError::MalformedResponse(_))
        ));
    }
}

//! OAuth callback data models

use serde::Deserialize;

/// Authorization-code callback payload for POST /api/auth/oauth/:provider
#[derive(Deserialize)]
pub struct OAuthCallbackPayload {
    pub code: String,
    pub redirect_uri: Option<String>,
}

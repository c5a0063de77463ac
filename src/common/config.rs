// src/common/config.rs
//! Runtime profile and per-service configuration loaded from the environment

use std::env;
use tracing::info;

/// Deployment profile. Controls threshold defaults and how aggressive the
/// pattern blocker is allowed to be (suspicious user-agents are only blocked
/// in production to avoid false positives against local tooling).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Production,
    Development,
}

impl Profile {
    pub fn from_env() -> Self {
        match env::var("APP_PROFILE")
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
            .as_str()
        {
            "production" | "prod" => Profile::Production,
            _ => Profile::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Profile::Production)
    }
}

/// Token signing configuration. The signing secret is process-wide and never
/// request-supplied.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "replace_with_strong_secret".to_string(),
            access_ttl_secs: 3600,        // 1 hour
            refresh_ttl_secs: 7 * 86_400, // 7 days
        }
    }
}

impl AuthConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(secret) = env::var("JWT_SECRET") {
            config.jwt_secret = secret;
        }
        if let Ok(ttl) = env::var("ACCESS_TOKEN_TTL_SECONDS") {
            if let Ok(val) = ttl.parse::<i64>() {
                config.access_ttl_secs = val;
            }
        }
        if let Ok(ttl) = env::var("REFRESH_TOKEN_TTL_SECONDS") {
            if let Ok(val) = ttl.parse::<i64>() {
                config.refresh_ttl_secs = val;
            }
        }

        config
    }
}

/// Abuse-mitigation configuration.
///
/// Window length is deliberately a parameter rather than a constant; the
/// thresholds are interpreted per window.
#[derive(Debug, Clone)]
pub struct AbuseConfig {
    pub enabled: bool,
    pub login_limit: u32,
    pub general_api_limit: u32,
    pub window_seconds: u64,
    pub pattern_matching_enabled: bool,
    pub strict_user_agent: bool,
    pub list_ttl_days: i64,
    pub list_cache_secs: u64,
    pub throttle_score_weight: i64,
    pub pattern_score_weight: i64,
    pub reputation_ttl_secs: u64,
}

impl AbuseConfig {
    pub fn defaults_for(profile: Profile) -> Self {
        match profile {
            Profile::Production => Self {
                enabled: true,
                login_limit: 5,
                general_api_limit: 100,
                window_seconds: 60,
                pattern_matching_enabled: true,
                strict_user_agent: true,
                list_ttl_days: 30,
                list_cache_secs: 30,
                throttle_score_weight: 1,
                pattern_score_weight: 10,
                reputation_ttl_secs: 86_400,
            },
            Profile::Development => Self {
                login_limit: 50,
                general_api_limit: 1000,
                strict_user_agent: false,
                ..Self::defaults_for(Profile::Production)
            },
        }
    }

    /// Load configuration from environment variables, starting from the
    /// profile defaults.
    pub fn from_env(profile: Profile) -> Self {
        let mut config = Self::defaults_for(profile);

        // ABUSE_ENABLED - set to "false" to disable the gate entirely
        if let Ok(enabled) = env::var("ABUSE_ENABLED") {
            config.enabled = enabled.to_lowercase() != "false";
        }

        // ABUSE_LOGIN_LIMIT - login attempts per window per IP
        if let Ok(limit) = env::var("ABUSE_LOGIN_LIMIT") {
            if let Ok(val) = limit.parse::<u32>() {
                config.login_limit = val;
            }
        }

        // ABUSE_API_LIMIT - general API calls per window per IP
        if let Ok(limit) = env::var("ABUSE_API_LIMIT") {
            if let Ok(val) = limit.parse::<u32>() {
                config.general_api_limit = val;
            }
        }

        // ABUSE_WINDOW_SECONDS - counting window length
        if let Ok(window) = env::var("ABUSE_WINDOW_SECONDS") {
            if let Ok(val) = window.parse::<u64>() {
                if val > 0 {
                    config.window_seconds = val;
                }
            }
        }

        // ABUSE_PATTERN_MATCHING - set to "false" to pass suspicious payloads through
        if let Ok(v) = env::var("ABUSE_PATTERN_MATCHING") {
            config.pattern_matching_enabled = v.to_lowercase() != "false";
        }

        // ABUSE_STRICT_USER_AGENT - block scanner user-agents
        if let Ok(v) = env::var("ABUSE_STRICT_USER_AGENT") {
            config.strict_user_agent = v.to_lowercase() == "true";
        }

        // ABUSE_LIST_TTL_DAYS - allow/block list entry lifetime
        if let Ok(days) = env::var("ABUSE_LIST_TTL_DAYS") {
            if let Ok(val) = days.parse::<i64>() {
                config.list_ttl_days = val;
            }
        }

        // ABUSE_REPUTATION_TTL_SECONDS - behavior record lifetime
        if let Ok(ttl) = env::var("ABUSE_REPUTATION_TTL_SECONDS") {
            if let Ok(val) = ttl.parse::<u64>() {
                config.reputation_ttl_secs = val;
            }
        }

        config
    }
}

/// Print the active profile on startup
pub fn print_profile_status(profile: Profile, abuse: &AbuseConfig) {
    info!(
        profile = ?profile,
        abuse_enabled = abuse.enabled,
        login_limit = abuse.login_limit,
        general_api_limit = abuse.general_api_limit,
        window_seconds = abuse.window_seconds,
        pattern_matching = abuse.pattern_matching_enabled,
        "Runtime profile loaded"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_defaults() {
        let config = AbuseConfig::defaults_for(Profile::Production);
        assert_eq!(config.login_limit, 5);
        assert_eq!(config.general_api_limit, 100);
        assert!(config.strict_user_agent);
        assert!(config.pattern_matching_enabled);
    }

    #[test]
    fn test_development_relaxes_thresholds() {
        let config = AbuseConfig::defaults_for(Profile::Development);
        assert_eq!(config.login_limit, 50);
        assert_eq!(config.general_api_limit, 1000);
        assert!(!config.strict_user_agent);
        // Pattern matching stays on by default even in development
        assert!(config.pattern_matching_enabled);
    }

    #[test]
    fn test_auth_config_defaults() {
        let config = AuthConfig::default();
        assert_eq!(config.access_ttl_secs, 3600);
        assert_eq!(config.refresh_ttl_secs, 604_800);
    }
}

// src/services/abuse.rs
//! Abuse mitigation engine
//!
//! Classifies every inbound request by source IP before any handler runs.
//! Evaluation order per request:
//! allow-list (bypass) → block-list (deny) → pattern scan (deny) →
//! sliding-window counter (throttle) → pass.
//!
//! Counters use a two-bucket sliding window: the previous bucket's count is
//! weighted by the unelapsed fraction of the current window and added to the
//! current bucket. A fixed window would let 2×threshold requests straddle a
//! boundary undetected; the weighting closes that gap.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::common::config::AbuseConfig;
use crate::common::generate_audit_id;

use super::store::CacheStore;

/// Request category for windowed counting. Login-shaped endpoints get the
/// tight threshold; everything else counts as general API traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Login,
    GeneralApi,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Login => "login",
            Category::GeneralApi => "general_api",
        }
    }

    pub fn from_path(path: &str) -> Self {
        if path.starts_with("/api/auth/login")
            || path.starts_with("/api/auth/oauth")
            || path.starts_with("/api/auth/forgot-password")
        {
            Category::Login
        } else {
            Category::GeneralApi
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Allowed,
    Throttled,
    Blocked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    BlockList,
    Pattern(&'static str),
}

/// Verdict for one request.
#[derive(Debug)]
pub enum AccessDecision {
    /// Allow-listed: bypasses counting and pattern checks entirely.
    Bypass,
    Pass,
    Throttled {
        limit: u32,
        retry_after: u64,
        reset: i64,
    },
    Blocked {
        reason: BlockReason,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationEvent {
    pub kind: String,
    pub detail: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct IpReputation {
    pub ip: String,
    pub score: i64,
    pub classification: Classification,
    pub history: Vec<ViolationEvent>,
}

const HISTORY_CAP: usize = 20;

pub struct AbuseEngine {
    config: AbuseConfig,
    db: SqlitePool,
    store: Arc<dyn CacheStore>,
    signatures: Vec<(&'static str, Regex)>,
    ua_signature: Regex,
}

/// Built-in attack signatures: SQL injection, script-tag injection, and
/// path-traversal sequences.
pub fn default_signatures() -> Vec<(&'static str, Regex)> {
    vec![
        (
            "sql_injection",
            Regex::new(
                r"(?i)(\bunion\b[\s\S]{0,64}\bselect\b|\bor\b\s+\d+\s*=\s*\d+|'\s*or\s*'|\bdrop\s+table\b|;\s*--)",
            )
            .expect("sql injection signature"),
        ),
        (
            "script_injection",
            Regex::new(r"(?i)(<\s*script|javascript\s*:)").expect("script signature"),
        ),
        (
            "path_traversal",
            Regex::new(r"(?i)(\.\.[/\\]|%2e%2e)").expect("traversal signature"),
        ),
    ]
}

impl AbuseEngine {
    pub fn new(config: AbuseConfig, db: SqlitePool, store: Arc<dyn CacheStore>) -> Self {
        Self::with_signatures(config, db, store, default_signatures())
    }

    /// Construct with a caller-supplied signature set instead of the
    /// defaults.
    pub fn with_signatures(
        config: AbuseConfig,
        db: SqlitePool,
        store: Arc<dyn CacheStore>,
        signatures: Vec<(&'static str, Regex)>,
    ) -> Self {
        let ua_signature = Regex::new(
            r"(?i)(sqlmap|nikto|nessus|masscan|dirbuster|gobuster|hydra|acunetix|wpscan)",
        )
        .expect("user-agent signature");

        Self {
            config,
            db,
            store,
            signatures,
            ua_signature,
        }
    }

    /// Classify one inbound request. Errors here come only from the list
    /// tables; the caller decides its failure policy.
    pub async fn check_request(
        &self,
        ip: &str,
        path: &str,
        query: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<AccessDecision, sqlx::Error> {
        if !self.config.enabled {
            return Ok(AccessDecision::Pass);
        }

        if self.is_allow_listed(ip).await? {
            return Ok(AccessDecision::Bypass);
        }

        if self.block_list_reason(ip).await?.is_some() {
            debug!(ip = %ip, "Request denied by block list");
            return Ok(AccessDecision::Blocked {
                reason: BlockReason::BlockList,
            });
        }

        if self.config.pattern_matching_enabled {
            if let Some(label) = self.scan(path, query, user_agent) {
                warn!(ip = %ip, path = %path, signature = label, "Request matched attack signature");
                self.record_violation(ip, label, path, self.config.pattern_score_weight)
                    .await;
                return Ok(AccessDecision::Blocked {
                    reason: BlockReason::Pattern(label),
                });
            }
        }

        let category = Category::from_path(path);
        let limit = self.limit_for(category);
        let now_ts = Utc::now().timestamp();
        let window = self.config.window_seconds as i64;
        let bucket = now_ts / window;
        let in_window = now_ts % window;

        let current = self
            .store
            .incr_by(
                &counter_key(category, ip, bucket),
                1,
                Duration::from_secs(self.config.window_seconds * 2),
            )
            .await;
        let previous = self.get_count(&counter_key(category, ip, bucket - 1)).await;

        let fraction = in_window as f64 / window as f64;
        let weighted = previous as f64 * (1.0 - fraction) + current as f64;

        self.touch(ip).await;

        if weighted > limit as f64 {
            let retry_after = (window - in_window).max(1) as u64;
            self.record_violation(ip, "rate_limit", category.as_str(), self.config.throttle_score_weight)
                .await;
            return Ok(AccessDecision::Throttled {
                limit,
                retry_after,
                reset: (bucket + 1) * window,
            });
        }

        Ok(AccessDecision::Pass)
    }

    /// Reputation snapshot for an IP: accumulated score, what the engine
    /// would currently do with its next plain request, and recent violations.
    pub async fn check_ip_reputation(&self, ip: &str) -> Result<IpReputation, sqlx::Error> {
        let score = self.get_count(&format!("rep:score:{}", ip)).await;

        let classification = if self.block_list_reason(ip).await?.is_some() {
            Classification::Blocked
        } else if self.currently_throttled(ip).await {
            Classification::Throttled
        } else {
            Classification::Allowed
        };

        let history = self
            .store
            .get(&format!("rep:hist:{}", ip))
            .await
            .and_then(|raw| serde_json::from_str::<Vec<ViolationEvent>>(&raw).ok())
            .unwrap_or_default();

        Ok(IpReputation {
            ip: ip.to_string(),
            score,
            classification,
            history,
        })
    }

    /// Idempotent allow-list upsert with the configured TTL. Durably audited.
    pub async fn whitelist(&self, ip: &str, actor: &str) -> Result<(), sqlx::Error> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO ip_allow_list (ip, created_by, created_at, expires_at) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT(ip) DO UPDATE SET \
                 created_by = excluded.created_by, \
                 created_at = excluded.created_at, \
                 expires_at = excluded.expires_at",
        )
        .bind(ip)
        .bind(actor)
        .bind(now)
        .bind(now + chrono::Duration::days(self.config.list_ttl_days))
        .execute(&self.db)
        .await?;

        self.store.delete(&format!("al:{}", ip)).await;
        self.audit(actor, "allowlist_add", ip, None).await?;
        Ok(())
    }

    /// Idempotent block-list upsert with the configured TTL. Durably audited.
    pub async fn blacklist(&self, ip: &str, reason: &str, actor: &str) -> Result<(), sqlx::Error> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO ip_block_list (ip, reason, created_by, created_at, expires_at) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(ip) DO UPDATE SET \
                 reason = excluded.reason, \
                 created_by = excluded.created_by, \
                 created_at = excluded.created_at, \
                 expires_at = excluded.expires_at",
        )
        .bind(ip)
        .bind(reason)
        .bind(actor)
        .bind(now)
        .bind(now + chrono::Duration::days(self.config.list_ttl_days))
        .execute(&self.db)
        .await?;

        self.store.delete(&format!("bl:{}", ip)).await;
        self.audit(actor, "blocklist_add", ip, Some(reason)).await?;
        Ok(())
    }

    /// Wipe an IP's behavior record and list entries. Durably audited.
    pub async fn clear_history(&self, ip: &str, actor: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM ip_allow_list WHERE ip = ?")
            .bind(ip)
            .execute(&self.db)
            .await?;
        sqlx::query("DELETE FROM ip_block_list WHERE ip = ?")
            .bind(ip)
            .execute(&self.db)
            .await?;

        for key in [
            format!("al:{}", ip),
            format!("bl:{}", ip),
            format!("rep:score:{}", ip),
            format!("rep:hist:{}", ip),
            format!("rep:seen:{}", ip),
        ] {
            self.store.delete(&key).await;
        }

        // Current and previous window buckets for both categories
        let window = self.config.window_seconds as i64;
        let bucket = Utc::now().timestamp() / window;
        for category in [Category::Login, Category::GeneralApi] {
            self.store.delete(&counter_key(category, ip, bucket)).await;
            self.store
                .delete(&counter_key(category, ip, bucket - 1))
                .await;
        }

        self.audit(actor, "clear_history", ip, None).await?;
        Ok(())
    }

    // ---- internals ----

    fn limit_for(&self, category: Category) -> u32 {
        match category {
            Category::Login => self.config.login_limit,
            Category::GeneralApi => self.config.general_api_limit,
        }
    }

    fn scan(&self, path: &str, query: Option<&str>, user_agent: Option<&str>) -> Option<&'static str> {
        let decoded_query = query.map(|q| {
            urlencoding::decode(q)
                .map(|cow| cow.into_owned())
                .unwrap_or_else(|_| q.to_string())
        });

        for (label, signature) in &self.signatures {
            if signature.is_match(path) {
                return Some(*label);
            }
            if let Some(q) = decoded_query.as_deref() {
                if signature.is_match(q) {
                    return Some(*label);
                }
            }
        }

        // Scanner user-agents only count against the stricter profile
        if self.config.strict_user_agent {
            if let Some(ua) = user_agent {
                if self.ua_signature.is_match(ua) {
                    return Some("suspicious_user_agent");
                }
            }
        }

        None
    }

    async fn is_allow_listed(&self, ip: &str) -> Result<bool, sqlx::Error> {
        let key = format!("al:{}", ip);
        if let Some(cached) = self.store.get(&key).await {
            return Ok(cached == "1");
        }

        let row: Option<(String,)> =
            sqlx::query_as("SELECT ip FROM ip_allow_list WHERE ip = ? AND expires_at > ?")
                .bind(ip)
                .bind(Utc::now())
                .fetch_optional(&self.db)
                .await?;

        let listed = row.is_some();
        self.store
            .set(
                &key,
                if listed { "1" } else { "0" },
                Duration::from_secs(self.config.list_cache_secs),
            )
            .await;
        Ok(listed)
    }

    async fn block_list_reason(&self, ip: &str) -> Result<Option<String>, sqlx::Error> {
        let key = format!("bl:{}", ip);
        if let Some(cached) = self.store.get(&key).await {
            return Ok(if cached == "-" { None } else { Some(cached) });
        }

        let row: Option<(String,)> =
            sqlx::query_as("SELECT reason FROM ip_block_list WHERE ip = ? AND expires_at > ?")
                .bind(ip)
                .bind(Utc::now())
                .fetch_optional(&self.db)
                .await?;

        let reason = row.map(|(reason,)| reason);
        self.store
            .set(
                &key,
                reason.as_deref().unwrap_or("-"),
                Duration::from_secs(self.config.list_cache_secs),
            )
            .await;
        Ok(reason)
    }

    async fn currently_throttled(&self, ip: &str) -> bool {
        let now_ts = Utc::now().timestamp();
        let window = self.config.window_seconds as i64;
        let bucket = now_ts / window;
        let fraction = (now_ts % window) as f64 / window as f64;

        for category in [Category::Login, Category::GeneralApi] {
            let current = self.get_count(&counter_key(category, ip, bucket)).await;
            let previous = self.get_count(&counter_key(category, ip, bucket - 1)).await;
            let weighted = previous as f64 * (1.0 - fraction) + current as f64;
            if weighted > self.limit_for(category) as f64 {
                return true;
            }
        }
        false
    }

    async fn get_count(&self, key: &str) -> i64 {
        self.store
            .get(key)
            .await
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0)
    }

    /// Accumulate score and append to the capped history list. The score has
    /// no self-decay: it lives until clear_history or the record TTL lapses.
    async fn record_violation(&self, ip: &str, kind: &str, detail: &str, weight: i64) {
        let ttl = Duration::from_secs(self.config.reputation_ttl_secs);
        let score = self
            .store
            .incr_by(&format!("rep:score:{}", ip), weight, ttl)
            .await;

        let hist_key = format!("rep:hist:{}", ip);
        let mut history = self
            .store
            .get(&hist_key)
            .await
            .and_then(|raw| serde_json::from_str::<Vec<ViolationEvent>>(&raw).ok())
            .unwrap_or_default();
        history.push(ViolationEvent {
            kind: kind.to_string(),
            detail: detail.to_string(),
            at: Utc::now(),
        });
        if history.len() > HISTORY_CAP {
            let overflow = history.len() - HISTORY_CAP;
            history.drain(..overflow);
        }
        if let Ok(raw) = serde_json::to_string(&history) {
            self.store.set(&hist_key, &raw, ttl).await;
        }

        debug!(ip = %ip, kind = kind, score = score, "Recorded abuse violation");
    }

    async fn touch(&self, ip: &str) {
        self.store
            .set(
                &format!("rep:seen:{}", ip),
                &Utc::now().to_rfc3339(),
                Duration::from_secs(self.config.reputation_ttl_secs),
            )
            .await;
    }

    async fn audit(
        &self,
        actor: &str,
        action: &str,
        ip: &str,
        reason: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO audit_log (id, actor, action, ip, reason, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(generate_audit_id())
        .bind(actor)
        .bind(action)
        .bind(ip)
        .bind(reason)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        info!(actor = %actor, action = action, ip = %ip, reason = ?reason, "Abuse list change");
        Ok(())
    }
}

fn counter_key(category: Category, ip: &str, bucket: i64) -> String {
    format!("rl:{}:{}:{}", category.as_str(), ip, bucket)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::Profile;
    use crate::common::migrations;
    use crate::services::store::MemoryStore;

    async fn make_engine(config: AbuseConfig) -> (AbuseEngine, SqlitePool) {
        // Single connection: a pooled :memory: database is per-connection
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let engine = AbuseEngine::new(config, pool.clone(), Arc::new(MemoryStore::new()));
        (engine, pool)
    }

    fn production_config() -> AbuseConfig {
        AbuseConfig::defaults_for(Profile::Production)
    }

    #[tokio::test]
    async fn test_sixth_login_attempt_throttled_fifth_not() {
        let (engine, _) = make_engine(production_config()).await;

        for attempt in 1..=5 {
            let decision = engine
                .check_request("198.51.100.1", "/api/auth/login", None, None)
                .await
                .unwrap();
            assert!(
                matches!(decision, AccessDecision::Pass),
                "attempt {} should pass",
                attempt
            );
        }

        let decision = engine
            .check_request("198.51.100.1", "/api/auth/login", None, None)
            .await
            .unwrap();
        match decision {
            AccessDecision::Throttled { limit, retry_after, reset } => {
                assert_eq!(limit, 5);
                assert!(retry_after >= 1);
                assert!(reset > Utc::now().timestamp());
            }
            other => panic!("expected Throttled, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_limits_are_per_ip() {
        let (engine, _) = make_engine(production_config()).await;

        for _ in 0..6 {
            engine
                .check_request("198.51.100.2", "/api/auth/login", None, None)
                .await
                .unwrap();
        }

        // A different IP is unaffected
        let decision = engine
            .check_request("198.51.100.3", "/api/auth/login", None, None)
            .await
            .unwrap();
        assert!(matches!(decision, AccessDecision::Pass));
    }

    #[tokio::test]
    async fn test_allow_listed_ip_survives_heavy_traffic() {
        let (engine, _) = make_engine(production_config()).await;
        engine.whitelist("203.0.113.5", "ops@example.com").await.unwrap();

        for _ in 0..1000 {
            let decision = engine
                .check_request("203.0.113.5", "/api/v1/things", None, None)
                .await
                .unwrap();
            assert!(matches!(decision, AccessDecision::Bypass));
        }

        // Even attack signatures pass for allow-listed sources
        let decision = engine
            .check_request("203.0.113.5", "/api/v1/users", Some("id=1 OR 1=1"), None)
            .await
            .unwrap();
        assert!(matches!(decision, AccessDecision::Bypass));
    }

    #[tokio::test]
    async fn test_block_listed_ip_denied_with_zero_prior_requests() {
        let (engine, _) = make_engine(production_config()).await;
        engine
            .blacklist("192.0.2.9", "credential stuffing", "ops@example.com")
            .await
            .unwrap();

        let decision = engine
            .check_request("192.0.2.9", "/api/v1/things", None, None)
            .await
            .unwrap();
        assert!(matches!(
            decision,
            AccessDecision::Blocked { reason: BlockReason::BlockList }
        ));
    }

    #[tokio::test]
    async fn test_sql_injection_query_blocked_when_enforced() {
        let (engine, _) = make_engine(production_config()).await;

        let decision = engine
            .check_request("198.51.100.4", "/api/v1/users", Some("id=1 OR 1=1"), None)
            .await
            .unwrap();
        assert!(matches!(
            decision,
            AccessDecision::Blocked { reason: BlockReason::Pattern("sql_injection") }
        ));

        // URL-encoded form is decoded before matching
        let decision = engine
            .check_request("198.51.100.4", "/api/v1/users", Some("id=1%20OR%201%3D1"), None)
            .await
            .unwrap();
        assert!(matches!(decision, AccessDecision::Blocked { .. }));
    }

    #[tokio::test]
    async fn test_sql_injection_passes_with_enforcement_off() {
        let config = AbuseConfig {
            pattern_matching_enabled: false,
            ..production_config()
        };
        let (engine, _) = make_engine(config).await;

        let decision = engine
            .check_request("198.51.100.5", "/api/v1/users", Some("id=1 OR 1=1"), None)
            .await
            .unwrap();
        assert!(matches!(decision, AccessDecision::Pass));
    }

    #[tokio::test]
    async fn test_traversal_and_script_signatures() {
        let (engine, _) = make_engine(production_config()).await;

        let decision = engine
            .check_request("198.51.100.6", "/files/../../etc/passwd", None, None)
            .await
            .unwrap();
        assert!(matches!(
            decision,
            AccessDecision::Blocked { reason: BlockReason::Pattern("path_traversal") }
        ));

        let decision = engine
            .check_request(
                "198.51.100.6",
                "/api/v1/comments",
                Some("body=%3Cscript%3Ealert(1)%3C/script%3E"),
                None,
            )
            .await
            .unwrap();
        assert!(matches!(
            decision,
            AccessDecision::Blocked { reason: BlockReason::Pattern("script_injection") }
        ));
    }

    #[tokio::test]
    async fn test_scanner_user_agent_blocked_only_under_strict_profile() {
        let (engine, _) = make_engine(production_config()).await;
        let decision = engine
            .check_request("198.51.100.7", "/api/v1/things", None, Some("sqlmap/1.7"))
            .await
            .unwrap();
        assert!(matches!(
            decision,
            AccessDecision::Blocked { reason: BlockReason::Pattern("suspicious_user_agent") }
        ));

        let relaxed = AbuseConfig {
            strict_user_agent: false,
            ..production_config()
        };
        let (engine, _) = make_engine(relaxed).await;
        let decision = engine
            .check_request("198.51.100.7", "/api/v1/things", None, Some("sqlmap/1.7"))
            .await
            .unwrap();
        assert!(matches!(decision, AccessDecision::Pass));
    }

    #[tokio::test]
    async fn test_reputation_weights_and_history() {
        let (engine, _) = make_engine(production_config()).await;
        let ip = "198.51.100.8";

        // One pattern hit: large weight
        engine
            .check_request(ip, "/api/v1/users", Some("id=1 OR 1=1"), None)
            .await
            .unwrap();
        let rep = engine.check_ip_reputation(ip).await.unwrap();
        assert_eq!(rep.score, 10);
        assert_eq!(rep.history.len(), 1);
        assert_eq!(rep.history[0].kind, "sql_injection");

        // Throttle events: small weight each
        for _ in 0..7 {
            engine.check_request(ip, "/api/auth/login", None, None).await.unwrap();
        }
        let rep = engine.check_ip_reputation(ip).await.unwrap();
        assert_eq!(rep.score, 12); // 10 + 2 throttled attempts
        assert_eq!(rep.classification, Classification::Throttled);
    }

    #[tokio::test]
    async fn test_reputation_classification_for_clean_and_blocked() {
        let (engine, _) = make_engine(production_config()).await;

        let rep = engine.check_ip_reputation("203.0.113.77").await.unwrap();
        assert_eq!(rep.score, 0);
        assert_eq!(rep.classification, Classification::Allowed);
        assert!(rep.history.is_empty());

        engine
            .blacklist("203.0.113.77", "manual", "ops@example.com")
            .await
            .unwrap();
        let rep = engine.check_ip_reputation("203.0.113.77").await.unwrap();
        assert_eq!(rep.classification, Classification::Blocked);
    }

    #[tokio::test]
    async fn test_clear_history_resets_everything() {
        let (engine, pool) = make_engine(production_config()).await;
        let ip = "198.51.100.9";

        engine
            .check_request(ip, "/api/v1/users", Some("id=1 OR 1=1"), None)
            .await
            .unwrap();
        engine.blacklist(ip, "pattern abuse", "ops@example.com").await.unwrap();
        engine.clear_history(ip, "ops@example.com").await.unwrap();

        let rep = engine.check_ip_reputation(ip).await.unwrap();
        assert_eq!(rep.score, 0);
        assert_eq!(rep.classification, Classification::Allowed);
        assert!(rep.history.is_empty());

        // Back to normal traffic
        let decision = engine
            .check_request(ip, "/api/v1/things", None, None)
            .await
            .unwrap();
        assert!(matches!(decision, AccessDecision::Pass));

        // Both operator actions are on the durable audit trail
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM audit_log WHERE ip = ?")
            .bind(ip)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 2); // blocklist_add + clear_history

        let actions: Vec<(String,)> =
            sqlx::query_as("SELECT action FROM audit_log WHERE ip = ? ORDER BY created_at")
                .bind(ip)
                .fetch_all(&pool)
                .await
                .unwrap();
        assert_eq!(actions[0].0, "blocklist_add");
        assert_eq!(actions[1].0, "clear_history");
    }

    #[tokio::test]
    async fn test_whitelist_is_idempotent() {
        let (engine, pool) = make_engine(production_config()).await;

        engine.whitelist("203.0.113.50", "ops@example.com").await.unwrap();
        engine.whitelist("203.0.113.50", "ops2@example.com").await.unwrap();

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM ip_allow_list")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 1);

        // Latest operator wins on the row, both actions audited
        let row: (String,) =
            sqlx::query_as("SELECT created_by FROM ip_allow_list WHERE ip = '203.0.113.50'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(row.0, "ops2@example.com");
    }

    #[tokio::test]
    async fn test_list_entries_carry_thirty_day_ttl() {
        let (engine, pool) = make_engine(production_config()).await;
        engine.whitelist("203.0.113.51", "ops@example.com").await.unwrap();

        let (created_at, expires_at): (DateTime<Utc>, DateTime<Utc>) = sqlx::query_as(
            "SELECT created_at, expires_at FROM ip_allow_list WHERE ip = '203.0.113.51'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!((expires_at - created_at).num_days(), 30);
    }

    #[tokio::test]
    async fn test_disabled_engine_passes_everything() {
        let config = AbuseConfig {
            enabled: false,
            ..production_config()
        };
        let (engine, _) = make_engine(config).await;

        for _ in 0..50 {
            let decision = engine
                .check_request("198.51.100.10", "/api/auth/login", Some("id=1 OR 1=1"), None)
                .await
                .unwrap();
            assert!(matches!(decision, AccessDecision::Pass));
        }
    }
}

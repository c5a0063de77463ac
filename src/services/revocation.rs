// src/services/revocation.rs
//! Revoked-token denylist
//!
//! Tracks revoked token identifiers (jti) until the token they belong to
//! would have expired anyway. Entries carry the token's own expiry as their
//! TTL, so the list never needs to remember a token longer than the token
//! could live.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

use super::store::CacheStore;

const KEY_PREFIX: &str = "revoked:";

#[derive(Clone)]
pub struct RevocationList {
    store: Arc<dyn CacheStore>,
}

impl RevocationList {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Record a jti as revoked until `expires_at`. A jti whose expiry is
    /// already in the past needs no entry: verification rejects it as
    /// expired before the revocation check runs.
    pub async fn add(&self, jti: &str, expires_at: DateTime<Utc>) {
        let remaining = expires_at - Utc::now();
        let Ok(ttl) = remaining.to_std() else {
            debug!(jti = %jti, "Skipping revocation entry for already-expired token");
            return;
        };
        self.store
            .set(&format!("{}{}", KEY_PREFIX, jti), "1", ttl)
            .await;
    }

    /// O(1) amortized lookup; an expired entry reads as not-revoked and is
    /// dropped on the miss path by the store.
    pub async fn is_revoked(&self, jti: &str) -> bool {
        self.store
            .get(&format!("{}{}", KEY_PREFIX, jti))
            .await
            .is_some()
    }

    /// Sweep expired entries. Driven by the shared maintenance task.
    pub async fn prune(&self) {
        self.store.prune().await;
    }
}

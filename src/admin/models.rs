//! Admin data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Deserialize)]
pub struct AllowListPayload {
    pub ip: String,
}

#[derive(Deserialize)]
pub struct BlockListPayload {
    pub ip: String,
    pub reason: String,
}

/// One row of the durable operator audit trail
#[derive(FromRow, Serialize, Debug)]
pub struct AuditEntry {
    pub id: String,
    pub actor: String,
    pub action: String,
    pub ip: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

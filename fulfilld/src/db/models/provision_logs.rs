//! Row types for the append-only `provision_logs` audit table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Which provision table a log row refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ProvisionType {
    Hosting,
    Vpn,
}

impl ProvisionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisionType::Hosting => "hosting",
            ProvisionType::Vpn => "vpn",
        }
    }
}

impl std::fmt::Display for ProvisionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ProvisionLog {
    pub id: Uuid,
    pub provision_id: Uuid,
    pub provision_type: ProvisionType,
    pub action: String,
    pub status: String,
    pub message: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

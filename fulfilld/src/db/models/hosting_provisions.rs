//! Row and request types for the `hosting_provisions` table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle of a hosting provision.
///
/// Transitions are monotonic forward except for `failed -> deleted`, which
/// the auto-cleanup path uses so the user can retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum HostingStatus {
    Pending,
    Creating,
    Running,
    Installing,
    Active,
    Stopping,
    Stopped,
    Deleted,
    Failed,
}

impl HostingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostingStatus::Pending => "pending",
            HostingStatus::Creating => "creating",
            HostingStatus::Running => "running",
            HostingStatus::Installing => "installing",
            HostingStatus::Active => "active",
            HostingStatus::Stopping => "stopping",
            HostingStatus::Stopped => "stopped",
            HostingStatus::Deleted => "deleted",
            HostingStatus::Failed => "failed",
        }
    }

    /// Statuses where the node is still being brought up.
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            HostingStatus::Pending
                | HostingStatus::Creating
                | HostingStatus::Running
                | HostingStatus::Installing
        )
    }
}

impl std::fmt::Display for HostingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user's VPS node within a subscription, one fulfillment lifetime per row.
#[derive(Debug, Clone, FromRow)]
pub struct HostingProvision {
    pub id: Uuid,
    pub subscription_id: String,
    pub user_id: String,
    pub channel: String,

    pub hosting_node_id: Option<String>,
    pub provider: String,
    pub region: String,

    pub public_ip: Option<String>,
    pub api_port: Option<i32>,
    pub api_key: Option<String>,
    pub vless_port: Option<i32>,
    pub ss_port: Option<i32>,
    pub public_key: Option<String>,
    pub short_id: Option<String>,

    pub status: HostingStatus,
    pub error_message: Option<String>,
    pub plan_tier: String,
    pub traffic_limit: i64,
    pub traffic_used: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ready_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

pub struct HostingProvisionCreateDBRequest {
    pub id: Uuid,
    pub subscription_id: String,
    pub user_id: String,
    pub channel: String,
    pub provider: String,
    pub region: String,
    pub status: HostingStatus,
    pub plan_tier: String,
    pub traffic_limit: i64,
}

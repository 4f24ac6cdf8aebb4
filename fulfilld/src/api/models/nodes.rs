//! User-facing node status types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Top-level hosting state the frontend switches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostingState {
    NoSubscription,
    SubscribedNoNode,
    NodeCreating,
    NodeActive,
    NodeFailed,
    SubscriptionExpired,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserNodeStatusResponse {
    pub hosting_status: HostingState,

    pub has_subscription: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<SubscriptionInfo>,

    pub has_node: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<UserNodeInfo>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_progress: Option<NodeCreationProgress>,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionInfo {
    pub subscription_id: String,
    pub status: String,
    pub plan_tier: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub expires_at: String,
    pub auto_renew: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeCreationProgress {
    pub current_step: u8,
    pub total_steps: u8,
    pub step_name: String,
    pub steps: Vec<NodeCreationStep>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeCreationStep {
    pub step: u8,
    pub name: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserNodeInfo {
    pub resource_id: Uuid,
    pub region: String,
    pub region_name: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_port: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vless_port: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ss_port: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_id: Option<String>,
    pub plan_tier: String,
    pub traffic_limit_gb: f64,
    pub traffic_used_gb: f64,
    pub traffic_percent: f64,
    pub created_at: String,
}

/// User-initiated node creation.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateNodeBody {
    pub region: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateNodeResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<Uuid>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_progress: Option<NodeCreationProgress>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteNodeResult {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegionInfo {
    pub code: String,
    pub name: String,
    pub provider: String,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegionListResponse {
    pub regions: Vec<RegionInfo>,
}

/// Admin region upsert payload.
#[derive(Debug, Clone, Deserialize)]
pub struct RegionUpsertBody {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default = "default_true")]
    pub available: bool,
}

fn default_true() -> bool {
    true
}

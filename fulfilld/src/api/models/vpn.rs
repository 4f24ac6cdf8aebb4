//! User-facing VPN status and configuration types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::nodes::SubscriptionInfo;
use crate::clients;

/// Top-level VPN state the frontend switches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VpnState {
    NoSubscription,
    Active,
    Expired,
    Disabled,
}

#[derive(Debug, Clone, Serialize)]
pub struct VpnStatusResponse {
    pub vpn_status: VpnState,

    pub has_subscription: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<SubscriptionInfo>,

    pub has_vpn_user: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpn_user: Option<VpnUserView>,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VpnUserView {
    pub resource_id: Uuid,
    pub vpn_user_id: String,
    pub status: String,
    pub plan_tier: String,
    pub traffic_limit_gb: f64,
    pub traffic_used_gb: f64,
    pub traffic_percent: f64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub expire_at: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VpnProtocol {
    #[serde(rename = "protocol_name")]
    pub protocol: String,
    pub url: String,
    pub node: String,
}

impl From<clients::Protocol> for VpnProtocol {
    fn from(p: clients::Protocol) -> Self {
        Self {
            protocol: p.protocol,
            url: p.url,
            node: p.node,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VpnSubscribeResponse {
    pub status: String,
    pub subscribe_url: String,
    pub device_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub protocols: Vec<VpnProtocol>,
    pub traffic_limit: i64,
    pub traffic_used: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub expire_at: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Lightweight traffic/expiry snapshot without protocol URLs.
#[derive(Debug, Clone, Serialize)]
pub struct VpnQuickStatus {
    pub status: String,
    pub traffic_limit: i64,
    pub traffic_used: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub expire_at: String,
}

/// Extend/upgrade request. All-empty means no-op.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UpdateVpnUserBody {
    pub traffic_limit: i64,
    pub extend_days: i64,
    pub plan_tier: String,
}

impl UpdateVpnUserBody {
    pub fn is_empty(&self) -> bool {
        self.traffic_limit <= 0 && self.extend_days <= 0 && self.plan_tier.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_body_emptiness() {
        assert!(UpdateVpnUserBody::default().is_empty());
        assert!(!UpdateVpnUserBody {
            extend_days: 30,
            ..Default::default()
        }
        .is_empty());
        assert!(!UpdateVpnUserBody {
            plan_tier: "premium".to_string(),
            ..Default::default()
        }
        .is_empty());
    }

    #[test]
    fn test_protocol_serializes_with_renamed_field() {
        let p = VpnProtocol {
            protocol: "vless".to_string(),
            url: "vless://example".to_string(),
            node: "primary".to_string(),
        };
        let value = serde_json::to_value(&p).unwrap();
        assert_eq!(value["protocol_name"], "vless");
    }
}

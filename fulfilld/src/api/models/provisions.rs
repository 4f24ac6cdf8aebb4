//! Internal provisioning API types: the dispatcher request, lifecycle
//! responses, and the node-agent callbacks.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sent by the subscription service to create a resource. Routed to the
/// hosting or VPN provisioner by `app_source`, falling back to the legacy
/// `resource_type` values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionRequest {
    // three-level classification (preferred)
    pub app_source: String,
    pub business_type: String,
    pub channel: String,

    // association
    pub subscription_id: String,
    pub user_id: String,
    pub user_email: String,

    // resource parameters
    pub resource_type: String,
    pub plan_tier: String,
    pub region: String,
    pub traffic_limit: i64,
    pub expire_days: i64,

    pub product_id: String,
    pub purchase_type: String,

    // trial-specific
    pub device_id: String,
}

impl ProvisionRequest {
    /// Route to the VPN provisioner? Legacy `otun_node`/`vpn_user` resource
    /// types map there as well.
    pub fn is_vpn(&self) -> bool {
        self.app_source == "otun"
            || self.resource_type == "otun_node"
            || self.resource_type == "vpn_user"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionResponse {
    pub resource_id: Uuid,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_ready_seconds: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpn_user_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeprovisionRequest {
    pub subscription_id: String,
    #[serde(default)]
    pub resource_id: Option<Uuid>,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeprovisionResponse {
    pub resource_id: Uuid,
    pub status: String,
    pub message: String,
}

/// Full resource view served back to the subscription service. This is the
/// read path for node configuration, which callbacks deliberately omit.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceStatusResponse {
    pub resource_id: Uuid,
    pub subscription_id: String,
    pub user_id: String,
    pub resource_type: String,
    pub provider: String,
    pub region: String,
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
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_at: Option<String>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Posted by the node agent once the networking daemon is installed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeReadyCallback {
    pub resource_id: Uuid,
    pub public_ip: String,
    #[serde(default)]
    pub api_port: i32,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub vless_port: i32,
    #[serde(default)]
    pub ss_port: i32,
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub short_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeFailedCallback {
    pub resource_id: Uuid,
    #[serde(default)]
    pub error_message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vpn_routing() {
        let mut req = ProvisionRequest {
            app_source: "otun".to_string(),
            ..Default::default()
        };
        assert!(req.is_vpn());

        req.app_source = "obox".to_string();
        assert!(!req.is_vpn());

        req.app_source = String::new();
        req.resource_type = "vpn_user".to_string();
        assert!(req.is_vpn());

        req.resource_type = "otun_node".to_string();
        assert!(req.is_vpn());

        req.resource_type = "hosting_node".to_string();
        assert!(!req.is_vpn());
    }

    #[test]
    fn test_provision_request_accepts_partial_body() {
        let req: ProvisionRequest =
            serde_json::from_str(r#"{"user_id": "u1", "app_source": "obox"}"#).unwrap();
        assert_eq!(req.user_id, "u1");
        assert_eq!(req.expire_days, 0);
        assert!(req.region.is_empty());
    }
}

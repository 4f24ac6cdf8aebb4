//! Trial and gift entitlement types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::vpn::VpnProtocol;

/// Public trial parameters, served without auth.
#[derive(Debug, Clone, Serialize)]
pub struct TrialConfigResponse {
    pub enabled: bool,
    pub duration_hours: i64,
    pub traffic_gb: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ActivateTrialBody {
    pub email: String,
    pub device_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivateTrialResponse {
    pub entitlement_id: Uuid,
    pub is_trial: bool,
    pub traffic_limit: i64,
    pub expire_at: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrialStatusResponse {
    /// Whether a new trial could be started (feature on, none used yet).
    pub available: bool,
    pub used: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traffic_limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traffic_used: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expired: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GiftEntitlementBody {
    pub user_id: String,
    #[serde(default)]
    pub email: String,
    pub traffic_gb: i64,
    pub duration_days: i64,
    #[serde(default)]
    pub service_tier: String,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GiftEntitlementResponse {
    pub entitlement_id: Uuid,
    pub otun_uuid: String,
    pub traffic_limit: i64,
    pub expire_at: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub protocols: Vec<VpnProtocol>,
}

/// Admin list filters. `source` is the legacy alias of `business_type`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EntitlementListQuery {
    pub user_id: String,
    pub business_type: String,
    pub source: String,
    pub status: String,
}

impl EntitlementListQuery {
    pub fn business_type(&self) -> &str {
        if self.business_type.is_empty() {
            &self.source
        } else {
            &self.business_type
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EntitlementInfo {
    pub id: Uuid,
    pub user_id: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otun_uuid: Option<String>,
    pub business_type: String,
    pub status: String,
    pub traffic_limit: i64,
    pub traffic_used: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_at: Option<String>,
    pub service_tier: String,
    pub granted_by: String,
    pub note: String,
    pub device_id: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntitlementListResponse {
    pub entitlements: Vec<EntitlementInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_type_falls_back_to_source() {
        let query = EntitlementListQuery {
            source: "trial".to_string(),
            ..Default::default()
        };
        assert_eq!(query.business_type(), "trial");

        let query = EntitlementListQuery {
            business_type: "gift".to_string(),
            source: "trial".to_string(),
            ..Default::default()
        };
        assert_eq!(query.business_type(), "gift");
    }
}

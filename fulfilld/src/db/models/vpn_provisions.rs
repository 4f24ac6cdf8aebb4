//! Row and request types for the `vpn_provisions` table.
//!
//! A user can have several rows over time (trial, then a purchase, then
//! renewals); at most one of them carries `is_current = TRUE` and represents
//! the live account state. The `otun_uuid` column is a weak reference to the
//! identity owned by the VPN manager and, once assigned, is reused by every
//! later row for the same user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum BusinessType {
    Purchase,
    Subscription,
    Trial,
    Gift,
}

impl BusinessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusinessType::Purchase => "purchase",
            BusinessType::Subscription => "subscription",
            BusinessType::Trial => "trial",
            BusinessType::Gift => "gift",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "purchase" => Some(BusinessType::Purchase),
            "subscription" => Some(BusinessType::Subscription),
            "trial" => Some(BusinessType::Trial),
            "gift" => Some(BusinessType::Gift),
            _ => None,
        }
    }
}

impl std::fmt::Display for BusinessType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum VpnStatus {
    Active,
    Expired,
    Disabled,
    Revoked,
    Converted,
}

impl VpnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VpnStatus::Active => "active",
            VpnStatus::Expired => "expired",
            VpnStatus::Disabled => "disabled",
            VpnStatus::Revoked => "revoked",
            VpnStatus::Converted => "converted",
        }
    }
}

impl std::fmt::Display for VpnStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ServiceTier {
    Standard,
    Premium,
    Residential,
}

impl ServiceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceTier::Standard => "standard",
            ServiceTier::Premium => "premium",
            ServiceTier::Residential => "residential",
        }
    }

    /// Fixed plan tier to service tier mapping used for node assignment.
    pub fn from_plan_tier(plan_tier: &str) -> Self {
        match plan_tier {
            "basic" => ServiceTier::Standard,
            "premium" | "unlimited" => ServiceTier::Premium,
            _ => ServiceTier::Standard,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "standard" => Some(ServiceTier::Standard),
            "premium" => Some(ServiceTier::Premium),
            "residential" => Some(ServiceTier::Residential),
            _ => None,
        }
    }
}

impl std::fmt::Display for ServiceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One lifetime of a user's VPN account.
#[derive(Debug, Clone, FromRow)]
pub struct VpnProvision {
    pub id: Uuid,
    pub user_id: String,
    pub subscription_id: Option<String>,
    pub channel: String,

    pub business_type: BusinessType,
    pub service_tier: ServiceTier,

    pub otun_uuid: Option<String>,
    pub plan_tier: String,
    pub status: VpnStatus,

    pub traffic_limit: i64,
    pub traffic_used: i64,
    pub expire_at: Option<DateTime<Utc>>,

    pub email: String,
    pub device_id: String,
    pub granted_by: String,
    pub note: String,

    pub is_current: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VpnProvision {
    /// Expired by wall clock or by traffic exhaustion.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        if let Some(expire_at) = self.expire_at {
            if now > expire_at {
                return true;
            }
        }
        self.traffic_limit > 0 && self.traffic_used >= self.traffic_limit
    }

    pub fn otun_uuid_nonempty(&self) -> Option<&str> {
        self.otun_uuid.as_deref().filter(|u| !u.is_empty())
    }
}

pub struct VpnProvisionCreateDBRequest {
    pub id: Uuid,
    pub user_id: String,
    pub subscription_id: Option<String>,
    pub channel: String,
    pub business_type: BusinessType,
    pub service_tier: ServiceTier,
    pub otun_uuid: Option<String>,
    pub plan_tier: String,
    pub status: VpnStatus,
    pub traffic_limit: i64,
    pub traffic_used: i64,
    pub expire_at: Option<DateTime<Utc>>,
    pub email: String,
    pub device_id: String,
    pub granted_by: String,
    pub note: String,
    pub is_current: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn row(expire_at: Option<DateTime<Utc>>, limit: i64, used: i64) -> VpnProvision {
        let now = Utc::now();
        VpnProvision {
            id: Uuid::new_v4(),
            user_id: "u1".to_string(),
            subscription_id: None,
            channel: "trial".to_string(),
            business_type: BusinessType::Trial,
            service_tier: ServiceTier::Standard,
            otun_uuid: Some("o-1".to_string()),
            plan_tier: String::new(),
            status: VpnStatus::Active,
            traffic_limit: limit,
            traffic_used: used,
            expire_at,
            email: String::new(),
            device_id: String::new(),
            granted_by: "system".to_string(),
            note: String::new(),
            is_current: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_service_tier_mapping() {
        assert_eq!(ServiceTier::from_plan_tier("basic"), ServiceTier::Standard);
        assert_eq!(ServiceTier::from_plan_tier("premium"), ServiceTier::Premium);
        assert_eq!(
            ServiceTier::from_plan_tier("unlimited"),
            ServiceTier::Premium
        );
        assert_eq!(ServiceTier::from_plan_tier("other"), ServiceTier::Standard);
        assert_eq!(ServiceTier::from_plan_tier(""), ServiceTier::Standard);
    }

    #[test]
    fn test_service_tier_parse() {
        assert_eq!(ServiceTier::parse("standard"), Some(ServiceTier::Standard));
        assert_eq!(ServiceTier::parse("premium"), Some(ServiceTier::Premium));
        assert_eq!(
            ServiceTier::parse("residential"),
            Some(ServiceTier::Residential)
        );
        assert_eq!(ServiceTier::parse("basic"), None);
        assert_eq!(ServiceTier::parse(""), None);
    }

    #[test]
    fn test_expired_by_time() {
        let now = Utc::now();
        let vp = row(Some(now - Duration::hours(1)), 100, 0);
        assert!(vp.is_expired(now));

        let vp = row(Some(now + Duration::hours(1)), 100, 0);
        assert!(!vp.is_expired(now));
    }

    #[test]
    fn test_expired_by_traffic() {
        let now = Utc::now();
        let vp = row(Some(now + Duration::hours(1)), 100, 100);
        assert!(vp.is_expired(now));

        // zero limit means no traffic cap
        let vp = row(None, 0, 100);
        assert!(!vp.is_expired(now));
    }

    #[test]
    fn test_otun_uuid_nonempty() {
        let mut vp = row(None, 0, 0);
        assert_eq!(vp.otun_uuid_nonempty(), Some("o-1"));
        vp.otun_uuid = Some(String::new());
        assert_eq!(vp.otun_uuid_nonempty(), None);
        vp.otun_uuid = None;
        assert_eq!(vp.otun_uuid_nonempty(), None);
    }
}

//! Trial and gift entitlements.
//!
//! Entitlements are VPN provisions with extra invariants: one trial per user,
//! per device and per email address. The application checks each axis first,
//! but the partial unique indexes are the real guard; a losing racer gets its
//! insert rejected and reports the same generic answer as any other abuse
//! check, so callers cannot probe which axis matched.

use std::sync::Arc;

use chrono::{Duration, Utc};
use sqlx::PgPool;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::api::models::entitlements::{
    ActivateTrialResponse, EntitlementInfo, GiftEntitlementBody, GiftEntitlementResponse,
    TrialConfigResponse, TrialStatusResponse,
};
use crate::clients::{CreateVpnUserRequest, OtunClient, UpdateVpnUserFields};
use crate::config::Config;
use crate::crypto;
use crate::db::handlers::{ProvisionLogs, VpnProvisions};
use crate::db::models::provision_logs::ProvisionType;
use crate::db::models::vpn_provisions::{
    BusinessType, ServiceTier, VpnProvision, VpnProvisionCreateDBRequest, VpnStatus,
};
use crate::errors::{Error, Result};
use crate::provisioner::policy::GB;
use crate::types::abbrev_uuid;

const TRIAL_USED_MESSAGE: &str = "trial already used";
const SS_PASSWORD_LEN: usize = 16;

#[derive(Clone)]
pub struct EntitlementEngine {
    db: PgPool,
    config: Arc<Config>,
    otun: OtunClient,
}

impl EntitlementEngine {
    pub fn new(db: PgPool, config: Arc<Config>, otun: OtunClient) -> Self {
        Self { db, config, otun }
    }

    pub fn trial_config(&self) -> TrialConfigResponse {
        TrialConfigResponse {
            enabled: self.config.trial.enabled,
            duration_hours: self.config.trial.duration_hours,
            traffic_gb: self.config.trial.traffic_gb,
        }
    }

    /// Activate the free trial for a user.
    #[instrument(skip(self, email), fields(user_id = %user_id), err)]
    pub async fn activate_trial(
        &self,
        user_id: &str,
        email: &str,
        device_id: &str,
    ) -> Result<ActivateTrialResponse> {
        if !self.config.trial.enabled {
            return Err(Error::BadRequest {
                message: "trial not available".to_string(),
            });
        }

        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let mut repo = VpnProvisions::new(&mut conn);

        if repo
            .get_by_user_and_business_type(user_id, BusinessType::Trial)
            .await?
            .is_some()
        {
            return Err(Error::Conflict {
                message: TRIAL_USED_MESSAGE.to_string(),
            });
        }

        if !email.is_empty() && repo.exists_trial_by_email(email).await? {
            return Err(Error::Conflict {
                message: TRIAL_USED_MESSAGE.to_string(),
            });
        }

        if !device_id.is_empty() {
            match repo.exists_trial_by_device_id(device_id).await {
                Ok(true) => {
                    return Err(Error::Conflict {
                        message: TRIAL_USED_MESSAGE.to_string(),
                    });
                }
                Ok(false) => {}
                Err(e) => {
                    // the unique index still closes the gap
                    warn!(error = %e, "Device trial check failed, continuing");
                }
            }
        }

        let current = repo.get_current_by_user(user_id).await?;
        if let Some(current) = &current {
            if current.business_type != BusinessType::Trial {
                return Err(Error::Conflict {
                    message: "user already has an active VPN provision".to_string(),
                });
            }
        }

        let current_any = repo.get_current_by_user_any_status(user_id).await?;
        drop(conn);

        let traffic_limit = self.config.trial.traffic_gb * GB;
        let expire_at = Utc::now() + Duration::hours(self.config.trial.duration_hours);

        let (otun_uuid, created_new_user) = self
            .ensure_vpn_account(
                user_id,
                email,
                traffic_limit,
                &expire_at.to_rfc3339(),
                ServiceTier::Standard,
            )
            .await?;

        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let mut repo = VpnProvisions::new(&mut conn);

        if let Some(previous) = current_any {
            repo.mark_not_current(previous.id).await?;
        }

        let create = VpnProvisionCreateDBRequest {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            subscription_id: None,
            channel: "trial".to_string(),
            business_type: BusinessType::Trial,
            service_tier: ServiceTier::Standard,
            otun_uuid: Some(otun_uuid.clone()),
            plan_tier: String::new(),
            status: VpnStatus::Active,
            traffic_limit,
            traffic_used: 0,
            expire_at: Some(expire_at),
            email: email.to_string(),
            device_id: device_id.to_string(),
            granted_by: "system".to_string(),
            note: String::new(),
            is_current: true,
        };

        let row = match repo.create(&create).await {
            Ok(row) => row,
            Err(e) => {
                if created_new_user {
                    if let Err(delete_err) = self.otun.delete_user(&otun_uuid).await {
                        warn!(error = %delete_err, "Compensation delete of VPN user failed");
                    }
                }
                // a concurrent activation won the race on one of the trial
                // indexes; report the same generic answer
                if e.is_trial_conflict() {
                    return Err(Error::Conflict {
                        message: TRIAL_USED_MESSAGE.to_string(),
                    });
                }
                return Err(e.into());
            }
        };

        let mut logs = ProvisionLogs::new(&mut conn);
        if let Err(e) = logs
            .log_action_with_metadata(
                row.id,
                ProvisionType::Vpn,
                "trial_activated",
                "active",
                "Trial activated",
                serde_json::json!({
                    "traffic_limit": traffic_limit,
                    "expire_at": expire_at.to_rfc3339(),
                }),
            )
            .await
        {
            warn!(error = %e, "Failed to write trial activation log");
        }

        info!(provision_id = %abbrev_uuid(&row.id), "Trial activated");

        Ok(ActivateTrialResponse {
            entitlement_id: row.id,
            is_trial: true,
            traffic_limit,
            expire_at: expire_at.to_rfc3339(),
            message: "Trial activated".to_string(),
        })
    }

    /// Trial availability/usage for a user, refreshed from the VPN manager
    /// when reachable.
    #[instrument(skip(self), err)]
    pub async fn get_trial_status(&self, user_id: &str) -> Result<TrialStatusResponse> {
        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let mut repo = VpnProvisions::new(&mut conn);

        let Some(mut vp) = repo
            .get_by_user_and_business_type(user_id, BusinessType::Trial)
            .await?
        else {
            return Ok(TrialStatusResponse {
                available: self.config.trial.enabled,
                used: false,
                status: None,
                traffic_limit: None,
                traffic_used: None,
                expire_at: None,
                enabled: None,
                expired: None,
            });
        };

        let mut enabled = vp.status == VpnStatus::Active;
        if let Some(otun_uuid) = vp.otun_uuid_nonempty() {
            match self.otun.sync_user(otun_uuid).await {
                Ok(live) => {
                    enabled = live.enabled;
                    vp.traffic_used = live.traffic_used;
                    if let Err(e) = repo.update_traffic_used(vp.id, live.traffic_used).await {
                        warn!(error = %e, "Failed to cache refreshed traffic_used");
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to sync trial user, serving cached values");
                }
            }
        }

        let expired = vp.is_expired(Utc::now());

        Ok(TrialStatusResponse {
            available: false,
            used: true,
            status: Some(vp.status.to_string()),
            traffic_limit: Some(vp.traffic_limit),
            traffic_used: Some(vp.traffic_used),
            expire_at: vp.expire_at.map(|t| t.to_rfc3339()),
            enabled: Some(enabled),
            expired: Some(expired),
        })
    }

    /// Admin-granted entitlement. No abuse checks; the grant reuses the
    /// user's VPN identity like any other provision.
    #[instrument(skip(self, body), fields(user_id = %body.user_id), err)]
    pub async fn gift_entitlement(&self, body: &GiftEntitlementBody) -> Result<GiftEntitlementResponse> {
        if body.user_id.is_empty() {
            return Err(Error::BadRequest {
                message: "user_id is required".to_string(),
            });
        }
        if body.traffic_gb <= 0 || body.duration_days <= 0 {
            return Err(Error::BadRequest {
                message: "traffic_gb and duration_days must be positive".to_string(),
            });
        }

        let traffic_limit = body.traffic_gb * GB;
        let expire_at = Utc::now() + Duration::days(body.duration_days);
        let service_tier = ServiceTier::parse(&body.service_tier).unwrap_or(ServiceTier::Standard);

        let (otun_uuid, created_new_user) = self
            .ensure_vpn_account(
                &body.user_id,
                &body.email,
                traffic_limit,
                &expire_at.to_rfc3339(),
                service_tier,
            )
            .await?;

        let protocols = match self.otun.sync_user(&otun_uuid).await {
            Ok(live) => live.protocols.into_iter().map(Into::into).collect(),
            Err(e) => {
                warn!(error = %e, "Failed to sync gifted user, returning without protocols");
                Vec::new()
            }
        };

        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let mut repo = VpnProvisions::new(&mut conn);

        if let Some(previous) = repo.get_current_by_user_any_status(&body.user_id).await? {
            repo.mark_not_current(previous.id).await?;
        }

        let create = VpnProvisionCreateDBRequest {
            id: Uuid::new_v4(),
            user_id: body.user_id.clone(),
            subscription_id: None,
            channel: "gift".to_string(),
            business_type: BusinessType::Gift,
            service_tier,
            otun_uuid: Some(otun_uuid.clone()),
            plan_tier: String::new(),
            status: VpnStatus::Active,
            traffic_limit,
            traffic_used: 0,
            expire_at: Some(expire_at),
            email: body.email.clone(),
            device_id: String::new(),
            granted_by: "admin".to_string(),
            note: body.note.clone(),
            is_current: true,
        };

        let row = match repo.create(&create).await {
            Ok(row) => row,
            Err(e) => {
                if created_new_user {
                    if let Err(delete_err) = self.otun.delete_user(&otun_uuid).await {
                        warn!(error = %delete_err, "Compensation delete of VPN user failed");
                    }
                }
                return Err(e.into());
            }
        };

        let mut logs = ProvisionLogs::new(&mut conn);
        if let Err(e) = logs
            .log_action_with_metadata(
                row.id,
                ProvisionType::Vpn,
                "gift_granted",
                "active",
                "Gift entitlement granted",
                serde_json::json!({
                    "traffic_gb": body.traffic_gb,
                    "duration_days": body.duration_days,
                }),
            )
            .await
        {
            warn!(error = %e, "Failed to write gift log");
        }

        info!(provision_id = %abbrev_uuid(&row.id), "Gift entitlement created");

        Ok(GiftEntitlementResponse {
            entitlement_id: row.id,
            otun_uuid,
            traffic_limit,
            expire_at: expire_at.to_rfc3339(),
            protocols,
        })
    }

    /// Filtered admin listing, newest first, capped at 100.
    pub async fn list_entitlements(
        &self,
        user_id: &str,
        business_type: &str,
        status: &str,
    ) -> Result<Vec<EntitlementInfo>> {
        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let mut repo = VpnProvisions::new(&mut conn);

        let rows = repo.list_by_filters(user_id, business_type, status).await?;
        Ok(rows.iter().map(to_entitlement_info).collect())
    }

    /// Update the user's existing VPN account, or create one if this is the
    /// user's first entitlement. Returns the identity and whether it was
    /// freshly created (for compensation on a later insert failure).
    async fn ensure_vpn_account(
        &self,
        user_id: &str,
        email: &str,
        traffic_limit: i64,
        expire_at: &str,
        service_tier: ServiceTier,
    ) -> Result<(String, bool)> {
        let existing_otun = {
            let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
            let mut repo = VpnProvisions::new(&mut conn);
            repo.get_otun_uuid_by_user(user_id).await?
        };

        if let Some(otun_uuid) = existing_otun.filter(|u| !u.is_empty()) {
            self.otun
                .update_user(
                    &otun_uuid,
                    &UpdateVpnUserFields {
                        traffic_limit: Some(traffic_limit),
                        expire_at: Some(expire_at.to_string()),
                        enabled: Some(true),
                        ..Default::default()
                    },
                )
                .await
                .map_err(|e| Error::ProviderFailed {
                    provider: "otun-manager",
                    message: e.to_string(),
                })?;
            return Ok((otun_uuid, false));
        }

        let vpn_user_id = Uuid::new_v4().to_string();
        let ss_password = crypto::generate_password(SS_PASSWORD_LEN);

        let created = self
            .otun
            .create_user(&CreateVpnUserRequest {
                uuid: vpn_user_id,
                email: email.to_string(),
                auth_user_id: user_id.to_string(),
                protocols: vec!["vless".to_string(), "shadowsocks".to_string()],
                ss_password,
                traffic_limit,
                expire_at: expire_at.to_string(),
                service_tier: service_tier.to_string(),
            })
            .await
            .map_err(|e| Error::ProviderFailed {
                provider: "otun-manager",
                message: e.to_string(),
            })?;

        Ok((created.uuid, true))
    }
}

fn to_entitlement_info(vp: &VpnProvision) -> EntitlementInfo {
    EntitlementInfo {
        id: vp.id,
        user_id: vp.user_id.clone(),
        email: vp.email.clone(),
        otun_uuid: vp.otun_uuid.clone(),
        business_type: vp.business_type.to_string(),
        status: vp.status.to_string(),
        traffic_limit: vp.traffic_limit,
        traffic_used: vp.traffic_used,
        expire_at: vp.expire_at.map(|t| t.to_rfc3339()),
        service_tier: vp.service_tier.to_string(),
        granted_by: vp.granted_by.clone(),
        note: vp.note.clone(),
        device_id: vp.device_id.clone(),
        created_at: vp.created_at.to_rfc3339(),
        updated_at: vp.updated_at.to_rfc3339(),
    }
}

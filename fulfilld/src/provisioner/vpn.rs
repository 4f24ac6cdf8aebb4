//! VPN account provisioning.
//!
//! Unlike hosting, this flow is synchronous: all external calls complete
//! before the response is sent. The interesting parts are the idempotency and
//! renewal rules:
//!
//! - a repeat request for the same subscription returns the existing row
//!   without touching the VPN manager;
//! - a user keeps one VPN identity (`otun_uuid`) across every provision
//!   lifetime, so renewals and conversions update the same account;
//! - expiry stacking is decided by the channel policy: paid-on-same-paid
//!   stacks, everything else starts fresh;
//! - a channel change converts the old row (`is_current=false,
//!   status=converted`) and inserts a new one, preserving history.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::api::models::provisions::{ProvisionRequest, ProvisionResponse};
use crate::api::models::vpn::{
    UpdateVpnUserBody, VpnQuickStatus, VpnState, VpnStatusResponse, VpnSubscribeResponse,
    VpnUserView,
};
use crate::api::models::nodes::SubscriptionInfo;
use crate::clients::{
    CallbackApp, CreateVpnUserRequest, OtunClient, SubscribeRequest, SubscriptionClient,
    UpdateVpnUserFields,
};
use crate::config::Config;
use crate::crypto;
use crate::db::handlers::{ProvisionLogs, VpnProvisions};
use crate::db::models::provision_logs::ProvisionType;
use crate::db::models::vpn_provisions::{
    BusinessType, ServiceTier, VpnProvision, VpnProvisionCreateDBRequest, VpnStatus,
};
use crate::errors::{Error, Result};
use crate::provisioner::{policy, traffic_stats};
use crate::types::abbrev_uuid;

const SS_PASSWORD_LEN: usize = 16;

#[derive(Clone)]
pub struct VpnProvisioner {
    db: PgPool,
    config: Arc<Config>,
    otun: OtunClient,
    subscriptions: SubscriptionClient,
}

impl VpnProvisioner {
    pub fn new(
        db: PgPool,
        config: Arc<Config>,
        otun: OtunClient,
        subscriptions: SubscriptionClient,
    ) -> Self {
        Self {
            db,
            config,
            otun,
            subscriptions,
        }
    }

    /// Provision or renew the user's VPN account.
    #[instrument(skip_all, fields(user_id = %req.user_id, channel = %req.channel), err)]
    pub async fn provision_vpn_user(&self, req: &ProvisionRequest) -> Result<ProvisionResponse> {
        if req.user_id.is_empty() {
            return Err(Error::BadRequest {
                message: "user_id is required".to_string(),
            });
        }

        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

        // Subscription idempotency: a retried request for an already-active
        // subscription returns the row verbatim without a VPN manager call.
        if !req.subscription_id.is_empty() {
            let mut repo = VpnProvisions::new(&mut conn);
            if let Some(existing) = repo.get_by_subscription_id(&req.subscription_id).await? {
                if existing.status == VpnStatus::Active && existing.otun_uuid_nonempty().is_some() {
                    info!(
                        provision_id = %abbrev_uuid(&existing.id),
                        "VPN provision already active for subscription"
                    );
                    return Ok(existing_response(&existing));
                }
            }
        }

        let business_type = BusinessType::parse(&req.business_type)
            .unwrap_or(BusinessType::Subscription);
        let service_tier = ServiceTier::from_plan_tier(&req.plan_tier);
        let days = policy::expire_days(&req.channel, req.expire_days);
        let traffic_limit = policy::vpn_traffic_limit(&req.plan_tier, req.traffic_limit);
        let now = Utc::now();

        let existing = {
            let mut repo = VpnProvisions::new(&mut conn);
            repo.get_current_by_user_any_status(&req.user_id).await?
        };
        drop(conn);

        if let Some(existing) = &existing {
            if let Some(otun_uuid) = existing.otun_uuid_nonempty() {
                return self
                    .renew(req, existing, otun_uuid.to_string(), business_type, service_tier, days, traffic_limit, now)
                    .await;
            }
        }

        self.provision_fresh(req, existing, business_type, service_tier, days, traffic_limit, now)
            .await
    }

    /// Renewal or upgrade of an account that already has a VPN identity.
    #[allow(clippy::too_many_arguments)]
    async fn renew(
        &self,
        req: &ProvisionRequest,
        existing: &VpnProvision,
        otun_uuid: String,
        business_type: BusinessType,
        service_tier: ServiceTier,
        days: i64,
        traffic_limit: i64,
        now: DateTime<Utc>,
    ) -> Result<ProvisionResponse> {
        let renewal = policy::renewal_policy(&existing.channel, &req.channel);

        // A stacked renewal extends the live expiry known to the VPN manager,
        // not the possibly stale local copy.
        let current_expire = if renewal == policy::RenewalPolicy::Stack {
            match self.otun.get_user(&otun_uuid).await {
                Ok(user) => parse_rfc3339(&user.expire_at),
                Err(e) => {
                    warn!(error = %e, "Failed to fetch live expiry, starting fresh period");
                    None
                }
            }
        } else {
            None
        };
        let expire_at = policy::renewal_expire_at(renewal, current_expire, days, now);

        if let Err(e) = self
            .otun
            .update_user(
                &otun_uuid,
                &UpdateVpnUserFields {
                    traffic_limit: Some(traffic_limit),
                    expire_at: Some(expire_at.to_rfc3339()),
                    enabled: Some(true),
                    ..Default::default()
                },
            )
            .await
        {
            warn!(error = %e, "Failed to update VPN user during renewal, continuing");
        }

        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let mut repo = VpnProvisions::new(&mut conn);

        let provision_id;
        if existing.channel != req.channel {
            // channel change: preserve conversion history
            repo.mark_not_current(existing.id).await?;
            let row = repo
                .create(&VpnProvisionCreateDBRequest {
                    id: Uuid::new_v4(),
                    user_id: req.user_id.clone(),
                    subscription_id: nonempty(&req.subscription_id),
                    channel: req.channel.clone(),
                    business_type,
                    service_tier,
                    otun_uuid: Some(otun_uuid.clone()),
                    plan_tier: req.plan_tier.clone(),
                    status: VpnStatus::Active,
                    traffic_limit,
                    traffic_used: 0,
                    expire_at: Some(expire_at),
                    email: req.user_email.clone(),
                    device_id: req.device_id.clone(),
                    granted_by: "system".to_string(),
                    note: String::new(),
                    is_current: true,
                })
                .await?;
            provision_id = row.id;

            info!(
                old = %abbrev_uuid(&existing.id),
                new = %abbrev_uuid(&provision_id),
                "Converted VPN provision to new channel"
            );
        } else {
            let mut updated = existing.clone();
            updated.traffic_limit = traffic_limit;
            if let Some(subscription_id) = nonempty(&req.subscription_id) {
                updated.subscription_id = Some(subscription_id);
            }
            updated.business_type = business_type;
            updated.service_tier = service_tier;
            updated.plan_tier = req.plan_tier.clone();
            updated.status = VpnStatus::Active;
            updated.expire_at = Some(expire_at);
            repo.update(&updated).await?;
            provision_id = existing.id;
        }

        let mut logs = ProvisionLogs::new(&mut conn);
        if let Err(e) = logs
            .log_action_with_metadata(
                provision_id,
                ProvisionType::Vpn,
                "vpn_user_renewed",
                "active",
                "VPN provision renewed",
                serde_json::json!({
                    "plan_tier": req.plan_tier,
                    "traffic_limit": traffic_limit,
                    "expire_at": expire_at.to_rfc3339(),
                    "stacked": renewal == policy::RenewalPolicy::Stack,
                }),
            )
            .await
        {
            warn!(error = %e, "Failed to write renewal log");
        }
        drop(conn);

        self.notify_active(&req.subscription_id).await;

        Ok(ProvisionResponse {
            resource_id: provision_id,
            status: VpnStatus::Active.to_string(),
            estimated_ready_seconds: None,
            vpn_user_id: Some(otun_uuid),
            message: "VPN user renewed".to_string(),
        })
    }

    /// First provision for this user, or a re-provision after conversion.
    #[allow(clippy::too_many_arguments)]
    async fn provision_fresh(
        &self,
        req: &ProvisionRequest,
        existing: Option<VpnProvision>,
        business_type: BusinessType,
        service_tier: ServiceTier,
        days: i64,
        traffic_limit: i64,
        now: DateTime<Utc>,
    ) -> Result<ProvisionResponse> {
        let expire_at = now + Duration::days(days);

        let existing_otun = {
            let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
            let mut repo = VpnProvisions::new(&mut conn);
            repo.get_otun_uuid_by_user(&req.user_id).await?
        };

        let (otun_uuid, created_new_user) = match existing_otun {
            Some(otun_uuid) if !otun_uuid.is_empty() => {
                if let Err(e) = self
                    .otun
                    .update_user(
                        &otun_uuid,
                        &UpdateVpnUserFields {
                            traffic_limit: Some(traffic_limit),
                            expire_at: Some(expire_at.to_rfc3339()),
                            enabled: Some(true),
                            ..Default::default()
                        },
                    )
                    .await
                {
                    warn!(error = %e, "Failed to update reused VPN user, continuing");
                }
                (otun_uuid, false)
            }
            _ => {
                let vpn_user_id = Uuid::new_v4().to_string();
                let ss_password = crypto::generate_password(SS_PASSWORD_LEN);

                let created = self
                    .otun
                    .create_user(&CreateVpnUserRequest {
                        uuid: vpn_user_id.clone(),
                        email: req.user_email.clone(),
                        auth_user_id: req.user_id.clone(),
                        protocols: vec!["vless".to_string(), "shadowsocks".to_string()],
                        ss_password,
                        traffic_limit,
                        expire_at: expire_at.to_rfc3339(),
                        service_tier: service_tier.to_string(),
                    })
                    .await
                    .map_err(|e| {
                        warn!(error = %e, "Failed to create VPN user");
                        Error::ProviderFailed {
                            provider: "otun-manager",
                            message: e.to_string(),
                        }
                    })?;
                (created.uuid, true)
            }
        };

        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let mut repo = VpnProvisions::new(&mut conn);

        if let Some(existing) = &existing {
            repo.mark_not_current(existing.id).await?;
        }

        let create = VpnProvisionCreateDBRequest {
            id: Uuid::new_v4(),
            user_id: req.user_id.clone(),
            subscription_id: nonempty(&req.subscription_id),
            channel: req.channel.clone(),
            business_type,
            service_tier,
            otun_uuid: Some(otun_uuid.clone()),
            plan_tier: req.plan_tier.clone(),
            status: VpnStatus::Active,
            traffic_limit,
            traffic_used: 0,
            expire_at: Some(expire_at),
            email: req.user_email.clone(),
            device_id: req.device_id.clone(),
            granted_by: "system".to_string(),
            note: String::new(),
            is_current: true,
        };

        let row = match repo.create(&create).await {
            Ok(row) => row,
            Err(e) => {
                // Avoid an orphaned account in the VPN manager when the local
                // insert loses.
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
                "vpn_user_created",
                "active",
                "VPN user provisioned",
                serde_json::json!({
                    "plan_tier": req.plan_tier,
                    "traffic_limit": traffic_limit,
                    "expire_at": expire_at.to_rfc3339(),
                    "reused_identity": !created_new_user,
                }),
            )
            .await
        {
            warn!(error = %e, "Failed to write provision log");
        }
        drop(conn);

        self.notify_active(&req.subscription_id).await;

        info!(provision_id = %abbrev_uuid(&row.id), "VPN user provisioned");

        Ok(ProvisionResponse {
            resource_id: row.id,
            status: VpnStatus::Active.to_string(),
            estimated_ready_seconds: None,
            vpn_user_id: Some(otun_uuid),
            message: "VPN user created successfully".to_string(),
        })
    }

    /// Resolve a deprovision target by explicit resource id or by the
    /// subscription's current row, then retire it.
    pub async fn deprovision_by(
        &self,
        subscription_id: &str,
        resource_id: Option<Uuid>,
        reason: &str,
    ) -> Result<Uuid> {
        let vp = {
            let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
            let mut repo = VpnProvisions::new(&mut conn);
            match resource_id {
                Some(id) => repo.get_by_id(id).await?,
                None => repo.get_by_subscription_id(subscription_id).await?,
            }
        };

        let vp = vp.ok_or_else(|| Error::NotFound {
            resource: "resource".to_string(),
            id: resource_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| subscription_id.to_string()),
        })?;

        self.deprovision_vpn_user(vp.id, reason).await?;
        Ok(vp.id)
    }

    /// Disable the account and retire the row.
    #[instrument(skip(self, reason), fields(provision_id = %abbrev_uuid(&provision_id)), err)]
    pub async fn deprovision_vpn_user(&self, provision_id: Uuid, reason: &str) -> Result<()> {
        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let mut repo = VpnProvisions::new(&mut conn);

        let mut vp = repo.get_by_id(provision_id).await?.ok_or_else(|| Error::NotFound {
            resource: "vpn provision".to_string(),
            id: provision_id.to_string(),
        })?;

        if let Some(otun_uuid) = vp.otun_uuid_nonempty() {
            if let Err(e) = self.otun.disable_user(otun_uuid).await {
                warn!(error = %e, "Failed to disable VPN user, continuing");
            }
        }

        vp.status = VpnStatus::Disabled;
        vp.is_current = false;
        repo.update(&vp).await?;

        let mut logs = ProvisionLogs::new(&mut conn);
        if let Err(e) = logs
            .log_action(vp.id, ProvisionType::Vpn, "vpn_user_deprovisioned", "disabled", reason)
            .await
        {
            warn!(error = %e, "Failed to write deprovision log");
        }
        drop(conn);

        if let Some(subscription_id) = vp.subscription_id.as_deref() {
            if let Err(e) = self
                .subscriptions
                .notify_deleted(subscription_id, CallbackApp::Otun)
                .await
            {
                warn!(error = %e, "Failed to notify subscription-service (deleted)");
            }
        }

        Ok(())
    }

    /// Extend or upgrade a VPN provision. An all-empty request is a no-op
    /// with no external calls.
    #[instrument(skip(self, body), fields(provision_id = %abbrev_uuid(&provision_id)), err)]
    pub async fn update_vpn_user(&self, provision_id: Uuid, body: &UpdateVpnUserBody) -> Result<()> {
        if body.is_empty() {
            return Ok(());
        }

        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let mut repo = VpnProvisions::new(&mut conn);

        let mut vp = repo.get_by_id(provision_id).await?.ok_or_else(|| Error::NotFound {
            resource: "vpn provision".to_string(),
            id: provision_id.to_string(),
        })?;

        let otun_uuid = vp
            .otun_uuid_nonempty()
            .ok_or_else(|| Error::BadRequest {
                message: "VPN provision has no VPN user id".to_string(),
            })?
            .to_string();
        drop(conn);

        let user = self.otun.get_user(&otun_uuid).await.map_err(|e| Error::ProviderFailed {
            provider: "otun-manager",
            message: e.to_string(),
        })?;

        let mut fields = UpdateVpnUserFields::default();

        if body.traffic_limit > 0 {
            fields.traffic_limit = Some(body.traffic_limit);
            vp.traffic_limit = body.traffic_limit;
        }

        if body.extend_days > 0 {
            let now = Utc::now();
            let base = parse_rfc3339(&user.expire_at).filter(|t| *t > now).unwrap_or(now);
            let new_expire = base + Duration::days(body.extend_days);
            fields.expire_at = Some(new_expire.to_rfc3339());
            vp.expire_at = Some(new_expire);
        }

        if !body.plan_tier.is_empty() && body.plan_tier != vp.plan_tier {
            vp.plan_tier = body.plan_tier.clone();
            vp.service_tier = ServiceTier::from_plan_tier(&body.plan_tier);
            if body.traffic_limit <= 0 {
                let new_limit = policy::vpn_traffic_limit(&body.plan_tier, 0);
                fields.traffic_limit = Some(new_limit);
                vp.traffic_limit = new_limit;
            }
        }

        self.otun
            .update_user(&otun_uuid, &fields)
            .await
            .map_err(|e| Error::ProviderFailed {
                provider: "otun-manager",
                message: e.to_string(),
            })?;

        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let mut repo = VpnProvisions::new(&mut conn);
        repo.update(&vp).await?;

        let mut logs = ProvisionLogs::new(&mut conn);
        if let Err(e) = logs
            .log_action_with_metadata(
                vp.id,
                ProvisionType::Vpn,
                "vpn_user_updated",
                "active",
                "VPN user updated",
                serde_json::json!({
                    "traffic_limit": vp.traffic_limit,
                    "plan_tier": vp.plan_tier,
                    "extend_days": body.extend_days,
                }),
            )
            .await
        {
            warn!(error = %e, "Failed to write update log");
        }

        Ok(())
    }

    /// VPN status with subscription context, as shown to the user.
    #[instrument(skip(self), err)]
    pub async fn get_user_vpn_status(&self, user_id: &str) -> Result<VpnStatusResponse> {
        let subscription = match self.subscriptions.get_user_vpn_subscription(user_id).await {
            Ok(status) => Some(status),
            Err(e) => {
                warn!(error = %e, "Failed to check VPN subscription");
                None
            }
        };

        let has_active_subscription = subscription.as_ref().is_some_and(|s| s.has_active);
        if !has_active_subscription {
            return Ok(VpnStatusResponse {
                vpn_status: VpnState::NoSubscription,
                has_subscription: false,
                subscription: None,
                has_vpn_user: false,
                vpn_user: None,
                message: "No active VPN subscription. Please subscribe to use VPN.".to_string(),
            });
        }
        let sub = subscription.unwrap_or_default();
        let subscription_info = SubscriptionInfo {
            subscription_id: sub.subscription_id,
            status: sub.status,
            plan_tier: sub.plan_tier,
            expires_at: sub.expires_at,
            auto_renew: sub.auto_renew,
        };

        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let mut repo = VpnProvisions::new(&mut conn);
        let vp = repo.get_current_by_user_any_status(user_id).await?;

        let Some(vp) = vp else {
            return Ok(VpnStatusResponse {
                vpn_status: VpnState::Expired,
                has_subscription: true,
                subscription: Some(subscription_info),
                has_vpn_user: false,
                vpn_user: None,
                message: "VPN subscription active but no VPN user found. Please contact support."
                    .to_string(),
            });
        };

        let (state, message) = match vp.status {
            VpnStatus::Active => (VpnState::Active, "VPN is active and ready to use."),
            VpnStatus::Expired | VpnStatus::Converted => {
                (VpnState::Expired, "VPN subscription expired.")
            }
            _ => (VpnState::Disabled, "VPN is currently disabled."),
        };

        let (limit_gb, used_gb, percent) = traffic_stats(vp.traffic_limit, vp.traffic_used);

        Ok(VpnStatusResponse {
            vpn_status: state,
            has_subscription: true,
            subscription: Some(subscription_info),
            has_vpn_user: true,
            vpn_user: Some(VpnUserView {
                resource_id: vp.id,
                vpn_user_id: vp.otun_uuid.clone().unwrap_or_default(),
                status: vp.status.to_string(),
                plan_tier: vp.plan_tier.clone(),
                traffic_limit_gb: limit_gb,
                traffic_used_gb: used_gb,
                traffic_percent: percent,
                expire_at: vp.expire_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
                created_at: vp.created_at.to_rfc3339(),
            }),
            message: message.to_string(),
        })
    }

    /// Protocol URLs for the user's client app. Requires both an active
    /// subscription (authoritative) and a current provision.
    #[instrument(skip(self), err)]
    pub async fn get_user_vpn_subscribe_config(&self, user_id: &str) -> Result<VpnSubscribeResponse> {
        let sub = self
            .subscriptions
            .get_user_vpn_subscription(user_id)
            .await
            .map_err(|e| Error::ProviderFailed {
                provider: "subscription-service",
                message: e.to_string(),
            })?;
        if !sub.has_active {
            return Err(Error::NotFound {
                resource: "active VPN subscription for user".to_string(),
                id: user_id.to_string(),
            });
        }

        let vp = {
            let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
            let mut repo = VpnProvisions::new(&mut conn);
            repo.get_current_by_user(user_id).await?
        }
        .ok_or_else(|| Error::NotFound {
            resource: "VPN provision for user".to_string(),
            id: user_id.to_string(),
        })?;

        let traffic_gb = (vp.traffic_limit / policy::GB).max(1);
        let config = self
            .otun
            .get_subscribe_config(&SubscribeRequest {
                device_id: user_id,
                traffic_gb,
                days_valid: 30,
            })
            .await
            .map_err(|e| Error::ProviderFailed {
                provider: "otun-manager",
                message: e.to_string(),
            })?;

        Ok(VpnSubscribeResponse {
            status: vp.status.to_string(),
            subscribe_url: format!("{}/api/subscribe", self.config.services.otun_manager_url),
            device_id: user_id.to_string(),
            protocols: config.protocols.into_iter().map(Into::into).collect(),
            traffic_limit: config.traffic_limit,
            traffic_used: config.traffic_used,
            expire_at: config.expire_at,
            message: "VPN configuration retrieved successfully".to_string(),
        })
    }

    /// Traffic/expiry snapshot. Local fields are served as a fallback when
    /// the VPN manager is unreachable; fresh values override them otherwise.
    #[instrument(skip(self), err)]
    pub async fn get_user_vpn_quick_status(&self, user_id: &str) -> Result<VpnQuickStatus> {
        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let mut repo = VpnProvisions::new(&mut conn);

        let vp = repo
            .get_current_by_user_any_status(user_id)
            .await?
            .ok_or_else(|| Error::NotFound {
                resource: "VPN provision for user".to_string(),
                id: user_id.to_string(),
            })?;

        let mut status = VpnQuickStatus {
            status: vp.status.to_string(),
            traffic_limit: vp.traffic_limit,
            traffic_used: vp.traffic_used,
            expire_at: vp.expire_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
        };

        if let Some(otun_uuid) = vp.otun_uuid_nonempty() {
            match self.otun.sync_user(otun_uuid).await {
                Ok(live) => {
                    status.traffic_used = live.traffic_used;
                    if !live.expire_at.is_empty() {
                        status.expire_at = live.expire_at;
                    }
                    if let Err(e) = repo.update_traffic_used(vp.id, live.traffic_used).await {
                        warn!(error = %e, "Failed to cache refreshed traffic_used");
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to sync VPN user, serving cached values");
                }
            }
        }

        Ok(status)
    }

    async fn notify_active(&self, subscription_id: &str) {
        if subscription_id.is_empty() {
            return;
        }
        if let Err(e) = self
            .subscriptions
            .notify_active(subscription_id, CallbackApp::Otun, None)
            .await
        {
            warn!(error = %e, "Failed to notify subscription-service (active)");
        }
    }
}

fn existing_response(vp: &VpnProvision) -> ProvisionResponse {
    ProvisionResponse {
        resource_id: vp.id,
        status: vp.status.to_string(),
        estimated_ready_seconds: None,
        vpn_user_id: vp.otun_uuid.clone(),
        message: "VPN user already exists".to_string(),
    }
}

fn nonempty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rfc3339() {
        assert!(parse_rfc3339("2026-08-01T00:00:00Z").is_some());
        assert!(parse_rfc3339("2026-08-01T00:00:00+08:00").is_some());
        assert!(parse_rfc3339("").is_none());
        assert!(parse_rfc3339("not-a-date").is_none());
    }

    #[test]
    fn test_nonempty() {
        assert_eq!(nonempty(""), None);
        assert_eq!(nonempty("s1"), Some("s1".to_string()));
    }
}

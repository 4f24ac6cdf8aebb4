//! Database repository for VPN provisions.
//!
//! The queries here back both the VPN provisioner and the entitlement engine.
//! Trial uniqueness and the one-current-row rule are ultimately guaranteed by
//! partial unique indexes; callers treat a unique violation on insert as
//! "already used" and must not overwrite.

use crate::db::errors::Result;
use crate::db::models::vpn_provisions::{
    BusinessType, VpnProvision, VpnProvisionCreateDBRequest, VpnStatus,
};
use crate::types::abbrev_uuid;
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

const COLUMNS: &str = "id, user_id, subscription_id, channel, \
     business_type, service_tier, otun_uuid, plan_tier, status, \
     traffic_limit, traffic_used, expire_at, \
     email, device_id, granted_by, note, is_current, \
     created_at, updated_at";

pub struct VpnProvisions<'c> {
    db: &'c mut PgConnection,
}

impl<'c> VpnProvisions<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(provision_id = %abbrev_uuid(&request.id)), err)]
    pub async fn create(&mut self, request: &VpnProvisionCreateDBRequest) -> Result<VpnProvision> {
        let row = sqlx::query_as::<_, VpnProvision>(&format!(
            "INSERT INTO vpn_provisions \
                 (id, user_id, subscription_id, channel, \
                  business_type, service_tier, otun_uuid, plan_tier, status, \
                  traffic_limit, traffic_used, expire_at, \
                  email, device_id, granted_by, note, is_current) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17) \
             RETURNING {COLUMNS}"
        ))
        .bind(request.id)
        .bind(&request.user_id)
        .bind(&request.subscription_id)
        .bind(&request.channel)
        .bind(request.business_type)
        .bind(request.service_tier)
        .bind(&request.otun_uuid)
        .bind(&request.plan_tier)
        .bind(request.status)
        .bind(request.traffic_limit)
        .bind(request.traffic_used)
        .bind(request.expire_at)
        .bind(&request.email)
        .bind(&request.device_id)
        .bind(&request.granted_by)
        .bind(&request.note)
        .bind(request.is_current)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(row)
    }

    #[instrument(skip(self), fields(provision_id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, id: Uuid) -> Result<Option<VpnProvision>> {
        let row = sqlx::query_as::<_, VpnProvision>(&format!(
            "SELECT {COLUMNS} FROM vpn_provisions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(row)
    }

    /// The user's live account: current and active.
    #[instrument(skip(self), err)]
    pub async fn get_current_by_user(&mut self, user_id: &str) -> Result<Option<VpnProvision>> {
        let row = sqlx::query_as::<_, VpnProvision>(&format!(
            "SELECT {COLUMNS} FROM vpn_provisions \
             WHERE user_id = $1 AND is_current = TRUE AND status = 'active' \
             ORDER BY created_at DESC \
             LIMIT 1"
        ))
        .bind(user_id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(row)
    }

    /// The current row regardless of status, for renewal and conversion checks.
    #[instrument(skip(self), err)]
    pub async fn get_current_by_user_any_status(
        &mut self,
        user_id: &str,
    ) -> Result<Option<VpnProvision>> {
        let row = sqlx::query_as::<_, VpnProvision>(&format!(
            "SELECT {COLUMNS} FROM vpn_provisions \
             WHERE user_id = $1 AND is_current = TRUE \
             ORDER BY created_at DESC \
             LIMIT 1"
        ))
        .bind(user_id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(row)
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_subscription_id(
        &mut self,
        subscription_id: &str,
    ) -> Result<Option<VpnProvision>> {
        let row = sqlx::query_as::<_, VpnProvision>(&format!(
            "SELECT {COLUMNS} FROM vpn_provisions \
             WHERE subscription_id = $1 AND is_current = TRUE \
             ORDER BY created_at DESC \
             LIMIT 1"
        ))
        .bind(subscription_id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(row)
    }

    #[instrument(skip(self), fields(business_type = %business_type), err)]
    pub async fn get_by_user_and_business_type(
        &mut self,
        user_id: &str,
        business_type: BusinessType,
    ) -> Result<Option<VpnProvision>> {
        let row = sqlx::query_as::<_, VpnProvision>(&format!(
            "SELECT {COLUMNS} FROM vpn_provisions \
             WHERE user_id = $1 AND business_type = $2 \
             ORDER BY created_at DESC \
             LIMIT 1"
        ))
        .bind(user_id)
        .bind(business_type)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(row)
    }

    /// Latest non-empty otun_uuid for this user across all rows and statuses.
    /// The single lookup point for the identity-reuse rule.
    #[instrument(skip(self), err)]
    pub async fn get_otun_uuid_by_user(&mut self, user_id: &str) -> Result<Option<String>> {
        let uuid = sqlx::query_scalar::<_, String>(
            "SELECT otun_uuid FROM vpn_provisions \
             WHERE user_id = $1 AND otun_uuid IS NOT NULL AND otun_uuid != '' \
             ORDER BY created_at DESC \
             LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(uuid)
    }

    #[instrument(skip(self, vp), fields(provision_id = %abbrev_uuid(&vp.id)), err)]
    pub async fn update(&mut self, vp: &VpnProvision) -> Result<()> {
        sqlx::query(
            "UPDATE vpn_provisions SET \
                 subscription_id = $1, channel = $2, \
                 business_type = $3, service_tier = $4, \
                 otun_uuid = $5, plan_tier = $6, status = $7, \
                 traffic_limit = $8, traffic_used = $9, expire_at = $10, \
                 email = $11, device_id = $12, granted_by = $13, note = $14, \
                 is_current = $15, updated_at = NOW() \
             WHERE id = $16",
        )
        .bind(&vp.subscription_id)
        .bind(&vp.channel)
        .bind(vp.business_type)
        .bind(vp.service_tier)
        .bind(&vp.otun_uuid)
        .bind(&vp.plan_tier)
        .bind(vp.status)
        .bind(vp.traffic_limit)
        .bind(vp.traffic_used)
        .bind(vp.expire_at)
        .bind(&vp.email)
        .bind(&vp.device_id)
        .bind(&vp.granted_by)
        .bind(&vp.note)
        .bind(vp.is_current)
        .bind(vp.id)
        .execute(&mut *self.db)
        .await?;

        Ok(())
    }

    #[instrument(skip(self), fields(provision_id = %abbrev_uuid(&id), status = %status), err)]
    pub async fn update_status(&mut self, id: Uuid, status: VpnStatus) -> Result<()> {
        sqlx::query("UPDATE vpn_provisions SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(status)
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(())
    }

    /// Conversion step: the row stops representing the user's live state.
    #[instrument(skip(self), fields(provision_id = %abbrev_uuid(&id)), err)]
    pub async fn mark_not_current(&mut self, id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE vpn_provisions \
             SET is_current = FALSE, status = 'converted', updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .execute(&mut *self.db)
        .await?;

        Ok(())
    }

    #[instrument(skip(self), fields(provision_id = %abbrev_uuid(&id)), err)]
    pub async fn update_traffic_used(&mut self, id: Uuid, traffic_used: i64) -> Result<()> {
        sqlx::query("UPDATE vpn_provisions SET traffic_used = $1, updated_at = NOW() WHERE id = $2")
            .bind(traffic_used)
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(())
    }

    #[instrument(skip(self), err)]
    pub async fn exists_trial_by_device_id(&mut self, device_id: &str) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS( \
                 SELECT 1 FROM vpn_provisions \
                 WHERE device_id = $1 AND business_type = 'trial')",
        )
        .bind(device_id)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(exists)
    }

    #[instrument(skip(self, email), err)]
    pub async fn exists_trial_by_email(&mut self, email: &str) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS( \
                 SELECT 1 FROM vpn_provisions \
                 WHERE email = $1 AND business_type = 'trial')",
        )
        .bind(email)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(exists)
    }

    /// Filtered listing for the admin entitlement view. Empty filter values
    /// match everything; results are newest first with a fixed cap.
    #[instrument(skip(self), err)]
    pub async fn list_by_filters(
        &mut self,
        user_id: &str,
        business_type: &str,
        status: &str,
    ) -> Result<Vec<VpnProvision>> {
        let rows = sqlx::query_as::<_, VpnProvision>(&format!(
            "SELECT {COLUMNS} FROM vpn_provisions \
             WHERE ($1 = '' OR user_id = $1) \
               AND ($2 = '' OR business_type = $2) \
               AND ($3 = '' OR status = $3) \
             ORDER BY created_at DESC \
             LIMIT 100"
        ))
        .bind(user_id)
        .bind(business_type)
        .bind(status)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(rows)
    }
}

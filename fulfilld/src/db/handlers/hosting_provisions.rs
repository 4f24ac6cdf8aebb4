//! Database repository for hosting provisions.

use crate::db::errors::Result;
use crate::db::models::hosting_provisions::{
    HostingProvision, HostingProvisionCreateDBRequest, HostingStatus,
};
use crate::types::abbrev_uuid;
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

const COLUMNS: &str = "id, subscription_id, user_id, channel, \
     hosting_node_id, provider, region, \
     public_ip, api_port, api_key, vless_port, ss_port, public_key, short_id, \
     status, error_message, plan_tier, traffic_limit, traffic_used, \
     created_at, updated_at, ready_at, deleted_at";

pub struct HostingProvisions<'c> {
    db: &'c mut PgConnection,
}

impl<'c> HostingProvisions<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(provision_id = %abbrev_uuid(&request.id)), err)]
    pub async fn create(&mut self, request: &HostingProvisionCreateDBRequest) -> Result<HostingProvision> {
        let row = sqlx::query_as::<_, HostingProvision>(&format!(
            "INSERT INTO hosting_provisions \
                 (id, subscription_id, user_id, channel, provider, region, status, plan_tier, traffic_limit) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {COLUMNS}"
        ))
        .bind(request.id)
        .bind(&request.subscription_id)
        .bind(&request.user_id)
        .bind(&request.channel)
        .bind(&request.provider)
        .bind(&request.region)
        .bind(request.status)
        .bind(&request.plan_tier)
        .bind(request.traffic_limit)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(row)
    }

    #[instrument(skip(self), fields(provision_id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, id: Uuid) -> Result<Option<HostingProvision>> {
        let row = sqlx::query_as::<_, HostingProvision>(&format!(
            "SELECT {COLUMNS} FROM hosting_provisions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(row)
    }

    /// Newest first; soft-deleted rows are excluded.
    #[instrument(skip(self), err)]
    pub async fn get_by_subscription_id(&mut self, subscription_id: &str) -> Result<Vec<HostingProvision>> {
        let rows = sqlx::query_as::<_, HostingProvision>(&format!(
            "SELECT {COLUMNS} FROM hosting_provisions \
             WHERE subscription_id = $1 AND deleted_at IS NULL \
             ORDER BY created_at DESC"
        ))
        .bind(subscription_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(rows)
    }

    /// The user's live node, if any. Failed and deleted rows do not count.
    #[instrument(skip(self), err)]
    pub async fn get_active_by_user(&mut self, user_id: &str) -> Result<Option<HostingProvision>> {
        let row = sqlx::query_as::<_, HostingProvision>(&format!(
            "SELECT {COLUMNS} FROM hosting_provisions \
             WHERE user_id = $1 \
               AND status NOT IN ('deleted', 'failed') \
               AND deleted_at IS NULL \
             ORDER BY created_at DESC \
             LIMIT 1"
        ))
        .bind(user_id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(row)
    }

    /// Like [`Self::get_active_by_user`] but includes failed rows, so callers
    /// can surface or clean up a failed creation attempt.
    #[instrument(skip(self), err)]
    pub async fn get_latest_by_user(&mut self, user_id: &str) -> Result<Option<HostingProvision>> {
        let row = sqlx::query_as::<_, HostingProvision>(&format!(
            "SELECT {COLUMNS} FROM hosting_provisions \
             WHERE user_id = $1 \
               AND status != 'deleted' \
               AND deleted_at IS NULL \
             ORDER BY created_at DESC \
             LIMIT 1"
        ))
        .bind(user_id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(row)
    }

    #[instrument(skip(self, hp), fields(provision_id = %abbrev_uuid(&hp.id)), err)]
    pub async fn update(&mut self, hp: &HostingProvision) -> Result<()> {
        sqlx::query(
            "UPDATE hosting_provisions SET \
                 hosting_node_id = $1, \
                 public_ip = $2, \
                 api_port = $3, \
                 api_key = $4, \
                 vless_port = $5, \
                 ss_port = $6, \
                 public_key = $7, \
                 short_id = $8, \
                 status = $9, \
                 error_message = $10, \
                 traffic_used = $11, \
                 ready_at = $12, \
                 deleted_at = $13, \
                 updated_at = NOW() \
             WHERE id = $14",
        )
        .bind(&hp.hosting_node_id)
        .bind(&hp.public_ip)
        .bind(hp.api_port)
        .bind(&hp.api_key)
        .bind(hp.vless_port)
        .bind(hp.ss_port)
        .bind(&hp.public_key)
        .bind(&hp.short_id)
        .bind(hp.status)
        .bind(&hp.error_message)
        .bind(hp.traffic_used)
        .bind(hp.ready_at)
        .bind(hp.deleted_at)
        .bind(hp.id)
        .execute(&mut *self.db)
        .await?;

        Ok(())
    }

    #[instrument(skip(self, error), fields(provision_id = %abbrev_uuid(&id), status = %status), err)]
    pub async fn update_status(
        &mut self,
        id: Uuid,
        status: HostingStatus,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE hosting_provisions \
             SET status = $1, error_message = $2, updated_at = NOW() \
             WHERE id = $3",
        )
        .bind(status)
        .bind(error)
        .bind(id)
        .execute(&mut *self.db)
        .await?;

        Ok(())
    }
}

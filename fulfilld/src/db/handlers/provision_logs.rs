//! Database repository for provision audit logs.

use crate::db::errors::Result;
use crate::db::models::provision_logs::{ProvisionLog, ProvisionType};
use crate::types::abbrev_uuid;
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

const DEFAULT_LIMIT: i64 = 50;

pub struct ProvisionLogs<'c> {
    db: &'c mut PgConnection,
}

impl<'c> ProvisionLogs<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, message, metadata), fields(provision_id = %abbrev_uuid(&provision_id), action = action), err)]
    pub async fn create(
        &mut self,
        provision_id: Uuid,
        provision_type: ProvisionType,
        action: &str,
        status: &str,
        message: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO provision_logs \
                 (id, provision_id, provision_type, action, status, message, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(Uuid::new_v4())
        .bind(provision_id)
        .bind(provision_type)
        .bind(action)
        .bind(status)
        .bind(message)
        .bind(metadata)
        .execute(&mut *self.db)
        .await?;

        Ok(())
    }

    #[instrument(skip(self), fields(provision_id = %abbrev_uuid(&provision_id)), err)]
    pub async fn get_by_provision_id(
        &mut self,
        provision_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ProvisionLog>> {
        let limit = if limit <= 0 { DEFAULT_LIMIT } else { limit };

        let rows = sqlx::query_as::<_, ProvisionLog>(
            "SELECT id, provision_id, provision_type, action, status, message, metadata, created_at \
             FROM provision_logs \
             WHERE provision_id = $1 \
             ORDER BY created_at DESC \
             LIMIT $2",
        )
        .bind(provision_id)
        .bind(limit)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(rows)
    }

    pub async fn log_action(
        &mut self,
        provision_id: Uuid,
        provision_type: ProvisionType,
        action: &str,
        status: &str,
        message: &str,
    ) -> Result<()> {
        self.create(provision_id, provision_type, action, status, message, None)
            .await
    }

    pub async fn log_action_with_metadata(
        &mut self,
        provision_id: Uuid,
        provision_type: ProvisionType,
        action: &str,
        status: &str,
        message: &str,
        metadata: serde_json::Value,
    ) -> Result<()> {
        self.create(
            provision_id,
            provision_type,
            action,
            status,
            message,
            Some(metadata),
        )
        .await
    }
}

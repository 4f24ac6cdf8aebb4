//! Database repository for the region catalog.

use crate::db::errors::Result;
use crate::db::models::regions::{Region, RegionUpsertDBRequest};
use sqlx::PgConnection;
use tracing::instrument;

const COLUMNS: &str = "code, name, provider, available, created_at, updated_at";

pub struct Regions<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Regions<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), err)]
    pub async fn get_all(&mut self) -> Result<Vec<Region>> {
        let rows = sqlx::query_as::<_, Region>(&format!(
            "SELECT {COLUMNS} FROM regions ORDER BY name"
        ))
        .fetch_all(&mut *self.db)
        .await?;

        Ok(rows)
    }

    #[instrument(skip(self), err)]
    pub async fn get_available(&mut self) -> Result<Vec<Region>> {
        let rows = sqlx::query_as::<_, Region>(&format!(
            "SELECT {COLUMNS} FROM regions WHERE available = TRUE ORDER BY name"
        ))
        .fetch_all(&mut *self.db)
        .await?;

        Ok(rows)
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_code(&mut self, code: &str) -> Result<Option<Region>> {
        let row = sqlx::query_as::<_, Region>(&format!(
            "SELECT {COLUMNS} FROM regions WHERE code = $1"
        ))
        .bind(code)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(row)
    }

    #[instrument(skip(self, request), fields(code = %request.code), err)]
    pub async fn upsert(&mut self, request: &RegionUpsertDBRequest) -> Result<Region> {
        let row = sqlx::query_as::<_, Region>(&format!(
            "INSERT INTO regions (code, name, provider, available) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (code) DO UPDATE SET \
                 name = EXCLUDED.name, \
                 provider = EXCLUDED.provider, \
                 available = EXCLUDED.available, \
                 updated_at = NOW() \
             RETURNING {COLUMNS}"
        ))
        .bind(&request.code)
        .bind(&request.name)
        .bind(&request.provider)
        .bind(request.available)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(row)
    }
}

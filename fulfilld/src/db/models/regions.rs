//! Row type for the `regions` catalog.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Region {
    pub code: String,
    pub name: String,
    pub provider: String,
    pub available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Admin-supplied upsert payload.
#[derive(Debug, Clone)]
pub struct RegionUpsertDBRequest {
    pub code: String,
    pub name: String,
    pub provider: String,
    pub available: bool,
}

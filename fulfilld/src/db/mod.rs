//! Database layer: connection pool setup, migrations, repositories.

pub mod errors;
pub mod handlers;
pub mod models;

use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseConfig;

/// Get the fulfilld database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Connect a bounded pool with the configured schema on the search path, then
/// run migrations. Pool bounds match the reference sizing (25 max, 5 min).
pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<PgPool> {
    let schema = config.schema.clone();

    let pool = PgPoolOptions::new()
        .max_connections(25)
        .min_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .after_connect(move |conn, _meta| {
            let schema = schema.clone();
            Box::pin(async move {
                conn.execute(format!("SET search_path = '{schema}', public").as_str())
                    .await?;
                Ok(())
            })
        })
        .connect(&config.url())
        .await?;

    pool.execute(format!("CREATE SCHEMA IF NOT EXISTS {}", config.schema).as_str())
        .await?;

    migrator().run(&pool).await?;

    info!(
        host = %config.host,
        database = %config.name,
        schema = %config.schema,
        "Connected to PostgreSQL"
    );

    Ok(pool)
}

use std::time::Duration;

use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::config::Config;

/// Opens the pool and brings the schema up to date.
pub async fn connect_pg(cfg: &Config) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_max_connections)
        .acquire_timeout(cfg.store_timeout.max(Duration::from_secs(1)))
        .connect(&cfg.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database ready ({} max connections)", cfg.db_max_connections);
    Ok(pool)
}

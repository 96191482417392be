use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{info, warn};

pub async fn connect(database_url: &str) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .context("connect to database")
}

/// Bring the schema up to date, optionally wiping it first.
pub async fn migrate(db: &PgPool, reset: bool) -> anyhow::Result<()> {
    if reset {
        destructive_reset(db).await?;
    }
    sqlx::migrate!("./migrations")
        .run(db)
        .await
        .context("run migrations")?;
    info!("database schema up to date");
    Ok(())
}

/// Drop every table this service owns, including the migration ledger.
pub async fn destructive_reset(db: &PgPool) -> anyhow::Result<()> {
    warn!("dropping auth tables and migration history");
    for table in ["password_resets", "users", "_sqlx_migrations"] {
        sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
            .execute(db)
            .await
            .with_context(|| format!("drop table {table}"))?;
    }
    Ok(())
}

//! eidetic_store - event table bootstrap
//!
//! Connects with the configured database, creates the event table if needed
//! and verifies its columns.

use eidetic_store::{db, telemetry, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    telemetry::init_tracing();

    let config = Config::from_env()?;

    tracing::info!(
        "Bootstrapping event table '{}' ({})",
        config.table_name,
        config.environment
    );

    let pool = db::connect(&config).await?;
    db::verify_connection(&pool).await?;

    db::ensure_schema(&pool, &config.table_name).await?;

    if !db::check_schema(&pool, &config.table_name).await? {
        tracing::error!("Event table is not complete. Check for a conflicting table definition.");
        pool.close().await;
        return Err(anyhow::anyhow!("Event table schema incomplete"));
    }

    tracing::info!(
        "Event store ready (entity creation on save: {})",
        config.allow_entity_creation
    );

    pool.close().await;
    Ok(())
}

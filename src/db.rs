//! Database module
//!
//! Pool construction, connectivity check and event table bootstrap.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::{Config, TableName};

/// Create a connection pool from configuration
pub async fn connect(config: &Config) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(config.database_acquire_timeout)
        .connect(&config.database_url)
        .await
}

/// Verify the database answers queries
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;

    Ok(())
}

/// Create the event table and its ordering index if they do not exist.
///
/// The primary key on (entity_identifier, version) is what rejects a second
/// writer appending the same version. Read-back is ordered by `sequence`, which
/// keeps append order even if the wall clock behind `recorded_at` steps back.
pub async fn ensure_schema(pool: &PgPool, table: &TableName) -> Result<(), sqlx::Error> {
    let create_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            sequence BIGSERIAL NOT NULL,
            entity_identifier TEXT NOT NULL,
            version BIGINT NOT NULL CHECK (version > 0),
            event_type TEXT NOT NULL,
            schema_version INTEGER NOT NULL,
            event JSONB NOT NULL,
            recorded_at TIMESTAMPTZ NOT NULL DEFAULT clock_timestamp(),
            PRIMARY KEY (entity_identifier, version)
        )
        "#
    );

    // Tables bootstrapped before the sequence column existed
    let add_sequence = format!("ALTER TABLE {table} ADD COLUMN IF NOT EXISTS sequence BIGSERIAL");

    let create_index = format!(
        r#"
        CREATE INDEX IF NOT EXISTS {table}_sequence_idx
        ON {table} (entity_identifier, sequence)
        "#
    );

    let mut tx = pool.begin().await?;
    // Concurrent CREATE TABLE IF NOT EXISTS can still collide in the catalog
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(table.as_str())
        .execute(&mut *tx)
        .await?;
    sqlx::query(&create_table).execute(&mut *tx).await?;
    sqlx::query(&add_sequence).execute(&mut *tx).await?;
    sqlx::query(&create_index).execute(&mut *tx).await?;
    tx.commit().await?;

    tracing::info!("Event table '{}' is ready", table);
    Ok(())
}

/// Check the event table exists with the expected columns
pub async fn check_schema(pool: &PgPool, table: &TableName) -> Result<bool, sqlx::Error> {
    let required_columns = [
        "sequence",
        "entity_identifier",
        "version",
        "event_type",
        "schema_version",
        "event",
        "recorded_at",
    ];

    for column in required_columns {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.columns
                WHERE table_schema = current_schema()
                  AND table_name = $1
                  AND column_name = $2
            )
            "#,
        )
        .bind(table.as_str())
        .bind(column)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required column '{}.{}' does not exist", table, column);
            return Ok(false);
        }
    }

    Ok(true)
}

//! PostgreSQL Storage
//!
//! Event storage on a sqlx `PgPool`. The `(entity_identifier, version)`
//! primary key rejects a second writer that raced past the version check.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use crate::config::TableName;

use super::storage::{EventRecord, EventStorage, NewEventRecord, StorageSession, TransactionState};
use super::EventStoreError;

/// SQLSTATE for unique_violation
const UNIQUE_VIOLATION: &str = "23505";

type EventRow = (i64, String, i64, String, i32, serde_json::Value, DateTime<Utc>);

/// Event storage backed by PostgreSQL
#[derive(Debug, Clone)]
pub struct PgEventStorage {
    pool: PgPool,
    table: TableName,
}

impl PgEventStorage {
    /// Create storage for the given pool and event table
    pub fn new(pool: PgPool, table: TableName) -> Self {
        Self { pool, table }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }
}

#[async_trait]
impl EventStorage for PgEventStorage {
    type Session = PgSession;

    async fn open_session(&self) -> Result<PgSession, EventStoreError> {
        Ok(PgSession {
            pool: self.pool.clone(),
            table: self.table.clone(),
            tx: None,
        })
    }
}

/// Session over the pool; holds a pooled connection only while a transaction is open
pub struct PgSession {
    pool: PgPool,
    table: TableName,
    tx: Option<Transaction<'static, Postgres>>,
}

impl std::fmt::Debug for PgSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgSession")
            .field("table", &self.table)
            .field("state", &self.transaction_state())
            .finish()
    }
}

/// Map an insert failure, turning a primary key clash into `DuplicateVersion`
fn map_insert_error(err: sqlx::Error, record: &NewEventRecord) -> EventStoreError {
    let is_unique_violation = matches!(
        &err,
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION)
    );

    if is_unique_violation {
        EventStoreError::DuplicateVersion {
            identifier: record.entity_identifier.clone(),
            version: record.version,
        }
    } else {
        EventStoreError::Database(err)
    }
}

#[async_trait]
impl StorageSession for PgSession {
    fn transaction_state(&self) -> TransactionState {
        if self.tx.is_some() {
            TransactionState::InProgress
        } else {
            TransactionState::Idle
        }
    }

    async fn begin(&mut self) -> Result<(), EventStoreError> {
        if self.tx.is_some() {
            return Err(EventStoreError::TransactionAlreadyInProgress);
        }

        self.tx = Some(self.pool.begin().await?);
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), EventStoreError> {
        let tx = self
            .tx
            .take()
            .ok_or(EventStoreError::NoTransactionInProgress)?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), EventStoreError> {
        let tx = self
            .tx
            .take()
            .ok_or(EventStoreError::NoTransactionInProgress)?;
        tx.rollback().await?;
        Ok(())
    }

    async fn count_events(&mut self, entity_identifier: &str) -> Result<i64, EventStoreError> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE entity_identifier = $1",
            self.table
        );

        let count: i64 = match self.tx.as_mut() {
            Some(tx) => {
                sqlx::query_scalar(&sql)
                    .bind(entity_identifier)
                    .fetch_one(&mut **tx)
                    .await?
            }
            None => {
                sqlx::query_scalar(&sql)
                    .bind(entity_identifier)
                    .fetch_one(&self.pool)
                    .await?
            }
        };

        Ok(count)
    }

    async fn insert_event(&mut self, record: &NewEventRecord) -> Result<(), EventStoreError> {
        let sql = format!(
            r#"
            INSERT INTO {} (entity_identifier, version, event_type, schema_version, event)
            VALUES ($1, $2, $3, $4, $5)
            "#,
            self.table
        );

        let query = sqlx::query(&sql)
            .bind(&record.entity_identifier)
            .bind(record.version)
            .bind(&record.event.event_type)
            .bind(record.event.schema_version)
            .bind(&record.event.data);

        let result = match self.tx.as_mut() {
            Some(tx) => query.execute(&mut **tx).await,
            None => query.execute(&self.pool).await,
        };

        result.map_err(|e| map_insert_error(e, record))?;
        Ok(())
    }

    async fn select_events(
        &mut self,
        entity_identifier: &str,
        after_version: i64,
    ) -> Result<Vec<EventRecord>, EventStoreError> {
        let sql = format!(
            r#"
            SELECT sequence, entity_identifier, version, event_type, schema_version, event, recorded_at
            FROM {}
            WHERE entity_identifier = $1 AND version > $2
            ORDER BY sequence ASC
            "#,
            self.table
        );

        let query = sqlx::query_as::<_, EventRow>(&sql)
            .bind(entity_identifier)
            .bind(after_version);

        let rows = match self.tx.as_mut() {
            Some(tx) => query.fetch_all(&mut **tx).await?,
            None => query.fetch_all(&self.pool).await?,
        };

        let records = rows
            .into_iter()
            .map(
                |(sequence, entity_identifier, version, event_type, schema_version, data, recorded_at)| {
                    EventRecord {
                        sequence,
                        entity_identifier,
                        version,
                        event_type,
                        schema_version,
                        data,
                        recorded_at,
                    }
                },
            )
            .collect();

        Ok(records)
    }
}

//! In-Memory Storage
//!
//! Process-local event storage with the same transaction and uniqueness
//! rules as the PostgreSQL backend. Used for tests and local development.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use super::storage::{EventRecord, EventStorage, NewEventRecord, StorageSession, TransactionState};
use super::EventStoreError;

/// Committed events per entity plus the last assigned sequence and record time
#[derive(Debug, Default)]
struct EventLog {
    streams: HashMap<String, Vec<EventRecord>>,
    last_sequence: i64,
    last_recorded_at: Option<DateTime<Utc>>,
}

impl EventLog {
    fn has_version(&self, entity_identifier: &str, version: i64) -> bool {
        self.streams
            .get(entity_identifier)
            .is_some_and(|stream| stream.iter().any(|r| r.version == version))
    }

    /// Strictly increasing record time, even if the wall clock stalls
    fn next_recorded_at(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let recorded_at = match self.last_recorded_at {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_recorded_at = Some(recorded_at);
        recorded_at
    }

    /// Append rows atomically; nothing is written if any slot is taken
    fn append(&mut self, mut records: Vec<EventRecord>) -> Result<(), EventStoreError> {
        for (idx, record) in records.iter().enumerate() {
            let clashes_with_batch = records[..idx].iter().any(|r| {
                r.entity_identifier == record.entity_identifier && r.version == record.version
            });

            if clashes_with_batch || self.has_version(&record.entity_identifier, record.version) {
                return Err(EventStoreError::DuplicateVersion {
                    identifier: record.entity_identifier.clone(),
                    version: record.version,
                });
            }
        }

        for record in records.iter_mut() {
            self.last_sequence += 1;
            record.sequence = self.last_sequence;
            record.recorded_at = self.next_recorded_at();
        }

        for record in records {
            self.streams
                .entry(record.entity_identifier.clone())
                .or_default()
                .push(record);
        }

        Ok(())
    }
}

/// Event storage held in process memory.
///
/// Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventStorage {
    log: Arc<RwLock<EventLog>>,
}

impl InMemoryEventStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of committed events across all entities
    pub async fn len(&self) -> usize {
        self.log.read().await.streams.values().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl EventStorage for InMemoryEventStorage {
    type Session = InMemorySession;

    async fn open_session(&self) -> Result<InMemorySession, EventStoreError> {
        Ok(InMemorySession {
            log: Arc::clone(&self.log),
            pending: None,
        })
    }
}

/// Session over the shared log.
///
/// Writes made inside a transaction are buffered and only reach the log on
/// commit; they are visible to this session's own reads meanwhile.
#[derive(Debug)]
pub struct InMemorySession {
    log: Arc<RwLock<EventLog>>,
    pending: Option<Vec<EventRecord>>,
}

impl InMemorySession {
    fn pending_for<'a>(
        &'a self,
        entity_identifier: &'a str,
    ) -> impl Iterator<Item = &'a EventRecord> + 'a {
        self.pending
            .iter()
            .flatten()
            .filter(move |r| r.entity_identifier == entity_identifier)
    }
}

#[async_trait]
impl StorageSession for InMemorySession {
    fn transaction_state(&self) -> TransactionState {
        if self.pending.is_some() {
            TransactionState::InProgress
        } else {
            TransactionState::Idle
        }
    }

    async fn begin(&mut self) -> Result<(), EventStoreError> {
        if self.pending.is_some() {
            return Err(EventStoreError::TransactionAlreadyInProgress);
        }

        self.pending = Some(Vec::new());
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), EventStoreError> {
        let pending = self
            .pending
            .take()
            .ok_or(EventStoreError::NoTransactionInProgress)?;

        self.log.write().await.append(pending)
    }

    async fn rollback(&mut self) -> Result<(), EventStoreError> {
        self.pending
            .take()
            .ok_or(EventStoreError::NoTransactionInProgress)?;
        Ok(())
    }

    async fn count_events(&mut self, entity_identifier: &str) -> Result<i64, EventStoreError> {
        let committed = self
            .log
            .read()
            .await
            .streams
            .get(entity_identifier)
            .map_or(0, Vec::len);
        let pending = self.pending_for(entity_identifier).count();

        Ok((committed + pending) as i64)
    }

    async fn insert_event(&mut self, record: &NewEventRecord) -> Result<(), EventStoreError> {
        if record.version < 1 {
            return Err(EventStoreError::InvalidEventData(format!(
                "version must be positive, got {}",
                record.version
            )));
        }

        let taken = self
            .log
            .read()
            .await
            .has_version(&record.entity_identifier, record.version)
            || self
                .pending_for(&record.entity_identifier)
                .any(|r| r.version == record.version);

        if taken {
            return Err(EventStoreError::DuplicateVersion {
                identifier: record.entity_identifier.clone(),
                version: record.version,
            });
        }

        // sequence and recorded_at are assigned when the row is committed
        let row = EventRecord {
            sequence: 0,
            entity_identifier: record.entity_identifier.clone(),
            version: record.version,
            event_type: record.event.event_type.clone(),
            schema_version: record.event.schema_version,
            data: record.event.data.clone(),
            recorded_at: Utc::now(),
        };

        match self.pending.as_mut() {
            Some(pending) => pending.push(row),
            None => self.log.write().await.append(vec![row])?,
        }

        Ok(())
    }

    async fn select_events(
        &mut self,
        entity_identifier: &str,
        after_version: i64,
    ) -> Result<Vec<EventRecord>, EventStoreError> {
        let mut records: Vec<EventRecord> = self
            .log
            .read()
            .await
            .streams
            .get(entity_identifier)
            .map(|stream| {
                stream
                    .iter()
                    .filter(|r| r.version > after_version)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        // Own uncommitted rows follow everything committed, in insert order
        records.extend(
            self.pending_for(entity_identifier)
                .filter(|r| r.version > after_version)
                .cloned(),
        );

        Ok(records)
    }
}

//! Storage Sessions
//!
//! The durable side of the event store. A backend hands out sessions; each
//! session owns at most one open transaction and runs the row-level
//! operations the store needs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::codec::EncodedEvent;

use super::EventStoreError;

/// Event row to be appended
#[derive(Debug, Clone)]
pub struct NewEventRecord {
    pub entity_identifier: String,
    pub version: i64,
    pub event: EncodedEvent,
}

/// Committed event row
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    /// Store-wide append position; the ordering key for read-back
    pub sequence: i64,
    pub entity_identifier: String,
    pub version: i64,
    pub event_type: String,
    pub schema_version: i32,
    pub data: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl EventRecord {
    /// Encoded payload of this row
    pub fn encoded(&self) -> EncodedEvent {
        EncodedEvent {
            event_type: self.event_type.clone(),
            schema_version: self.schema_version,
            data: self.data.clone(),
        }
    }
}

/// Transaction lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    InProgress,
}

/// Source of storage sessions
#[async_trait]
pub trait EventStorage: Send + Sync {
    type Session: StorageSession;

    /// Acquire a new session with no open transaction
    async fn open_session(&self) -> Result<Self::Session, EventStoreError>;
}

/// One unit of access to the durable store.
///
/// Queries run inside the open transaction when there is one. Dropping a
/// session with an open transaction discards it.
#[async_trait]
pub trait StorageSession: Send {
    fn transaction_state(&self) -> TransactionState;

    /// Open a transaction; fails with `TransactionAlreadyInProgress` when one is open
    async fn begin(&mut self) -> Result<(), EventStoreError>;

    /// Make the transaction's writes durable.
    /// May fail with `DuplicateVersion` if another writer took a version first.
    async fn commit(&mut self) -> Result<(), EventStoreError>;

    /// Discard the transaction's writes
    async fn rollback(&mut self) -> Result<(), EventStoreError>;

    /// Number of committed (or own uncommitted) events for an entity
    async fn count_events(&mut self, entity_identifier: &str) -> Result<i64, EventStoreError>;

    /// Insert one event row; fails with `DuplicateVersion` when the slot is taken
    async fn insert_event(&mut self, record: &NewEventRecord) -> Result<(), EventStoreError>;

    /// Events with `version > after_version`, in append order (`sequence`)
    async fn select_events(
        &mut self,
        entity_identifier: &str,
        after_version: i64,
    ) -> Result<Vec<EventRecord>, EventStoreError>;
}

//! Event Store Errors
//!
//! Error types for event store operations.

/// Errors that can occur in the event store
#[derive(Debug, thiserror::Error)]
pub enum EventStoreError {
    /// Optimistic concurrency conflict
    #[error("Version mismatch for entity {identifier}: expected version {expected}, found {actual}")]
    VersionMismatch {
        identifier: String,
        expected: i64,
        actual: i64,
    },

    /// No events have been recorded for the entity
    #[error("Entity does not exist: {0}")]
    EntityDoesNotExist(String),

    /// Staged event has no recoverable type tag
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// `begin` called on a session that already has an open transaction
    #[error("A transaction is already in progress on this session")]
    TransactionAlreadyInProgress,

    /// `commit` or `rollback` called without an open transaction
    #[error("No transaction in progress on this session")]
    NoTransactionInProgress,

    /// The (entity, version) slot is already taken.
    /// Raised by storage backends; the store reports it as `VersionMismatch`.
    #[error("Duplicate version {version} for entity {identifier}")]
    DuplicateVersion { identifier: String, version: i64 },

    /// Stored payload was written with a different schema version
    #[error("Unsupported schema version for {event_type}: found {found}, supported {supported}")]
    UnsupportedSchemaVersion {
        event_type: String,
        found: i32,
        supported: i32,
    },

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored event data could not be decoded
    #[error("Invalid event data: {0}")]
    InvalidEventData(String),
}

impl EventStoreError {
    /// Check if this error is a concurrency conflict
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(
            self,
            EventStoreError::VersionMismatch { .. } | EventStoreError::DuplicateVersion { .. }
        )
    }

    /// Check if this error is retryable (after reloading the entity)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EventStoreError::VersionMismatch { .. }
                | EventStoreError::DuplicateVersion { .. }
                | EventStoreError::Database(_)
        )
    }
}

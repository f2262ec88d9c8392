//! Event Store Repository
//!
//! Core implementation of the Event Store pattern.
//! Appends an entity's staged events atomically behind an optimistic version
//! check, and reads an entity's history back in recorded order.

use crate::codec::EventCodec;
use crate::entity::EventSourcedEntity;

use super::storage::{EventRecord, EventStorage, NewEventRecord, StorageSession, TransactionState};
use super::EventStoreError;

/// Behaviour switches for the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// When true, an entity with no persisted events and version 0 may be
    /// saved. When false, `save` requires at least one persisted event.
    pub allow_entity_creation: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            allow_entity_creation: true,
        }
    }
}

/// Event Store for persisting and retrieving events
#[derive(Debug, Clone)]
pub struct EventStore<S, C> {
    storage: S,
    codec: C,
    options: StoreOptions,
}

impl<S, C> EventStore<S, C>
where
    S: EventStorage,
    C: EventCodec,
{
    /// Create a new EventStore over a storage backend and codec
    pub fn new(storage: S, codec: C) -> Self {
        Self {
            storage,
            codec,
            options: StoreOptions::default(),
        }
    }

    pub fn with_options(mut self, options: StoreOptions) -> Self {
        self.options = options;
        self
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Open a session for use with the `*_in` operations
    pub async fn open_session(&self) -> Result<S::Session, EventStoreError> {
        self.storage.open_session().await
    }

    // =========================================================================
    // save
    // =========================================================================

    /// Append the entity's staged events on a fresh session
    pub async fn save<E>(&self, entity: &E) -> Result<(), EventStoreError>
    where
        E: EventSourcedEntity<Event = C::Event>,
    {
        let mut session = self.storage.open_session().await?;
        self.save_in(&mut session, entity).await
    }

    /// Append the entity's staged events on the given session.
    ///
    /// The session must not have an open transaction; the store opens its own
    /// and always ends it with a commit or a rollback before returning.
    pub async fn save_in<E>(
        &self,
        session: &mut S::Session,
        entity: &E,
    ) -> Result<(), EventStoreError>
    where
        E: EventSourcedEntity<Event = C::Event>,
    {
        if session.transaction_state() == TransactionState::InProgress {
            return Err(EventStoreError::TransactionAlreadyInProgress);
        }

        let identifier = entity.identifier();
        let expected = entity.version();

        // Fast-path rejection; the storage uniqueness constraint is the real guard
        let persisted = self.persisted_version(session, identifier, expected).await?;
        if persisted != expected {
            tracing::warn!(
                "Version mismatch for entity {}: expected {}, found {}",
                identifier,
                expected,
                persisted
            );
            return Err(EventStoreError::VersionMismatch {
                identifier: identifier.to_string(),
                expected,
                actual: persisted,
            });
        }

        let staged = entity.staged_events();
        if staged.is_empty() {
            tracing::debug!("No staged events for entity {}", identifier);
            return Ok(());
        }

        session.begin().await?;

        if let Err(e) = self.append_staged(session, identifier, persisted, staged).await {
            if let Err(rollback_err) = session.rollback().await {
                tracing::error!(
                    "Rollback failed for entity {}: {}",
                    identifier,
                    rollback_err
                );
            } else {
                tracing::warn!("Rolled back save for entity {}: {}", identifier, e);
            }
            return Err(self.map_conflict(session, identifier, expected, e).await);
        }

        if let Err(e) = session.commit().await {
            return Err(self.map_conflict(session, identifier, expected, e).await);
        }

        tracing::info!(
            entity = identifier,
            from_version = persisted + 1,
            to_version = persisted + staged.len() as i64,
            "Committed {} event(s)",
            staged.len()
        );

        Ok(())
    }

    /// Encode and insert each staged event with the next version
    async fn append_staged(
        &self,
        session: &mut S::Session,
        identifier: &str,
        persisted: i64,
        staged: &[C::Event],
    ) -> Result<(), EventStoreError> {
        for (offset, event) in staged.iter().enumerate() {
            let version = persisted + offset as i64 + 1;
            let encoded = self.codec.encode(event)?;

            tracing::debug!(
                "Appending {} as version {} of entity {}",
                encoded.event_type,
                version,
                identifier
            );

            let record = NewEventRecord {
                entity_identifier: identifier.to_string(),
                version,
                event: encoded,
            };
            session.insert_event(&record).await?;
        }

        Ok(())
    }

    /// Report a lost race on a version slot as a version mismatch
    async fn map_conflict(
        &self,
        session: &mut S::Session,
        identifier: &str,
        expected: i64,
        err: EventStoreError,
    ) -> EventStoreError {
        let version = match err {
            EventStoreError::DuplicateVersion { version, .. } => version,
            other => return other,
        };

        let actual = match session.count_events(identifier).await {
            Ok(count) => count,
            Err(_) => version,
        };

        tracing::warn!(
            "Concurrent write to entity {} at version {}, save rejected",
            identifier,
            version
        );

        EventStoreError::VersionMismatch {
            identifier: identifier.to_string(),
            expected,
            actual,
        }
    }

    /// Persisted version used by `save`, applying the entity creation policy
    async fn persisted_version(
        &self,
        session: &mut S::Session,
        identifier: &str,
        expected: i64,
    ) -> Result<i64, EventStoreError> {
        let count = session.count_events(identifier).await?;

        if count == 0 && (!self.options.allow_entity_creation || expected != 0) {
            return Err(EventStoreError::EntityDoesNotExist(identifier.to_string()));
        }

        Ok(count)
    }

    // =========================================================================
    // entity_version
    // =========================================================================

    /// Number of events persisted for an entity.
    /// Fails with `EntityDoesNotExist` when there are none.
    pub async fn entity_version(&self, identifier: &str) -> Result<i64, EventStoreError> {
        let mut session = self.storage.open_session().await?;
        self.entity_version_in(&mut session, identifier).await
    }

    pub async fn entity_version_in(
        &self,
        session: &mut S::Session,
        identifier: &str,
    ) -> Result<i64, EventStoreError> {
        match session.count_events(identifier).await? {
            0 => Err(EventStoreError::EntityDoesNotExist(identifier.to_string())),
            count => Ok(count),
        }
    }

    // =========================================================================
    // fetch
    // =========================================================================

    /// Full event history of an entity, in recorded order.
    /// Empty when the entity has no events.
    pub async fn fetch_entity_events(
        &self,
        identifier: &str,
    ) -> Result<Vec<C::Event>, EventStoreError> {
        let mut session = self.storage.open_session().await?;
        self.fetch_entity_events_in(&mut session, identifier).await
    }

    pub async fn fetch_entity_events_in(
        &self,
        session: &mut S::Session,
        identifier: &str,
    ) -> Result<Vec<C::Event>, EventStoreError> {
        let records = session.select_events(identifier, 0).await?;
        self.decode_all(&records)
    }

    /// Events recorded after `after_version`, in recorded order
    pub async fn fetch_entity_events_after(
        &self,
        identifier: &str,
        after_version: i64,
    ) -> Result<Vec<C::Event>, EventStoreError> {
        let mut session = self.storage.open_session().await?;
        let records = session.select_events(identifier, after_version).await?;
        self.decode_all(&records)
    }

    /// Raw committed rows of an entity (for debugging/auditing)
    pub async fn fetch_entity_records(
        &self,
        identifier: &str,
    ) -> Result<Vec<EventRecord>, EventStoreError> {
        let mut session = self.storage.open_session().await?;
        session.select_events(identifier, 0).await
    }

    fn decode_all(&self, records: &[EventRecord]) -> Result<Vec<C::Event>, EventStoreError> {
        records
            .iter()
            .map(|record| self.codec.decode(&record.encoded()))
            .collect()
    }
}

//! eidetic_store
//!
//! Append-only event store for event-sourced entities. Entities stage events;
//! the store appends them behind an optimistic version check in a single
//! transaction and reads an entity's history back in recorded order.

pub mod codec;
pub mod config;
pub mod db;
pub mod entity;
pub mod event_store;
pub mod telemetry;

pub use codec::{DomainEvent, EncodedEvent, EventCodec, JsonCodec};
pub use config::{Config, ConfigError, TableName};
pub use entity::EventSourcedEntity;
pub use event_store::{
    EventRecord, EventStore, EventStoreError, InMemoryEventStorage, PgEventStorage,
    StoreOptions,
};

//! Event Store module
//!
//! Persistence layer for Event Sourcing.
//! Handles storing and retrieving entity events, with PostgreSQL and
//! in-memory storage backends.

mod error;
mod memory;
mod postgres;
mod repository;
mod storage;

pub use error::EventStoreError;
pub use memory::{InMemoryEventStorage, InMemorySession};
pub use postgres::{PgEventStorage, PgSession};
pub use repository::{EventStore, StoreOptions};
pub use storage::{
    EventRecord, EventStorage, NewEventRecord, StorageSession, TransactionState,
};

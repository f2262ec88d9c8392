//! Common test utilities
//!
//! A small account domain used to drive the store, plus Postgres setup.

#![allow(dead_code)]

use eidetic_store::{
    db, DomainEvent, EventSourcedEntity, EventStore, InMemoryEventStorage, JsonCodec,
    PgEventStorage, TableName,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;

/// Table used by the Postgres integration tests
pub const TEST_TABLE: &str = "eidetic_test_events";

/// Account-related events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AccountEvent {
    Opened { owner: String },
    Credited { amount: Decimal },
    Debited { amount: Decimal },
    /// Carries no usable type tag; the store must refuse it
    #[serde(rename = "")]
    Malformed,
}

impl DomainEvent for AccountEvent {
    fn event_type(&self) -> &str {
        match self {
            AccountEvent::Opened { .. } => "Opened",
            AccountEvent::Credited { .. } => "Credited",
            AccountEvent::Debited { .. } => "Debited",
            AccountEvent::Malformed => "",
        }
    }
}

/// Account entity rebuilt from its events
#[derive(Debug, Clone, Default)]
pub struct Account {
    id: String,
    owner: Option<String>,
    balance: Decimal,
    version: i64,
    staged: Vec<AccountEvent>,
}

impl Account {
    /// New account with no history
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::default()
        }
    }

    /// Rebuild an account by replaying its history
    pub fn replay(id: &str, history: Vec<AccountEvent>) -> Self {
        let mut account = Self::new(id);
        for event in history {
            account.apply(&event);
            account.version += 1;
        }
        account
    }

    /// Stage an event and apply it to the in-memory state
    pub fn record(&mut self, event: AccountEvent) -> &mut Self {
        self.apply(&event);
        self.staged.push(event);
        self
    }

    /// Forget staged events after they have been saved
    pub fn mark_committed(&mut self) {
        self.version += self.staged.len() as i64;
        self.staged.clear();
    }

    /// Pretend to have seen a different version
    pub fn with_version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    fn apply(&mut self, event: &AccountEvent) {
        match event {
            AccountEvent::Opened { owner } => self.owner = Some(owner.clone()),
            AccountEvent::Credited { amount } => self.balance += *amount,
            AccountEvent::Debited { amount } => self.balance -= *amount,
            AccountEvent::Malformed => {}
        }
    }
}

impl EventSourcedEntity for Account {
    type Event = AccountEvent;

    fn identifier(&self) -> &str {
        &self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn staged_events(&self) -> &[AccountEvent] {
        &self.staged
    }
}

pub fn opened(owner: &str) -> AccountEvent {
    AccountEvent::Opened {
        owner: owner.to_string(),
    }
}

pub fn credited(amount: Decimal) -> AccountEvent {
    AccountEvent::Credited { amount }
}

pub fn debited(amount: Decimal) -> AccountEvent {
    AccountEvent::Debited { amount }
}

pub type MemoryStore = EventStore<InMemoryEventStorage, JsonCodec<AccountEvent>>;
pub type PgStore = EventStore<PgEventStorage, JsonCodec<AccountEvent>>;

pub fn memory_store() -> MemoryStore {
    EventStore::new(InMemoryEventStorage::new(), JsonCodec::new())
}

/// Unique identifier so parallel tests never share a stream
pub fn fresh_id(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4())
}

/// Connect to the test database and make sure the event table exists.
/// Returns None (and the test should return early) when DATABASE_URL is unset.
pub async fn setup_pg_store() -> Option<PgStore> {
    dotenvy::dotenv().ok();
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping Postgres test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    let table = TableName::parse(TEST_TABLE).expect("Invalid test table name");
    db::ensure_schema(&pool, &table)
        .await
        .expect("Failed to create event table");

    Some(EventStore::new(
        PgEventStorage::new(pool, table),
        JsonCodec::new(),
    ))
}

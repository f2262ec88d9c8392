//! Contention Probe
//!
//! Several writers append to the same entity at once, reloading and retrying
//! on version conflicts. Afterwards the persisted versions must be 1..=N.
//!
//! Run with: cargo run --bin contention --release -- --writers 8 --rounds 50

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use eidetic_store::{
    db, telemetry, Config, DomainEvent, EventSourcedEntity, EventStore, EventStoreError,
    JsonCodec, PgEventStorage,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum ProbeEvent {
    Ticked { writer: u32, round: u32 },
}

impl DomainEvent for ProbeEvent {
    fn event_type(&self) -> &str {
        match self {
            ProbeEvent::Ticked { .. } => "Ticked",
        }
    }
}

struct Probe {
    id: String,
    version: i64,
    staged: Vec<ProbeEvent>,
}

impl EventSourcedEntity for Probe {
    type Event = ProbeEvent;

    fn identifier(&self) -> &str {
        &self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn staged_events(&self) -> &[ProbeEvent] {
        &self.staged
    }
}

type ProbeStore = EventStore<PgEventStorage, JsonCodec<ProbeEvent>>;

fn arg_value(args: &[String], name: &str, default: u32) -> u32 {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Append `rounds` events for one writer; returns the number of conflicts hit
async fn run_writer(
    store: Arc<ProbeStore>,
    identifier: String,
    writer: u32,
    rounds: u32,
) -> Result<u64, EventStoreError> {
    let mut conflicts = 0u64;

    for round in 0..rounds {
        loop {
            let history = store.fetch_entity_events(&identifier).await?;
            let probe = Probe {
                id: identifier.clone(),
                version: history.len() as i64,
                staged: vec![ProbeEvent::Ticked { writer, round }],
            };

            match store.save(&probe).await {
                Ok(()) => break,
                Err(e) if e.is_concurrency_conflict() => conflicts += 1,
                Err(e) => return Err(e),
            }
        }
    }

    Ok(conflicts)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let writers = arg_value(&args, "--writers", 8);
    let rounds = arg_value(&args, "--rounds", 50);

    let config = Config::from_env()?;
    let pool = db::connect(&config).await?;
    db::ensure_schema(&pool, &config.table_name).await?;

    let storage = PgEventStorage::new(pool.clone(), config.table_name.clone());
    let store = Arc::new(
        EventStore::new(storage, JsonCodec::<ProbeEvent>::new())
            .with_options(config.store_options()),
    );
    let identifier = format!("probe-{}", uuid::Uuid::new_v4());

    println!(
        "Contention probe - {} writers x {} rounds on {}",
        writers, rounds, identifier
    );

    let start = Instant::now();
    let mut handles = Vec::with_capacity(writers as usize);
    for writer in 0..writers {
        handles.push(tokio::spawn(run_writer(
            Arc::clone(&store),
            identifier.clone(),
            writer,
            rounds,
        )));
    }

    let mut conflicts = 0u64;
    for handle in handles {
        conflicts += handle.await??;
    }
    let elapsed = start.elapsed();

    let records = store.fetch_entity_records(&identifier).await?;
    let expected = (writers as i64) * (rounds as i64);
    let contiguous = records
        .iter()
        .enumerate()
        .all(|(idx, r)| r.version == idx as i64 + 1);

    println!("\n=== Contention Probe Results ===");
    println!("Events persisted: {} (expected {})", records.len(), expected);
    println!("Version conflicts: {}", conflicts);
    println!("Versions contiguous: {}", contiguous);
    println!("Time: {:.2}s", elapsed.as_secs_f64());

    pool.close().await;

    if !contiguous || records.len() as i64 != expected {
        return Err(anyhow::anyhow!("Event history is inconsistent"));
    }

    Ok(())
}

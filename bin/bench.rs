//! Store benchmark script
//!
//! Runs a fixed sequence of CRUD steps against one backend and records how
//! long each step took.

use anyhow::{Context, Result};
use clap::ValueEnum;
use keel_core::config::{DbLocation, StoreOptions};
use keel_core::impl_record;
use keel_storage::sqlite::SqliteCore;
use keel_storage::{AsyncDataStore, BlockingStore, DataStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub client_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl_record!(Client {
    key client_id => "ClientId",
    first_name => "FirstName",
    last_name => "LastName",
    email => "Email",
});

const CLIENT_TABLE_DDL: &str = "CREATE TABLE IF NOT EXISTS \"Client\" (\
    \"ClientId\" INTEGER PRIMARY KEY AUTOINCREMENT, \
    \"FirstName\" TEXT NOT NULL, \
    \"LastName\" TEXT NOT NULL, \
    \"Email\" TEXT NOT NULL)";

/// Storage style under test
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Document,
    Relational,
}

#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub mode: Mode,
    pub location: DbLocation,
    pub options: StoreOptions,
    pub count: usize,
}

#[derive(Debug, Clone)]
pub struct StepTiming {
    pub label: &'static str,
    pub items: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
struct Timings {
    steps: Vec<StepTiming>,
}

impl Timings {
    fn record(&mut self, label: &'static str, items: usize, started: Instant) {
        let elapsed = started.elapsed();
        info!("{}: {} items in {} ms", label, items, elapsed.as_millis());
        self.steps.push(StepTiming {
            label,
            items,
            elapsed,
        });
    }
}

fn create_clients(count: usize) -> Vec<Client> {
    (0..count)
        .map(|i| Client {
            client_id: 0,
            first_name: format!("First Name {}", i),
            last_name: format!("Last Name {}", i),
            email: format!("sender{}@example.com", i),
        })
        .collect()
}

/// Create the demo table, then reopen so the catalog sees it
fn open_relational(config: &BenchConfig) -> Result<Arc<SqliteCore>> {
    let bootstrap = SqliteCore::open_with_options(config.location.clone(), config.options.clone())?;
    bootstrap
        .transact_ddl(CLIENT_TABLE_DDL)
        .context("failed to create the Client table")?;
    drop(bootstrap);
    Ok(Arc::new(SqliteCore::open_with_options(
        config.location.clone(),
        config.options.clone(),
    )?))
}

/// Run the script and return the per-step timings
pub async fn run(config: &BenchConfig) -> Result<Vec<StepTiming>> {
    let mut timings = Timings::default();
    info!(
        "Benchmarking {:?} store at {}",
        config.mode,
        config.location.connection_string()
    );

    let started = Instant::now();
    match config.mode {
        Mode::Document => {
            let core = Arc::new(SqliteCore::open_with_options(
                config.location.clone(),
                config.options.clone(),
            )?);
            let store = BlockingStore::new(core.document_store::<Client>()?);
            timings.record("Initialized document store", 0, started);
            run_script(&store, config.count, &mut timings).await?;
        }
        Mode::Relational => {
            let core = open_relational(config)?;
            let store = BlockingStore::new(core.relational_store::<Client>()?);
            timings.record("Initialized relational store", 0, started);
            run_script(&store, config.count, &mut timings).await?;
        }
    }
    Ok(timings.steps)
}

async fn run_script<S>(
    store: &BlockingStore<S, Client>,
    count: usize,
    timings: &mut Timings,
) -> Result<()>
where
    S: DataStore<Client> + 'static,
{
    store.delete_all().await?;

    let clock = Instant::now();
    let single = store.add(create_clients(1)).await?;
    timings.record("Inserted single item", 1, clock);
    let saved_id = single
        .first()
        .map(|c| c.client_id)
        .context("insert returned an empty batch")?;
    debug!("Single item stored with key {}", saved_id);

    let clock = Instant::now();
    let saved = store.load_all().await?;
    timings.record("Loaded items", saved.len(), clock);

    let mut item = find(saved, saved_id)?;
    item.first_name = "Updated First".to_string();
    item.last_name = "Updated Last".to_string();
    item.email = "updated@example.com".to_string();
    let clock = Instant::now();
    store.update(vec![item.clone()]).await?;
    timings.record("Updated single item", 1, clock);

    let copy = Client {
        client_id: item.client_id,
        first_name: "Copy First".to_string(),
        last_name: "Copy Last".to_string(),
        email: "Copy Email".to_string(),
    };
    let clock = Instant::now();
    store.update(vec![copy]).await?;
    timings.record("Updated copy of single item", 1, clock);

    let clock = Instant::now();
    let saved = store.load_all().await?;
    timings.record("Loaded items", saved.len(), clock);

    let item = find(saved, saved_id)?;
    let clock = Instant::now();
    store.delete(vec![item]).await?;
    timings.record("Deleted single item", 1, clock);

    let clock = Instant::now();
    let inserted = store.add(create_clients(count)).await?;
    timings.record("Inserted items", inserted.len(), clock);

    let clock = Instant::now();
    let mut saved = store.load_all().await?;
    timings.record("Loaded items", saved.len(), clock);

    for (index, item) in saved.iter_mut().enumerate() {
        item.first_name = format!("Updated First {}", index);
        item.last_name = format!("Updated Last {}", index);
        item.email = format!("Updated email {}", index);
    }
    let updated = saved.len();
    let clock = Instant::now();
    store.update(saved).await?;
    timings.record("Updated items", updated, clock);

    let clock = Instant::now();
    let saved = store.load_all().await?;
    timings.record("Loaded updated items", saved.len(), clock);

    let deleted = saved.len();
    let clock = Instant::now();
    store.delete(saved).await?;
    timings.record("Deleted updated items", deleted, clock);

    Ok(())
}

fn find(items: Vec<Client>, id: i64) -> Result<Client> {
    items
        .into_iter()
        .find(|c| c.client_id == id)
        .with_context(|| format!("client {} not found after load", id))
}

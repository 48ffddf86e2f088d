//! CLI command implementations
//!
//! `check-config` loads a configuration file and prints it with defaults
//! filled in.
//!
//! `workload` opens an in-memory store and runs concurrent writers that
//! each increment counters under RepeatableRead. Afterwards it checkpoints,
//! verifies the counter total through a Snapshot transaction, and can
//! export a checkpoint image and verify that a store reopened from it
//! serves the same total.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::json;

use crate::availability::ManualAvailability;
use crate::checkpoint::CheckpointImage;
use crate::lock::CancelToken;
use crate::observability::{log_event_with_fields, Event, Logger};
use crate::store::{StoreConfig, StoreError, StoreResult, Store};
use crate::txn::{IsolationLevel, Transaction};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::write_response;

/// Store type driven by the CLI: string keys, counter values.
type CounterStore = Store<String, u64>;

/// Attempts per workload transaction before giving up.
const MAX_ATTEMPTS: usize = 32;

/// Writers check whether a checkpoint is due this often.
const CHECKPOINT_CHECK_INTERVAL: usize = 64;

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::CheckConfig { config } => check_config(&config),
        Command::Workload {
            config,
            writers,
            transactions,
            keys,
            image,
        } => workload(
            &config,
            WorkloadSettings {
                writers,
                transactions,
                keys,
                image,
            },
        ),
    }
}

/// Validate a configuration file and print the effective settings
pub fn check_config(config_path: &Path) -> CliResult<()> {
    let config = StoreConfig::load(config_path)?;
    Logger::set_min_severity(config.severity()?);
    log_event_with_fields(
        Event::ConfigLoaded,
        &[("path", &config_path.display().to_string())],
    );

    write_response(json!({ "config": config }))
}

/// Workload shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadSettings {
    pub writers: usize,
    pub transactions: usize,
    pub keys: usize,
    pub image: Option<PathBuf>,
}

impl WorkloadSettings {
    fn validate(&self) -> CliResult<()> {
        if self.writers == 0 {
            return Err(CliError::config_error("--writers must be at least 1"));
        }
        if self.keys == 0 {
            return Err(CliError::config_error("--keys must be at least 1"));
        }
        Ok(())
    }

    fn expected_total(&self) -> u64 {
        (self.writers * self.transactions) as u64
    }
}

/// What one writer task did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriterTotals {
    pub committed: usize,
    pub retries: usize,
    pub checkpoints: usize,
}

impl std::ops::AddAssign for WriterTotals {
    fn add_assign(&mut self, other: Self) {
        self.committed += other.committed;
        self.retries += other.retries;
        self.checkpoints += other.checkpoints;
    }
}

/// Run a concurrent workload and print its summary
pub fn workload(config_path: &Path, settings: WorkloadSettings) -> CliResult<()> {
    settings.validate()?;
    let config = load_or_default(config_path)?;
    Logger::set_min_severity(config.severity()?);

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::runtime_error(format!("Failed to start runtime: {}", e)))?;
    let summary = runtime.block_on(run_workload(config, settings))?;

    write_response(summary)
}

/// A missing file means defaults; an unreadable or invalid one is an error.
fn load_or_default(config_path: &Path) -> CliResult<StoreConfig> {
    if !config_path.exists() {
        return Ok(StoreConfig::default());
    }
    let config = StoreConfig::load(config_path)?;
    log_event_with_fields(
        Event::ConfigLoaded,
        &[("path", &config_path.display().to_string())],
    );
    Ok(config)
}

async fn run_workload(
    config: StoreConfig,
    settings: WorkloadSettings,
) -> CliResult<serde_json::Value> {
    let store: CounterStore = Store::open(config.clone(), Arc::new(ManualAvailability::primary()))?;
    let started = Instant::now();

    let mut tasks = Vec::with_capacity(settings.writers);
    for writer in 0..settings.writers {
        let store = store.clone();
        let transactions = settings.transactions;
        let keys = settings.keys;
        tasks.push(tokio::spawn(async move {
            run_writer(store, writer, transactions, keys).await
        }));
    }

    let mut totals = WriterTotals::default();
    for task in tasks {
        let writer_totals = task
            .await
            .map_err(|e| CliError::workload_failed(format!("Writer task failed: {}", e)))??;
        totals += writer_totals;
    }

    let report = store.checkpoint_latest().await?;
    let total = sum_counters(&store, settings.keys).await?;
    if total != settings.expected_total() {
        return Err(CliError::workload_failed(format!(
            "counter total {} does not match {} committed increments",
            total,
            settings.expected_total()
        )));
    }

    let image = match &settings.image {
        Some(path) => Some(export_and_verify(&store, &config, path, settings.keys, total).await?),
        None => None,
    };

    let summary = json!({
        "writers": settings.writers,
        "transactions_per_writer": settings.transactions,
        "keys": settings.keys,
        "totals": totals,
        "counter_total": total,
        "elapsed_ms": started.elapsed().as_millis() as u64,
        "last_committed_lsn": store.last_committed_lsn(),
        "checkpoint": report,
        "image": image,
        "stats": store.stats(),
        "metrics": store.metrics(),
    });

    store.close();
    Ok(summary)
}

fn key_name(index: usize) -> String {
    format!("counter-{:05}", index)
}

/// Spreads writers over the key space so they collide now and then.
fn key_for(writer: usize, iteration: usize, keys: usize) -> String {
    key_name((writer * 7_919 + iteration * 31) % keys)
}

async fn run_writer(
    store: CounterStore,
    writer: usize,
    transactions: usize,
    keys: usize,
) -> CliResult<WriterTotals> {
    let mut totals = WriterTotals::default();

    for iteration in 0..transactions {
        let key = key_for(writer, iteration, keys);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut txn = store.begin_transaction_with(IsolationLevel::RepeatableRead)?;
            match increment(&store, &mut txn, key.clone()).await {
                Ok(()) => {
                    txn.commit()?;
                    totals.committed += 1;
                    break;
                }
                Err(err) if err.is_retryable() && attempt < MAX_ATTEMPTS => {
                    if txn.is_active() {
                        txn.abort()?;
                    }
                    totals.retries += 1;
                    tokio::task::yield_now().await;
                }
                Err(err) => return Err(err.into()),
            }
        }

        if (iteration + 1) % CHECKPOINT_CHECK_INTERVAL == 0
            && store.checkpoint_if_due().await?.is_some()
        {
            totals.checkpoints += 1;
        }
    }

    Ok(totals)
}

/// Read-modify-write of one counter. The RepeatableRead read holds the key
/// lock, so the write that follows cannot be rejected.
async fn increment(
    store: &CounterStore,
    txn: &mut Transaction<String, u64>,
    key: String,
) -> StoreResult<()> {
    let timeout = store.default_timeout();
    let cancel = CancelToken::none();

    match store.conditional_get(txn, &key, timeout, &cancel).await? {
        Some(current) => {
            let applied = store
                .conditional_update(txn, key.clone(), current.value + 1, timeout, &cancel, Some(current.lsn))
                .await?;
            if !applied {
                return Err(StoreError::Conflict { key });
            }
            Ok(())
        }
        None => store.add(txn, key, 1, timeout, &cancel).await,
    }
}

/// Sums every counter through one Snapshot transaction.
async fn sum_counters(store: &CounterStore, keys: usize) -> StoreResult<u64> {
    let cancel = CancelToken::none();
    let mut txn = store.begin_transaction_with(IsolationLevel::Snapshot)?;
    let mut total = 0;
    for index in 0..keys {
        if let Some(read) = store
            .conditional_get(&mut txn, &key_name(index), store.default_timeout(), &cancel)
            .await?
        {
            total += read.value;
        }
    }
    txn.commit()?;
    Ok(total)
}

async fn export_and_verify(
    store: &CounterStore,
    config: &StoreConfig,
    path: &Path,
    keys: usize,
    expected_total: u64,
) -> CliResult<serde_json::Value> {
    let image = store.checkpoint_image().await?;
    image.write_to_file(path).map_err(StoreError::from)?;

    let loaded: CheckpointImage<String, u64> =
        CheckpointImage::read_from_file(path).map_err(StoreError::from)?;
    let checkpoint_lsn = loaded.checkpoint_lsn;
    let entries = loaded.len();

    let reopened: CounterStore = Store::open_from_image(
        config.clone(),
        Arc::new(ManualAvailability::primary()),
        loaded,
    )?;
    let reopened_total = sum_counters(&reopened, keys).await?;
    reopened.close();

    if reopened_total != expected_total {
        return Err(CliError::workload_failed(format!(
            "image at {} holds counter total {}, expected {}",
            path.display(),
            reopened_total,
            expected_total
        )));
    }

    Ok(json!({
        "path": path.display().to_string(),
        "entries": entries,
        "checkpoint_lsn": checkpoint_lsn,
        "verified": true,
    }))
}

//! Job queue and result persistence.
//!
//! `JobStore` is the row-level interface to the shared relational store. The
//! worker holds one handle for its whole lifetime. Two adapters ship:
//! `MemoryStore` (tests, local runs) and `PostgrestStore` (hosted store over
//! its REST row API).
//!
//! Claiming is optimistic: the queued→running transition is conditional on
//! the job still being queued, so of several concurrent claimants exactly one
//! sees an affected row.

pub mod memory;
pub mod postgrest;

pub use memory::MemoryStore;
pub use postgrest::{PostgrestConfig, PostgrestStore};

use chrono::{DateTime, NaiveDate, Utc};
use factorlab_core::domain::{JobId, PriceTable, RunId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::result::BacktestResult;

/// Equity rows are written in chunks of this size.
pub const EQUITY_CHUNK_SIZE: usize = 500;
/// Price rows are upserted in chunks of this size.
pub const PRICE_CHUNK_SIZE: usize = 1000;
/// Failure messages are cut to this many characters.
pub const FAILURE_MESSAGE_LIMIT: usize = 400;

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Transport(String),

    #[error("store returned HTTP {status} for {table}: {body}")]
    Status {
        table: String,
        status: u16,
        body: String,
    },

    #[error("could not decode {table} rows: {reason}")]
    Decode { table: String, reason: String },

    #[error("store not configured: {0}")]
    NotConfigured(String),
}

/// Lifecycle shared by jobs and runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Queued,
    Running,
    Completed,
    Failed,
}

/// A claimable unit of work. Always references a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub run_id: RunId,
    pub name: String,
}

/// What to backtest. `strategy_id` stays raw text; dispatch parses it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub name: String,
    pub strategy_id: String,
    pub status: Status,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// One stored adjusted close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRow {
    pub ticker: String,
    pub date: NaiveDate,
    pub adj_close: f64,
}

/// Ingestion bookkeeping, one row per source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestLog {
    pub source: String,
    pub tickers_ingested: usize,
    pub rows_upserted: usize,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub last_updated_at: DateTime<Utc>,
}

/// Row-level operations the engine needs from the shared store.
pub trait JobStore: Send + Sync {
    /// Oldest queued jobs that reference a run, at most `limit`.
    fn fetch_queued_jobs(&self, limit: usize) -> Result<Vec<Job>, StoreError>;

    /// Conditionally move `job` queued→running (progress 5). `false` means
    /// another worker won. A successful claim also moves the run to running.
    fn claim_job(&self, job: &Job) -> Result<bool, StoreError>;

    fn fetch_run(&self, run_id: &RunId) -> Result<Option<Run>, StoreError>;

    /// Stored closes for `tickers` within `[start, end]`.
    fn fetch_price_table(
        &self,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceTable, StoreError>;

    /// Replace the run's result rows and mark job and run completed.
    fn save_success(
        &self,
        job: &Job,
        duration_secs: u64,
        result: &BacktestResult,
    ) -> Result<(), StoreError>;

    /// Mark job and run failed, recording a truncated message in the job name.
    fn save_failure(&self, job: &Job, duration_secs: u64, message: &str)
        -> Result<(), StoreError>;

    /// Upsert price rows keyed by `(ticker, date)`. Returns rows written.
    fn upsert_prices(&self, rows: &[PriceRow]) -> Result<usize, StoreError>;

    /// Upsert the ingestion log row keyed by `source`.
    fn record_ingest(&self, log: &IngestLog) -> Result<(), StoreError>;
}

/// First `FAILURE_MESSAGE_LIMIT` characters of `message`.
pub fn truncate_message(message: &str) -> &str {
    match message.char_indices().nth(FAILURE_MESSAGE_LIMIT) {
        Some((idx, _)) => &message[..idx],
        None => message,
    }
}

/// Build a price table whose columns follow the requested `tickers` order,
/// whatever order the rows arrived in. Unrequested tickers go last.
pub fn price_table_in_order(tickers: &[String], mut rows: Vec<PriceRow>) -> PriceTable {
    rows.sort_by_key(|r| {
        tickers
            .iter()
            .position(|t| *t == r.ticker)
            .unwrap_or(usize::MAX)
    });
    PriceTable::from_observations(rows.into_iter().map(|r| (r.ticker, r.date, r.adj_close)))
}

/// Job name recorded on failure.
pub fn failed_job_name(name: &str, message: &str) -> String {
    format!("{name} (failed: {})", truncate_message(message))
}

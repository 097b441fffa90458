//! In-process `JobStore`.
//!
//! All tables live behind one mutex, so every operation is atomic with
//! respect to the others. The compare-and-set in `claim_job` gives the same
//! exactly-one-winner guarantee as the conditional update of the hosted store.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, NaiveDate, Utc};
use factorlab_core::domain::{JobId, PriceTable, RunId};

use super::{
    failed_job_name, price_table_in_order, IngestLog, Job, JobStore, PriceRow, Run, Status,
    StoreError,
};
use crate::metrics::PerformanceMetrics;
use crate::result::{BacktestResult, EquityRow, FeatureRecord, ModelMetadata, PredictionRow};

/// Stored state of a job row.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub job: Job,
    pub status: Status,
    pub progress: u8,
    pub started_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<u64>,
    seq: u64,
}

#[derive(Debug, Default)]
struct Tables {
    next_seq: u64,
    jobs: BTreeMap<JobId, JobRecord>,
    runs: HashMap<RunId, Run>,
    prices: BTreeMap<(String, NaiveDate), f64>,
    equity: HashMap<RunId, Vec<EquityRow>>,
    metrics: HashMap<RunId, PerformanceMetrics>,
    features: BTreeMap<(String, NaiveDate), FeatureRecord>,
    predictions: HashMap<RunId, Vec<PredictionRow>>,
    metadata: HashMap<RunId, ModelMetadata>,
    ingest_logs: HashMap<String, IngestLog>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a run row.
    pub fn insert_run(&self, run: Run) {
        self.tables().runs.insert(run.id.clone(), run);
    }

    /// Enqueue a job. Jobs are handed out in insertion order.
    pub fn enqueue_job(&self, job: Job) {
        let mut t = self.tables();
        let seq = t.next_seq;
        t.next_seq += 1;
        t.jobs.insert(
            job.id.clone(),
            JobRecord {
                job,
                status: Status::Queued,
                progress: 0,
                started_at: None,
                duration_secs: None,
                seq,
            },
        );
    }

    /// Insert a queued run together with its job.
    pub fn enqueue_run(
        &self,
        job_id: &str,
        run_id: &str,
        strategy_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Job {
        let run = Run {
            id: RunId::new(run_id),
            name: format!("{strategy_id} {start}..{end}"),
            strategy_id: strategy_id.to_string(),
            status: Status::Queued,
            start_date: start,
            end_date: end,
        };
        let job = Job {
            id: JobId::new(job_id),
            run_id: run.id.clone(),
            name: format!("Backtest {}", run.name),
        };
        self.insert_run(run);
        self.enqueue_job(job.clone());
        job
    }

    pub fn job(&self, id: &JobId) -> Option<JobRecord> {
        self.tables().jobs.get(id).cloned()
    }

    pub fn run(&self, id: &RunId) -> Option<Run> {
        self.tables().runs.get(id).cloned()
    }

    pub fn equity_rows(&self, run_id: &RunId) -> Vec<EquityRow> {
        self.tables().equity.get(run_id).cloned().unwrap_or_default()
    }

    pub fn metrics(&self, run_id: &RunId) -> Option<PerformanceMetrics> {
        self.tables().metrics.get(run_id).copied()
    }

    pub fn prediction_rows(&self, run_id: &RunId) -> Vec<PredictionRow> {
        self.tables()
            .predictions
            .get(run_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn model_metadata(&self, run_id: &RunId) -> Option<ModelMetadata> {
        self.tables().metadata.get(run_id).cloned()
    }

    pub fn feature_count(&self) -> usize {
        self.tables().features.len()
    }

    pub fn price_count(&self) -> usize {
        self.tables().prices.len()
    }

    pub fn ingest_log(&self, source: &str) -> Option<IngestLog> {
        self.tables().ingest_logs.get(source).cloned()
    }

    fn set_run_status(t: &mut Tables, run_id: &RunId, status: Status) {
        if let Some(run) = t.runs.get_mut(run_id) {
            run.status = status;
        }
    }
}

impl JobStore for MemoryStore {
    fn fetch_queued_jobs(&self, limit: usize) -> Result<Vec<Job>, StoreError> {
        let t = self.tables();
        let mut queued: Vec<&JobRecord> = t
            .jobs
            .values()
            .filter(|r| r.status == Status::Queued)
            .collect();
        queued.sort_by_key(|r| r.seq);
        Ok(queued.into_iter().take(limit).map(|r| r.job.clone()).collect())
    }

    fn claim_job(&self, job: &Job) -> Result<bool, StoreError> {
        let mut t = self.tables();
        let Some(record) = t.jobs.get_mut(&job.id) else {
            return Ok(false);
        };
        if record.status != Status::Queued {
            return Ok(false);
        }
        record.status = Status::Running;
        record.progress = 5;
        record.started_at = Some(Utc::now());

        if let Some(run) = t.runs.get_mut(&job.run_id) {
            if run.status == Status::Queued {
                run.status = Status::Running;
            }
        }
        Ok(true)
    }

    fn fetch_run(&self, run_id: &RunId) -> Result<Option<Run>, StoreError> {
        Ok(self.tables().runs.get(run_id).cloned())
    }

    fn fetch_price_table(
        &self,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceTable, StoreError> {
        let rows: Vec<PriceRow> = self
            .tables()
            .prices
            .iter()
            .filter(|((ticker, date), _)| {
                *date >= start && *date <= end && tickers.iter().any(|x| x == ticker)
            })
            .map(|((ticker, date), close)| PriceRow {
                ticker: ticker.clone(),
                date: *date,
                adj_close: *close,
            })
            .collect();
        Ok(price_table_in_order(tickers, rows))
    }

    fn save_success(
        &self,
        job: &Job,
        duration_secs: u64,
        result: &BacktestResult,
    ) -> Result<(), StoreError> {
        let mut t = self.tables();
        let run_id = job.run_id.clone();

        t.equity.insert(run_id.clone(), result.equity_rows.clone());
        t.metrics.insert(run_id.clone(), result.metrics);
        if let Some(features) = &result.feature_rows {
            for row in features {
                t.features
                    .insert((row.ticker.clone(), row.date), row.clone());
            }
        }
        // A result without model output still clears the previous model rows.
        t.predictions.remove(&run_id);
        t.metadata.remove(&run_id);
        if let Some(predictions) = &result.prediction_rows {
            t.predictions.insert(run_id.clone(), predictions.clone());
        }
        if let Some(metadata) = &result.model_metadata {
            t.metadata.insert(run_id.clone(), metadata.clone());
        }

        if let Some(record) = t.jobs.get_mut(&job.id) {
            record.status = Status::Completed;
            record.progress = 100;
            record.duration_secs = Some(duration_secs);
        }
        Self::set_run_status(&mut t, &run_id, Status::Completed);
        Ok(())
    }

    fn save_failure(
        &self,
        job: &Job,
        duration_secs: u64,
        message: &str,
    ) -> Result<(), StoreError> {
        let mut t = self.tables();
        if let Some(record) = t.jobs.get_mut(&job.id) {
            record.status = Status::Failed;
            record.progress = 100;
            record.duration_secs = Some(duration_secs);
            record.job.name = failed_job_name(&job.name, message);
        }
        Self::set_run_status(&mut t, &job.run_id, Status::Failed);
        Ok(())
    }

    fn upsert_prices(&self, rows: &[PriceRow]) -> Result<usize, StoreError> {
        let mut t = self.tables();
        for row in rows {
            t.prices
                .insert((row.ticker.clone(), row.date), row.adj_close);
        }
        Ok(rows.len())
    }

    fn record_ingest(&self, log: &IngestLog) -> Result<(), StoreError> {
        self.tables()
            .ingest_logs
            .insert(log.source.clone(), log.clone());
        Ok(())
    }
}

//! Queue worker: poll, claim, dispatch, persist.
//!
//! Jobs are processed one at a time. A job that loses the claim race is
//! skipped silently. Once claimed, a job always ends `completed` or `failed`
//! unless the store itself is unreachable while recording the outcome.

use std::time::{Duration, Instant};

use factorlab_core::EngineError;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::market_data::MarketDataClient;
use crate::runner::Dispatcher;
use crate::store::{Job, JobStore, StoreError};

/// Why a claimed job failed.
#[derive(Debug, Error)]
enum JobError {
    #[error("Run not found for run_id={0}")]
    RunNotFound(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Terminal state of one `process_job` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Another worker claimed the job first.
    Skipped,
    Completed { duration_secs: u64, synthetic: bool },
    Failed { duration_secs: u64, message: String },
}

pub struct Worker<'a> {
    store: &'a dyn JobStore,
    dispatcher: Dispatcher<'a>,
    poll_interval: Duration,
    batch_size: usize,
}

impl<'a> Worker<'a> {
    pub fn new(
        store: &'a dyn JobStore,
        market: &'a dyn MarketDataClient,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            store,
            dispatcher: Dispatcher::new(store, market, config),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            batch_size: config.job_batch_size.max(1),
        }
    }

    /// Claim and run one job, recording success or failure in the store.
    ///
    /// Errors only when the claim or the failure record cannot reach the store.
    pub fn process_job(&self, job: &Job) -> Result<JobOutcome, StoreError> {
        if !self.store.claim_job(job)? {
            return Ok(JobOutcome::Skipped);
        }

        let started = Instant::now();
        info!(job_id = %job.id, run_id = %job.run_id, "running job");

        match self.execute(job, started) {
            Ok(synthetic) => {
                let duration_secs = started.elapsed().as_secs();
                info!(job_id = %job.id, run_id = %job.run_id, duration_secs, synthetic, "job completed");
                Ok(JobOutcome::Completed {
                    duration_secs,
                    synthetic,
                })
            }
            Err(err) => {
                let duration_secs = started.elapsed().as_secs();
                let message = err.to_string();
                self.store.save_failure(job, duration_secs, &message)?;
                error!(job_id = %job.id, run_id = %job.run_id, duration_secs, error = %message, "job failed");
                Ok(JobOutcome::Failed {
                    duration_secs,
                    message,
                })
            }
        }
    }

    /// Steps after the claim. Returns whether the persisted result is synthetic.
    fn execute(&self, job: &Job, started: Instant) -> Result<bool, JobError> {
        let run = self
            .store
            .fetch_run(&job.run_id)?
            .ok_or_else(|| JobError::RunNotFound(job.run_id.to_string()))?;
        let result = self.dispatcher.dispatch(&run)?;
        self.store
            .save_success(job, started.elapsed().as_secs(), &result)?;
        Ok(result.is_synthetic())
    }

    /// Fetch one batch and process it. Returns the number of jobs fetched.
    ///
    /// Store errors are logged and count as an empty poll.
    pub fn poll_once(&self) -> usize {
        let jobs = match self.store.fetch_queued_jobs(self.batch_size) {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(error = %e, "failed to fetch queued jobs");
                return 0;
            }
        };
        for job in &jobs {
            if let Err(e) = self.process_job(job) {
                error!(job_id = %job.id, run_id = %job.run_id, error = %e, "store error while processing job");
            }
        }
        jobs.len()
    }

    /// Poll forever, sleeping `poll_interval` after an empty poll.
    /// With `once`, return after the first poll.
    pub fn run(&self, once: bool) {
        info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            batch_size = self.batch_size,
            "worker started"
        );
        loop {
            let fetched = self.poll_once();
            if once {
                return;
            }
            if fetched == 0 {
                std::thread::sleep(self.poll_interval);
            }
        }
    }
}

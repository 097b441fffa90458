//! `JobStore` over a PostgREST endpoint (the hosted store's REST row API).
//!
//! Tables: `jobs`, `runs`, `prices`, `equity_curve`, `run_metrics`,
//! `features`, `model_predictions`, `model_metadata`, `data_last_updated`.
//!
//! Conditional updates use filters on the PATCH itself with
//! `Prefer: return=representation`; an empty body means zero rows matched.
//! Upserts use `on_conflict` with `Prefer: resolution=merge-duplicates`.

use std::time::Duration;

use chrono::{NaiveDate, Utc};
use factorlab_core::domain::{PriceTable, RunId};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::{
    failed_job_name, price_table_in_order, IngestLog, Job, JobStore, PriceRow, Run, StoreError,
    EQUITY_CHUNK_SIZE, PRICE_CHUNK_SIZE,
};
use crate::result::{BacktestResult, EquityRow, MetricsRecord};

/// Page size for price reads.
const PRICE_PAGE_SIZE: usize = 1000;

/// Connection settings for the hosted store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostgrestConfig {
    /// Project URL; the REST root is `<url>/rest/v1`.
    pub url: String,
    /// Service-role key, sent as both `apikey` and bearer token.
    pub service_key: String,
}

pub struct PostgrestStore {
    client: Client,
    rest_url: String,
    service_key: String,
}

#[derive(Serialize)]
struct EquityInsert<'a> {
    run_id: &'a RunId,
    #[serde(flatten)]
    row: &'a EquityRow,
}

impl PostgrestStore {
    pub fn new(config: &PostgrestConfig) -> Result<Self, StoreError> {
        if config.url.trim().is_empty() || config.service_key.trim().is_empty() {
            return Err(StoreError::NotConfigured(
                "store URL and service key are required".into(),
            ));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            rest_url: format!("{}/rest/v1", config.url.trim_end_matches('/')),
            service_key: config.service_key.clone(),
        })
    }

    fn request(&self, method: reqwest::Method, table: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{table}", self.rest_url))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    fn send(table: &str, builder: RequestBuilder) -> Result<Response, StoreError> {
        let resp = builder
            .send()
            .map_err(|e| StoreError::Transport(format!("{table}: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(StoreError::Status {
                table: table.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    fn decode<T: DeserializeOwned>(table: &str, resp: Response) -> Result<T, StoreError> {
        resp.json().map_err(|e| StoreError::Decode {
            table: table.to_string(),
            reason: e.to_string(),
        })
    }

    fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, StoreError> {
        let resp = Self::send(table, self.request(reqwest::Method::GET, table).query(query))?;
        Self::decode(table, resp)
    }

    fn patch(
        &self,
        table: &str,
        filters: &[(&str, String)],
        body: &serde_json::Value,
    ) -> Result<(), StoreError> {
        Self::send(
            table,
            self.request(reqwest::Method::PATCH, table)
                .query(filters)
                .json(body),
        )?;
        Ok(())
    }

    fn delete(&self, table: &str, filters: &[(&str, String)]) -> Result<(), StoreError> {
        Self::send(table, self.request(reqwest::Method::DELETE, table).query(filters))?;
        Ok(())
    }

    fn insert_chunks<T: Serialize>(
        &self,
        table: &str,
        rows: &[T],
        chunk_size: usize,
        on_conflict: Option<&str>,
    ) -> Result<usize, StoreError> {
        let mut written = 0;
        for chunk in rows.chunks(chunk_size.max(1)) {
            let mut builder = self.request(reqwest::Method::POST, table).json(chunk);
            if let Some(keys) = on_conflict {
                builder = builder
                    .query(&[("on_conflict", keys)])
                    .header("Prefer", "resolution=merge-duplicates");
            }
            Self::send(table, builder)?;
            written += chunk.len();
        }
        debug!(table, rows = written, "rows written");
        Ok(written)
    }
}

#[derive(Deserialize)]
struct QueuedJobRow {
    id: String,
    run_id: Option<String>,
    name: String,
}

impl JobStore for PostgrestStore {
    fn fetch_queued_jobs(&self, limit: usize) -> Result<Vec<Job>, StoreError> {
        let rows: Vec<QueuedJobRow> = self.select(
            "jobs",
            &[
                ("select", "id,run_id,name".into()),
                ("status", "eq.queued".into()),
                ("run_id", "not.is.null".into()),
                ("order", "created_at.asc".into()),
                ("limit", limit.to_string()),
            ],
        )?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let run_id = row.run_id.filter(|r| !r.is_empty())?;
                Some(Job {
                    id: factorlab_core::domain::JobId::new(row.id),
                    run_id: RunId::new(run_id),
                    name: row.name,
                })
            })
            .collect())
    }

    fn claim_job(&self, job: &Job) -> Result<bool, StoreError> {
        let resp = Self::send(
            "jobs",
            self.request(reqwest::Method::PATCH, "jobs")
                .query(&[
                    ("id", format!("eq.{}", job.id)),
                    ("status", "eq.queued".to_string()),
                ])
                .header("Prefer", "return=representation")
                .json(&json!({
                    "status": "running",
                    "progress": 5,
                    "started_at": Utc::now().to_rfc3339(),
                })),
        )?;
        let claimed: Vec<serde_json::Value> = Self::decode("jobs", resp)?;
        if claimed.is_empty() {
            return Ok(false);
        }

        self.patch(
            "runs",
            &[
                ("id", format!("eq.{}", job.run_id)),
                ("status", "eq.queued".to_string()),
            ],
            &json!({ "status": "running" }),
        )?;
        Ok(true)
    }

    fn fetch_run(&self, run_id: &RunId) -> Result<Option<Run>, StoreError> {
        let rows: Vec<Run> = self.select(
            "runs",
            &[
                ("select", "id,name,strategy_id,status,start_date,end_date".into()),
                ("id", format!("eq.{run_id}")),
                ("limit", "1".into()),
            ],
        )?;
        Ok(rows.into_iter().next())
    }

    fn fetch_price_table(
        &self,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceTable, StoreError> {
        if tickers.is_empty() {
            return Ok(PriceTable::from_observations(Vec::<(String, NaiveDate, f64)>::new()));
        }
        let mut rows: Vec<PriceRow> = Vec::new();
        let mut offset = 0;
        loop {
            let page: Vec<PriceRow> = self.select(
                "prices",
                &[
                    ("select", "ticker,date,adj_close".into()),
                    ("ticker", format!("in.({})", tickers.join(","))),
                    ("date", format!("gte.{start}")),
                    ("date", format!("lte.{end}")),
                    ("order", "date.asc,ticker.asc".into()),
                    ("limit", PRICE_PAGE_SIZE.to_string()),
                    ("offset", offset.to_string()),
                ],
            )?;
            let fetched = page.len();
            rows.extend(page);
            if fetched < PRICE_PAGE_SIZE {
                break;
            }
            offset += fetched;
        }
        debug!(rows = rows.len(), tickers = tickers.len(), "stored prices read");
        Ok(price_table_in_order(tickers, rows))
    }

    fn save_success(
        &self,
        job: &Job,
        duration_secs: u64,
        result: &BacktestResult,
    ) -> Result<(), StoreError> {
        let run_filter = [("run_id", format!("eq.{}", job.run_id))];

        self.delete("equity_curve", &run_filter)?;
        let equity: Vec<EquityInsert<'_>> = result
            .equity_rows
            .iter()
            .map(|row| EquityInsert {
                run_id: &job.run_id,
                row,
            })
            .collect();
        self.insert_chunks("equity_curve", &equity, EQUITY_CHUNK_SIZE, None)?;

        let metrics = MetricsRecord {
            run_id: job.run_id.clone(),
            metrics: result.metrics,
        };
        self.insert_chunks("run_metrics", &[metrics], 1, Some("run_id"))?;

        if let Some(features) = &result.feature_rows {
            self.insert_chunks("features", features, EQUITY_CHUNK_SIZE, Some("ticker,date"))?;
        }
        self.delete("model_predictions", &run_filter)?;
        self.delete("model_metadata", &run_filter)?;
        if let Some(predictions) = &result.prediction_rows {
            self.insert_chunks("model_predictions", predictions, EQUITY_CHUNK_SIZE, None)?;
        }
        if let Some(metadata) = &result.model_metadata {
            self.insert_chunks(
                "model_metadata",
                std::slice::from_ref(metadata),
                1,
                Some("run_id"),
            )?;
        }

        self.patch(
            "jobs",
            &[("id", format!("eq.{}", job.id))],
            &json!({ "status": "completed", "progress": 100, "duration": duration_secs }),
        )?;
        self.patch(
            "runs",
            &[("id", format!("eq.{}", job.run_id))],
            &json!({ "status": "completed" }),
        )
    }

    fn save_failure(
        &self,
        job: &Job,
        duration_secs: u64,
        message: &str,
    ) -> Result<(), StoreError> {
        self.patch(
            "jobs",
            &[("id", format!("eq.{}", job.id))],
            &json!({
                "status": "failed",
                "duration": duration_secs,
                "progress": 100,
                "name": failed_job_name(&job.name, message),
            }),
        )?;
        self.patch(
            "runs",
            &[("id", format!("eq.{}", job.run_id))],
            &json!({ "status": "failed" }),
        )
    }

    fn upsert_prices(&self, rows: &[PriceRow]) -> Result<usize, StoreError> {
        self.insert_chunks("prices", rows, PRICE_CHUNK_SIZE, Some("ticker,date"))
    }

    fn record_ingest(&self, log: &IngestLog) -> Result<(), StoreError> {
        self.insert_chunks("data_last_updated", std::slice::from_ref(log), 1, Some("source"))?;
        Ok(())
    }
}

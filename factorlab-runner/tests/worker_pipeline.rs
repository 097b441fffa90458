//! End-to-end worker tests against the in-memory store.
//!
//! Prices are seeded into the store so no test touches the network; the
//! market-data client used here always reports no data.

use std::collections::BTreeMap;

use chrono::{Datelike, Days, NaiveDate};
use factorlab_core::domain::{PriceTable, RunId};
use factorlab_runner::market_data::{MarketDataClient, MarketDataError};
use factorlab_runner::result::{
    BacktestResult, ModelMetadata, ModelParams, PredictionRow, ResultOrigin,
};
use factorlab_runner::store::{JobStore, MemoryStore, PriceRow, Status};
use factorlab_runner::synthetic::synthetic_result;
use factorlab_runner::{EngineConfig, JobOutcome, Worker};

struct Offline;

impl MarketDataClient for Offline {
    fn name(&self) -> &str {
        "offline"
    }

    fn download_prices(
        &self,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceTable, MarketDataError> {
        Err(MarketDataError::NoData {
            tickers: tickers.join(","),
            start,
            end,
        })
    }
}

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// `n` consecutive weekdays starting at `start`.
fn weekdays(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
    let mut out = Vec::with_capacity(n);
    let mut day = start;
    while out.len() < n {
        if day.weekday().number_from_monday() <= 5 {
            out.push(day);
        }
        day = day + Days::new(1);
    }
    out
}

fn config(universe: &[&str]) -> EngineConfig {
    EngineConfig {
        universe: universe.iter().map(|s| s.to_string()).collect(),
        ..EngineConfig::default()
    }
}

/// Deterministic LCG walk per ticker.
fn random_walk_rows(tickers: &[&str], dates: &[NaiveDate]) -> Vec<PriceRow> {
    let mut rows = Vec::new();
    for (k, ticker) in tickers.iter().enumerate() {
        let mut px = 50.0 + 25.0 * k as f64;
        for (i, date) in dates.iter().enumerate() {
            let seed = ((i * tickers.len() + k) as u64)
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let change = ((seed >> 33) % 400) as f64 / 10_000.0 - 0.0195;
            px *= 1.0 + change;
            rows.push(PriceRow {
                ticker: ticker.to_string(),
                date: *date,
                adj_close: px,
            });
        }
    }
    rows
}

#[test]
fn equal_weight_curve_has_one_row_per_date() {
    let store = MemoryStore::new();
    let dates = weekdays(d("2023-01-02"), 300);
    let rows: Vec<PriceRow> = dates
        .iter()
        .enumerate()
        .flat_map(|(i, date)| {
            [
                PriceRow { ticker: "SPY".into(), date: *date, adj_close: 100.0 + i as f64 },
                PriceRow { ticker: "QQQ".into(), date: *date, adj_close: 200.0 - 0.3 * i as f64 },
            ]
        })
        .collect();
    store.upsert_prices(&rows).unwrap();

    let job = store.enqueue_run("j1", "r1", "equal_weight", dates[0], dates[299]);
    let cfg = config(&["SPY", "QQQ"]);
    let worker = Worker::new(&store, &Offline, &cfg);

    let outcome = worker.process_job(&job).unwrap();
    assert!(matches!(outcome, JobOutcome::Completed { synthetic: false, .. }));

    let equity = store.equity_rows(&job.run_id);
    assert_eq!(equity.len(), 300);
    assert_eq!(equity[0].date, dates[0]);
    assert_eq!(equity[299].date, dates[299]);

    // The first date has no prior close, so its blended return is 0.
    assert!((equity[0].portfolio - 100_000.0).abs() < 1e-9);
    assert!((equity[0].benchmark - 100_000.0).abs() < 1e-9);

    let blended = 0.5 * (101.0 / 100.0 - 1.0) + 0.5 * (199.7 / 200.0 - 1.0);
    assert!((equity[1].portfolio - 100_000.0 * (1.0 + blended)).abs() < 1e-6);
    assert!((equity[1].benchmark - 101_000.0).abs() < 1e-6);

    let metrics = store.metrics(&job.run_id).unwrap();
    assert_eq!(metrics.turnover, 0.08);
    assert_eq!(store.run(&job.run_id).unwrap().status, Status::Completed);
    let record = store.job(&job.id).unwrap();
    assert_eq!(record.status, Status::Completed);
    assert_eq!(record.progress, 100);
}

#[test]
fn momentum_runs_on_stored_prices() {
    let store = MemoryStore::new();
    let tickers = ["SPY", "QQQ", "IWM", "EFA"];
    let dates = weekdays(d("2022-01-03"), 400);
    store.upsert_prices(&random_walk_rows(&tickers, &dates)).unwrap();

    let job = store.enqueue_run("j1", "r1", "momentum_12_1", dates[0], dates[399]);
    let cfg = config(&tickers);
    let worker = Worker::new(&store, &Offline, &cfg);

    let outcome = worker.process_job(&job).unwrap();
    assert!(matches!(outcome, JobOutcome::Completed { synthetic: false, .. }));
    assert_eq!(store.equity_rows(&job.run_id).len(), 400);
    let turnover = store.metrics(&job.run_id).unwrap().turnover;
    assert!((0.0..=1.0).contains(&turnover));
}

#[test]
fn unknown_strategy_falls_back_to_seeded_synthetic() {
    let store = MemoryStore::new();
    let (start, end) = (d("2024-01-01"), d("2024-06-28"));
    let job = store.enqueue_run("j1", "run-42", "mean_reversion_x", start, end);
    let cfg = EngineConfig::default();
    let worker = Worker::new(&store, &Offline, &cfg);

    let outcome = worker.process_job(&job).unwrap();
    assert!(matches!(outcome, JobOutcome::Completed { synthetic: true, .. }));

    let expected = synthetic_result(&RunId::new("run-42"), start, end, "").unwrap();
    let stored = store.equity_rows(&job.run_id);
    assert!(!stored.is_empty());
    assert_eq!(stored, expected.equity_rows);
    assert_eq!(store.metrics(&job.run_id).unwrap().turnover, 0.12);
}

#[test]
fn model_strategy_persists_predictions_and_metadata() {
    let store = MemoryStore::new();
    let tickers = ["SPY", "QQQ", "IWM", "EFA", "EEM"];
    let dates = weekdays(d("2016-01-01"), 1820);
    store.upsert_prices(&random_walk_rows(&tickers, &dates)).unwrap();

    let (start, end) = (d("2021-01-01"), d("2022-12-31"));
    let job = store.enqueue_run("j1", "r-ml", "ml_ridge", start, end);
    let cfg = EngineConfig {
        top_n: 2,
        ..config(&["QQQ", "IWM", "EFA", "EEM"])
    };
    let worker = Worker::new(&store, &Offline, &cfg);

    let outcome = worker.process_job(&job).unwrap();
    assert!(matches!(outcome, JobOutcome::Completed { synthetic: false, .. }));

    let meta = store.model_metadata(&job.run_id).unwrap();
    let equity = store.equity_rows(&job.run_id);
    assert_eq!(meta.rebalance_count, equity.len());
    assert_eq!(meta.model_name, "ridge");
    assert_eq!(meta.top_n, 2);
    let total: f64 = meta.feature_importance.values().sum();
    assert!((total - 1.0).abs() < 1e-9);

    let predictions = store.prediction_rows(&job.run_id);
    assert_eq!(predictions.len(), meta.prediction_rows);
    assert!(predictions.iter().all(|p| p.ticker != "SPY"));
    assert!(predictions.iter().all(|p| p.target_date >= start && p.target_date <= end));
    assert!(store.feature_count() > 0);

    for row in &equity {
        let batch: Vec<_> = predictions.iter().filter(|p| p.target_date == row.date).collect();
        let weight: f64 = batch.iter().filter(|p| p.selected).map(|p| p.weight).sum();
        assert!((weight - 1.0).abs() < 1e-9);
        let top = batch.iter().find(|p| p.rank == 1).unwrap();
        assert!(batch.iter().all(|p| p.predicted_return <= top.predicted_return));
    }
}

#[test]
fn saving_twice_replaces_rows() {
    let store = MemoryStore::new();
    let (start, end) = (d("2024-01-01"), d("2024-03-29"));
    let job = store.enqueue_run("j1", "r1", "equal_weight", start, end);

    let long = synthetic_result(&job.run_id, start, end, "first").unwrap();
    store.save_success(&job, 1, &long).unwrap();
    assert_eq!(store.equity_rows(&job.run_id).len(), long.equity_rows.len());

    let mut short: BacktestResult = synthetic_result(&job.run_id, start, d("2024-01-31"), "second").unwrap();
    short.origin = ResultOrigin::Strategy;
    store.save_success(&job, 2, &short).unwrap();

    let stored = store.equity_rows(&job.run_id);
    assert_eq!(stored, short.equity_rows);
    assert!(stored.len() < long.equity_rows.len());
}

#[test]
fn result_without_model_output_clears_previous_model_rows() {
    let store = MemoryStore::new();
    let (start, end) = (d("2024-01-01"), d("2024-03-29"));
    let job = store.enqueue_run("j1", "r-ml", "ml_ridge", start, end);

    let mut model_result = synthetic_result(&job.run_id, start, end, "").unwrap();
    model_result.origin = ResultOrigin::Strategy;
    model_result.prediction_rows = Some(vec![PredictionRow {
        run_id: job.run_id.clone(),
        model_name: "ridge".into(),
        as_of_date: d("2024-01-31"),
        target_date: d("2024-02-29"),
        ticker: "QQQ".into(),
        predicted_return: 0.01,
        realized_return: 0.02,
        rank: 1,
        selected: true,
        weight: 1.0,
    }]);
    model_result.model_metadata = Some(ModelMetadata {
        run_id: job.run_id.clone(),
        model_name: "ridge".into(),
        train_start: d("2019-01-31"),
        train_end: d("2024-01-31"),
        train_rows: 240,
        prediction_rows: 1,
        rebalance_count: 1,
        top_n: 1,
        cost_bps: 10.0,
        feature_columns: vec!["momentum".into()],
        feature_importance: BTreeMap::from([("momentum".to_string(), 1.0)]),
        model_params: ModelParams {
            min_train_months: 24,
            top_n: 1,
            cost_bps: 10.0,
        },
    });
    store.save_success(&job, 4, &model_result).unwrap();
    assert_eq!(store.prediction_rows(&job.run_id).len(), 1);
    assert!(store.model_metadata(&job.run_id).is_some());

    // Requeued run that degraded to the synthetic result.
    let fallback = synthetic_result(&job.run_id, start, end, "no data returned").unwrap();
    assert!(fallback.prediction_rows.is_none() && fallback.model_metadata.is_none());
    store.save_success(&job, 1, &fallback).unwrap();

    assert!(store.prediction_rows(&job.run_id).is_empty());
    assert!(store.model_metadata(&job.run_id).is_none());
    assert_eq!(store.equity_rows(&job.run_id), fallback.equity_rows);
}

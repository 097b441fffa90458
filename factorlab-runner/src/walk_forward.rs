//! Walk-forward model strategy: expanding-window retrain at each month-end.
//!
//! For every as-of month whose forward target falls inside the run window:
//! 1. Train a fresh model on all earlier complete rows of the tradable universe
//!    (skipped until `min_train_months` distinct months are available).
//! 2. Score the tradable cross-section, rank descending, hold the top N equally.
//! 3. Book the realized next-month return net of `cost_bps × turnover`.
//!
//! The benchmark is excluded from the tradable universe. The equity curve is
//! dated at target month-ends and compounds net and benchmark returns
//! independently from `INITIAL_NAV`.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use factorlab_core::domain::{Periodicity, ReturnSeries, RunId};
use factorlab_core::features::{FeatureRow, FEATURE_COLUMNS};
use factorlab_core::model::{normalize_importances, ReturnModel};
use factorlab_core::EngineError;
use serde::{Deserialize, Serialize};

use crate::metrics::PerformanceMetrics;
use crate::result::{
    equity_rows, BacktestResult, FeatureRecord, ModelMetadata, ModelParams, PredictionRow,
    ResultOrigin,
};

// ─── Configuration ───────────────────────────────────────────────────

/// Configuration for the walk-forward runner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardConfig {
    /// Distinct training months required before the first rebalance (default 24).
    pub min_train_months: usize,
    /// Portfolio size before clamping to the universe (default 10).
    pub top_n: usize,
    /// One-way cost per unit of turnover, in basis points (default 10).
    pub cost_bps: f64,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self {
            min_train_months: 24,
            top_n: 10,
            cost_bps: 10.0,
        }
    }
}

// ─── Rebalance ───────────────────────────────────────────────────────

/// One scored ticker inside a rebalance decision.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedTicker {
    pub ticker: String,
    pub score: f64,
    pub realized: f64,
    pub rank: usize,
    pub selected: bool,
    pub weight: f64,
}

/// Outcome of one as-of month.
#[derive(Debug, Clone, PartialEq)]
pub struct RebalanceDecision {
    pub as_of: NaiveDate,
    pub target_date: NaiveDate,
    pub ranked: Vec<RankedTicker>,
}

impl RebalanceDecision {
    pub fn selected(&self) -> impl Iterator<Item = &RankedTicker> {
        self.ranked.iter().filter(|r| r.selected)
    }
}

/// Sort scored tickers descending (stable on ties), assign ranks 1..k and
/// equal weights to the top `top_n`.
pub fn rank_and_select(mut scored: Vec<(String, f64, f64)>, top_n: usize) -> Vec<RankedTicker> {
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    let n_selected = scored.len().min(top_n);
    let weight = if n_selected > 0 {
        1.0 / n_selected as f64
    } else {
        0.0
    };
    scored
        .into_iter()
        .enumerate()
        .map(|(i, (ticker, score, realized))| {
            let selected = i < top_n;
            RankedTicker {
                ticker,
                score,
                realized,
                rank: i + 1,
                selected,
                weight: if selected { weight } else { 0.0 },
            }
        })
        .collect()
}

/// Half the L1 distance between two weight vectors over `universe`.
fn turnover(
    universe: &[String],
    prev: &BTreeMap<String, f64>,
    next: &BTreeMap<String, f64>,
) -> f64 {
    universe
        .iter()
        .map(|t| {
            let a = prev.get(t).copied().unwrap_or(0.0);
            let b = next.get(t).copied().unwrap_or(0.0);
            (b - a).abs()
        })
        .sum::<f64>()
        / 2.0
}

// ─── Runner ──────────────────────────────────────────────────────────

/// Run the walk-forward strategy over `features` for the `[start, end]` window.
///
/// `new_model` builds a fresh, unfitted model for each rebalance.
#[allow(clippy::too_many_arguments)]
pub fn run_walk_forward(
    run_id: &RunId,
    model_name: &str,
    features: &[FeatureRow],
    start: NaiveDate,
    end: NaiveDate,
    benchmark: &str,
    new_model: &dyn Fn() -> Result<Box<dyn ReturnModel>, EngineError>,
    config: &WalkForwardConfig,
) -> Result<BacktestResult, EngineError> {
    let model_rows: Vec<&FeatureRow> = features.iter().filter(|r| r.is_model_ready()).collect();
    let in_window: Vec<&FeatureRow> = model_rows
        .iter()
        .copied()
        .filter(|r| r.target_date >= start && r.target_date <= end)
        .collect();
    if in_window.is_empty() {
        return Err(EngineError::InsufficientData(format!(
            "no complete feature rows with targets in {start}..={end}"
        )));
    }

    let universe: Vec<String> = in_window
        .iter()
        .filter(|r| r.ticker != benchmark)
        .map(|r| r.ticker.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if universe.is_empty() {
        return Err(EngineError::InsufficientData(
            "no non-benchmark tickers available for the model portfolio".into(),
        ));
    }
    let tradable: BTreeSet<&str> = universe.iter().map(String::as_str).collect();
    let top_n = config.top_n.min(universe.len()).max(1);
    let cost_rate = config.cost_bps / 10_000.0;

    let rebalance_dates: BTreeSet<NaiveDate> = in_window.iter().map(|r| r.date).collect();

    let mut predictions: Vec<PredictionRow> = Vec::new();
    let mut dates = Vec::new();
    let mut net_returns = Vec::new();
    let mut bench_returns = Vec::new();
    let mut turnovers = Vec::new();
    let mut prev_weights: BTreeMap<String, f64> = BTreeMap::new();
    let mut train_rows = 0usize;
    let mut last_model: Option<Box<dyn ReturnModel>> = None;

    for as_of in rebalance_dates {
        let train: Vec<&FeatureRow> = model_rows
            .iter()
            .copied()
            .filter(|r| r.date < as_of && tradable.contains(r.ticker.as_str()))
            .collect();
        let train_months = train.iter().map(|r| r.date).collect::<BTreeSet<_>>().len();
        if train_months < config.min_train_months {
            continue;
        }

        let test: Vec<&FeatureRow> = in_window
            .iter()
            .copied()
            .filter(|r| r.date == as_of && tradable.contains(r.ticker.as_str()))
            .collect();
        if test.is_empty() {
            continue;
        }

        let x: Vec<Vec<f64>> = train.iter().map(|r| r.features().to_vec()).collect();
        let y: Vec<f64> = train.iter().map(|r| r.target_return).collect();
        let mut model = new_model()?;
        model.fit(&x, &y)?;
        train_rows = train.len();

        let x_test: Vec<Vec<f64>> = test.iter().map(|r| r.features().to_vec()).collect();
        let scores = model.predict(&x_test)?;
        let ranked = rank_and_select(
            test.iter()
                .zip(scores)
                .map(|(r, s)| (r.ticker.clone(), s, r.target_return))
                .collect(),
            top_n,
        );
        let decision = RebalanceDecision {
            as_of,
            target_date: test[0].target_date,
            ranked,
        };

        let new_weights: BTreeMap<String, f64> = decision
            .selected()
            .map(|r| (r.ticker.clone(), r.weight))
            .collect();
        let tv = turnover(&universe, &prev_weights, &new_weights);
        prev_weights = new_weights;
        turnovers.push(tv);

        let selected: Vec<f64> = decision.selected().map(|r| r.realized).collect();
        let gross = if selected.is_empty() {
            0.0
        } else {
            selected.iter().sum::<f64>() / selected.len() as f64
        };
        dates.push(decision.target_date);
        net_returns.push(gross - cost_rate * tv);
        bench_returns.push(test[0].benchmark_return);

        predictions.extend(decision.ranked.iter().map(|r| PredictionRow {
            run_id: run_id.clone(),
            model_name: model_name.to_string(),
            as_of_date: decision.as_of,
            target_date: decision.target_date,
            ticker: r.ticker.clone(),
            predicted_return: r.score,
            realized_return: r.realized,
            rank: r.rank,
            selected: r.selected,
            weight: r.weight,
        }));
        last_model = Some(model);
    }

    let Some(model) = last_model else {
        return Err(EngineError::NoRebalance);
    };

    let portfolio = ReturnSeries::new(dates.clone(), net_returns);
    let bench = ReturnSeries::new(dates, bench_returns);
    let equity = equity_rows(&portfolio, &bench);
    let mean_turnover = turnovers.iter().sum::<f64>() / turnovers.len() as f64;
    let metrics = PerformanceMetrics::compute(&portfolio.values, mean_turnover, Periodicity::Monthly)?;

    let feature_rows: Vec<FeatureRecord> = features
        .iter()
        .filter(|r| r.has_features())
        .map(FeatureRecord::from)
        .collect();

    let importances = normalize_importances(model.importances(), FEATURE_COLUMNS.len());
    let (train_start, train_end) = model_rows
        .iter()
        .fold((NaiveDate::MAX, NaiveDate::MIN), |(lo, hi), r| {
            (lo.min(r.date), hi.max(r.date))
        });

    let metadata = ModelMetadata {
        run_id: run_id.clone(),
        model_name: model_name.to_string(),
        train_start,
        train_end,
        train_rows,
        prediction_rows: predictions.len(),
        rebalance_count: equity.len(),
        top_n,
        cost_bps: config.cost_bps,
        feature_columns: FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect(),
        feature_importance: FEATURE_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .zip(importances)
            .collect(),
        model_params: ModelParams {
            min_train_months: config.min_train_months,
            top_n,
            cost_bps: config.cost_bps,
        },
    };

    Ok(BacktestResult {
        equity_rows: equity,
        metrics,
        feature_rows: Some(feature_rows),
        prediction_rows: Some(predictions),
        model_metadata: Some(metadata),
        origin: ResultOrigin::Strategy,
    })
}

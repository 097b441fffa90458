//! Backtest result and the persisted row shapes it carries.

use chrono::NaiveDate;
use factorlab_core::domain::{ReturnSeries, RunId};
use factorlab_core::features::FeatureRow;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::metrics::PerformanceMetrics;

/// Starting NAV for every equity curve.
pub const INITIAL_NAV: f64 = 100_000.0;

/// Complete result of one run.
///
/// Replaces any earlier result of the same run when persisted. The model
/// fields are present only for model-family strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub equity_rows: Vec<EquityRow>,
    pub metrics: PerformanceMetrics,
    pub feature_rows: Option<Vec<FeatureRecord>>,
    pub prediction_rows: Option<Vec<PredictionRow>>,
    pub model_metadata: Option<ModelMetadata>,
    /// How the result was produced. Not persisted.
    #[serde(skip)]
    pub origin: ResultOrigin,
}

impl BacktestResult {
    pub fn is_synthetic(&self) -> bool {
        matches!(self.origin, ResultOrigin::SyntheticFallback { .. })
    }
}

/// Provenance of a result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ResultOrigin {
    #[default]
    Strategy,
    /// The preferred computation failed; `reason` is its error text.
    SyntheticFallback { reason: String },
}

/// One equity-curve point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityRow {
    pub date: NaiveDate,
    pub portfolio: f64,
    pub benchmark: f64,
}

/// Compound a portfolio and a benchmark return series from `INITIAL_NAV`.
///
/// Both series must share dates; the portfolio's dates are used.
pub fn equity_rows(portfolio: &ReturnSeries, benchmark: &ReturnSeries) -> Vec<EquityRow> {
    let p = portfolio.compound(INITIAL_NAV);
    let b = benchmark.compound(INITIAL_NAV);
    portfolio
        .dates
        .iter()
        .zip(p)
        .zip(b)
        .map(|((&date, portfolio), benchmark)| EquityRow {
            date,
            portfolio,
            benchmark,
        })
        .collect()
}

/// Persisted feature row: factors only, labels stay in memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub ticker: String,
    pub date: NaiveDate,
    pub momentum: f64,
    pub reversal: f64,
    pub volatility: f64,
    pub beta: f64,
    pub drawdown: f64,
}

impl From<&FeatureRow> for FeatureRecord {
    fn from(row: &FeatureRow) -> Self {
        Self {
            ticker: row.ticker.clone(),
            date: row.date,
            momentum: row.momentum,
            reversal: row.reversal,
            volatility: row.volatility,
            beta: row.beta,
            drawdown: row.drawdown,
        }
    }
}

/// One scored ticker at one rebalance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRow {
    pub run_id: RunId,
    pub model_name: String,
    pub as_of_date: NaiveDate,
    pub target_date: NaiveDate,
    pub ticker: String,
    pub predicted_return: f64,
    pub realized_return: f64,
    pub rank: usize,
    pub selected: bool,
    pub weight: f64,
}

/// Hyperparameters recorded with a model run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    pub min_train_months: usize,
    pub top_n: usize,
    pub cost_bps: f64,
}

/// Run-level description of a walk-forward model run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub run_id: RunId,
    pub model_name: String,
    pub train_start: NaiveDate,
    pub train_end: NaiveDate,
    pub train_rows: usize,
    pub prediction_rows: usize,
    pub rebalance_count: usize,
    pub top_n: usize,
    pub cost_bps: f64,
    pub feature_columns: Vec<String>,
    /// Normalized importances keyed by feature column; sums to 1 or is all zero.
    pub feature_importance: BTreeMap<String, f64>,
    pub model_params: ModelParams,
}

/// Persisted metrics record, keyed by run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub run_id: RunId,
    #[serde(flatten)]
    pub metrics: PerformanceMetrics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equity_rows_compound_independently() {
        let d1 = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let p = ReturnSeries::new(vec![d1, d2], vec![0.1, 0.1]);
        let b = ReturnSeries::new(vec![d1, d2], vec![0.0, -0.1]);
        let rows = equity_rows(&p, &b);
        assert_eq!(rows.len(), 2);
        assert!((rows[0].portfolio - 110_000.0).abs() < 1e-6);
        assert!((rows[1].portfolio - 121_000.0).abs() < 1e-6);
        assert!((rows[1].benchmark - 90_000.0).abs() < 1e-6);
    }

    #[test]
    fn metrics_record_flattens() {
        let record = MetricsRecord {
            run_id: RunId::new("r1"),
            metrics: PerformanceMetrics {
                cagr: 0.1,
                sharpe: 1.0,
                max_drawdown: -0.2,
                turnover: 0.08,
                volatility: 0.15,
                win_rate: 0.55,
                profit_factor: 1.3,
                calmar: 0.5,
            },
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["run_id"], "r1");
        assert_eq!(json["turnover"], 0.08);
    }

    #[test]
    fn origin_is_not_serialized() {
        let result = BacktestResult {
            equity_rows: Vec::new(),
            metrics: PerformanceMetrics {
                cagr: 0.0,
                sharpe: 0.0,
                max_drawdown: 0.0,
                turnover: 0.12,
                volatility: 0.0,
                win_rate: 0.0,
                profit_factor: 0.0,
                calmar: 0.0,
            },
            feature_rows: None,
            prediction_rows: None,
            model_metadata: None,
            origin: ResultOrigin::SyntheticFallback {
                reason: "x".into(),
            },
        };
        assert!(result.is_synthetic());
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("origin").is_none());
    }
}

//! Monthly factor features.
//!
//! Daily closes are resampled to calendar month-ends, then five trailing
//! factors are computed per ticker plus two forward labels:
//!
//! | column | definition |
//! |---|---|
//! | momentum | `px[t-1] / px[t-12] - 1` |
//! | reversal | `-ret[t-1]` |
//! | volatility | 6-month population stdev of `ret` × √12 |
//! | beta | 12-month `cov(ret, bench) / var(bench)` |
//! | drawdown | `px[t] / max(px[t-11..=t]) - 1` |
//! | target_return | `ret[t+1]` (label) |
//! | benchmark_return | `bench_ret[t+1]` (label) |
//!
//! Every rolling window requires all of its observations; a missing input
//! yields NaN rather than a partial statistic. Labels are never read by
//! the factor computations.

use crate::domain::{next_month_end, PriceTable};
use crate::error::EngineError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Model input columns, in design-matrix order.
pub const FEATURE_COLUMNS: [&str; 5] = ["momentum", "reversal", "volatility", "beta", "drawdown"];

const VOL_WINDOW: usize = 6;
const BETA_WINDOW: usize = 12;
const DRAWDOWN_WINDOW: usize = 12;
const MOMENTUM_SKIP: usize = 1;
const MOMENTUM_LOOKBACK: usize = 12;

/// One `(ticker, month-end)` observation. Missing values are NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub ticker: String,
    pub date: NaiveDate,
    pub target_date: NaiveDate,
    pub momentum: f64,
    pub reversal: f64,
    pub volatility: f64,
    pub beta: f64,
    pub drawdown: f64,
    pub target_return: f64,
    pub benchmark_return: f64,
}

impl FeatureRow {
    /// Feature vector in `FEATURE_COLUMNS` order.
    pub fn features(&self) -> [f64; 5] {
        [
            self.momentum,
            self.reversal,
            self.volatility,
            self.beta,
            self.drawdown,
        ]
    }

    /// All five factors finite.
    pub fn has_features(&self) -> bool {
        self.features().iter().all(|v| v.is_finite())
    }

    /// Usable for training or evaluation: factors and target all finite.
    pub fn is_model_ready(&self) -> bool {
        self.has_features() && self.target_return.is_finite()
    }
}

/// Compute the monthly feature table for every ticker in `prices`.
///
/// Rows are emitted date-major, tickers in table column order. Rows with
/// missing values are kept; filtering is the caller's job.
pub fn compute_monthly_features(
    prices: &PriceTable,
    benchmark: &str,
) -> Result<Vec<FeatureRow>, EngineError> {
    let bench_col = prices.column_index(benchmark).ok_or_else(|| {
        EngineError::InsufficientData(format!("benchmark {benchmark} not in price table"))
    })?;

    let monthly = prices.month_end();
    let n = monthly.len();
    let width = monthly.width();
    if n == 0 {
        return Ok(Vec::new());
    }

    let px: Vec<Vec<f64>> = (0..width)
        .map(|c| (0..n).map(|r| monthly.close(r, c)).collect())
        .collect();
    let ret: Vec<Vec<f64>> = px.iter().map(|col| simple_returns(col)).collect();
    let bench_ret = &ret[bench_col];

    let momentum: Vec<Vec<f64>> = px
        .iter()
        .map(|col| lagged_ratio(col, MOMENTUM_SKIP, MOMENTUM_LOOKBACK))
        .collect();
    let volatility: Vec<Vec<f64>> = ret
        .iter()
        .map(|col| {
            rolling_std(col, VOL_WINDOW)
                .into_iter()
                .map(|s| s * 12f64.sqrt())
                .collect()
        })
        .collect();
    let drawdown: Vec<Vec<f64>> = px
        .iter()
        .map(|col| drawdown_from_rolling_max(col, DRAWDOWN_WINDOW))
        .collect();
    let beta: Vec<Vec<f64>> = ret
        .iter()
        .map(|col| rolling_beta(col, bench_ret, BETA_WINDOW))
        .collect();

    let mut rows = Vec::with_capacity(n * width);
    for (t, &date) in monthly.dates().iter().enumerate() {
        let target_date = next_month_end(date);
        for (c, ticker) in monthly.tickers().iter().enumerate() {
            let reversal = if t >= 1 { -ret[c][t - 1] } else { f64::NAN };
            let (target_return, benchmark_return) = if t + 1 < n {
                (ret[c][t + 1], bench_ret[t + 1])
            } else {
                (f64::NAN, f64::NAN)
            };
            rows.push(FeatureRow {
                ticker: ticker.clone(),
                date,
                target_date,
                momentum: finite_or_nan(momentum[c][t]),
                reversal: finite_or_nan(reversal),
                volatility: finite_or_nan(volatility[c][t]),
                beta: finite_or_nan(beta[c][t]),
                drawdown: finite_or_nan(drawdown[c][t]),
                target_return: finite_or_nan(target_return),
                benchmark_return: finite_or_nan(benchmark_return),
            });
        }
    }
    Ok(rows)
}

// ─── Rolling helpers ────────────────────────────────────────────────

fn finite_or_nan(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        f64::NAN
    }
}

fn simple_returns(px: &[f64]) -> Vec<f64> {
    let mut out = vec![f64::NAN; px.len()];
    for t in 1..px.len() {
        out[t] = px[t] / px[t - 1] - 1.0;
    }
    out
}

/// `px[t - skip] / px[t - lookback] - 1`.
fn lagged_ratio(px: &[f64], skip: usize, lookback: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; px.len()];
    for t in lookback..px.len() {
        out[t] = px[t - skip] / px[t - lookback] - 1.0;
    }
    out
}

/// Window slice ending at `t`, or `None` if it is short or holds a NaN.
fn full_window(values: &[f64], t: usize, window: usize) -> Option<&[f64]> {
    if t + 1 < window {
        return None;
    }
    let slice = &values[t + 1 - window..=t];
    if slice.iter().any(|v| v.is_nan()) {
        None
    } else {
        Some(slice)
    }
}

/// Rolling population standard deviation.
fn rolling_std(values: &[f64], window: usize) -> Vec<f64> {
    (0..values.len())
        .map(|t| match full_window(values, t, window) {
            Some(w) => {
                let mean = w.iter().sum::<f64>() / window as f64;
                let var = w.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / window as f64;
                var.sqrt()
            }
            None => f64::NAN,
        })
        .collect()
}

fn drawdown_from_rolling_max(px: &[f64], window: usize) -> Vec<f64> {
    (0..px.len())
        .map(|t| match full_window(px, t, window) {
            Some(w) => {
                let peak = w.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                px[t] / peak - 1.0
            }
            None => f64::NAN,
        })
        .collect()
}

/// Rolling `cov(asset, bench) / var(bench)`. NaN when the benchmark variance is 0.
fn rolling_beta(asset: &[f64], bench: &[f64], window: usize) -> Vec<f64> {
    (0..asset.len())
        .map(|t| {
            let (Some(a), Some(b)) = (full_window(asset, t, window), full_window(bench, t, window))
            else {
                return f64::NAN;
            };
            let n = window as f64;
            let mean_a = a.iter().sum::<f64>() / n;
            let mean_b = b.iter().sum::<f64>() / n;
            let cov: f64 = a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - mean_a) * (y - mean_b))
                .sum();
            let var: f64 = b.iter().map(|y| (y - mean_b).powi(2)).sum();
            if var == 0.0 {
                f64::NAN
            } else {
                cov / var
            }
        })
        .collect()
}

//! Deterministic synthetic result, the last step of every fallback chain.
//!
//! Daily returns over the business days of the run window are drawn from
//! fixed normal distributions with an RNG seeded from the run id, so the
//! same run always regenerates the same curve.

use chrono::{Datelike, NaiveDate, Weekday};
use factorlab_core::domain::{Periodicity, ReturnSeries, RunId};
use factorlab_core::EngineError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::metrics::PerformanceMetrics;
use crate::result::{equity_rows, BacktestResult, ResultOrigin};

pub const SYNTHETIC_TURNOVER: f64 = 0.12;

const PORTFOLIO_MEAN: f64 = 0.0003;
const PORTFOLIO_STD: f64 = 0.008;
const BENCHMARK_MEAN: f64 = 0.0002;
const BENCHMARK_STD: f64 = 0.006;

/// Monday–Friday dates in `[start, end]`.
pub fn business_days(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .collect()
}

fn sample_normal(rng: &mut StdRng, mean: f64, std_dev: f64) -> f64 {
    // 1 - U keeps u1 in (0, 1] so the log is finite.
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + std_dev * z
}

/// Build the synthetic result for `run_id`.
///
/// `reason` is the error text of the computation this replaces.
pub fn synthetic_result(
    run_id: &RunId,
    start: NaiveDate,
    end: NaiveDate,
    reason: &str,
) -> Result<BacktestResult, EngineError> {
    let dates = business_days(start, end);
    if dates.len() < 2 {
        return Err(EngineError::InsufficientData(format!(
            "synthetic window {start}..={end} has {} business days, need 2",
            dates.len()
        )));
    }

    let mut rng = StdRng::seed_from_u64(run_id.seed());
    let mut portfolio = Vec::with_capacity(dates.len());
    let mut benchmark = Vec::with_capacity(dates.len());
    for _ in &dates {
        portfolio.push(sample_normal(&mut rng, PORTFOLIO_MEAN, PORTFOLIO_STD));
        benchmark.push(sample_normal(&mut rng, BENCHMARK_MEAN, BENCHMARK_STD));
    }

    let metrics = PerformanceMetrics::compute(&portfolio, SYNTHETIC_TURNOVER, Periodicity::Daily)?;
    let portfolio = ReturnSeries::new(dates.clone(), portfolio);
    let benchmark = ReturnSeries::new(dates, benchmark);

    Ok(BacktestResult {
        equity_rows: equity_rows(&portfolio, &benchmark),
        metrics,
        feature_rows: None,
        prediction_rows: None,
        model_metadata: None,
        origin: ResultOrigin::SyntheticFallback {
            reason: reason.to_string(),
        },
    })
}

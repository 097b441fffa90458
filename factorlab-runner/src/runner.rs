//! Strategy dispatch with the synthetic fallback.
//!
//! `Dispatcher::dispatch` turns a Run into a `BacktestResult`:
//! - baselines load daily prices and run the rule engine,
//! - model strategies load prices with a warm-up window, build monthly
//!   features and run the walk-forward runner,
//! - any error on either path (and an unknown strategy id) degrades to the
//!   deterministic synthetic result.
//!
//! Only the synthetic step's own input error escapes.

use chrono::{Months, NaiveDate};
use factorlab_core::domain::{Periodicity, PriceTable, ReturnSeries, StrategyFamily, StrategyId};
use factorlab_core::features::compute_monthly_features;
use factorlab_core::model::model_for;
use factorlab_core::strategies::BaselineStrategy;
use factorlab_core::EngineError;
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::data_loader::{load_prices, MIN_BASELINE_STORE_ROWS, MIN_MODEL_STORE_ROWS};
use crate::market_data::MarketDataClient;
use crate::metrics::PerformanceMetrics;
use crate::result::{equity_rows, BacktestResult, ResultOrigin};
use crate::store::{JobStore, Run};
use crate::synthetic::synthetic_result;
use crate::walk_forward::run_walk_forward;

pub struct Dispatcher<'a> {
    store: &'a dyn JobStore,
    market: &'a dyn MarketDataClient,
    config: &'a EngineConfig,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        store: &'a dyn JobStore,
        market: &'a dyn MarketDataClient,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            store,
            market,
            config,
        }
    }

    /// Compute the result for `run`, falling back to the synthetic result.
    pub fn dispatch(&self, run: &Run) -> Result<BacktestResult, EngineError> {
        let attempt = run
            .strategy_id
            .parse::<StrategyId>()
            .and_then(|id| self.run_strategy(id, run));

        match attempt {
            Ok(result) => Ok(result),
            Err(err) => {
                if matches!(err, EngineError::UnsupportedStrategy(_)) {
                    error!(run_id = %run.id, strategy = %run.strategy_id, "unsupported strategy, using synthetic result");
                } else {
                    warn!(
                        run_id = %run.id,
                        strategy = %run.strategy_id,
                        kind = err.kind(),
                        error = %err,
                        "strategy failed, using synthetic result"
                    );
                }
                synthetic_result(&run.id, run.start_date, run.end_date, &err.to_string())
            }
        }
    }

    /// Run a parsed strategy without any fallback.
    pub fn run_strategy(&self, id: StrategyId, run: &Run) -> Result<BacktestResult, EngineError> {
        match id.family() {
            StrategyFamily::Baseline => self.run_baseline(id, run),
            StrategyFamily::Model => self.run_model(id, run),
        }
    }

    fn run_baseline(&self, id: StrategyId, run: &Run) -> Result<BacktestResult, EngineError> {
        let strategy = BaselineStrategy::from_id(id)?;
        let tickers = self.config.baseline_universe();
        let loaded = load_prices(
            self.store,
            self.market,
            &tickers,
            run.start_date,
            run.end_date,
            MIN_BASELINE_STORE_ROWS,
        )?;
        let prices = &loaded.table;

        let output = strategy.compute(prices)?;
        let benchmark = benchmark_returns(prices)?;
        let metrics =
            PerformanceMetrics::compute(&output.returns.values, output.turnover, Periodicity::Daily)?;

        info!(
            run_id = %run.id,
            strategy = %id,
            rows = prices.len(),
            source = ?loaded.source,
            "baseline computed"
        );
        Ok(BacktestResult {
            equity_rows: equity_rows(&output.returns, &benchmark),
            metrics,
            feature_rows: None,
            prediction_rows: None,
            model_metadata: None,
            origin: ResultOrigin::Strategy,
        })
    }

    fn run_model(&self, id: StrategyId, run: &Run) -> Result<BacktestResult, EngineError> {
        let model_name = model_for(id)?.name().to_string();
        let tickers = self.config.model_universe();
        let warmup_start = warmup_start(run.start_date, self.config.warmup_years);
        let loaded = load_prices(
            self.store,
            self.market,
            &tickers,
            warmup_start,
            run.end_date,
            MIN_MODEL_STORE_ROWS,
        )?;
        let prices = &loaded.table;

        let benchmark = prices
            .default_benchmark()
            .ok_or_else(|| EngineError::InsufficientData("price table has no tickers".into()))?
            .to_string();
        let features = compute_monthly_features(prices, &benchmark)?;
        let result = run_walk_forward(
            &run.id,
            &model_name,
            &features,
            run.start_date,
            run.end_date,
            &benchmark,
            &|| model_for(id),
            &self.config.walk_forward(),
        )?;

        info!(
            run_id = %run.id,
            strategy = %id,
            model = %model_name,
            rebalances = result.equity_rows.len(),
            source = ?loaded.source,
            "walk-forward computed"
        );
        Ok(result)
    }
}

/// Daily benchmark returns over the table dates, first and missing entries 0.
pub fn benchmark_returns(prices: &PriceTable) -> Result<ReturnSeries, EngineError> {
    let ticker = prices
        .default_benchmark()
        .ok_or_else(|| EngineError::InsufficientData("price table has no tickers".into()))?;
    let col = prices
        .column_index(ticker)
        .ok_or_else(|| EngineError::InsufficientData(format!("benchmark {ticker} missing")))?;
    let values = prices
        .pct_change()
        .into_iter()
        .map(|row| {
            let r = row[col];
            if r.is_finite() {
                r
            } else {
                0.0
            }
        })
        .collect();
    Ok(ReturnSeries::new(prices.dates().to_vec(), values))
}

/// `start` moved back by `years`, clamped to the end of shorter months.
pub fn warmup_start(start: NaiveDate, years: u32) -> NaiveDate {
    start
        .checked_sub_months(Months::new(years.saturating_mul(12)))
        .unwrap_or(NaiveDate::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn warmup_moves_back_whole_years() {
        assert_eq!(warmup_start(d("2020-03-15"), 5), d("2015-03-15"));
        assert_eq!(warmup_start(d("2024-02-29"), 1), d("2023-02-28"));
        assert_eq!(warmup_start(d("2024-02-29"), 0), d("2024-02-29"));
    }

    #[test]
    fn benchmark_prefers_spy() {
        let prices = PriceTable::from_observations(vec![
            ("QQQ", d("2024-01-02"), 100.0),
            ("SPY", d("2024-01-02"), 200.0),
            ("QQQ", d("2024-01-03"), 150.0),
            ("SPY", d("2024-01-03"), 220.0),
        ]);
        let bench = benchmark_returns(&prices).unwrap();
        assert_eq!(bench.values[0], 0.0);
        assert!((bench.values[1] - 0.1).abs() < 1e-12);
    }

    #[test]
    fn benchmark_falls_back_to_first_column() {
        let prices = PriceTable::from_observations(vec![
            ("QQQ", d("2024-01-02"), 100.0),
            ("IWM", d("2024-01-02"), 50.0),
            ("QQQ", d("2024-01-03"), 150.0),
            ("IWM", d("2024-01-03"), 50.0),
        ]);
        let bench = benchmark_returns(&prices).unwrap();
        assert!((bench.values[1] - 0.5).abs() < 1e-12);
    }
}

//! Equal-weight baseline: 1/N across the whole universe every day.

use super::{filled_asset_returns, weighted_returns, StrategyReturns};
use crate::domain::{PriceTable, ReturnSeries};

/// Turnover reported for equal weight: the initial allocation only.
pub const EQUAL_WEIGHT_TURNOVER: f64 = 0.08;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EqualWeight;

impl EqualWeight {
    /// Per-date weights; every row is `1/N` for each of the N tickers.
    pub fn weights(&self, prices: &PriceTable) -> Vec<Vec<f64>> {
        let n = prices.width();
        if n == 0 {
            return vec![Vec::new(); prices.len()];
        }
        vec![vec![1.0 / n as f64; n]; prices.len()]
    }

    pub fn compute(&self, prices: &PriceTable) -> StrategyReturns {
        let rets = filled_asset_returns(prices);
        let values = weighted_returns(&rets, &self.weights(prices));
        StrategyReturns {
            returns: ReturnSeries::new(prices.dates().to_vec(), values),
            turnover: EQUAL_WEIGHT_TURNOVER,
        }
    }
}

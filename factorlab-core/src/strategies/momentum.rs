//! Cross-sectional 12-1 momentum.
//!
//! On the first trading day of each calendar month, score every ticker by
//! `px[t-21] / px[t-252] - 1` and hold the top half (at least one) of those
//! with a positive score, equal weighted. Weights are held until the next
//! month change. A day's return uses the previous day's weights.

use super::{filled_asset_returns, weighted_returns, StrategyReturns};
use crate::domain::{PriceTable, ReturnSeries};
use chrono::Datelike;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Momentum12_1 {
    /// Trading days skipped at the recent end of the window.
    pub skip: usize,
    /// Trading days back to the start of the window.
    pub lookback: usize,
}

impl Default for Momentum12_1 {
    fn default() -> Self {
        Self {
            skip: 21,
            lookback: 252,
        }
    }
}

impl Momentum12_1 {
    fn score(&self, prices: &PriceTable, row: usize, col: usize) -> f64 {
        if row < self.lookback {
            return f64::NAN;
        }
        prices.close(row - self.skip, col) / prices.close(row - self.lookback, col) - 1.0
    }

    fn is_rebalance_day(prices: &PriceTable, row: usize) -> bool {
        let dates = prices.dates();
        row == 0 || dates[row].month() != dates[row - 1].month()
    }

    /// Held weights per date (the allocation decided at that date's close).
    pub fn weights(&self, prices: &PriceTable) -> Vec<Vec<f64>> {
        let width = prices.width();
        let top_n = (width / 2).max(1);
        let mut current = vec![0.0; width];
        let mut out = Vec::with_capacity(prices.len());

        for row in 0..prices.len() {
            if Self::is_rebalance_day(prices, row) {
                let mut scored: Vec<(usize, f64)> = (0..width)
                    .map(|col| (col, self.score(prices, row, col)))
                    .filter(|(_, s)| s.is_finite() && *s > 0.0)
                    .collect();
                scored.sort_by(|a, b| b.1.total_cmp(&a.1));
                scored.truncate(top_n);

                current = vec![0.0; width];
                if !scored.is_empty() {
                    let w = 1.0 / scored.len() as f64;
                    for (col, _) in &scored {
                        current[*col] = w;
                    }
                }
            }
            out.push(current.clone());
        }
        out
    }

    pub fn compute(&self, prices: &PriceTable) -> StrategyReturns {
        let weights = self.weights(prices);
        let width = prices.width();

        let mut lagged = Vec::with_capacity(weights.len());
        lagged.push(vec![0.0; width]);
        lagged.extend(weights.iter().take(weights.len().saturating_sub(1)).cloned());

        let rets = filled_asset_returns(prices);
        let values = weighted_returns(&rets, &lagged);

        StrategyReturns {
            returns: ReturnSeries::new(prices.dates().to_vec(), values),
            turnover: mean_turnover(&weights),
        }
    }
}

/// Mean over all dates of `sum|w[t] - w[t-1]| / 2`; the first date counts as 0.
pub fn mean_turnover(weights: &[Vec<f64>]) -> f64 {
    if weights.is_empty() {
        return 0.0;
    }
    let total: f64 = weights
        .windows(2)
        .map(|pair| {
            pair[1]
                .iter()
                .zip(&pair[0])
                .map(|(a, b)| (a - b).abs())
                .sum::<f64>()
        })
        .sum();
    total / weights.len() as f64 / 2.0
}

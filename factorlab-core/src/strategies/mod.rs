//! Rule-based baseline strategies.
//!
//! Both baselines map a daily `PriceTable` to a per-date weight matrix and
//! derive a daily portfolio return series from it. Asset returns that cannot
//! be computed (first row, leading gaps) count as 0.

pub mod equal_weight;
pub mod momentum;

pub use equal_weight::EqualWeight;
pub use momentum::Momentum12_1;

use crate::domain::{PriceTable, ReturnSeries, StrategyId};
use crate::error::EngineError;

/// Minimum daily observations a baseline needs.
pub const MIN_BASELINE_ROWS: usize = 40;

/// Output of a baseline run: daily returns aligned to the table dates plus
/// the strategy's turnover figure.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyReturns {
    pub returns: ReturnSeries,
    pub turnover: f64,
}

/// Closed set of baselines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaselineStrategy {
    EqualWeight(EqualWeight),
    Momentum(Momentum12_1),
}

impl BaselineStrategy {
    /// Resolve a strategy id to a baseline. Model strategies are unsupported here.
    pub fn from_id(id: StrategyId) -> Result<Self, EngineError> {
        match id {
            StrategyId::EqualWeight => Ok(Self::EqualWeight(EqualWeight)),
            StrategyId::Momentum12_1 => Ok(Self::Momentum(Momentum12_1::default())),
            other => Err(EngineError::UnsupportedStrategy(format!(
                "{other} is not a baseline strategy"
            ))),
        }
    }

    pub fn id(&self) -> StrategyId {
        match self {
            Self::EqualWeight(_) => StrategyId::EqualWeight,
            Self::Momentum(_) => StrategyId::Momentum12_1,
        }
    }

    pub fn compute(&self, prices: &PriceTable) -> Result<StrategyReturns, EngineError> {
        if prices.width() == 0 || prices.len() < MIN_BASELINE_ROWS {
            return Err(EngineError::InsufficientData(format!(
                "{} needs at least {MIN_BASELINE_ROWS} daily rows, got {}",
                self.id(),
                prices.len()
            )));
        }
        match self {
            Self::EqualWeight(s) => Ok(s.compute(prices)),
            Self::Momentum(s) => Ok(s.compute(prices)),
        }
    }
}

/// Daily asset returns with missing values replaced by 0.
pub(crate) fn filled_asset_returns(prices: &PriceTable) -> Vec<Vec<f64>> {
    prices
        .pct_change()
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|r| if r.is_finite() { r } else { 0.0 })
                .collect()
        })
        .collect()
}

/// Sum of `returns[t] · weights[t]` per row.
pub(crate) fn weighted_returns(returns: &[Vec<f64>], weights: &[Vec<f64>]) -> Vec<f64> {
    returns
        .iter()
        .zip(weights)
        .map(|(r, w)| r.iter().zip(w).map(|(a, b)| a * b).sum())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn table(rows: usize) -> PriceTable {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        PriceTable::from_observations((0..rows).flat_map(|i| {
            let d = start + chrono::Days::new(i as u64);
            [("SPY", d, 100.0 + i as f64), ("QQQ", d, 200.0 - i as f64 * 0.5)]
        }))
    }

    #[test]
    fn below_forty_rows_is_insufficient() {
        let prices = table(39);
        for id in [StrategyId::EqualWeight, StrategyId::Momentum12_1] {
            let err = BaselineStrategy::from_id(id)
                .unwrap()
                .compute(&prices)
                .unwrap_err();
            assert!(matches!(err, EngineError::InsufficientData(_)));
        }
    }

    #[test]
    fn model_ids_are_not_baselines() {
        let err = BaselineStrategy::from_id(StrategyId::MlRidge).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedStrategy(_)));
    }

    #[test]
    fn returns_align_with_dates() {
        let prices = table(40);
        let out = BaselineStrategy::from_id(StrategyId::EqualWeight)
            .unwrap()
            .compute(&prices)
            .unwrap();
        assert_eq!(out.returns.dates, prices.dates());
        assert_eq!(out.returns.values[0], 0.0);
    }
}

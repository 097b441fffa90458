//! Performance metrics: pure functions over a periodic return series.
//!
//! Every metric is a pure function: cleaned returns in, scalar out. The
//! annualization factor comes from the series' `Periodicity` (252 daily,
//! 12 monthly). Standard deviations are population (denominator n).

use factorlab_core::domain::Periodicity;
use factorlab_core::EngineError;
use serde::{Deserialize, Serialize};

/// The persisted metrics record of one run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub cagr: f64,
    pub sharpe: f64,
    pub max_drawdown: f64,
    pub turnover: f64,
    pub volatility: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub calmar: f64,
}

impl PerformanceMetrics {
    /// Compute all metrics from raw returns and a turnover passthrough.
    ///
    /// Non-finite entries are discarded first; nothing left is `EmptyInput`.
    pub fn compute(
        returns: &[f64],
        turnover: f64,
        periodicity: Periodicity,
    ) -> Result<Self, EngineError> {
        let clean: Vec<f64> = returns.iter().copied().filter(|r| r.is_finite()).collect();
        if clean.is_empty() {
            return Err(EngineError::EmptyInput(
                "no finite returns to compute metrics".into(),
            ));
        }
        let periods = periodicity.periods_per_year();
        let equity = equity_curve(&clean);

        let cagr = cagr(&equity, periods);
        let max_drawdown = max_drawdown(&equity);
        Ok(Self {
            cagr,
            sharpe: sharpe_ratio(&clean, periods),
            max_drawdown,
            turnover,
            volatility: std_dev(&clean) * periods.sqrt(),
            win_rate: win_rate(&clean),
            profit_factor: profit_factor(&clean),
            calmar: calmar_ratio(cagr, max_drawdown),
        })
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Running product of `(1 + r)`, starting from 1.
pub fn equity_curve(returns: &[f64]) -> Vec<f64> {
    let mut equity = 1.0;
    returns
        .iter()
        .map(|r| {
            equity *= 1.0 + r;
            equity
        })
        .collect()
}

/// Compound annual growth rate: `equity_final^(periods_per_year / n) - 1`.
pub fn cagr(equity_curve: &[f64], periods_per_year: f64) -> f64 {
    match equity_curve.last() {
        Some(&final_eq) => final_eq.powf(periods_per_year / equity_curve.len() as f64) - 1.0,
        None => 0.0,
    }
}

/// Annualized Sharpe ratio (zero risk-free rate).
///
/// Returns 0.0 when the standard deviation is zero.
pub fn sharpe_ratio(returns: &[f64], periods_per_year: f64) -> f64 {
    let std = std_dev(returns);
    if std < 1e-15 {
        return 0.0;
    }
    mean_f64(returns) / std * periods_per_year.sqrt()
}

/// Maximum drawdown as a negative fraction (e.g., -0.15 = 15% drawdown).
///
/// Returns 0.0 if equity never falls below its running peak.
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd = 0.0_f64;
    for &eq in equity_curve {
        peak = peak.max(eq);
        if peak > 0.0 {
            max_dd = max_dd.min(eq / peak - 1.0);
        }
    }
    max_dd
}

/// Calmar ratio: CAGR / |max_drawdown|, 0.0 without a drawdown.
pub fn calmar_ratio(cagr: f64, max_drawdown: f64) -> f64 {
    if max_drawdown < 0.0 {
        cagr / max_drawdown.abs()
    } else {
        0.0
    }
}

/// Fraction of periods with a strictly positive return.
pub fn win_rate(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    returns.iter().filter(|&&r| r > 0.0).count() as f64 / returns.len() as f64
}

/// Sum of gains / |sum of losses|; 0.0 when there are no losses.
pub fn profit_factor(returns: &[f64]) -> f64 {
    let gains: f64 = returns.iter().filter(|&&r| r > 0.0).sum();
    let losses: f64 = returns.iter().filter(|&&r| r < 0.0).sum::<f64>().abs();
    if losses > 0.0 {
        gains / losses
    } else {
        0.0
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = mean_f64(values);
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_positive_returns() {
        let m = PerformanceMetrics::compute(&[0.001; 252], 0.0, Periodicity::Daily).unwrap();
        assert_eq!(m.sharpe, 0.0);
        assert_eq!(m.max_drawdown, 0.0);
        assert_eq!(m.calmar, 0.0);
        assert_eq!(m.win_rate, 1.0);
        assert_eq!(m.profit_factor, 0.0);
        let expected = 1.001f64.powi(252) - 1.0;
        assert!((m.cagr - expected).abs() < 1e-9);
    }

    #[test]
    fn empty_input_is_error() {
        let err = PerformanceMetrics::compute(&[], 0.1, Periodicity::Daily).unwrap_err();
        assert!(matches!(err, EngineError::EmptyInput(_)));
        let err =
            PerformanceMetrics::compute(&[f64::NAN, f64::INFINITY], 0.1, Periodicity::Daily)
                .unwrap_err();
        assert!(matches!(err, EngineError::EmptyInput(_)));
    }

    #[test]
    fn non_finite_entries_are_dropped() {
        let a = PerformanceMetrics::compute(&[0.01, f64::NAN, -0.02], 0.3, Periodicity::Monthly)
            .unwrap();
        let b = PerformanceMetrics::compute(&[0.01, -0.02], 0.3, Periodicity::Monthly).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.turnover, 0.3);
    }

    #[test]
    fn drawdown_and_calmar() {
        let m = PerformanceMetrics::compute(&[0.1, -0.5, 0.2], 0.0, Periodicity::Monthly).unwrap();
        assert!((m.max_drawdown - (-0.5)).abs() < 1e-12);
        assert!((m.calmar - m.cagr / 0.5).abs() < 1e-12);
    }

    #[test]
    fn profit_factor_and_win_rate() {
        let m = PerformanceMetrics::compute(&[0.02, -0.01, 0.03, -0.04], 0.0, Periodicity::Daily)
            .unwrap();
        assert!((m.profit_factor - 1.0).abs() < 1e-12);
        assert_eq!(m.win_rate, 0.5);
    }

    #[test]
    fn monthly_annualization() {
        let returns = [0.01, -0.02, 0.03, 0.0];
        let m = PerformanceMetrics::compute(&returns, 0.0, Periodicity::Monthly).unwrap();
        let sd = std_dev(&returns);
        assert!((m.volatility - sd * 12f64.sqrt()).abs() < 1e-12);
        assert!((m.sharpe - mean_f64(&returns) / sd * 12f64.sqrt()).abs() < 1e-12);
    }
}

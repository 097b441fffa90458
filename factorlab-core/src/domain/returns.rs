use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Sampling frequency of a return series; decides the annualization factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Periodicity {
    Daily,
    Monthly,
}

impl Periodicity {
    pub fn periods_per_year(self) -> f64 {
        match self {
            Self::Daily => 252.0,
            Self::Monthly => 12.0,
        }
    }
}

/// Ordered `(date, periodic return)` pairs, one per period.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReturnSeries {
    pub dates: Vec<NaiveDate>,
    pub values: Vec<f64>,
}

impl ReturnSeries {
    pub fn new(dates: Vec<NaiveDate>, values: Vec<f64>) -> Self {
        debug_assert_eq!(dates.len(), values.len());
        Self { dates, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.dates.iter().copied().zip(self.values.iter().copied())
    }

    /// NAV path `base × cumprod(1 + r)`; non-finite returns count as flat.
    pub fn compound(&self, base: f64) -> Vec<f64> {
        let mut nav = base;
        self.values
            .iter()
            .map(|&r| {
                if r.is_finite() {
                    nav *= 1.0 + r;
                }
                nav
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compound_from_base() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let series = ReturnSeries::new(vec![d, d, d], vec![0.1, f64::NAN, -0.5]);
        let nav = series.compound(100.0);
        assert!((nav[0] - 110.0).abs() < 1e-9);
        assert!((nav[1] - 110.0).abs() < 1e-9);
        assert!((nav[2] - 55.0).abs() < 1e-9);
    }

    #[test]
    fn annualization_factors() {
        assert_eq!(Periodicity::Daily.periods_per_year(), 252.0);
        assert_eq!(Periodicity::Monthly.periods_per_year(), 12.0);
    }
}

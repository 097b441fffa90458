//! Return models for the walk-forward runner.
//!
//! A model maps a row of factor values to a predicted next-month return. The
//! runner builds a fresh instance per rebalance, fits it on the expanding
//! training window and ranks the cross-section by `predict`.

pub mod boosting;
pub mod ridge;

pub use boosting::{BoostedStumps, BoostingParams};
pub use ridge::RidgeRegression;

use crate::domain::StrategyId;
use crate::error::EngineError;

/// Fit/predict capability used by the walk-forward runner.
pub trait ReturnModel: Send {
    fn name(&self) -> &str;

    /// Train on row-major features `x` against targets `y`.
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<(), EngineError>;

    /// Score each row of `x`. Fails if the model is unfitted or the width differs.
    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, EngineError>;

    /// Raw per-feature importances, if the model defines them.
    fn importances(&self) -> Option<Vec<f64>> {
        None
    }
}

/// Fresh model for a model-family strategy.
pub fn model_for(id: StrategyId) -> Result<Box<dyn ReturnModel>, EngineError> {
    match id {
        StrategyId::MlRidge => Ok(Box::new(RidgeRegression::new(1.0))),
        StrategyId::MlLightgbm => Ok(Box::new(BoostedStumps::new(BoostingParams::default()))),
        other => Err(EngineError::UnsupportedStrategy(format!(
            "{other} is not a model strategy"
        ))),
    }
}

/// Normalize raw importances to sum to 1.
///
/// Returns all zeros when importances are missing, have the wrong width,
/// contain non-finite values, or sum to a non-positive total.
pub fn normalize_importances(raw: Option<Vec<f64>>, width: usize) -> Vec<f64> {
    let zeros = vec![0.0; width];
    let Some(values) = raw else {
        return zeros;
    };
    if values.len() != width || values.iter().any(|v| !v.is_finite()) {
        return zeros;
    }
    let total: f64 = values.iter().sum();
    if total <= 0.0 {
        return zeros;
    }
    values.into_iter().map(|v| v / total).collect()
}

/// Shared shape checks for `fit`.
pub(crate) fn check_training_set(x: &[Vec<f64>], y: &[f64]) -> Result<usize, EngineError> {
    if x.is_empty() {
        return Err(EngineError::Model("empty training set".into()));
    }
    if x.len() != y.len() {
        return Err(EngineError::Model(format!(
            "{} feature rows but {} targets",
            x.len(),
            y.len()
        )));
    }
    let width = x[0].len();
    if width == 0 || x.iter().any(|row| row.len() != width) {
        return Err(EngineError::Model("ragged or empty feature rows".into()));
    }
    if x.iter().flatten().chain(y).any(|v| !v.is_finite()) {
        return Err(EngineError::Model("non-finite training value".into()));
    }
    Ok(width)
}

pub(crate) fn check_width(x: &[Vec<f64>], width: usize) -> Result<(), EngineError> {
    match x.iter().find(|row| row.len() != width) {
        Some(row) => Err(EngineError::Model(format!(
            "expected {width} features, got {}",
            row.len()
        ))),
        None => Ok(()),
    }
}

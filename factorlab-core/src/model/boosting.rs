//! Gradient-boosted regression stumps.
//!
//! Squared-loss boosting: start from the target mean, then repeatedly fit a
//! depth-1 tree to the residuals and add it scaled by the learning rate.
//! Splits are searched exhaustively over every feature, so training is
//! deterministic. Importance is the total squared-error reduction each
//! feature's splits produced.

use super::{check_training_set, check_width, ReturnModel};
use crate::error::EngineError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    pub n_rounds: usize,
    pub learning_rate: f64,
    pub min_samples_leaf: usize,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_rounds: 300,
            learning_rate: 0.05,
            min_samples_leaf: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Stump {
    feature: usize,
    threshold: f64,
    left: f64,
    right: f64,
}

impl Stump {
    fn predict(&self, row: &[f64]) -> f64 {
        if row[self.feature] <= self.threshold {
            self.left
        } else {
            self.right
        }
    }
}

#[derive(Debug, Clone)]
pub struct BoostedStumps {
    params: BoostingParams,
    base: f64,
    width: usize,
    stumps: Vec<Stump>,
    gains: Vec<f64>,
    fitted: bool,
}

impl BoostedStumps {
    pub fn new(params: BoostingParams) -> Self {
        Self {
            params,
            base: 0.0,
            width: 0,
            stumps: Vec::new(),
            gains: Vec::new(),
            fitted: false,
        }
    }

    /// Number of stumps actually added (training stops when no split helps).
    pub fn n_stumps(&self) -> usize {
        self.stumps.len()
    }

    fn best_split(
        &self,
        x: &[Vec<f64>],
        residuals: &[f64],
        order: &[Vec<usize>],
    ) -> Option<(Stump, f64)> {
        let n = residuals.len();
        let min_leaf = self.params.min_samples_leaf.max(1);
        if n < 2 * min_leaf {
            return None;
        }
        let total: f64 = residuals.iter().sum();
        let parent = total * total / n as f64;

        let mut best: Option<(Stump, f64)> = None;
        for (feature, idx) in order.iter().enumerate() {
            let mut left_sum = 0.0;
            for k in 1..n {
                left_sum += residuals[idx[k - 1]];
                let lo = x[idx[k - 1]][feature];
                let hi = x[idx[k]][feature];
                if k < min_leaf || n - k < min_leaf || lo == hi {
                    continue;
                }
                let right_sum = total - left_sum;
                let (nl, nr) = (k as f64, (n - k) as f64);
                let gain = left_sum * left_sum / nl + right_sum * right_sum / nr - parent;
                if gain > best.map_or(1e-15, |(_, g)| g) {
                    best = Some((
                        Stump {
                            feature,
                            threshold: lo + (hi - lo) / 2.0,
                            left: left_sum / nl,
                            right: right_sum / nr,
                        },
                        gain,
                    ));
                }
            }
        }
        best
    }
}

impl ReturnModel for BoostedStumps {
    fn name(&self) -> &str {
        "boosted_stumps"
    }

    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<(), EngineError> {
        let width = check_training_set(x, y)?;
        let n = y.len();

        self.width = width;
        self.base = y.iter().sum::<f64>() / n as f64;
        self.stumps.clear();
        self.gains = vec![0.0; width];

        let order: Vec<Vec<usize>> = (0..width)
            .map(|j| {
                let mut idx: Vec<usize> = (0..n).collect();
                idx.sort_by(|&a, &b| x[a][j].total_cmp(&x[b][j]));
                idx
            })
            .collect();

        let mut pred = vec![self.base; n];
        let mut residuals = vec![0.0; n];
        for _ in 0..self.params.n_rounds {
            for i in 0..n {
                residuals[i] = y[i] - pred[i];
            }
            let Some((stump, gain)) = self.best_split(x, &residuals, &order) else {
                break;
            };
            for (p, row) in pred.iter_mut().zip(x) {
                *p += self.params.learning_rate * stump.predict(row);
            }
            self.gains[stump.feature] += gain;
            self.stumps.push(stump);
        }

        self.fitted = true;
        Ok(())
    }

    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, EngineError> {
        if !self.fitted {
            return Err(EngineError::Model("boosted model is not fitted".into()));
        }
        check_width(x, self.width)?;
        Ok(x.iter()
            .map(|row| {
                self.base
                    + self.params.learning_rate
                        * self.stumps.iter().map(|s| s.predict(row)).sum::<f64>()
            })
            .collect())
    }

    fn importances(&self) -> Option<Vec<f64>> {
        self.fitted.then(|| self.gains.clone())
    }
}

//! Standardized ridge regression.
//!
//! Features are scaled to zero mean and unit population variance (constant
//! columns keep scale 1), then `(ZᵀZ + αI) β = Zᵀ(y − ȳ)` is solved in closed
//! form. The intercept is ȳ. Coefficients live on the standardized scale, so
//! `|β|` is comparable across features.

use super::{check_training_set, check_width, ReturnModel};
use crate::error::EngineError;

#[derive(Debug, Clone)]
struct Fitted {
    means: Vec<f64>,
    scales: Vec<f64>,
    coefficients: Vec<f64>,
    intercept: f64,
}

#[derive(Debug, Clone)]
pub struct RidgeRegression {
    alpha: f64,
    fitted: Option<Fitted>,
}

impl RidgeRegression {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            fitted: None,
        }
    }

    /// Standardized-scale coefficients, once fitted.
    pub fn coefficients(&self) -> Option<&[f64]> {
        self.fitted.as_ref().map(|f| f.coefficients.as_slice())
    }

    pub fn intercept(&self) -> Option<f64> {
        self.fitted.as_ref().map(|f| f.intercept)
    }
}

impl ReturnModel for RidgeRegression {
    fn name(&self) -> &str {
        "ridge"
    }

    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<(), EngineError> {
        if self.alpha.is_nan() || self.alpha < 0.0 {
            return Err(EngineError::Model(format!("invalid alpha {}", self.alpha)));
        }
        let width = check_training_set(x, y)?;
        let n = x.len() as f64;

        let means: Vec<f64> = (0..width)
            .map(|j| x.iter().map(|r| r[j]).sum::<f64>() / n)
            .collect();
        let scales: Vec<f64> = (0..width)
            .map(|j| {
                let var = x.iter().map(|r| (r[j] - means[j]).powi(2)).sum::<f64>() / n;
                let sd = var.sqrt();
                if sd > 0.0 {
                    sd
                } else {
                    1.0
                }
            })
            .collect();
        let y_mean = y.iter().sum::<f64>() / n;

        // Normal equations on the standardized design.
        let mut gram = vec![vec![0.0; width]; width];
        let mut rhs = vec![0.0; width];
        for (row, &target) in x.iter().zip(y) {
            let z: Vec<f64> = (0..width).map(|j| (row[j] - means[j]) / scales[j]).collect();
            let yc = target - y_mean;
            for a in 0..width {
                rhs[a] += z[a] * yc;
                for b in a..width {
                    gram[a][b] += z[a] * z[b];
                }
            }
        }
        for a in 0..width {
            for b in 0..a {
                gram[a][b] = gram[b][a];
            }
            gram[a][a] += self.alpha;
        }

        let coefficients = solve_linear_system(gram, rhs)?;
        self.fitted = Some(Fitted {
            means,
            scales,
            coefficients,
            intercept: y_mean,
        });
        Ok(())
    }

    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, EngineError> {
        let fitted = self
            .fitted
            .as_ref()
            .ok_or_else(|| EngineError::Model("ridge model is not fitted".into()))?;
        check_width(x, fitted.coefficients.len())?;
        Ok(x.iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(j, v)| (v - fitted.means[j]) / fitted.scales[j] * fitted.coefficients[j])
                    .sum::<f64>()
                    + fitted.intercept
            })
            .collect())
    }

    fn importances(&self) -> Option<Vec<f64>> {
        self.coefficients()
            .map(|c| c.iter().map(|v| v.abs()).collect())
    }
}

/// Gaussian elimination with partial pivoting.
fn solve_linear_system(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>, EngineError> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        let p = a[pivot][col].abs();
        if p.is_nan() || p <= 1e-12 {
            return Err(EngineError::Model("singular normal equations".into()));
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Ok(x)
}

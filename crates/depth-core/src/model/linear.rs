//! Ridge regression on standardized features

use super::Regressor;
use crate::error::{DepthError, Result};
use serde::{Deserialize, Serialize};

/// Diagonal floor keeping the normal equations solvable when a feature is constant
const MIN_RIDGE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub means: Vec<f64>,
    /// Per-feature standard deviation, 1.0 for constant features
    pub scales: Vec<f64>,
    /// Weights in standardized space
    pub weights: Vec<f64>,
    pub intercept: f64,
}

impl LinearModel {
    pub fn fit(rows: &[&[f64]], labels: &[f64], l2: f64) -> Result<Self> {
        let n = rows.len();
        if n == 0 {
            return Err(DepthError::EmptyDataset("training rows".to_string()));
        }
        let d = rows[0].len();

        let mut means = vec![0.0; d];
        for row in rows {
            for (m, x) in means.iter_mut().zip(row.iter()) {
                *m += x;
            }
        }
        means.iter_mut().for_each(|m| *m /= n as f64);

        let mut scales = vec![0.0; d];
        for row in rows {
            for j in 0..d {
                scales[j] += (row[j] - means[j]).powi(2);
            }
        }
        for s in scales.iter_mut() {
            let std = (*s / n as f64).sqrt();
            *s = if std > 1e-12 { std } else { 1.0 };
        }

        let y_mean = labels.iter().sum::<f64>() / n as f64;

        // Normal equations (Z^T Z + lambda I) w = Z^T (y - mean(y))
        let mut a = vec![vec![0.0; d]; d];
        let mut b = vec![0.0; d];
        let mut z = vec![0.0; d];
        for (row, y) in rows.iter().zip(labels) {
            for j in 0..d {
                z[j] = (row[j] - means[j]) / scales[j];
            }
            for i in 0..d {
                b[i] += z[i] * (y - y_mean);
                for j in i..d {
                    a[i][j] += z[i] * z[j];
                }
            }
        }
        let lambda = l2.max(MIN_RIDGE);
        for i in 0..d {
            for j in 0..i {
                a[i][j] = a[j][i];
            }
            a[i][i] += lambda;
        }

        let weights = solve(a, b).ok_or_else(|| {
            DepthError::InvalidConfig("linear system is singular, increase l2".to_string())
        })?;

        Ok(Self {
            means,
            scales,
            weights,
            intercept: y_mean,
        })
    }
}

impl Regressor for LinearModel {
    fn predict_row(&self, row: &[f64]) -> f64 {
        self.intercept
            + row
                .iter()
                .zip(&self.means)
                .zip(&self.scales)
                .zip(&self.weights)
                .map(|(((x, m), s), w)| w * (x - m) / s)
                .sum::<f64>()
    }

    fn n_features(&self) -> usize {
        self.weights.len()
    }

    fn check(&self) -> std::result::Result<(), String> {
        let d = self.weights.len();
        if self.means.len() != d || self.scales.len() != d {
            return Err("linear parameter lengths disagree".to_string());
        }
        let all_finite = self
            .means
            .iter()
            .chain(&self.scales)
            .chain(&self.weights)
            .chain(std::iter::once(&self.intercept))
            .all(|v| v.is_finite());
        if !all_finite {
            return Err("linear parameters are not finite".to_string());
        }
        if self.scales.iter().any(|s| *s <= 0.0) {
            return Err("linear feature scale must be positive".to_string());
        }
        Ok(())
    }
}

/// Gaussian elimination with partial pivoting
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-300 {
            return None;
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
    x.iter().all(|v| v.is_finite()).then_some(x)
}

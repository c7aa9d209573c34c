// src/ordination.rs - Standardization, principal components and linear discriminants

use std::cmp::Ordering;

use nalgebra::{DMatrix, DVector, SymmetricEigen};

use crate::errors::{Result, WingShapeError};
use crate::linalg::center_columns;

/// Z-score every column using the population standard deviation.
///
/// Constant columns are centered but left unscaled.
pub fn standardize(x: &DMatrix<f64>) -> DMatrix<f64> {
    let n = x.nrows();
    let mut out = center_columns(x);
    if n == 0 {
        return out;
    }
    for mut col in out.column_iter_mut() {
        let std = (col.norm_squared() / n as f64).sqrt();
        if std > 0.0 {
            col /= std;
        }
    }
    out
}

/// Eigen-decomposition of a symmetric matrix with eigenpairs sorted by
/// descending eigenvalue and each eigenvector's largest-magnitude entry
/// made positive
fn sorted_eigen(matrix: DMatrix<f64>) -> (Vec<f64>, DMatrix<f64>) {
    let eigen = SymmetricEigen::new(matrix);
    let mut order: Vec<usize> = (0..eigen.eigenvalues.len()).collect();
    order.sort_by(|&a, &b| {
        eigen.eigenvalues[b]
            .partial_cmp(&eigen.eigenvalues[a])
            .unwrap_or(Ordering::Equal)
    });

    let values: Vec<f64> = order.iter().map(|&i| eigen.eigenvalues[i]).collect();
    let mut vectors = eigen.eigenvectors.select_columns(order.iter());
    for mut col in vectors.column_iter_mut() {
        let pivot = col.iter().copied().fold(0.0f64, |acc, v| if v.abs() > acc.abs() { v } else { acc });
        if pivot < 0.0 {
            col.neg_mut();
        }
    }
    (values, vectors)
}

/// Fitted principal-component model
#[derive(Debug, Clone)]
pub struct PcaModel {
    pub mean: DVector<f64>,
    /// Loadings, one column per component, strongest first
    pub components: DMatrix<f64>,
    pub explained_variance: Vec<f64>,
    pub explained_variance_ratio: Vec<f64>,
}

impl PcaModel {
    /// Fit on a samples x features matrix (covariance with n - 1 divisor).
    /// At most min(samples, features) components are kept.
    pub fn fit(x: &DMatrix<f64>) -> Result<Self> {
        let (n, p) = x.shape();
        if n == 0 || p == 0 {
            return Err(WingShapeError::EmptyDataset);
        }

        let mean = DVector::from_iterator(p, x.column_iter().map(|c| c.mean()));
        let centered = center_columns(x);
        let divisor = if n > 1 { (n - 1) as f64 } else { 1.0 };
        let cov = (centered.transpose() * &centered) / divisor;

        let (values, vectors) = sorted_eigen(cov);
        let keep = n.min(p);
        let total: f64 = values.iter().filter(|&&v| v > 0.0).sum();

        let explained_variance: Vec<f64> = values.iter().take(keep).map(|v| v.max(0.0)).collect();
        let explained_variance_ratio = explained_variance
            .iter()
            .map(|v| if total > 0.0 { v / total } else { 0.0 })
            .collect();

        Ok(Self {
            mean,
            components: vectors.columns(0, keep).into_owned(),
            explained_variance,
            explained_variance_ratio,
        })
    }

    pub fn n_components(&self) -> usize {
        self.components.ncols()
    }

    /// Scores on the first `k` components (clamped to what was fitted)
    pub fn transform(&self, x: &DMatrix<f64>, k: usize) -> DMatrix<f64> {
        let k = k.min(self.n_components());
        let mut centered = x.clone();
        for (j, mut col) in centered.column_iter_mut().enumerate() {
            col.add_scalar_mut(-self.mean[j]);
        }
        centered * self.components.columns(0, k)
    }

    /// Fraction of total variance carried by the first `k` components
    pub fn cumulative_ratio(&self, k: usize) -> f64 {
        self.explained_variance_ratio.iter().take(k).sum()
    }
}

/// Fitted linear discriminant model
#[derive(Debug, Clone)]
pub struct LdaModel {
    pub classes: Vec<String>,
    pub mean: DVector<f64>,
    /// Projection from centered features to discriminant axes
    pub scalings: DMatrix<f64>,
    pub explained_variance_ratio: Vec<f64>,
}

impl LdaModel {
    /// Fit up to `n_components` discriminants (at most classes - 1).
    ///
    /// The pooled within-class covariance is whitened first, so scores
    /// have unit within-class variance. Directions with no within-class
    /// spread are discarded rather than inverted.
    pub fn fit(x: &DMatrix<f64>, labels: &[&str], n_components: usize, factor: &str) -> Result<Self> {
        let (n, p) = x.shape();
        if n != labels.len() {
            return Err(WingShapeError::Numeric(format!(
                "{} samples but {} {} labels",
                n,
                labels.len(),
                factor
            )));
        }

        let mut classes: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        classes.sort();
        classes.dedup();
        if classes.len() < 2 {
            return Err(WingShapeError::InsufficientGroups {
                factor: factor.to_string(),
                found: classes.len(),
            });
        }

        let mean = DVector::from_iterator(p, x.column_iter().map(|c| c.mean()));
        let mut within = DMatrix::zeros(p, p);
        let mut between = DMatrix::zeros(p, p);
        for class in &classes {
            let rows: Vec<usize> = (0..n).filter(|&i| labels[i] == class.as_str()).collect();
            let sub = x.select_rows(rows.iter());
            let class_centered = center_columns(&sub);
            within += class_centered.transpose() * &class_centered;

            let class_mean = DVector::from_iterator(p, sub.column_iter().map(|c| c.mean()));
            let diff = class_mean - &mean;
            between += (&diff * diff.transpose()) * rows.len() as f64;
        }
        let dof = n.saturating_sub(classes.len()).max(1) as f64;
        within /= dof;
        between /= dof;

        // whitening transform W with W^t Sw W = I on the supported subspace
        let (w_values, w_vectors) = sorted_eigen(within);
        let tol = w_values.first().copied().unwrap_or(0.0).max(0.0) * p as f64 * f64::EPSILON;
        let support: Vec<usize> = (0..w_values.len()).filter(|&i| w_values[i] > tol).collect();
        if support.is_empty() {
            return Err(WingShapeError::Numeric(format!(
                "no within-{} variance to discriminate on",
                factor
            )));
        }
        let mut whitening = w_vectors.select_columns(support.iter());
        for (mut col, &i) in whitening.column_iter_mut().zip(&support) {
            col /= w_values[i].sqrt();
        }

        let whitened_between = whitening.transpose() * &between * &whitening;
        let (b_values, b_vectors) = sorted_eigen(whitened_between);
        let keep = n_components.min(classes.len() - 1).min(b_values.len());

        let total: f64 = b_values.iter().filter(|&&v| v > 0.0).sum();
        let explained_variance_ratio = b_values
            .iter()
            .take(keep)
            .map(|v| if total > 0.0 { v.max(0.0) / total } else { 0.0 })
            .collect();

        Ok(Self {
            classes,
            mean,
            scalings: whitening * b_vectors.columns(0, keep),
            explained_variance_ratio,
        })
    }

    pub fn n_components(&self) -> usize {
        self.scalings.ncols()
    }

    pub fn transform(&self, x: &DMatrix<f64>) -> DMatrix<f64> {
        let mut centered = x.clone();
        for (j, mut col) in centered.column_iter_mut().enumerate() {
            col.add_scalar_mut(-self.mean[j]);
        }
        centered * &self.scalings
    }
}

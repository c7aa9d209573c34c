// src/sscp.rs - Type-III SSCP variance partitioning

use nalgebra::DMatrix;
use serde::Serialize;

use crate::design::{DesignMatrix, ModelTerm};
use crate::errors::{Result, WingShapeError};
use crate::linalg::{drop_columns, projection, sscp_trace};

/// Trace of the SSCP matrix attributed to each model term, plus residual.
///
/// Terms appear in design order with the residual last. For
/// non-orthogonal designs the scores do not add up to the total SSCP of
/// the response; that is a property of the Type-III method.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SscpResult {
    pub scores: Vec<(ModelTerm, f64)>,
}

impl SscpResult {
    pub fn get(&self, term: ModelTerm) -> Option<f64> {
        self.scores.iter().find(|(t, _)| *t == term).map(|(_, s)| *s)
    }

    /// Sum of all term scores and the residual
    pub fn total(&self) -> f64 {
        self.scores.iter().map(|(_, s)| s).sum()
    }

    /// Each score as a percentage of [`SscpResult::total`].
    ///
    /// A zero or non-finite total yields 0% everywhere rather than NaN.
    pub fn percentages(&self) -> Vec<(ModelTerm, f64)> {
        let total = self.total();
        self.scores
            .iter()
            .map(|&(term, score)| {
                let pct = if total > 0.0 && total.is_finite() {
                    score / total * 100.0
                } else {
                    0.0
                };
                (term, pct)
            })
            .collect()
    }
}

/// Type-III SSCP traces of `y` (samples x responses) under `design`.
///
/// Each non-intercept term is scored by refitting without its columns:
/// effect = P_full Y - P_reduced Y, score = trace(effect^t effect).
pub fn type_iii_sscp(y: &DMatrix<f64>, design: &DesignMatrix) -> Result<SscpResult> {
    let x_full = design.matrix();
    if y.nrows() != x_full.nrows() {
        return Err(WingShapeError::Numeric(format!(
            "response has {} rows but design has {}",
            y.nrows(),
            x_full.nrows()
        )));
    }

    let p_full = projection(x_full)?;
    let y_full_hat = &p_full * y;

    let mut scores = Vec::with_capacity(design.terms().len());
    for slice in design.terms() {
        if slice.term == ModelTerm::Intercept {
            continue;
        }
        let x_reduced = drop_columns(x_full, slice.columns.clone());
        let y_reduced_hat = projection(&x_reduced)? * y;
        let effect = &y_full_hat - y_reduced_hat;
        scores.push((slice.term, sscp_trace(&effect)));
    }

    let residual = y - &y_full_hat;
    scores.push((ModelTerm::Residual, sscp_trace(&residual)));

    if let Some((term, _)) = scores.iter().find(|(_, s)| !s.is_finite()) {
        return Err(WingShapeError::Numeric(format!("non-finite SSCP score for term {}", term)));
    }

    Ok(SscpResult { scores })
}

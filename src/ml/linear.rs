//! Ordinary least squares and the per-feature scaling vector derived from it.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{PredictorError, Result};
use crate::forecast::FeatureTable;

/// Linear model `y = x . coefficients + intercept`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LinearFit {
    pub fn predict(&self, row: &[f64]) -> f64 {
        row.iter()
            .zip(&self.coefficients)
            .map(|(x, c)| x * c)
            .sum::<f64>()
            + self.intercept
    }
}

/// Least-squares fit with intercept.
///
/// Columns are centred and the system is solved through an SVD, so rank
/// deficient inputs (one-hot groups, constant columns) get the minimum-norm
/// solution instead of failing.
pub fn ordinary_least_squares(x: &[&[f64]], y: &[f64]) -> Result<LinearFit> {
    let n = x.len();
    if n == 0 {
        return Err(PredictorError::InsufficientTrainingData { needed: 1, got: 0 });
    }
    if y.len() != n {
        return Err(PredictorError::DimensionMismatch { expected: n, got: y.len() });
    }
    let p = x[0].len();
    if let Some(row) = x.iter().find(|r| r.len() != p) {
        return Err(PredictorError::DimensionMismatch { expected: p, got: row.len() });
    }

    let y_mean = y.iter().sum::<f64>() / n as f64;
    if p == 0 {
        return Ok(LinearFit { coefficients: Vec::new(), intercept: y_mean });
    }
    let means: Vec<f64> = (0..p)
        .map(|j| x.iter().map(|r| r[j]).sum::<f64>() / n as f64)
        .collect();

    let xc = DMatrix::from_fn(n, p, |i, j| x[i][j] - means[j]);
    let yc = DVector::from_iterator(n, y.iter().map(|v| v - y_mean));

    let svd = xc.svd(true, true);
    let max_sv = svd.singular_values.iter().copied().fold(0.0_f64, f64::max);
    let coefficients = if max_sv > 0.0 {
        let eps = max_sv * n.max(p) as f64 * f64::EPSILON;
        let beta = svd
            .solve(&yc, eps)
            .map_err(|e| PredictorError::Computation(format!("least squares solve failed: {e}")))?;
        beta.iter().copied().collect::<Vec<f64>>()
    } else {
        vec![0.0; p]
    };

    if coefficients.iter().any(|c| !c.is_finite()) {
        return Err(PredictorError::Computation(
            "least squares produced non-finite coefficients".into(),
        ));
    }

    let intercept = y_mean
        - coefficients
            .iter()
            .zip(&means)
            .map(|(c, m)| c * m)
            .sum::<f64>();

    Ok(LinearFit { coefficients, intercept })
}

/// One multiplicative factor per predictor column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingVector {
    columns: Vec<String>,
    factors: Vec<f64>,
}

impl ScalingVector {
    pub fn new(columns: Vec<String>, factors: Vec<f64>) -> Result<Self> {
        if columns.len() != factors.len() {
            return Err(PredictorError::DimensionMismatch {
                expected: columns.len(),
                got: factors.len(),
            });
        }
        Ok(Self { columns, factors })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn factors(&self) -> &[f64] {
        &self.factors
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    pub fn factor(&self, column: &str) -> Option<f64> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| self.factors[i])
    }

    pub fn apply_row(&self, row: &[f64]) -> Result<Vec<f64>> {
        if row.len() != self.factors.len() {
            return Err(PredictorError::DimensionMismatch {
                expected: self.factors.len(),
                got: row.len(),
            });
        }
        Ok(row.iter().zip(&self.factors).map(|(x, f)| x * f).collect())
    }

    /// Scale every predictor column of a table. Prices pass through.
    pub fn apply_table(&self, table: &FeatureTable) -> Result<FeatureTable> {
        if table.columns() != self.columns.as_slice() {
            return Err(PredictorError::DimensionMismatch {
                expected: self.columns.len(),
                got: table.n_features(),
            });
        }
        let rows = table
            .rows()
            .iter()
            .map(|row| self.apply_row(row))
            .collect::<Result<Vec<_>>>()?;
        FeatureTable::from_parts(
            table.columns().to_vec(),
            table.timestamps().to_vec(),
            rows,
            table.prices().to_vec(),
        )
    }
}

/// Phase one of the weighted k-NN fit: regress price on every predictor of
/// the labelled rows and keep the coefficients as column weights.
pub fn fit_scaling_vector(table: &FeatureTable) -> Result<ScalingVector> {
    let (x, y) = table.labelled();
    let fit = ordinary_least_squares(&x, &y)?;
    ScalingVector::new(table.columns().to_vec(), fit.coefficients)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-8
    }

    #[test]
    fn test_ols_recovers_exact_plane() {
        // y = 2x1 + 3x2 + 1
        let rows = vec![
            vec![1.0, 1.0],
            vec![2.0, 1.0],
            vec![1.0, 2.0],
            vec![3.0, 5.0],
            vec![4.0, 2.0],
        ];
        let x: Vec<&[f64]> = rows.iter().map(Vec::as_slice).collect();
        let y: Vec<f64> = rows.iter().map(|r| 2.0 * r[0] + 3.0 * r[1] + 1.0).collect();

        let fit = ordinary_least_squares(&x, &y).unwrap();
        assert!(close(fit.coefficients[0], 2.0));
        assert!(close(fit.coefficients[1], 3.0));
        assert!(close(fit.intercept, 1.0));
        assert!(close(fit.predict(&[10.0, 10.0]), 51.0));
    }

    #[test]
    fn test_ols_handles_collinear_columns() {
        // Second column duplicates the first; min-norm splits the weight.
        let rows = vec![vec![1.0, 1.0], vec![2.0, 2.0], vec![3.0, 3.0], vec![4.0, 4.0]];
        let x: Vec<&[f64]> = rows.iter().map(Vec::as_slice).collect();
        let y = vec![2.0, 4.0, 6.0, 8.0];

        let fit = ordinary_least_squares(&x, &y).unwrap();
        assert!(close(fit.coefficients[0], 1.0));
        assert!(close(fit.coefficients[1], 1.0));
        assert!(close(fit.intercept, 0.0));
    }

    #[test]
    fn test_ols_constant_column_gets_zero_weight() {
        let rows = vec![vec![1.0, 7.0], vec![2.0, 7.0], vec![3.0, 7.0]];
        let x: Vec<&[f64]> = rows.iter().map(Vec::as_slice).collect();
        let y = vec![1.0, 2.0, 3.0];

        let fit = ordinary_least_squares(&x, &y).unwrap();
        assert!(close(fit.coefficients[0], 1.0));
        assert!(close(fit.coefficients[1], 0.0));
    }

    #[test]
    fn test_ols_rejects_empty_input() {
        let err = ordinary_least_squares(&[], &[]).unwrap_err();
        assert!(matches!(err, PredictorError::InsufficientTrainingData { .. }));
    }

    #[test]
    fn test_scaling_vector_apply_row() {
        let scaling = ScalingVector::new(vec!["a".into(), "b".into()], vec![2.0, -0.5]).unwrap();
        assert_eq!(scaling.apply_row(&[3.0, 4.0]).unwrap(), vec![6.0, -2.0]);
        assert_eq!(scaling.factor("b"), Some(-0.5));
        assert!(scaling.apply_row(&[1.0]).is_err());
    }
}

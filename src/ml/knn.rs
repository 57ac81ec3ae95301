//! Brute-force k-nearest-neighbour regression.

use ordered_float::OrderedFloat;

use crate::error::{PredictorError, Result};

/// Uniformly weighted k-NN regressor over Euclidean distance.
///
/// Neighbours at equal distance are ranked by their position in the
/// training set, so predictions are deterministic.
#[derive(Debug, Clone)]
pub struct KnnRegressor {
    k: usize,
    dim: usize,
    points: Vec<Vec<f64>>,
    targets: Vec<f64>,
}

impl KnnRegressor {
    pub fn fit(points: Vec<Vec<f64>>, targets: Vec<f64>, k: usize) -> Result<Self> {
        if k == 0 {
            return Err(PredictorError::InvalidParameter("k must be at least 1".into()));
        }
        if points.len() != targets.len() {
            return Err(PredictorError::DimensionMismatch {
                expected: points.len(),
                got: targets.len(),
            });
        }
        if points.len() < k {
            return Err(PredictorError::InsufficientTrainingData {
                needed: k,
                got: points.len(),
            });
        }
        let dim = points[0].len();
        if let Some(bad) = points.iter().find(|p| p.len() != dim) {
            return Err(PredictorError::DimensionMismatch {
                expected: dim,
                got: bad.len(),
            });
        }
        Ok(Self {
            k,
            dim,
            points,
            targets,
        })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Indices and squared distances of the k nearest training points,
    /// nearest first.
    pub fn neighbors(&self, query: &[f64]) -> Result<Vec<(usize, f64)>> {
        if query.len() != self.dim {
            return Err(PredictorError::DimensionMismatch {
                expected: self.dim,
                got: query.len(),
            });
        }
        let mut ranked: Vec<(OrderedFloat<f64>, usize)> = self
            .points
            .iter()
            .enumerate()
            .map(|(i, p)| (OrderedFloat(squared_distance(p, query)), i))
            .collect();

        let k = self.k;
        if ranked.len() > k {
            ranked.select_nth_unstable(k - 1);
            ranked.truncate(k);
        }
        ranked.sort_unstable();
        Ok(ranked.into_iter().map(|(d, i)| (i, d.into_inner())).collect())
    }

    pub fn predict_one(&self, query: &[f64]) -> Result<f64> {
        let neighbors = self.neighbors(query)?;
        let sum: f64 = neighbors.iter().map(|(i, _)| self.targets[*i]).sum();
        Ok(sum / neighbors.len() as f64)
    }

    pub fn predict(&self, queries: &[Vec<f64>]) -> Result<Vec<f64>> {
        queries.iter().map(|q| self.predict_one(q)).collect()
    }
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

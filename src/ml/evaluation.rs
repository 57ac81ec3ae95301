//! Model accuracy metrics and repeated random-split backtesting.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::weighted_knn::{ModelConfig, WeightedKnnModel};
use crate::error::{PredictorError, Result};
use crate::forecast::FeatureTable;

/// Validation Metrics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationMetrics {
    pub mae: f64,  // Mean Absolute Error
    pub mse: f64,  // Mean Squared Error
    pub rmse: f64, // Root Mean Square Error
    pub r2: f64,   // R-squared
}

/// Calculate validation metrics
pub fn calculate_metrics(predictions: &[f64], targets: &[f64]) -> Result<ValidationMetrics> {
    if predictions.len() != targets.len() {
        return Err(PredictorError::DimensionMismatch {
            expected: targets.len(),
            got: predictions.len(),
        });
    }
    if predictions.is_empty() {
        return Err(PredictorError::InvalidParameter("no predictions to evaluate".into()));
    }

    let n = predictions.len() as f64;

    let mae: f64 = predictions
        .iter()
        .zip(targets)
        .map(|(p, t)| (p - t).abs())
        .sum::<f64>()
        / n;

    let mse: f64 = predictions
        .iter()
        .zip(targets)
        .map(|(p, t)| (p - t).powi(2))
        .sum::<f64>()
        / n;

    let mean_target: f64 = targets.iter().sum::<f64>() / n;
    let ss_tot: f64 = targets.iter().map(|t| (t - mean_target).powi(2)).sum();
    let ss_res: f64 = mse * n;
    let r2 = if ss_tot.abs() < 1e-10 {
        0.0
    } else {
        1.0 - (ss_res / ss_tot)
    };

    Ok(ValidationMetrics {
        mae,
        mse,
        rmse: mse.sqrt(),
        r2,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    /// Number of independent random splits.
    pub rounds: usize,
    /// Share of labelled rows used for fitting in each round.
    pub train_fraction: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            rounds: 500,
            train_fraction: 0.9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub rounds: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    /// Metrics averaged over all rounds.
    pub mean: ValidationMetrics,
}

/// Fit on a random subset of the labelled rows and score the rest, repeated
/// `rounds` times. Each round refits the scaling vector on its own subset.
pub fn backtest<R: Rng + ?Sized>(
    table: &FeatureTable,
    model: &ModelConfig,
    config: &BacktestConfig,
    rng: &mut R,
) -> Result<BacktestReport> {
    if config.rounds == 0 {
        return Err(PredictorError::InvalidParameter("rounds must be at least 1".into()));
    }
    if !(config.train_fraction > 0.0 && config.train_fraction < 1.0) {
        return Err(PredictorError::InvalidParameter(
            "train_fraction must be between 0 and 1".into(),
        ));
    }

    let mut labelled: Vec<usize> = table
        .prices()
        .iter()
        .enumerate()
        .filter(|(_, p)| p.is_some())
        .map(|(i, _)| i)
        .collect();
    let train_rows = (labelled.len() as f64 * config.train_fraction).round() as usize;
    let test_rows = labelled.len().saturating_sub(train_rows);
    if train_rows < model.k || test_rows == 0 {
        return Err(PredictorError::InsufficientTrainingData {
            needed: model.k + 1,
            got: labelled.len(),
        });
    }

    let mut sum = ValidationMetrics {
        mae: 0.0,
        mse: 0.0,
        rmse: 0.0,
        r2: 0.0,
    };
    for _ in 0..config.rounds {
        labelled.shuffle(rng);
        let (train_idx, test_idx) = labelled.split_at(train_rows);

        let fitted = WeightedKnnModel::fit(&table.select(train_idx), model)?;
        let test = table.select(test_idx);
        let predictions = fitted.predict_table(&test)?;
        let targets: Vec<f64> = test.prices().iter().flatten().copied().collect();

        let m = calculate_metrics(&predictions, &targets)?;
        sum.mae += m.mae;
        sum.mse += m.mse;
        sum.rmse += m.rmse;
        sum.r2 += m.r2;
    }

    let n = config.rounds as f64;
    let mean = ValidationMetrics {
        mae: sum.mae / n,
        mse: sum.mse / n,
        rmse: sum.rmse / n,
        r2: sum.r2 / n,
    };
    info!(
        rounds = config.rounds,
        train_rows,
        test_rows,
        mse = mean.mse,
        mae = mean.mae,
        "backtest finished"
    );

    Ok(BacktestReport {
        rounds: config.rounds,
        train_rows,
        test_rows,
        mean,
    })
}

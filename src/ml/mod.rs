//! Machine Learning Module
//!
//! The price model is fitted in two phases:
//! - [`linear`]: ordinary least squares of price on every predictor; the
//!   coefficients become a per-column scaling vector
//! - [`knn`]: k-nearest-neighbour regression on the rescaled rows
//!
//! [`weighted_knn`] composes both, [`evaluation`] scores fitted models.

pub mod evaluation;
pub mod knn;
pub mod linear;
pub mod weighted_knn;

pub use evaluation::{backtest, calculate_metrics, BacktestConfig, BacktestReport, ValidationMetrics};
pub use knn::KnnRegressor;
pub use linear::{fit_scaling_vector, ordinary_least_squares, LinearFit, ScalingVector};
pub use weighted_knn::{DistanceLayout, ModelConfig, WeightedKnnModel};

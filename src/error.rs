//! Error types shared by the prediction pipeline.

use thiserror::Error;

use crate::domain::Region;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PredictorError>;

/// Errors raised while fetching, training or predicting.
///
/// The enum is `Clone` so the outcome of one refresh cycle can be handed to
/// every caller that joined it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PredictorError {
    /// A source failed to fetch or returned unusable data.
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    /// Fewer labelled rows than neighbours requested.
    #[error("insufficient training data: need at least {needed} rows with known price, got {got}")]
    InsufficientTrainingData { needed: usize, got: usize },

    /// Prediction requested before any successful training cycle.
    #[error("model has not been trained yet")]
    NotYetTrained,

    /// Malformed query parameters.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Numerical failure inside a solver.
    #[error("computation error: {0}")]
    Computation(String),

    #[error("region {0} is not enabled")]
    UnknownRegion(Region),
}

impl PredictorError {
    /// Whether the error means "no usable prediction exists yet" rather than
    /// a fault in the request or the code.
    pub fn is_not_ready(&self) -> bool {
        matches!(
            self,
            Self::NotYetTrained | Self::InsufficientTrainingData { .. } | Self::DataUnavailable(_)
        )
    }
}

impl From<reqwest::Error> for PredictorError {
    fn from(error: reqwest::Error) -> Self {
        PredictorError::DataUnavailable(error.to_string())
    }
}

impl From<serde_json::Error> for PredictorError {
    fn from(error: serde_json::Error) -> Self {
        PredictorError::DataUnavailable(format!("malformed payload: {error}"))
    }
}

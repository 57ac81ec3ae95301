//! k-NN regression in a feature space rescaled by linear-regression weights.
//!
//! A plain k-NN treats every input dimension as equally important, which is
//! meaningless across wind speed, temperature, irradiance and calendar flags.
//! Multiplying each column by its least-squares coefficient against price
//! puts all columns on a "ct/kWh of effect" scale, so Euclidean distance in
//! the rescaled space tracks price-relevant similarity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::knn::KnnRegressor;
use super::linear::{fit_scaling_vector, ScalingVector};
use crate::domain::PriceSeries;
use crate::error::{PredictorError, Result};
use crate::forecast::{CalendarFeatures, FeatureTable};

/// How rescaled columns enter the distance computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceLayout {
    /// Every rescaled column is its own dimension.
    #[default]
    PerColumn,
    /// Rescaled weather and solar columns are summed into one dimension, so
    /// wind and solar production count as interchangeable supply.
    WeatherSum,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Neighbours averaged per prediction.
    pub k: usize,
    pub distance: DistanceLayout,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            k: 3,
            distance: DistanceLayout::PerColumn,
        }
    }
}

/// A fitted two-phase model: scaling vector plus k-NN over scaled rows.
///
/// Holds the rescaled full feature table it was fitted with, horizon rows
/// included, so the dense prediction needs no further scaling.
#[derive(Debug, Clone)]
pub struct WeightedKnnModel {
    config: ModelConfig,
    scaling: ScalingVector,
    weather_columns: Vec<usize>,
    knn: KnnRegressor,
    scaled: FeatureTable,
    trained_at: DateTime<Utc>,
}

impl WeightedKnnModel {
    pub fn fit(table: &FeatureTable, config: &ModelConfig) -> Result<Self> {
        let labelled = table.labelled_len();
        if labelled < config.k {
            return Err(PredictorError::InsufficientTrainingData {
                needed: config.k,
                got: labelled,
            });
        }

        // Phase 1: linear fit -> column weights.
        let scaling = fit_scaling_vector(table)?;
        let scaled = scaling.apply_table(table)?;

        let calendar = CalendarFeatures::column_names();
        let weather_columns: Vec<usize> = table
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, name)| !calendar.contains(*name))
            .map(|(i, _)| i)
            .collect();

        // Phase 2: k-NN on the scaled labelled rows.
        let (x, y) = scaled.labelled();
        let points = x
            .into_iter()
            .map(|row| project(config.distance, &weather_columns, row))
            .collect();
        let knn = KnnRegressor::fit(points, y, config.k)?;

        let model = Self {
            config: *config,
            scaling,
            weather_columns,
            knn,
            scaled,
            trained_at: Utc::now(),
        };

        debug!(
            rows = model.scaled.len(),
            labelled,
            features = model.scaling.len(),
            k = config.k,
            "weighted knn fitted"
        );
        Ok(model)
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn scaling(&self) -> &ScalingVector {
        &self.scaling
    }

    /// The full feature table after scaling, as used for distances.
    pub fn scaled_table(&self) -> &FeatureTable {
        &self.scaled
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    pub fn training_rows(&self) -> usize {
        self.knn.len()
    }

    fn project(&self, scaled_row: &[f64]) -> Vec<f64> {
        project(self.config.distance, &self.weather_columns, scaled_row)
    }

    /// Estimate every row of the retained table, known or not.
    pub fn predict_all(&self) -> Result<Vec<f64>> {
        self.scaled
            .rows()
            .iter()
            .map(|row| self.knn.predict_one(&self.project(row)))
            .collect()
    }

    /// Estimate rows of an unscaled table with the fitted weights.
    pub fn predict_table(&self, table: &FeatureTable) -> Result<Vec<f64>> {
        if table.is_empty() {
            return Ok(Vec::new());
        }
        let scaled = self.scaling.apply_table(table)?;
        scaled
            .rows()
            .iter()
            .map(|row| self.knn.predict_one(&self.project(row)))
            .collect()
    }

    /// Dense model-only series over the retained table.
    pub fn evaluation_series(&self) -> Result<PriceSeries> {
        let predictions = self.predict_all()?;
        Ok(self
            .scaled
            .timestamps()
            .iter()
            .copied()
            .zip(predictions)
            .collect())
    }
}

/// Map a scaled row into the k-NN space.
fn project(layout: DistanceLayout, weather_columns: &[usize], scaled_row: &[f64]) -> Vec<f64> {
    match layout {
        DistanceLayout::PerColumn => scaled_row.to_vec(),
        DistanceLayout::WeatherSum => {
            let weather: f64 = weather_columns.iter().map(|&i| scaled_row[i]).sum();
            let mut out = Vec::with_capacity(scaled_row.len() - weather_columns.len() + 1);
            out.push(weather);
            out.extend(
                scaled_row
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| !weather_columns.contains(i))
                    .map(|(_, v)| *v),
            );
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ObservationTable, Region, PRICE_COLUMN};
    use crate::forecast::FeatureBuilder;
    use chrono::{Duration, TimeZone};

    /// Price driven by wind only; temperature is noise-free but irrelevant.
    fn table(known: i64, horizon: i64) -> FeatureTable {
        let start = Utc.with_ymd_and_hms(2024, 4, 8, 0, 0, 0).unwrap();
        let mut weather = ObservationTable::new(["wind_0", "temp_0"]);
        let mut solar = ObservationTable::new(["irradiance_0"]);
        let mut prices = ObservationTable::new([PRICE_COLUMN]);
        for h in 0..known + horizon {
            let ts = start + Duration::hours(h);
            let wind = ((h * 7) % 13) as f64;
            let temp = ((h * 5) % 11) as f64;
            let irr = if (6..18).contains(&(h % 24)) { 300.0 } else { 0.0 };
            weather.insert(ts, vec![Some(wind), Some(temp)]).unwrap();
            solar.insert(ts, vec![Some(irr)]).unwrap();
            if h < known {
                prices.insert(ts, vec![Some(20.0 - wind)]).unwrap();
            }
        }
        FeatureBuilder::new(Region::DE)
            .build(Some(&weather), Some(&solar), Some(&prices))
            .unwrap()
    }

    #[test]
    fn test_scaling_vector_matches_columns() {
        let t = table(72, 24);
        let model = WeightedKnnModel::fit(&t, &ModelConfig::default()).unwrap();
        assert_eq!(model.scaling().len(), t.n_features());
        assert_eq!(model.scaling().columns(), t.columns());
        // Price = 20 - wind exactly, so wind's weight is -1.
        let wind = model.scaling().factor("wind_0").unwrap();
        assert!((wind + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_scaled_table_reproducible_from_scaling() {
        let t = table(72, 24);
        let model = WeightedKnnModel::fit(&t, &ModelConfig::default()).unwrap();
        let rescaled = model.scaling().apply_table(&t).unwrap();
        assert_eq!(&rescaled, model.scaled_table());
        assert_eq!(model.scaled_table().len(), 96);
    }

    #[test]
    fn test_predict_all_covers_every_row() {
        let t = table(72, 24);
        let model = WeightedKnnModel::fit(&t, &ModelConfig::default()).unwrap();
        let series = model.evaluation_series().unwrap();
        assert_eq!(series.len(), 96);
        assert_eq!(model.training_rows(), 72);
        assert!(series.values().all(|v| v.is_finite()));
    }

    #[test]
    fn test_fit_requires_k_labelled_rows() {
        let t = table(2, 24);
        let err = WeightedKnnModel::fit(&t, &ModelConfig::default()).unwrap_err();
        assert_eq!(err, PredictorError::InsufficientTrainingData { needed: 3, got: 2 });
    }

    #[test]
    fn test_predict_empty_table_is_empty() {
        let t = table(72, 0);
        let model = WeightedKnnModel::fit(&t, &ModelConfig::default()).unwrap();
        assert!(model.predict_table(&t.select(&[])).unwrap().is_empty());
    }

    #[test]
    fn test_weather_sum_layout_fits() {
        let t = table(72, 24);
        let config = ModelConfig {
            k: 3,
            distance: DistanceLayout::WeatherSum,
        };
        let model = WeightedKnnModel::fit(&t, &config).unwrap();
        assert_eq!(model.evaluation_series().unwrap().len(), 96);
    }
}

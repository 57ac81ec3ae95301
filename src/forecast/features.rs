//! Feature engineering for the price model
//!
//! Joins weather, solar and price observations on the hour and appends
//! calendar indicators computed in the region's local time.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{ObservationTable, Region, PRICE_COLUMN};
use crate::error::{PredictorError, Result};

pub const HOLIDAY_COLUMN: &str = "holiday";

/// Calendar information for one hour, in local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarFeatures {
    /// Hour of day (0-23)
    pub hour_of_day: u32,
    /// Day of week (0=Monday, 6=Sunday)
    pub day_of_week: u32,
    /// Public holiday or weekly rest day
    pub is_holiday: bool,
}

impl CalendarFeatures {
    pub const WIDTH: usize = 1 + 7 + 24;

    pub fn column_names() -> Vec<String> {
        let mut names = Vec::with_capacity(Self::WIDTH);
        names.push(HOLIDAY_COLUMN.to_string());
        names.extend((0..7).map(|d| format!("day_{d}")));
        names.extend((0..24).map(|h| format!("h_{h}")));
        names
    }

    /// One-hot encoding in the order of [`CalendarFeatures::column_names`].
    pub fn encode(&self, out: &mut Vec<f64>) {
        out.push(if self.is_holiday { 1.0 } else { 0.0 });
        out.extend((0..7).map(|d| if d == self.day_of_week { 1.0 } else { 0.0 }));
        out.extend((0..24).map(|h| if h == self.hour_of_day { 1.0 } else { 0.0 }));
    }
}

/// Dense feature rows ready for model fitting.
///
/// `prices[i]` is the known price for `timestamps[i]`, absent on horizon rows.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    columns: Vec<String>,
    timestamps: Vec<DateTime<Utc>>,
    rows: Vec<Vec<f64>>,
    prices: Vec<Option<f64>>,
}

impl FeatureTable {
    pub fn from_parts(
        columns: Vec<String>,
        timestamps: Vec<DateTime<Utc>>,
        rows: Vec<Vec<f64>>,
        prices: Vec<Option<f64>>,
    ) -> Result<Self> {
        if rows.len() != timestamps.len() || prices.len() != timestamps.len() {
            return Err(PredictorError::DimensionMismatch {
                expected: timestamps.len(),
                got: rows.len().min(prices.len()),
            });
        }
        if let Some(bad) = rows.iter().find(|r| r.len() != columns.len()) {
            return Err(PredictorError::DimensionMismatch {
                expected: columns.len(),
                got: bad.len(),
            });
        }
        Ok(Self {
            columns,
            timestamps,
            rows,
            prices,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn n_features(&self) -> usize {
        self.columns.len()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn prices(&self) -> &[Option<f64>] {
        &self.prices
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of rows with a known price.
    pub fn labelled_len(&self) -> usize {
        self.prices.iter().filter(|p| p.is_some()).count()
    }

    /// Rows with a known price and their targets.
    pub fn labelled(&self) -> (Vec<&[f64]>, Vec<f64>) {
        self.rows
            .iter()
            .zip(&self.prices)
            .filter_map(|(row, price)| price.map(|p| (row.as_slice(), p)))
            .unzip()
    }

    /// Rows at the given positions, in the given order.
    pub fn select(&self, indices: &[usize]) -> FeatureTable {
        FeatureTable {
            columns: self.columns.clone(),
            timestamps: indices.iter().map(|&i| self.timestamps[i]).collect(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
            prices: indices.iter().map(|&i| self.prices[i]).collect(),
        }
    }
}

/// Builds [`FeatureTable`]s for one region.
#[derive(Debug, Clone, Copy)]
pub struct FeatureBuilder {
    region: Region,
}

impl FeatureBuilder {
    pub fn new(region: Region) -> Self {
        Self { region }
    }

    pub fn region(&self) -> Region {
        self.region
    }

    /// Calendar features of a UTC timestamp, evaluated in local time.
    pub fn calendar_features(&self, timestamp: DateTime<Utc>) -> CalendarFeatures {
        let local = timestamp.with_timezone(&self.region.timezone());
        CalendarFeatures {
            hour_of_day: local.hour(),
            day_of_week: local.weekday().num_days_from_monday(),
            is_holiday: self.region.is_holiday(local.date_naive()),
        }
    }

    /// Join the sources into one feature table.
    ///
    /// Rows missing any weather or solar value are dropped. Price may be
    /// absent; a missing price table yields a table without labels.
    pub fn build(
        &self,
        weather: Option<&ObservationTable>,
        solar: Option<&ObservationTable>,
        prices: Option<&ObservationTable>,
    ) -> Result<FeatureTable> {
        let weather = weather
            .filter(|t| !t.is_empty())
            .ok_or_else(|| PredictorError::DataUnavailable("weather table missing".into()))?;
        let solar = solar
            .filter(|t| !t.is_empty())
            .ok_or_else(|| PredictorError::DataUnavailable("solar table missing".into()))?;
        if let Some(prices) = prices {
            if prices.column_index(PRICE_COLUMN).is_none() {
                return Err(PredictorError::DataUnavailable(format!(
                    "price table has no {PRICE_COLUMN} column"
                )));
            }
        }

        let predictors = ObservationTable::outer_join(&[weather, solar])?;
        let mut columns = predictors.columns().to_vec();
        columns.extend(CalendarFeatures::column_names());

        let mut timestamps = Vec::with_capacity(predictors.len());
        let mut rows = Vec::with_capacity(predictors.len());
        let mut labels = Vec::with_capacity(predictors.len());
        let mut dropped = 0usize;

        for (ts, values) in predictors.rows() {
            let Some(values) = values.iter().copied().collect::<Option<Vec<f64>>>() else {
                dropped += 1;
                continue;
            };
            let mut row = values;
            row.reserve(CalendarFeatures::WIDTH);
            self.calendar_features(*ts).encode(&mut row);

            timestamps.push(*ts);
            rows.push(row);
            labels.push(prices.and_then(|p| p.value(ts, PRICE_COLUMN)));
        }

        debug!(
            region = %self.region,
            rows = rows.len(),
            dropped,
            "feature table built"
        );

        FeatureTable::from_parts(columns, timestamps, rows, labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn sources(hours: i64, priced: i64) -> (ObservationTable, ObservationTable, ObservationTable) {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let mut weather = ObservationTable::new(["wind_0", "temp_0"]);
        let mut solar = ObservationTable::new(["irradiance_0"]);
        let mut prices = ObservationTable::new([PRICE_COLUMN]);
        for h in 0..hours {
            let ts = start + Duration::hours(h);
            weather
                .insert(ts, vec![Some(h as f64), Some(10.0)])
                .unwrap();
            solar.insert(ts, vec![Some(100.0)]).unwrap();
            if h < priced {
                prices.insert(ts, vec![Some(5.0 + h as f64)]).unwrap();
            }
        }
        (weather, solar, prices)
    }

    #[test]
    fn test_calendar_uses_local_time() {
        let builder = FeatureBuilder::new(Region::DE);
        // 23:30 UTC on Saturday 2 March is 00:30 Sunday in Berlin (CET).
        let ts = Utc.with_ymd_and_hms(2024, 3, 2, 23, 30, 0).unwrap();
        let features = builder.calendar_features(ts);
        assert_eq!(features.hour_of_day, 0);
        assert_eq!(features.day_of_week, 6);
        assert!(features.is_holiday);
    }

    #[test]
    fn test_calendar_summer_time_offset() {
        let builder = FeatureBuilder::new(Region::DE);
        // CEST is UTC+2.
        let ts = Utc.with_ymd_and_hms(2024, 7, 10, 10, 0, 0).unwrap();
        assert_eq!(builder.calendar_features(ts).hour_of_day, 12);
    }

    #[test]
    fn test_one_hot_invariant() {
        let builder = FeatureBuilder::new(Region::AT);
        let (w, s, p) = sources(48, 24);
        let table = builder.build(Some(&w), Some(&s), Some(&p)).unwrap();
        let offset = 3;
        for row in table.rows() {
            let holiday = row[offset];
            let days: f64 = row[offset + 1..offset + 8].iter().sum();
            let hours: f64 = row[offset + 8..offset + 32].iter().sum();
            assert!(holiday == 0.0 || holiday == 1.0);
            assert_eq!(days, 1.0);
            assert_eq!(hours, 1.0);
        }
        assert_eq!(table.n_features(), 3 + CalendarFeatures::WIDTH);
    }

    #[test]
    fn test_build_keeps_horizon_rows_without_price() {
        let builder = FeatureBuilder::new(Region::DE);
        let (w, s, p) = sources(96, 72);
        let table = builder.build(Some(&w), Some(&s), Some(&p)).unwrap();
        assert_eq!(table.len(), 96);
        assert_eq!(table.labelled_len(), 72);
        assert!(table.prices()[72..].iter().all(Option::is_none));
        assert_eq!(table.prices()[0], Some(5.0));
    }

    #[test]
    fn test_build_drops_incomplete_rows() {
        let builder = FeatureBuilder::new(Region::DE);
        let (mut w, s, p) = sources(10, 10);
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 4, 0, 0).unwrap();
        w.insert(ts, vec![None, Some(1.0)]).unwrap();
        let table = builder.build(Some(&w), Some(&s), Some(&p)).unwrap();
        assert_eq!(table.len(), 9);
        assert!(!table.timestamps().contains(&ts));
    }

    #[test]
    fn test_price_only_rows_are_dropped() {
        let builder = FeatureBuilder::new(Region::DE);
        let (w, s, mut p) = sources(5, 5);
        let late = Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap();
        p.insert(late, vec![Some(1.0)]).unwrap();
        let table = builder.build(Some(&w), Some(&s), Some(&p)).unwrap();
        assert_eq!(table.len(), 5);
    }

    #[test]
    fn test_missing_predictor_source_is_fatal() {
        let builder = FeatureBuilder::new(Region::DE);
        let (w, s, p) = sources(5, 5);
        assert!(matches!(
            builder.build(None, Some(&s), Some(&p)),
            Err(PredictorError::DataUnavailable(_))
        ));
        let empty = ObservationTable::new(["irradiance_0"]);
        assert!(matches!(
            builder.build(Some(&w), Some(&empty), Some(&p)),
            Err(PredictorError::DataUnavailable(_))
        ));
    }

    #[test]
    fn test_missing_prices_yield_unlabelled_table() {
        let builder = FeatureBuilder::new(Region::DE);
        let (w, s, _) = sources(5, 0);
        let table = builder.build(Some(&w), Some(&s), None).unwrap();
        assert_eq!(table.len(), 5);
        assert_eq!(table.labelled_len(), 0);
    }
}

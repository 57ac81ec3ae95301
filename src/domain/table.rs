//! Hourly observation tables as returned by data sources.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};

use crate::domain::hour_floor;
use crate::error::{PredictorError, Result};

/// Column name carrying the spot price in ct/kWh.
pub const PRICE_COLUMN: &str = "price";

/// Time-ordered table with one row per UTC hour.
///
/// Missing or non-finite values are stored as `None`. Inserting a row for an
/// hour that already exists replaces it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservationTable {
    columns: Vec<String>,
    rows: BTreeMap<DateTime<Utc>, Vec<Option<f64>>>,
}

impl ObservationTable {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: BTreeMap::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Insert a row, flooring the timestamp to the start of its hour.
    pub fn insert(&mut self, timestamp: DateTime<Utc>, values: Vec<Option<f64>>) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(PredictorError::DimensionMismatch {
                expected: self.columns.len(),
                got: values.len(),
            });
        }
        let values = values
            .into_iter()
            .map(|v| v.filter(|x| x.is_finite()))
            .collect();
        self.rows.insert(hour_floor(timestamp), values);
        Ok(())
    }

    pub fn get(&self, timestamp: &DateTime<Utc>) -> Option<&[Option<f64>]> {
        self.rows.get(timestamp).map(Vec::as_slice)
    }

    pub fn value(&self, timestamp: &DateTime<Utc>, column: &str) -> Option<f64> {
        let idx = self.column_index(column)?;
        self.rows.get(timestamp).and_then(|row| row[idx])
    }

    pub fn rows(&self) -> impl Iterator<Item = (&DateTime<Utc>, &[Option<f64>])> {
        self.rows.iter().map(|(ts, row)| (ts, row.as_slice()))
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.rows.keys().next().copied()
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.rows.keys().next_back().copied()
    }

    /// Latest row whose `column` holds a value.
    pub fn last_present(&self, column: &str) -> Option<(DateTime<Utc>, f64)> {
        let idx = self.column_index(column)?;
        self.rows
            .iter()
            .rev()
            .find_map(|(ts, row)| row[idx].map(|v| (*ts, v)))
    }

    /// Outer join on timestamp. Cells missing from a source become `None`.
    pub fn outer_join(tables: &[&ObservationTable]) -> Result<ObservationTable> {
        let mut seen = HashSet::new();
        let mut columns = Vec::new();
        for table in tables {
            for column in &table.columns {
                if !seen.insert(column.as_str()) {
                    return Err(PredictorError::DataUnavailable(format!(
                        "column {column} provided by more than one source"
                    )));
                }
                columns.push(column.clone());
            }
        }

        let mut rows: BTreeMap<DateTime<Utc>, Vec<Option<f64>>> = BTreeMap::new();
        let mut offset = 0;
        for table in tables {
            let width = table.columns.len();
            for (ts, row) in &table.rows {
                let joined = rows.entry(*ts).or_insert_with(|| vec![None; columns.len()]);
                joined[offset..offset + width].copy_from_slice(row);
            }
            offset += width;
        }

        Ok(ObservationTable { columns, rows })
    }
}

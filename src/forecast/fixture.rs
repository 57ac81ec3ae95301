//! Persistent on-disk cache in front of a data source.
//!
//! Each table is stored once as `<dir>/<kind>_<REGION>.json`. After the
//! first fetch the file is replayed on every call, which makes offline
//! development and backtests reproducible.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::source::{PriceProvider, WeatherProvider};
use crate::domain::{ObservationTable, Region};
use crate::error::{PredictorError, Result};

pub struct FixtureCache<S> {
    inner: S,
    dir: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct FixtureFile {
    columns: Vec<String>,
    rows: Vec<FixtureRow>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FixtureRow {
    time: DateTime<Utc>,
    values: Vec<Option<f64>>,
}

impl From<&ObservationTable> for FixtureFile {
    fn from(table: &ObservationTable) -> Self {
        Self {
            columns: table.columns().to_vec(),
            rows: table
                .rows()
                .map(|(ts, values)| FixtureRow {
                    time: *ts,
                    values: values.to_vec(),
                })
                .collect(),
        }
    }
}

impl TryFrom<FixtureFile> for ObservationTable {
    type Error = PredictorError;

    fn try_from(file: FixtureFile) -> Result<Self> {
        let mut table = ObservationTable::new(file.columns);
        for row in file.rows {
            table.insert(row.time, row.values)?;
        }
        Ok(table)
    }
}

impl<S> FixtureCache<S> {
    pub fn new(inner: S, dir: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            dir: dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, kind: &str, region: Region) -> PathBuf {
        self.dir.join(format!("{kind}_{region}.json"))
    }

    async fn cached<F>(&self, kind: &str, region: Region, fetch: F) -> Result<ObservationTable>
    where
        F: Future<Output = Result<ObservationTable>> + Send,
    {
        let path = self.path_for(kind, region);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                warn!(path = %path.display(), "loading {kind} from persistent cache");
                let file: FixtureFile = serde_json::from_slice(&bytes)?;
                return ObservationTable::try_from(file);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(PredictorError::DataUnavailable(format!(
                    "failed to read {}: {e}",
                    path.display()
                )))
            }
        }

        let table = fetch.await?;
        let bytes = serde_json::to_vec(&FixtureFile::from(&table))?;
        let write = async {
            tokio::fs::create_dir_all(&self.dir).await?;
            tokio::fs::write(&path, bytes).await
        };
        match write.await {
            Ok(()) => info!(path = %path.display(), rows = table.len(), "{kind} cached to disk"),
            // A failed write leaves the cache cold but the data is still good.
            Err(e) => warn!(path = %path.display(), error = %e, "failed to persist {kind}"),
        }
        Ok(table)
    }
}

#[async_trait]
impl<S: WeatherProvider> WeatherProvider for FixtureCache<S> {
    async fn fetch_weather(
        &self,
        region: Region,
        lookback_days: u32,
        lookahead_days: u32,
    ) -> Result<ObservationTable> {
        self.cached(
            "weather",
            region,
            self.inner.fetch_weather(region, lookback_days, lookahead_days),
        )
        .await
    }

    async fn fetch_solar(
        &self,
        region: Region,
        lookback_days: u32,
        lookahead_days: u32,
    ) -> Result<ObservationTable> {
        self.cached(
            "solar",
            region,
            self.inner.fetch_solar(region, lookback_days, lookahead_days),
        )
        .await
    }
}

#[async_trait]
impl<S: PriceProvider> PriceProvider for FixtureCache<S> {
    async fn fetch_prices(&self, region: Region, lookback_days: u32) -> Result<ObservationTable> {
        self.cached("prices", region, self.inner.fetch_prices(region, lookback_days))
            .await
    }
}

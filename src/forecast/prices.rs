//! Historical day-ahead prices from the SMARD chart data API.
//!
//! SMARD splits every series into weekly chunks. The index lists each
//! chunk's start timestamp; a lookback of `n` days needs the chunk that
//! contains `now - n days` plus all later ones.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use super::source::PriceProvider;
use crate::domain::{ObservationTable, Region, PRICE_COLUMN};
use crate::error::{PredictorError, Result};

pub const DEFAULT_SMARD_URL: &str = "https://www.smard.de";

/// Chart filter id of the day-ahead market price.
const MARKET_PRICE_FILTER: u32 = 4169;
const RESOLUTION: &str = "hour";

/// SMARD reports EUR/MWh; one ct/kWh is ten EUR/MWh.
const EUR_PER_MWH_PER_CT_PER_KWH: f64 = 10.0;

#[derive(Clone)]
pub struct SmardPriceSource {
    base_url: String,
    client: reqwest::Client,
}

impl SmardPriceSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("spot-price-predictor/", env!("CARGO_PKG_VERSION"))),
        );
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    fn chart_url(&self, region: Region, file: &str) -> String {
        format!(
            "{}/app/chart_data/{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            MARKET_PRICE_FILTER,
            region.smard_code(),
            file
        )
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PredictorError::DataUnavailable(format!(
                "SMARD error: HTTP {status} for {url}"
            )));
        }
        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn fetch_since(&self, region: Region, since: DateTime<Utc>) -> Result<ObservationTable> {
        let index: SmardIndex = self
            .get_json(&self.chart_url(region, &format!("index_{RESOLUTION}.json")))
            .await?;
        let chunks = select_chunks(index.timestamps, since.timestamp_millis());
        debug!(%region, chunks = chunks.len(), "fetching SMARD price chunks");

        let mut table = ObservationTable::new([PRICE_COLUMN]);
        for chunk in chunks {
            let file = format!(
                "{MARKET_PRICE_FILTER}_{}_{RESOLUTION}_{chunk}.json",
                region.smard_code()
            );
            let data: SmardSeries = self.get_json(&self.chart_url(region, &file)).await?;
            for (millis, price) in data.series {
                let Some(price) = price else { continue };
                let ts = DateTime::from_timestamp_millis(millis).ok_or_else(|| {
                    PredictorError::DataUnavailable(format!("bad SMARD timestamp {millis}"))
                })?;
                table.insert(ts, vec![Some(price / EUR_PER_MWH_PER_CT_PER_KWH)])?;
            }
        }

        if table.is_empty() {
            return Err(PredictorError::DataUnavailable(format!(
                "SMARD returned no prices for {region}"
            )));
        }
        info!(%region, rows = table.len(), "SMARD prices fetched");
        Ok(table)
    }
}

#[async_trait]
impl PriceProvider for SmardPriceSource {
    async fn fetch_prices(&self, region: Region, lookback_days: u32) -> Result<ObservationTable> {
        let since = Utc::now() - ChronoDuration::days(i64::from(lookback_days));
        self.fetch_since(region, since).await
    }
}

#[derive(Debug, Deserialize)]
struct SmardIndex {
    timestamps: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct SmardSeries {
    series: Vec<(i64, Option<f64>)>,
}

/// Chunk starts needed to cover everything after `since_millis`: the last
/// chunk starting at or before it and every later chunk.
fn select_chunks(mut timestamps: Vec<i64>, since_millis: i64) -> Vec<i64> {
    timestamps.sort_unstable();
    let first_after = timestamps.partition_point(|&ts| ts <= since_millis);
    let start = first_after.saturating_sub(1);
    timestamps.split_off(start)
}

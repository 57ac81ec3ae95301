//! Weather and irradiance from the Open-Meteo forecast API.
//!
//! One request covers every sampled location of a region. Each location
//! contributes its own columns (`wind_0`, `temp_0`, ... or `irradiance_0`,
//! ...) so the model can weigh regions of the country differently.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

use super::source::WeatherProvider;
use crate::domain::{GeoLocation, ObservationTable, Region};
use crate::error::{PredictorError, Result};

pub const DEFAULT_OPEN_METEO_URL: &str = "https://api.open-meteo.com";

/// Hourly variables and the column prefix each becomes.
const WEATHER_VARIABLES: [(&str, &str); 2] = [("wind_speed_80m", "wind"), ("temperature_2m", "temp")];
const SOLAR_VARIABLES: [(&str, &str); 1] = [("global_tilted_irradiance", "irradiance")];

#[derive(Clone)]
pub struct OpenMeteoSource {
    base_url: String,
    client: reqwest::Client,
}

impl OpenMeteoSource {
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

    fn url(
        &self,
        locations: &[GeoLocation],
        variables: &[(&str, &str)],
        lookback_days: u32,
        lookahead_days: u32,
    ) -> String {
        let join = |f: fn(&GeoLocation) -> f64| {
            locations
                .iter()
                .map(|l| f(l).to_string())
                .collect::<Vec<_>>()
                .join(",")
        };
        let hourly = variables
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "{}/v1/forecast?latitude={}&longitude={}&azimuth=0&tilt=0&past_days={}&forecast_days={}&hourly={}&timezone=UTC",
            self.base_url.trim_end_matches('/'),
            join(|l| l.latitude),
            join(|l| l.longitude),
            lookback_days,
            lookahead_days,
            hourly
        )
    }

    async fn fetch_table(
        &self,
        region: Region,
        variables: &[(&str, &str)],
        lookback_days: u32,
        lookahead_days: u32,
    ) -> Result<ObservationTable> {
        let locations = region.locations();
        let url = self.url(locations, variables, lookback_days, lookahead_days);
        debug!(%region, %url, "fetching open-meteo forecast");

        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(PredictorError::DataUnavailable(format!(
                "open-meteo error: HTTP {status}: {body}"
            )));
        }

        let forecasts = match serde_json::from_str::<OpenMeteoPayload>(&body)? {
            OpenMeteoPayload::Many(v) => v,
            OpenMeteoPayload::One(f) => vec![f],
        };
        if forecasts.len() != locations.len() {
            return Err(PredictorError::DataUnavailable(format!(
                "open-meteo returned {} locations, expected {}",
                forecasts.len(),
                locations.len()
            )));
        }

        let tables = forecasts
            .iter()
            .enumerate()
            .map(|(i, f)| location_table(i, &f.hourly, variables))
            .collect::<Result<Vec<_>>>()?;
        let table = ObservationTable::outer_join(&tables.iter().collect::<Vec<_>>())?;

        info!(
            %region,
            rows = table.len(),
            columns = table.columns().len(),
            "open-meteo data fetched"
        );
        Ok(table)
    }
}

#[async_trait]
impl WeatherProvider for OpenMeteoSource {
    async fn fetch_weather(
        &self,
        region: Region,
        lookback_days: u32,
        lookahead_days: u32,
    ) -> Result<ObservationTable> {
        self.fetch_table(region, &WEATHER_VARIABLES, lookback_days, lookahead_days)
            .await
    }

    async fn fetch_solar(
        &self,
        region: Region,
        lookback_days: u32,
        lookahead_days: u32,
    ) -> Result<ObservationTable> {
        self.fetch_table(region, &SOLAR_VARIABLES, lookback_days, lookahead_days)
            .await
    }
}

/// Open-Meteo answers a single location with an object, several with an array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OpenMeteoPayload {
    Many(Vec<OpenMeteoForecast>),
    One(OpenMeteoForecast),
}

#[derive(Debug, Deserialize)]
struct OpenMeteoForecast {
    hourly: HourlyBlock,
}

#[derive(Debug, Deserialize)]
struct HourlyBlock {
    time: Vec<String>,
    #[serde(flatten)]
    series: HashMap<String, Vec<Option<f64>>>,
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")
        .map(|t| t.and_utc())
        .map_err(|e| PredictorError::DataUnavailable(format!("bad open-meteo time {raw:?}: {e}")))
}

fn location_table(
    index: usize,
    hourly: &HourlyBlock,
    variables: &[(&str, &str)],
) -> Result<ObservationTable> {
    let series = variables
        .iter()
        .map(|(name, _)| {
            hourly.series.get(*name).ok_or_else(|| {
                PredictorError::DataUnavailable(format!("open-meteo response lacks {name}"))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut table =
        ObservationTable::new(variables.iter().map(|(_, prefix)| format!("{prefix}_{index}")));
    for (row, raw) in hourly.time.iter().enumerate() {
        let ts = parse_time(raw)?;
        let values = series
            .iter()
            .map(|s| s.get(row).copied().flatten())
            .collect();
        table.insert(ts, values)?;
    }
    Ok(table)
}

//! Data source abstraction for weather, solar and price observations.

use async_trait::async_trait;

use crate::domain::{ObservationTable, Region};
use crate::error::Result;

/// Provides weather and irradiance tables covering history and forecast.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// Wind and temperature per sampled location.
    async fn fetch_weather(
        &self,
        region: Region,
        lookback_days: u32,
        lookahead_days: u32,
    ) -> Result<ObservationTable>;

    /// Irradiance per sampled location.
    async fn fetch_solar(
        &self,
        region: Region,
        lookback_days: u32,
        lookahead_days: u32,
    ) -> Result<ObservationTable>;
}

/// Provides historical spot prices in ct/kWh under the `price` column.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    async fn fetch_prices(&self, region: Region, lookback_days: u32) -> Result<ObservationTable>;
}

/// Everything the refresh cycle needs to fetch.
pub trait DataSource: WeatherProvider + PriceProvider {}

impl<T: WeatherProvider + PriceProvider> DataSource for T {}

/// Weather from one provider, prices from another.
pub struct CompositeSource<W, P> {
    weather: W,
    prices: P,
}

impl<W, P> CompositeSource<W, P> {
    pub fn new(weather: W, prices: P) -> Self {
        Self { weather, prices }
    }
}

#[async_trait]
impl<W: WeatherProvider, P: Send + Sync> WeatherProvider for CompositeSource<W, P> {
    async fn fetch_weather(
        &self,
        region: Region,
        lookback_days: u32,
        lookahead_days: u32,
    ) -> Result<ObservationTable> {
        self.weather
            .fetch_weather(region, lookback_days, lookahead_days)
            .await
    }

    async fn fetch_solar(
        &self,
        region: Region,
        lookback_days: u32,
        lookahead_days: u32,
    ) -> Result<ObservationTable> {
        self.weather
            .fetch_solar(region, lookback_days, lookahead_days)
            .await
    }
}

#[async_trait]
impl<W: Send + Sync, P: PriceProvider> PriceProvider for CompositeSource<W, P> {
    async fn fetch_prices(&self, region: Region, lookback_days: u32) -> Result<ObservationTable> {
        self.prices.fetch_prices(region, lookback_days).await
    }
}

//! Shared fixtures for integration tests: an in-memory data source that
//! counts calls and can be told to fail or stall, and a settable clock.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, DurationRound, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use spot_price_predictor::domain::{ObservationTable, Region, PRICE_COLUMN};
use spot_price_predictor::forecast::{Clock, PriceProvider, WeatherProvider};
use spot_price_predictor::{PredictorError, Result};

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: ChronoDuration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Deterministic price model: price falls with wind and irradiance.
pub fn price_for(hour: i64) -> f64 {
    let wind = wind_for(hour);
    let irradiance = irradiance_for(hour);
    30.0 - wind - irradiance / 100.0
}

fn wind_for(hour: i64) -> f64 {
    ((hour * 7).rem_euclid(13)) as f64
}

fn irradiance_for(hour: i64) -> f64 {
    let h = hour.rem_euclid(24);
    if (7..19).contains(&h) {
        (6 - (h - 12).abs()) as f64 * 100.0
    } else {
        0.0
    }
}

/// Serves `known_hours` of priced history ending at `anchor` plus
/// `horizon_hours` of weather beyond it.
pub struct MemorySource {
    pub start: DateTime<Utc>,
    pub known_hours: i64,
    pub horizon_hours: i64,
    pub delay: Duration,
    pub weather_calls: AtomicUsize,
    pub solar_calls: AtomicUsize,
    pub price_calls: AtomicUsize,
    pub fail_weather: AtomicBool,
    pub fail_prices: AtomicBool,
}

impl MemorySource {
    pub fn new(anchor: DateTime<Utc>, known_hours: i64, horizon_hours: i64) -> Self {
        let anchor = anchor
            .duration_trunc(ChronoDuration::hours(1))
            .unwrap_or(anchor);
        Self {
            start: anchor - ChronoDuration::hours(known_hours),
            known_hours,
            horizon_hours,
            delay: Duration::ZERO,
            weather_calls: AtomicUsize::new(0),
            solar_calls: AtomicUsize::new(0),
            price_calls: AtomicUsize::new(0),
            fail_weather: AtomicBool::new(false),
            fail_prices: AtomicBool::new(false),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn ts(&self, hour: i64) -> DateTime<Utc> {
        self.start + ChronoDuration::hours(hour)
    }

    pub fn calls(&self) -> (usize, usize, usize) {
        (
            self.weather_calls.load(Ordering::SeqCst),
            self.solar_calls.load(Ordering::SeqCst),
            self.price_calls.load(Ordering::SeqCst),
        )
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }

    fn total_hours(&self) -> i64 {
        self.known_hours + self.horizon_hours
    }
}

#[async_trait]
impl WeatherProvider for MemorySource {
    async fn fetch_weather(&self, _region: Region, _back: u32, _ahead: u32) -> Result<ObservationTable> {
        self.weather_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.fail_weather.load(Ordering::SeqCst) {
            return Err(PredictorError::DataUnavailable("weather offline".into()));
        }
        let mut table = ObservationTable::new(["wind_0", "temp_0"]);
        for h in 0..self.total_hours() {
            table.insert(self.ts(h), vec![Some(wind_for(h)), Some(12.0)])?;
        }
        Ok(table)
    }

    async fn fetch_solar(&self, _region: Region, _back: u32, _ahead: u32) -> Result<ObservationTable> {
        self.solar_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.fail_weather.load(Ordering::SeqCst) {
            return Err(PredictorError::DataUnavailable("solar offline".into()));
        }
        let mut table = ObservationTable::new(["irradiance_0"]);
        for h in 0..self.total_hours() {
            table.insert(self.ts(h), vec![Some(irradiance_for(h))])?;
        }
        Ok(table)
    }
}

#[async_trait]
impl PriceProvider for MemorySource {
    async fn fetch_prices(&self, _region: Region, _back: u32) -> Result<ObservationTable> {
        self.price_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.fail_prices.load(Ordering::SeqCst) {
            return Err(PredictorError::DataUnavailable("prices offline".into()));
        }
        let mut table = ObservationTable::new([PRICE_COLUMN]);
        for h in 0..self.known_hours {
            table.insert(self.ts(h), vec![Some(price_for(h))])?;
        }
        Ok(table)
    }
}

//! Turning a cached price series into the answer to a price query.

use chrono::{DateTime, Duration, DurationRound, Utc};
use chrono_tz::Tz;

use crate::domain::{PredictionMode, PricePoint, PriceSeries, PriceUnit, Region};
use crate::error::{PredictorError, Result};

/// Decimal places kept in `total`.
pub const PRICE_DECIMALS: i32 = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct PriceQuery {
    pub region: Region,
    pub unit: PriceUnit,
    /// Surcharge added per kWh, in the output unit.
    pub fixed_price: f64,
    pub tax_percent: f64,
    /// Hours after `start` to include; `None` means up to the end of the series.
    pub hours: Option<u32>,
    /// First hour to include; `None` means the next full local hour.
    pub start: Option<DateTime<Utc>>,
    pub mode: PredictionMode,
}

impl PriceQuery {
    pub fn new(region: Region) -> Self {
        Self {
            region,
            unit: PriceUnit::default(),
            fixed_price: 0.0,
            tax_percent: 0.0,
            hours: None,
            start: None,
            mode: PredictionMode::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.fixed_price.is_finite() {
            return Err(PredictorError::InvalidQuery("fixedPrice must be finite".into()));
        }
        if !self.tax_percent.is_finite() || self.tax_percent < -100.0 {
            return Err(PredictorError::InvalidQuery(
                "taxPercent must be a number not below -100".into(),
            ));
        }
        Ok(())
    }

    /// Start and exclusive end of the requested window.
    pub fn window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, Option<DateTime<Utc>>) {
        let start = self
            .start
            .unwrap_or_else(|| next_full_hour(now, self.region.timezone()));
        let end = self.hours.map(|h| start + Duration::hours(i64::from(h)));
        (start, end)
    }

    /// Convert, surcharge, tax and round every hour in the window, in time order.
    pub fn apply(&self, series: &PriceSeries, now: DateTime<Utc>) -> Result<Vec<PricePoint>> {
        self.validate()?;
        let (start, end) = self.window(now);
        Ok(series
            .range(start..)
            .take_while(|(ts, _)| end.map_or(true, |end| **ts < end))
            .map(|(ts, price)| PricePoint {
                starts_at: *ts,
                total: self.total(*price),
            })
            .collect())
    }

    /// `(price_in_unit + fixed_price) * (1 + tax_percent / 100)`, rounded.
    pub fn total(&self, ct_per_kwh: f64) -> f64 {
        let price = self.unit.from_ct_per_kwh(ct_per_kwh);
        round_to((price + self.fixed_price) * (1.0 + self.tax_percent / 100.0), PRICE_DECIMALS)
    }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// The next full hour in local time, or `now` itself when it is on the hour.
pub fn next_full_hour(now: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let local = now.with_timezone(&tz);
    match local.duration_trunc(Duration::hours(1)) {
        Ok(floor) if floor == local => now,
        Ok(floor) => (floor + Duration::hours(1)).with_timezone(&Utc),
        Err(_) => now,
    }
}

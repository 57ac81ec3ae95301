use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Predicted or known price per hour, in ct/kWh.
pub type PriceSeries = BTreeMap<DateTime<Utc>, f64>;

/// Truncate a timestamp to the start of its UTC hour.
pub fn hour_floor(ts: DateTime<Utc>) -> DateTime<Utc> {
    let secs = ts.timestamp();
    DateTime::from_timestamp(secs - secs.rem_euclid(3600), 0).unwrap_or(ts)
}

/// Which cached series a caller wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PredictionMode {
    /// Known prices verbatim, model estimates only for the horizon.
    #[default]
    Live,
    /// Every hour model-estimated, for backtesting against known prices.
    Evaluation,
}

/// Output units offered by the query surface. All are linear in ct/kWh.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Default,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum PriceUnit {
    #[default]
    CtPerKwh,
    EurPerKwh,
    EurPerMwh,
}

impl PriceUnit {
    /// Multiplier from ct/kWh into this unit.
    pub fn factor(&self) -> f64 {
        match self {
            Self::CtPerKwh => 1.0,
            Self::EurPerKwh => 0.01,
            Self::EurPerMwh => 10.0,
        }
    }

    pub fn from_ct_per_kwh(&self, value: f64) -> f64 {
        value * self.factor()
    }
}

/// One hour of a formatted price answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub starts_at: DateTime<Utc>,
    pub total: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    #[test]
    fn test_hour_floor() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 13, 59, 59).unwrap();
        assert_eq!(hour_floor(ts), Utc.with_ymd_and_hms(2024, 1, 1, 13, 0, 0).unwrap());
        let exact = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(hour_floor(exact), exact);
    }

    #[test]
    fn test_unit_parse() {
        assert_eq!(PriceUnit::from_str("EUR_PER_MWH").unwrap(), PriceUnit::EurPerMwh);
        assert_eq!(PriceUnit::from_str("ct_per_kwh").unwrap(), PriceUnit::CtPerKwh);
        assert!(PriceUnit::from_str("SEK").is_err());
        assert_eq!(PriceUnit::EurPerKwh.to_string(), "EUR_PER_KWH");
    }

    #[test]
    fn test_unit_conversion() {
        assert_eq!(PriceUnit::EurPerMwh.from_ct_per_kwh(5.0), 50.0);
        assert_eq!(PriceUnit::CtPerKwh.from_ct_per_kwh(5.0), 5.0);
        assert!((PriceUnit::EurPerKwh.from_ct_per_kwh(5.0) - 0.05).abs() < 1e-12);
    }
}

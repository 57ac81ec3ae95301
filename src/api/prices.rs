use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use validator::Validate;

use crate::{
    api::error::ApiError,
    app::AppState,
    domain::{PredictionMode, PricePoint, PriceUnit, Region},
    error::PredictorError,
    forecast::PriceQuery,
};

/// Query parameters of `GET /prices`.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PricesParams {
    pub region: Option<String>,
    pub unit: Option<String>,
    pub fixed_price: Option<f64>,
    #[validate(range(min = -100.0))]
    pub tax_percent: Option<f64>,
    /// Omit for every remaining hour.
    #[validate(range(min = 0, max = 8784))]
    pub hours: Option<i64>,
    pub start_ts: Option<String>,
    pub evaluation: Option<bool>,
}

impl PricesParams {
    pub fn into_query(self, default_region: Region) -> Result<PriceQuery, PredictorError> {
        let region = match self.region.as_deref() {
            Some(raw) => Region::from_str(raw)
                .map_err(|_| PredictorError::InvalidQuery(format!("unknown region {raw:?}")))?,
            None => default_region,
        };
        let unit = match self.unit.as_deref() {
            Some(raw) => PriceUnit::from_str(raw)
                .map_err(|_| PredictorError::InvalidQuery(format!("unknown unit {raw:?}")))?,
            None => PriceUnit::default(),
        };
        let hours = self
            .hours
            .map(u32::try_from)
            .transpose()
            .map_err(|_| PredictorError::InvalidQuery("hours must not be negative".into()))?;
        let start = self
            .start_ts
            .as_deref()
            .map(|raw| parse_start(raw, region.timezone()))
            .transpose()?;

        let query = PriceQuery {
            region,
            unit,
            fixed_price: self.fixed_price.unwrap_or(0.0),
            tax_percent: self.tax_percent.unwrap_or(0.0),
            hours,
            start,
            mode: if self.evaluation.unwrap_or(false) {
                PredictionMode::Evaluation
            } else {
                PredictionMode::Live
            },
        };
        query.validate()?;
        Ok(query)
    }
}

/// RFC 3339, or a bare local date-time interpreted in the region's zone.
fn parse_start(raw: &str, tz: Tz) -> Result<DateTime<Utc>, PredictorError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .and_then(|naive| naive.and_local_timezone(tz).earliest())
        .map(|ts| ts.with_timezone(&Utc))
        .ok_or_else(|| PredictorError::InvalidQuery(format!("invalid startTs {raw:?}")))
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceEntry {
    /// Hour start in the region's local time.
    pub starts_at: String,
    pub total: f64,
}

impl PriceEntry {
    fn from_point(point: &PricePoint, tz: Tz) -> Self {
        Self {
            starts_at: point.starts_at.with_timezone(&tz).to_rfc3339(),
            total: point.total,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricesResponse {
    /// Last hour with a known market price, local time.
    pub known_until: Option<String>,
    pub prices: Vec<PriceEntry>,
}

/// GET /prices - Hourly price forecast with surcharge and tax applied
pub async fn get_prices(
    State(st): State<AppState>,
    Query(params): Query<PricesParams>,
) -> Result<Json<PricesResponse>, ApiError> {
    params.validate()?;
    let query = params.into_query(st.cfg.regions.default)?;
    let tz = query.region.timezone();

    let state = st.scheduler.ensure_fresh(query.region).await?;
    let points = query.apply(state.series(query.mode), Utc::now())?;

    Ok(Json(PricesResponse {
        known_until: state
            .last_known()
            .map(|(ts, _)| ts.with_timezone(&tz).to_rfc3339()),
        prices: points
            .iter()
            .map(|p| PriceEntry::from_point(p, tz))
            .collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_defaults() {
        let query = PricesParams::default().into_query(Region::AT).unwrap();
        assert_eq!(query, PriceQuery::new(Region::AT));
    }

    #[test]
    fn test_parses_all_parameters() {
        let params = PricesParams {
            region: Some("de".into()),
            unit: Some("EUR_PER_MWH".into()),
            fixed_price: Some(1.5),
            tax_percent: Some(19.0),
            hours: Some(24),
            start_ts: Some("2024-05-06T10:00:00+02:00".into()),
            evaluation: Some(true),
        };
        let query = params.into_query(Region::AT).unwrap();
        assert_eq!(query.region, Region::DE);
        assert_eq!(query.unit, PriceUnit::EurPerMwh);
        assert_eq!(query.hours, Some(24));
        assert_eq!(query.mode, PredictionMode::Evaluation);
        assert_eq!(
            query.start,
            Some(Utc.with_ymd_and_hms(2024, 5, 6, 8, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_naive_start_is_local_time() {
        let start = parse_start("2024-01-15T10:00", Region::DE.timezone()).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_rejects_unknown_unit_and_region() {
        let bad_unit = PricesParams {
            unit: Some("SEK".into()),
            ..Default::default()
        };
        assert!(matches!(
            bad_unit.into_query(Region::DE),
            Err(PredictorError::InvalidQuery(_))
        ));
        let bad_region = PricesParams {
            region: Some("FR".into()),
            ..Default::default()
        };
        assert!(matches!(
            bad_region.into_query(Region::DE),
            Err(PredictorError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_validation_rejects_negative_hours() {
        let params = PricesParams {
            hours: Some(-1),
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_rejects_garbage_start() {
        assert!(parse_start("tomorrow", Region::DE.timezone()).is_err());
    }
}

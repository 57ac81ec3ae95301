use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{app::AppState, domain::Region};

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    timestamp: DateTime<Utc>,
    regions: Vec<RegionHealth>,
}

/// Model state of one region
#[derive(Debug, Serialize)]
pub struct RegionHealth {
    region: Region,
    trained: bool,
    refreshing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    trained_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_weather_update: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_price_update: Option<DateTime<Utc>>,
}

/// GET /healthz - Liveness probe
///
/// Always 200 while the process serves requests; untrained regions are
/// reported, not treated as failures.
pub async fn healthz(State(st): State<AppState>) -> impl IntoResponse {
    let scheduler = &st.scheduler;
    let regions = scheduler
        .regions()
        .map(|region| {
            let state = scheduler.engine(region).ok().and_then(|e| e.snapshot());
            let freshness = scheduler.freshness(region).unwrap_or_default();
            RegionHealth {
                region,
                trained: state.is_some(),
                refreshing: scheduler.is_refreshing(region),
                trained_at: state.map(|s| s.trained_at()),
                last_weather_update: freshness.last_weather_update,
                last_price_update: freshness.last_price_update,
            }
        })
        .collect();

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            timestamp: Utc::now(),
            regions,
        }),
    )
}

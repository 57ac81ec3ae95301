pub mod error;
pub mod health;
pub mod prices;

use axum::{http::StatusCode, routing::get, Router};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::app::AppState;

pub fn router(state: AppState) -> Router {
    let request_timeout = Duration::from_secs(state.cfg.server.request_timeout_secs);

    Router::new()
        .route("/prices", get(prices::get_prices))
        .route("/healthz", get(health::healthz))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(axum::extract::DefaultBodyLimit::max(64 * 1024))
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    request_timeout,
                )),
        )
        .layer(TraceLayer::new_for_http())
}

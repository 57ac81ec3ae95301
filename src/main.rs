use anyhow::Result;
use spot_price_predictor::{api, app, config::Config, telemetry};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    let cfg = Config::load()?;
    let addr = cfg.server.socket_addr()?;

    let state = app::AppState::new(cfg)?;
    let refresh = app::spawn_refresh_tasks(&state);
    let router = api::router(state);

    info!(%addr, "starting spot price predictor");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await?;

    refresh.abort();
    warn!("shutdown complete");
    Ok(())
}

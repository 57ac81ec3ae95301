//! Repeated random-split backtest of the price model.
//!
//! Usage: `predictor-backtest [REGION] [ROUNDS] [SEED]`
//!
//! Fetches (or replays, with `sources.fixture_dir` set) one lookback window
//! of data and prints the averaged metrics as JSON.

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::str::FromStr;
use tracing::info;

use spot_price_predictor::{
    app::build_source,
    config::Config,
    domain::Region,
    forecast::FeatureBuilder,
    ml::{backtest, BacktestConfig},
    telemetry::{init_tracing_with, LogFormat},
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing_with(LogFormat::Text);

    let cfg = Config::load()?;
    let mut args = std::env::args().skip(1);
    let region = match args.next() {
        Some(raw) => Region::from_str(&raw).with_context(|| format!("unknown region {raw}"))?,
        None => cfg.regions.default,
    };
    let rounds = match args.next() {
        Some(raw) => raw.parse().with_context(|| format!("invalid round count {raw}"))?,
        None => BacktestConfig::default().rounds,
    };
    let mut rng = match args.next() {
        Some(raw) => StdRng::seed_from_u64(raw.parse().with_context(|| format!("invalid seed {raw}"))?),
        None => StdRng::from_entropy(),
    };

    let source = build_source(&cfg.sources)?;
    let (back, ahead) = (cfg.refresh.lookback_days, cfg.refresh.lookahead_days);
    let weather = source.fetch_weather(region, back, ahead).await?;
    let solar = source.fetch_solar(region, back, ahead).await?;
    let prices = source.fetch_prices(region, back).await?;

    let table = FeatureBuilder::new(region).build(Some(&weather), Some(&solar), Some(&prices))?;
    info!(%region, rows = table.len(), labelled = table.labelled_len(), "feature table ready");

    let config = BacktestConfig {
        rounds,
        ..BacktestConfig::default()
    };
    let report = backtest(&table, &cfg.model, &config, &mut rng)?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

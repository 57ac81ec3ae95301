use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::{Config, SourcesConfig};
use crate::forecast::{
    CompositeSource, DataSource, FixtureCache, OpenMeteoSource, RefreshScheduler,
    SmardPriceSource,
};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub scheduler: Arc<RefreshScheduler>,
}

impl AppState {
    pub fn new(cfg: Config) -> Result<Self> {
        let source = build_source(&cfg.sources)?;
        let scheduler = RefreshScheduler::new(
            source,
            cfg.refresh.clone(),
            cfg.model,
            &cfg.regions.enabled,
        );
        Ok(Self::with_scheduler(cfg, Arc::new(scheduler)))
    }

    pub fn with_scheduler(cfg: Config, scheduler: Arc<RefreshScheduler>) -> Self {
        Self {
            cfg: Arc::new(cfg),
            scheduler,
        }
    }
}

/// Open-Meteo for weather, SMARD for prices, optionally behind the on-disk
/// fixture cache.
pub fn build_source(cfg: &SourcesConfig) -> Result<Arc<dyn DataSource>> {
    let timeout = Duration::from_secs(cfg.http_timeout_seconds);
    let live = CompositeSource::new(
        OpenMeteoSource::new(cfg.open_meteo_url.clone(), timeout)?,
        SmardPriceSource::new(cfg.smard_url.clone(), timeout)?,
    );
    Ok(match &cfg.fixture_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "using fixture cache for source data");
            Arc::new(FixtureCache::new(live, dir.clone()))
        }
        None => Arc::new(live),
    })
}

/// Background staleness checks; the first tick fires immediately and warms
/// every enabled region.
pub fn spawn_refresh_tasks(state: &AppState) -> JoinHandle<()> {
    let scheduler = Arc::clone(&state.scheduler);
    info!(
        regions = ?scheduler.regions().collect::<Vec<_>>(),
        tick_secs = scheduler.policy().tick_secs,
        "starting refresh scheduler"
    );
    tokio::spawn(scheduler.run())
}

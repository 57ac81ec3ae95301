//! Per-region model state: source tables in, cached price series out.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

use super::features::{FeatureBuilder, FeatureTable};
use crate::domain::{ObservationTable, PredictionMode, PriceSeries, Region, PRICE_COLUMN};
use crate::error::{PredictorError, Result};
use crate::ml::{ModelConfig, WeightedKnnModel};

#[derive(Debug, Default)]
struct SourceTables {
    weather: Option<ObservationTable>,
    solar: Option<ObservationTable>,
    prices: Option<ObservationTable>,
}

/// Output of one successful training cycle. Replaced as a whole, so readers
/// never see the live series of one cycle next to the evaluation series of
/// another.
#[derive(Debug)]
pub struct TrainedState {
    model: WeightedKnnModel,
    live: PriceSeries,
    evaluation: PriceSeries,
    last_known: Option<(DateTime<Utc>, f64)>,
    cycle: u64,
}

impl TrainedState {
    pub fn series(&self, mode: PredictionMode) -> &PriceSeries {
        match mode {
            PredictionMode::Live => &self.live,
            PredictionMode::Evaluation => &self.evaluation,
        }
    }

    pub fn model(&self) -> &WeightedKnnModel {
        &self.model
    }

    /// Last hour with a known price when this state was trained.
    pub fn last_known(&self) -> Option<(DateTime<Utc>, f64)> {
        self.last_known
    }

    /// Sequence number of the training cycle, starting at 1.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.model.trained_at()
    }
}

pub struct ForecastEngine {
    region: Region,
    builder: FeatureBuilder,
    config: ModelConfig,
    sources: RwLock<SourceTables>,
    trained: RwLock<Option<Arc<TrainedState>>>,
    cycles: AtomicU64,
}

impl ForecastEngine {
    pub fn new(region: Region, config: ModelConfig) -> Self {
        Self {
            region,
            builder: FeatureBuilder::new(region),
            config,
            sources: RwLock::new(SourceTables::default()),
            trained: RwLock::new(None),
            cycles: AtomicU64::new(0),
        }
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn set_weather(&self, table: ObservationTable) {
        self.sources.write().weather = Some(table);
    }

    pub fn set_solar(&self, table: ObservationTable) {
        self.sources.write().solar = Some(table);
    }

    pub fn set_prices(&self, table: ObservationTable) {
        self.sources.write().prices = Some(table);
    }

    /// Whether both weather and solar tables have been loaded.
    pub fn has_weather(&self) -> bool {
        let sources = self.sources.read();
        sources.weather.is_some() && sources.solar.is_some()
    }

    pub fn has_prices(&self) -> bool {
        self.sources.read().prices.is_some()
    }

    /// Rebuild features from the current tables, refit the model and swap
    /// in fresh live and evaluation series. On error the previous state
    /// stays in place.
    pub fn train(&self) -> Result<Arc<TrainedState>> {
        let (table, last_known) = {
            let sources = self.sources.read();
            let table = self.builder.build(
                sources.weather.as_ref(),
                sources.solar.as_ref(),
                sources.prices.as_ref(),
            )?;
            let last_known = sources
                .prices
                .as_ref()
                .and_then(|p| p.last_present(PRICE_COLUMN));
            (table, last_known)
        };

        let model = WeightedKnnModel::fit(&table, &self.config)?;
        let evaluation = model.evaluation_series()?;
        let live = merge_known(&evaluation, &table);
        let cycle = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;

        info!(
            region = %self.region,
            cycle,
            rows = table.len(),
            labelled = table.labelled_len(),
            last_known = ?last_known.map(|(ts, _)| ts),
            "model trained"
        );

        let state = Arc::new(TrainedState {
            model,
            live,
            evaluation,
            last_known,
            cycle,
        });
        *self.trained.write() = Some(Arc::clone(&state));
        Ok(state)
    }

    /// The most recent trained state, if any.
    pub fn snapshot(&self) -> Option<Arc<TrainedState>> {
        self.trained.read().clone()
    }

    pub fn predict(&self, mode: PredictionMode) -> Result<PriceSeries> {
        self.snapshot()
            .map(|state| state.series(mode).clone())
            .ok_or(PredictorError::NotYetTrained)
    }

    /// Latest hour with a present price in the loaded price table.
    pub fn last_known_price(&self) -> Option<(DateTime<Utc>, f64)> {
        self.sources
            .read()
            .prices
            .as_ref()
            .and_then(|p| p.last_present(PRICE_COLUMN))
    }

    /// Number of completed training cycles.
    pub fn training_cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }
}

/// Overwrite model estimates with known prices where the feature table has
/// them. Hours dropped from the table for missing weather stay absent.
pub fn merge_known(evaluation: &PriceSeries, table: &FeatureTable) -> PriceSeries {
    let mut live = evaluation.clone();
    for (ts, price) in table.timestamps().iter().zip(table.prices()) {
        if let Some(price) = price {
            live.insert(*ts, *price);
        }
    }
    live
}

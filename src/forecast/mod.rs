//! Forecast pipeline: data sources, feature building, per-region engines
//! and the refresh scheduler that keeps them current.

pub mod engine;
pub mod features;
pub mod fixture;
pub mod prices;
pub mod query;
pub mod scheduler;
pub mod source;
pub mod weather;

pub use engine::{merge_known, ForecastEngine, TrainedState};
pub use features::{CalendarFeatures, FeatureBuilder, FeatureTable, HOLIDAY_COLUMN};
pub use fixture::FixtureCache;
pub use prices::{SmardPriceSource, DEFAULT_SMARD_URL};
pub use query::{next_full_hour, PriceQuery, PRICE_DECIMALS};
pub use scheduler::{
    Clock, CycleReport, CycleResult, Freshness, RefreshHandle, RefreshPlan, RefreshPolicy,
    RefreshScheduler, SystemClock,
};
pub use source::{CompositeSource, DataSource, PriceProvider, WeatherProvider};
pub use weather::{OpenMeteoSource, DEFAULT_OPEN_METEO_URL};

//! Refresh orchestration: staleness policy, single-flight refresh cycles,
//! cold-start blocking and stale-while-revalidate.
//!
//! Each region owns one [`ForecastEngine`], a [`Freshness`] record and at
//! most one in-flight refresh cycle. A cycle fetches whatever is due,
//! retrains when anything changed and swaps the engine's cached state.
//! Callers that arrive while the region has a cached state get it back
//! immediately; only a region with nothing cached makes callers wait.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::engine::{ForecastEngine, TrainedState};
use super::source::DataSource;
use crate::domain::{ObservationTable, PredictionMode, PriceSeries, Region};
use crate::error::{PredictorError, Result};
use crate::ml::ModelConfig;

/// Source of "now" for staleness decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshPolicy {
    pub weather_interval_minutes: u64,
    /// Price refresh interval while the last known price lies far ahead.
    pub price_interval_minutes: u64,
    /// Price refresh interval once the last known price is near or past.
    pub price_interval_near_minutes: u64,
    pub near_horizon_hours: u64,
    pub fetch_timeout_secs: u64,
    pub lookback_days: u32,
    pub lookahead_days: u32,
    /// Period of the background staleness check.
    pub tick_secs: u64,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            weather_interval_minutes: 8 * 60,
            price_interval_minutes: 6 * 60,
            price_interval_near_minutes: 15,
            near_horizon_hours: 12,
            fetch_timeout_secs: 60,
            lookback_days: 30,
            lookahead_days: 7,
            tick_secs: 60,
        }
    }
}

fn minutes(m: u64) -> ChronoDuration {
    ChronoDuration::minutes(m as i64)
}

impl RefreshPolicy {
    pub fn weather_interval(&self) -> ChronoDuration {
        minutes(self.weather_interval_minutes)
    }

    /// Price refresh interval given the last hour with a known price.
    ///
    /// Short while the known range ends within the near horizon (the next
    /// day-ahead auction result may appear any moment), long otherwise.
    pub fn price_interval(&self, last_known: Option<DateTime<Utc>>, now: DateTime<Utc>) -> ChronoDuration {
        let horizon = minutes(self.near_horizon_hours.saturating_mul(60));
        match last_known {
            Some(ts) if ts > now + horizon => minutes(self.price_interval_minutes),
            _ => minutes(self.price_interval_near_minutes),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs.max(1))
    }

    pub fn weather_due(&self, last_update: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        last_update.map_or(true, |t| now - t >= self.weather_interval())
    }

    pub fn price_due(
        &self,
        last_update: Option<DateTime<Utc>>,
        last_known: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        last_update.map_or(true, |t| now - t >= self.price_interval(last_known, now))
    }

    /// Minimum wait before weather is fetched again after a failed attempt.
    pub fn weather_retry_backoff(&self) -> ChronoDuration {
        ChronoDuration::seconds(self.tick_secs.max(1) as i64)
    }

    /// Minimum wait before prices are fetched again after a failed attempt.
    pub fn price_retry_backoff(&self) -> ChronoDuration {
        minutes(self.price_interval_near_minutes)
    }

    /// Whether a source may be fetched again. Only an attempt newer than the
    /// last success counts as a failure and holds the retry back.
    pub fn retry_allowed(
        &self,
        last_update: Option<DateTime<Utc>>,
        last_attempt: Option<DateTime<Utc>>,
        backoff: ChronoDuration,
        now: DateTime<Utc>,
    ) -> bool {
        match last_attempt {
            Some(attempt) if last_update.map_or(true, |u| attempt > u) => now - attempt >= backoff,
            _ => true,
        }
    }
}

/// When each source last refreshed successfully for a region, and when it
/// was last tried at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Freshness {
    pub last_weather_update: Option<DateTime<Utc>>,
    pub last_price_update: Option<DateTime<Utc>>,
    pub last_weather_attempt: Option<DateTime<Utc>>,
    pub last_price_attempt: Option<DateTime<Utc>>,
}

impl Freshness {
    fn weather_due(&self, policy: &RefreshPolicy, now: DateTime<Utc>) -> bool {
        policy.weather_due(self.last_weather_update, now)
            && policy.retry_allowed(
                self.last_weather_update,
                self.last_weather_attempt,
                policy.weather_retry_backoff(),
                now,
            )
    }

    fn price_due(
        &self,
        policy: &RefreshPolicy,
        last_known: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        policy.price_due(self.last_price_update, last_known, now)
            && policy.retry_allowed(
                self.last_price_update,
                self.last_price_attempt,
                policy.price_retry_backoff(),
                now,
            )
    }
}

/// Work a refresh cycle should do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshPlan {
    pub weather: bool,
    pub prices: bool,
    /// Retrain even if no fetch succeeds.
    pub retrain: bool,
}

impl RefreshPlan {
    pub fn is_empty(&self) -> bool {
        !(self.weather || self.prices || self.retrain)
    }
}

/// What one refresh cycle accomplished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle_id: u64,
    pub weather_updated: bool,
    pub prices_updated: bool,
    /// Training cycle number of the engine state this cycle produced.
    pub trained_cycle: Option<u64>,
}

pub type CycleResult = std::result::Result<CycleReport, PredictorError>;

/// Awaitable outcome of an in-flight cycle, shared by every caller.
pub type RefreshHandle = Shared<BoxFuture<'static, CycleResult>>;

struct InFlight {
    id: u64,
    cycle: RefreshHandle,
}

struct RegionSlot {
    engine: Arc<ForecastEngine>,
    freshness: Mutex<Freshness>,
    inflight: Mutex<Option<InFlight>>,
}

/// Clears the in-flight marker when its cycle ends, however it ends.
struct InflightGuard {
    slot: Arc<RegionSlot>,
    id: u64,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        let mut inflight = self.slot.inflight.lock();
        if inflight.as_ref().is_some_and(|f| f.id == self.id) {
            *inflight = None;
        }
    }
}

pub struct RefreshScheduler {
    source: Arc<dyn DataSource>,
    policy: RefreshPolicy,
    clock: Arc<dyn Clock>,
    slots: BTreeMap<Region, Arc<RegionSlot>>,
    next_cycle: AtomicU64,
}

impl RefreshScheduler {
    pub fn new(
        source: Arc<dyn DataSource>,
        policy: RefreshPolicy,
        model: ModelConfig,
        regions: &[Region],
    ) -> Self {
        let slots = regions
            .iter()
            .map(|&region| {
                let slot = RegionSlot {
                    engine: Arc::new(ForecastEngine::new(region, model)),
                    freshness: Mutex::new(Freshness::default()),
                    inflight: Mutex::new(None),
                };
                (region, Arc::new(slot))
            })
            .collect();
        Self {
            source,
            policy,
            clock: Arc::new(SystemClock),
            slots,
            next_cycle: AtomicU64::new(0),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn policy(&self) -> &RefreshPolicy {
        &self.policy
    }

    pub fn regions(&self) -> impl Iterator<Item = Region> + '_ {
        self.slots.keys().copied()
    }

    fn slot(&self, region: Region) -> Result<&Arc<RegionSlot>> {
        self.slots
            .get(&region)
            .ok_or(PredictorError::UnknownRegion(region))
    }

    pub fn engine(&self, region: Region) -> Result<Arc<ForecastEngine>> {
        self.slot(region).map(|s| Arc::clone(&s.engine))
    }

    pub fn freshness(&self, region: Region) -> Result<Freshness> {
        self.slot(region).map(|s| *s.freshness.lock())
    }

    pub fn is_refreshing(&self, region: Region) -> bool {
        self.slots
            .get(&region)
            .is_some_and(|s| s.inflight.lock().is_some())
    }

    /// Failed sources wait out their retry backoff, except for tables a
    /// cold region still lacks: its callers block until they arrive.
    fn plan_for(&self, slot: &RegionSlot, cold: bool) -> RefreshPlan {
        let now = self.clock.now();
        let freshness = *slot.freshness.lock();
        let last_known = slot.engine.last_known_price().map(|(ts, _)| ts);
        RefreshPlan {
            weather: freshness.weather_due(&self.policy, now)
                || (cold && !slot.engine.has_weather()),
            prices: freshness.price_due(&self.policy, last_known, now)
                || (cold && !slot.engine.has_prices()),
            retrain: cold,
        }
    }

    /// What a cycle started now would do for `region`.
    pub fn plan(&self, region: Region) -> Result<RefreshPlan> {
        let slot = self.slot(region)?;
        Ok(self.plan_for(slot, slot.engine.snapshot().is_none()))
    }

    /// Join the in-flight cycle, or start one if anything is due.
    fn trigger_slot(&self, slot: &Arc<RegionSlot>, plan: Option<RefreshPlan>) -> Option<RefreshHandle> {
        let mut inflight = slot.inflight.lock();
        if let Some(current) = inflight.as_ref() {
            debug!(region = %slot.engine.region(), cycle = current.id, "joining in-flight refresh");
            return Some(current.cycle.clone());
        }

        let plan = plan.unwrap_or_else(|| self.plan_for(slot, slot.engine.snapshot().is_none()));
        if plan.is_empty() {
            return None;
        }

        let id = self.next_cycle.fetch_add(1, Ordering::SeqCst) + 1;
        let task = CycleTask {
            source: Arc::clone(&self.source),
            policy: self.policy.clone(),
            clock: Arc::clone(&self.clock),
            slot: Arc::clone(slot),
            plan,
            id,
        };
        let handle = tokio::spawn(task.run());
        let cycle = async move {
            handle.await.unwrap_or_else(|e| {
                Err(PredictorError::Computation(format!("refresh task failed: {e}")))
            })
        }
        .boxed()
        .shared();

        *inflight = Some(InFlight {
            id,
            cycle: cycle.clone(),
        });
        Some(cycle)
    }

    /// Start a cycle for `region` if one is due. Returns the handle of the
    /// started or already running cycle.
    pub fn trigger(&self, region: Region) -> Result<Option<RefreshHandle>> {
        let slot = self.slot(region)?;
        Ok(self.trigger_slot(slot, None))
    }

    /// Refresh every source and retrain now, or join the running cycle.
    pub async fn refresh(&self, region: Region) -> CycleResult {
        let slot = self.slot(region)?;
        let plan = RefreshPlan {
            weather: true,
            prices: true,
            retrain: true,
        };
        match self.trigger_slot(slot, Some(plan)) {
            Some(cycle) => cycle.await,
            None => Ok(CycleReport::default()),
        }
    }

    /// The region's trained state. Waits for a refresh only when nothing is
    /// cached yet; otherwise due work runs in the background and the
    /// current state is returned as is.
    pub async fn ensure_fresh(&self, region: Region) -> Result<Arc<TrainedState>> {
        let slot = self.slot(region)?;
        let cached = slot.engine.snapshot();
        let cycle = self.trigger_slot(slot, None);

        if let Some(state) = cached {
            return Ok(state);
        }
        if let Some(cycle) = cycle {
            cycle.await?;
        }
        slot.engine.snapshot().ok_or(PredictorError::NotYetTrained)
    }

    pub async fn predict(&self, region: Region, mode: PredictionMode) -> Result<PriceSeries> {
        let state = self.ensure_fresh(region).await?;
        Ok(state.series(mode).clone())
    }

    /// Check every region on the policy tick so sources refresh on cadence
    /// even without queries.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.policy.tick());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            for slot in self.slots.values() {
                // Outcome is logged by the cycle itself.
                if self.trigger_slot(slot, None).is_some() {
                    debug!(region = %slot.engine.region(), "background refresh running");
                }
            }
        }
    }
}

struct CycleTask {
    source: Arc<dyn DataSource>,
    policy: RefreshPolicy,
    clock: Arc<dyn Clock>,
    slot: Arc<RegionSlot>,
    plan: RefreshPlan,
    id: u64,
}

impl CycleTask {
    async fn timed<T>(&self, what: &str, fetch: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.policy.fetch_timeout(), fetch)
            .await
            .map_err(|_| {
                PredictorError::DataUnavailable(format!(
                    "{what} fetch timed out after {}s",
                    self.policy.fetch_timeout_secs
                ))
            })?
    }

    async fn fetch_weather(&self, region: Region) -> Result<(ObservationTable, ObservationTable)> {
        let (back, ahead) = (self.policy.lookback_days, self.policy.lookahead_days);
        tokio::try_join!(
            self.timed("weather", self.source.fetch_weather(region, back, ahead)),
            self.timed("solar", self.source.fetch_solar(region, back, ahead)),
        )
    }

    async fn fetch_prices(&self, region: Region) -> Result<ObservationTable> {
        self.timed(
            "price",
            self.source.fetch_prices(region, self.policy.lookback_days),
        )
        .await
    }

    async fn run(self) -> CycleResult {
        let _guard = InflightGuard {
            slot: Arc::clone(&self.slot),
            id: self.id,
        };
        let engine = Arc::clone(&self.slot.engine);
        let region = engine.region();
        info!(
            %region,
            cycle = self.id,
            weather = self.plan.weather,
            prices = self.plan.prices,
            "refresh cycle started"
        );

        let mut report = CycleReport {
            cycle_id: self.id,
            ..CycleReport::default()
        };
        let mut failure = None;

        if self.plan.weather {
            let fetched = self.fetch_weather(region).await;
            let now = self.clock.now();
            self.slot.freshness.lock().last_weather_attempt = Some(now);
            match fetched {
                Ok((weather, solar)) => {
                    engine.set_weather(weather);
                    engine.set_solar(solar);
                    self.slot.freshness.lock().last_weather_update = Some(now);
                    report.weather_updated = true;
                }
                Err(e) => {
                    warn!(%region, cycle = self.id, error = %e, "weather refresh failed");
                    failure = Some(e);
                }
            }
        }

        if self.plan.prices {
            let fetched = self.fetch_prices(region).await;
            let now = self.clock.now();
            self.slot.freshness.lock().last_price_attempt = Some(now);
            match fetched {
                Ok(prices) => {
                    engine.set_prices(prices);
                    self.slot.freshness.lock().last_price_update = Some(now);
                    report.prices_updated = true;
                }
                Err(e) => {
                    warn!(%region, cycle = self.id, error = %e, "price refresh failed");
                    failure = failure.or(Some(e));
                }
            }
        }

        if !(report.weather_updated || report.prices_updated || self.plan.retrain) {
            return match failure {
                Some(e) => Err(e),
                None => Ok(report),
            };
        }

        let trainer = Arc::clone(&engine);
        let trained = tokio::task::spawn_blocking(move || trainer.train())
            .await
            .map_err(|e| PredictorError::Computation(format!("training task failed: {e}")))?;

        match trained {
            Ok(state) => {
                report.trained_cycle = Some(state.cycle());
                info!(
                    %region,
                    cycle = self.id,
                    training_cycle = state.cycle(),
                    "refresh cycle finished"
                );
                Ok(report)
            }
            Err(e) => {
                warn!(%region, cycle = self.id, error = %e, "retraining failed, keeping previous state");
                Err(failure.unwrap_or(e))
            }
        }
    }
}

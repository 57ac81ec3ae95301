//! Load Testing Suite
//!
//! Verifies the refresh path under many concurrent price queries:
//! - a cold start shared by every waiting caller
//! - queries answered from cache while a background refresh runs
//!
//! Key Performance Requirements:
//! - Each source is fetched once per refresh cycle regardless of caller count
//! - Warm queries never wait for a refresh

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

use crate::common::{ManualClock, MemorySource};
use spot_price_predictor::domain::{PredictionMode, Region};
use spot_price_predictor::forecast::{DataSource, RefreshPolicy, RefreshScheduler};
use spot_price_predictor::ml::ModelConfig;

fn build_scheduler(source: Arc<MemorySource>, clock: Arc<ManualClock>) -> Arc<RefreshScheduler> {
    let source: Arc<dyn DataSource> = source;
    Arc::new(
        RefreshScheduler::new(
            source,
            RefreshPolicy::default(),
            ModelConfig::default(),
            &[Region::DE, Region::AT],
        )
        .with_clock(clock),
    )
}

/// Test: 200 concurrent callers on a cold region share one cycle.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_cold_start_under_concurrent_load() {
    let now = Utc::now();
    let source = Arc::new(MemorySource::new(now, 24 * 14, 48).with_delay(Duration::from_millis(200)));
    let scheduler = build_scheduler(Arc::clone(&source), Arc::new(ManualClock::new(now)));

    let mut set = JoinSet::new();
    for _ in 0..200 {
        let scheduler = Arc::clone(&scheduler);
        set.spawn(async move { scheduler.predict(Region::DE, PredictionMode::Live).await });
    }

    let mut lengths = Vec::new();
    while let Some(result) = set.join_next().await {
        lengths.push(result.unwrap().unwrap().len());
    }

    assert_eq!(lengths.len(), 200);
    assert!(lengths.iter().all(|&n| n == 24 * 14 + 48));
    assert_eq!(source.calls(), (1, 1, 1));
    // AT was never queried.
    assert!(scheduler.engine(Region::AT).unwrap().snapshot().is_none());
}

/// Test: warm queries stay fast while a slow refresh is in flight.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore] // Slow: waits for a deliberately stalled source
async fn test_warm_queries_do_not_wait_for_refresh() {
    let now = Utc::now();
    let clock = Arc::new(ManualClock::new(now));
    let source = Arc::new(MemorySource::new(now, 24 * 30, 7 * 24).with_delay(Duration::from_secs(2)));
    let scheduler = build_scheduler(Arc::clone(&source), Arc::clone(&clock));

    scheduler.ensure_fresh(Region::DE).await.unwrap();
    clock.advance(ChronoDuration::hours(9));

    let started = Instant::now();
    let mut set = JoinSet::new();
    for _ in 0..1_000 {
        let scheduler = Arc::clone(&scheduler);
        set.spawn(async move {
            let t = Instant::now();
            let state = scheduler.ensure_fresh(Region::DE).await.unwrap();
            (state.cycle(), t.elapsed())
        });
    }

    let mut worst = Duration::ZERO;
    while let Some(result) = set.join_next().await {
        let (cycle, latency) = result.unwrap();
        assert_eq!(cycle, 1);
        worst = worst.max(latency);
    }
    println!("1000 warm queries in {:?}, worst latency {:?}", started.elapsed(), worst);
    assert!(worst < Duration::from_secs(1));
    assert!(scheduler.is_refreshing(Region::DE));

    if let Some(cycle) = scheduler.trigger(Region::DE).unwrap() {
        cycle.await.unwrap();
    }
    assert_eq!(scheduler.engine(Region::DE).unwrap().training_cycles(), 2);
    assert_eq!(source.calls(), (2, 2, 2));
}

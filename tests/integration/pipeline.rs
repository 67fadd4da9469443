//! End-to-end cycles over fake sources, a fake transport, and a manual clock.

use chrono::{DateTime, Duration, TimeZone, Utc, Weekday};
use rust_decimal_macros::dec;
use std::sync::Arc;

use vigil::clock::ManualClock;
use vigil::data::SourceClient;
use vigil::engine::{
    AcquisitionManager, AcquisitionSettings, AlertDispatcher, CycleOrchestrator,
    DispatchSettings, SignalEngine, SignalSettings,
};
use vigil::notify::Notifier;
use vigil::storage::{DispatchLog, SnapshotCache};
use vigil::types::{AcquisitionError, CycleOutcome, DispatchOutcome};

use crate::fakes::{call_log, CallLog, FakeNotifier, FakeSource, FixedScorer, FlatFeatures};

// Wednesday
fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 1, 12, 0, 0).unwrap()
}

fn signal_settings() -> SignalSettings {
    SignalSettings {
        strike_gap: dec!(1000),
        expiry_weekday: Weekday::Fri,
        min_profit: 0.2,
        min_volatility: 0.001,
        max_snapshot_age: Duration::minutes(30),
    }
}

fn dispatch_settings() -> DispatchSettings {
    DispatchSettings {
        confidence_threshold: 85.0,
        dedup_window: Duration::hours(1),
        destination: "-100123".into(),
        instrument: "BTC-USD".into(),
        instrument_name: "Bitcoin".into(),
    }
}

struct Harness {
    clock: Arc<ManualClock>,
    notifier: Arc<FakeNotifier>,
    orch: CycleOrchestrator,
}

fn harness(
    clock: Arc<ManualClock>,
    sources: Vec<Box<dyn SourceClient>>,
    scorer: FixedScorer,
) -> Harness {
    let notifier = FakeNotifier::new();
    let acquisition = AcquisitionManager::new(
        sources,
        AcquisitionSettings::default(),
        SnapshotCache::new(),
        clock.clone(),
    );
    let engine = SignalEngine::new(signal_settings(), clock.clone());
    let dispatcher = AlertDispatcher::new(
        notifier.clone() as Arc<dyn Notifier>,
        DispatchLog::new(),
        clock.clone(),
        dispatch_settings(),
    );
    let orch = CycleOrchestrator::new(
        "VIGIL-IT",
        "BTC-USD",
        acquisition,
        Box::new(FlatFeatures { volatility: 0.02 }),
        Box::new(scorer),
        engine,
        dispatcher,
        clock.clone(),
    )
    .with_error_alerts(3);

    Harness { clock, notifier, orch }
}

fn calls(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

#[tokio::test]
async fn binance_down_falls_back_to_coinbase() {
    let clock = Arc::new(ManualClock::new(t0()));
    let log = call_log();
    let sources = vec![
        FakeSource::always_down("binance", &log, &clock),
        FakeSource::always_up("coinbase", dec!(61342), &log, &clock),
        FakeSource::always_up("yahoo", dec!(1), &log, &clock),
    ];
    let mut h = harness(clock, sources, FixedScorer::call(0.9));

    let report = h.orch.run_cycle().await;

    assert_eq!(report.source.as_deref(), Some("coinbase"));
    assert_eq!(report.stale, Some(false));
    assert_eq!(calls(&log), vec!["binance", "binance", "binance", "coinbase"]);
    assert_eq!(report.outcome, CycleOutcome::Dispatched(DispatchOutcome::Sent));

    let signal = report.signal.unwrap();
    assert_eq!(signal.strike, dec!(61000));
    assert_eq!(signal.expiry.to_string(), "2026-04-03");
    assert_eq!(h.notifier.count(), 1);
    assert!(h.notifier.messages()[0].contains("(coinbase)"));
}

#[tokio::test]
async fn priority_order_never_skips_a_healthy_leader() {
    let clock = Arc::new(ManualClock::new(t0()));
    let log = call_log();
    let sources = vec![
        FakeSource::new("binance", vec![Some(dec!(61000)), None, Some(dec!(61100))], &log, &clock),
        FakeSource::always_up("coinbase", dec!(61050), &log, &clock),
    ];
    let mut h = harness(clock, sources, FixedScorer::call(0.5));

    for _ in 0..2 {
        h.orch.run_cycle().await;
        h.clock.advance(Duration::minutes(10));
    }
    // Second cycle: binance fails once, then recovers on retry.
    assert_eq!(calls(&log), vec!["binance", "binance", "binance"]);
}

#[tokio::test]
async fn identical_signal_is_deduplicated_until_window_elapses() {
    let clock = Arc::new(ManualClock::new(t0()));
    let log = call_log();
    let sources = vec![FakeSource::always_up("binance", dec!(61342), &log, &clock)];
    let mut h = harness(clock, sources, FixedScorer::call(0.9));

    let first = h.orch.run_cycle().await;
    h.clock.advance(Duration::minutes(10));
    let second = h.orch.run_cycle().await;
    h.clock.advance(Duration::minutes(55));
    let third = h.orch.run_cycle().await;

    assert_eq!(first.outcome, CycleOutcome::Dispatched(DispatchOutcome::Sent));
    assert_eq!(second.outcome, CycleOutcome::Dispatched(DispatchOutcome::Deduplicated));
    assert_eq!(third.outcome, CycleOutcome::Dispatched(DispatchOutcome::Sent));
    assert_eq!(h.notifier.count(), 2);
}

#[tokio::test]
async fn failed_delivery_does_not_block_retry() {
    let clock = Arc::new(ManualClock::new(t0()));
    let log = call_log();
    let sources = vec![FakeSource::always_up("binance", dec!(61342), &log, &clock)];
    let mut h = harness(clock, sources, FixedScorer::call(0.9));

    h.notifier.set_failing(true);
    let first = h.orch.run_cycle().await;
    assert_eq!(first.outcome, CycleOutcome::Dispatched(DispatchOutcome::DeliveryFailed));

    h.notifier.set_failing(false);
    h.clock.advance(Duration::minutes(10));
    let second = h.orch.run_cycle().await;
    assert_eq!(second.outcome, CycleOutcome::Dispatched(DispatchOutcome::Sent));
    assert_eq!(h.notifier.count(), 1);
}

#[tokio::test]
async fn low_confidence_is_suppressed_without_transport_call() {
    let clock = Arc::new(ManualClock::new(t0()));
    let log = call_log();
    let sources = vec![FakeSource::always_up("binance", dec!(61342), &log, &clock)];
    let mut h = harness(clock, sources, FixedScorer::call(0.8));

    let report = h.orch.run_cycle().await;
    assert_eq!(report.outcome, CycleOutcome::Dispatched(DispatchOutcome::Suppressed));
    assert_eq!(h.notifier.count(), 0);
}

#[tokio::test]
async fn outage_serves_cache_then_stops_signalling_past_tolerance() {
    let clock = Arc::new(ManualClock::new(t0()));
    let log = call_log();
    let sources = vec![
        FakeSource::new("binance", vec![Some(dec!(61342)), None], &log, &clock),
        FakeSource::always_down("coinbase", &log, &clock),
    ];
    let mut h = harness(clock, sources, FixedScorer::call(0.9));

    let live = h.orch.run_cycle().await;
    assert_eq!(live.stale, Some(false));

    // Within tolerance: scored from cache, flagged, and a fresh key would
    // still go out. Same key here, so it is deduplicated.
    h.clock.advance(Duration::minutes(5));
    let degraded = h.orch.run_cycle().await;
    assert_eq!(degraded.stale, Some(true));
    assert_eq!(degraded.source.as_deref(), Some("binance"));
    assert!(degraded.signal.as_ref().unwrap().degraded);
    assert_eq!(degraded.outcome, CycleOutcome::Dispatched(DispatchOutcome::Deduplicated));

    h.clock.advance(Duration::hours(2));
    let expired = h.orch.run_cycle().await;
    assert_eq!(expired.stale, Some(true));
    assert_eq!(expired.outcome, CycleOutcome::NoSignal);
    assert_eq!(h.notifier.count(), 1);
}

#[tokio::test]
async fn total_outage_with_empty_cache_reports_no_data_and_alerts_once() {
    let clock = Arc::new(ManualClock::new(t0()));
    let log = call_log();
    let sources = vec![
        FakeSource::always_down("binance", &log, &clock),
        FakeSource::always_down("coinbase", &log, &clock),
    ];
    let mut h = harness(clock, sources, FixedScorer::call(0.9));

    for _ in 0..4 {
        let report = h.orch.run_cycle().await;
        assert_eq!(report.outcome, CycleOutcome::NoData);
        assert!(report.source.is_none());
    }

    let messages = h.notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("3 consecutive cycles failed"));
    assert!(messages[0].contains("No data available for BTC-USD"));
}

#[tokio::test]
async fn acquisition_timing_follows_retry_and_rate_limit_delays() {
    let clock = Arc::new(ManualClock::new(t0()));
    let log = call_log();
    let mut manager = AcquisitionManager::new(
        vec![
            FakeSource::always_down("binance", &log, &clock),
            FakeSource::always_down("coinbase", &log, &clock),
        ],
        AcquisitionSettings::default(),
        SnapshotCache::new(),
        clock.clone(),
    );

    let result = manager.acquire("BTC-USD").await;
    let err = tokio_test::assert_err!(result);
    assert_eq!(
        err,
        AcquisitionError::NoDataAvailable {
            instrument: "BTC-USD".into(),
            attempts: 6,
        }
    );
    // 2 retry gaps per source plus one rate-limit floor at the hand-over.
    assert_eq!(clock.total_slept(), std::time::Duration::from_secs(45));
    assert_eq!(calls(&log).len(), 6);
}

#[tokio::test]
async fn cached_snapshot_survives_into_next_cycle() {
    let clock = Arc::new(ManualClock::new(t0()));
    let log = call_log();
    let mut manager = AcquisitionManager::new(
        vec![FakeSource::new("yahoo", vec![Some(dec!(3012.5)), None], &log, &clock)],
        AcquisitionSettings::default(),
        SnapshotCache::new(),
        clock.clone(),
    );

    let live = tokio_test::assert_ok!(manager.acquire("ETH-USD").await);
    clock.advance(Duration::minutes(10));
    let stale = tokio_test::assert_ok!(manager.acquire("ETH-USD").await);

    assert!(!live.is_stale);
    assert!(stale.is_stale);
    assert_eq!(stale.timestamp, live.timestamp);
    assert_eq!(stale.price, dec!(3012.5));
}

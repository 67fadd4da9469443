//! Cycles wired the way `main` wires them: shipped `config.toml`, the
//! shipped model artifact and the rolling feature window, over fake
//! sources and a fake transport.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

use vigil::clock::ManualClock;
use vigil::config::AppConfig;
use vigil::data::SourceClient;
use vigil::engine::{
    AcquisitionManager, AcquisitionSettings, AlertDispatcher, CycleOrchestrator,
    DispatchSettings, SignalEngine, SignalSettings,
};
use vigil::model::features::RollingFeatures;
use vigil::model::logistic::LogisticModel;
use vigil::model::FeatureSource;
use vigil::notify::Notifier;
use vigil::storage::{DispatchLog, SnapshotCache};
use vigil::types::{CycleOutcome, DispatchOutcome};

use crate::fakes::{call_log, CallLog, FakeNotifier, FakeSource};

// Wednesday
fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 1, 12, 0, 0).unwrap()
}

/// Choppy uptrend: +1.2% then -0.2%, alternating, rounded to cents.
fn choppy_uptrend(n: usize) -> Vec<Decimal> {
    let mut prices = vec![dec!(60000)];
    for i in 1..n {
        let step = if i % 2 == 1 { dec!(1.012) } else { dec!(0.998) };
        let next = (prices[i - 1] * step).round_dp(2);
        prices.push(next);
    }
    prices
}

fn shipped(
    clock: &Arc<ManualClock>,
    sources: Vec<Box<dyn SourceClient>>,
) -> (CycleOrchestrator, Arc<FakeNotifier>) {
    let cfg = AppConfig::load("config.toml").unwrap();
    let notifier = FakeNotifier::new();

    let features = RollingFeatures::new(cfg.signal.feature_window);
    let model = LogisticModel::load(&cfg.signal.model_path).unwrap();
    model.ensure_features(features.feature_names()).unwrap();

    let acquisition = AcquisitionManager::new(
        sources,
        AcquisitionSettings::from(&cfg.acquisition),
        SnapshotCache::new(),
        clock.clone(),
    );
    let engine = SignalEngine::new(SignalSettings::from(&cfg.signal), clock.clone());
    let dispatcher = AlertDispatcher::new(
        notifier.clone() as Arc<dyn Notifier>,
        DispatchLog::new(),
        clock.clone(),
        DispatchSettings::from_config(
            &cfg.alerts,
            "-100123".to_string(),
            &cfg.agent.instrument,
            &cfg.agent.instrument_name,
        ),
    );
    let orch = CycleOrchestrator::new(
        &cfg.agent.name,
        &cfg.agent.instrument,
        acquisition,
        Box::new(features),
        Box::new(model),
        engine,
        dispatcher,
        clock.clone(),
    )
    .with_history_interval(cfg.signal.history_interval)
    .with_error_alerts(cfg.alerts.error_alert_threshold);

    (orch, notifier)
}

fn history_calls(log: &CallLog) -> usize {
    log.lock().unwrap().iter().filter(|c| c.ends_with(":history")).count()
}

#[tokio::test]
async fn fresh_agent_scores_its_first_cycle_from_seeded_history() {
    let clock = Arc::new(ManualClock::new(t0()));
    let log = call_log();
    let prices = choppy_uptrend(49);
    let live = prices[48];
    let sources = vec![
        // Live feed is healthy but has no candle endpoint.
        FakeSource::always_up("binance", live, &log, &clock),
        FakeSource::with_history("coinbase", dec!(1), prices[..48].to_vec(), &log, &clock),
    ];
    let (mut orch, notifier) = shipped(&clock, sources);

    let report = orch.run_cycle().await;

    assert!(!report.outcome.is_failure(), "first cycle outcome: {}", report.outcome);
    assert_eq!(report.outcome, CycleOutcome::Dispatched(DispatchOutcome::Sent));
    assert_eq!(report.source.as_deref(), Some("binance"));
    assert_eq!(
        *log.lock().unwrap(),
        vec!["binance", "binance:history", "coinbase:history"]
    );

    let signal = report.signal.unwrap();
    assert_eq!(signal.strike, dec!(76000));
    assert_eq!(signal.expiry.to_string(), "2026-04-03");
    assert!(signal.confidence >= 85.0);
    assert!(!signal.degraded);

    assert_eq!(notifier.count(), 1);
    assert_eq!(orch.failure_streak(), 0);
}

#[tokio::test]
async fn without_history_the_window_warms_up_without_failing() {
    let clock = Arc::new(ManualClock::new(t0()));
    let log = call_log();
    let prices = choppy_uptrend(4);
    let script = prices.iter().copied().map(Some).collect();
    let sources = vec![FakeSource::new("binance", script, &log, &clock)];
    let (mut orch, notifier) = shipped(&clock, sources);

    // Two observations are not enough for a return series.
    for _ in 0..2 {
        let report = orch.run_cycle().await;
        assert_eq!(report.outcome, CycleOutcome::NoSignal);
        assert_eq!(report.source.as_deref(), Some("binance"));
        clock.advance(Duration::minutes(10));
    }
    assert_eq!(orch.failure_streak(), 0);
    assert_eq!(history_calls(&log), 2);

    // Third observation fills the minimum window; the model sees no edge.
    let third = orch.run_cycle().await;
    assert_eq!(third.outcome, CycleOutcome::NoSignal);
    assert_eq!(history_calls(&log), 3);

    // Once warm, history is no longer requested. The call is scored but
    // stays under the confidence threshold.
    clock.advance(Duration::minutes(10));
    let fourth = orch.run_cycle().await;
    assert_eq!(fourth.outcome, CycleOutcome::Dispatched(DispatchOutcome::Suppressed));
    assert_eq!(history_calls(&log), 3);

    assert_eq!(orch.failure_streak(), 0);
    // No operator streak alert and no signal.
    assert_eq!(notifier.count(), 0);
    assert_eq!(orch.cycle_count(), 4);
}

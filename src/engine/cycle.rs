//! Cycle orchestrator — one acquire → features → score → dispatch pass.
//!
//! `run_cycle` never fails: every collaborator error is caught, logged, and
//! folded into the returned [`CycleReport`]. The only fatal faults are
//! startup faults, which happen before an orchestrator exists.
//!
//! A cold feature window is seeded from upstream price history before the
//! live snapshot is observed. While it is still short of observations the
//! cycle ends `NoSignal` and does not count toward the error streak.

use chrono::{DateTime, Timelike, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::ScheduleConfig;
use crate::data::BarInterval;
use crate::model::{FeatureSource, Scorer};
use crate::notify::format;
use crate::types::{CycleOutcome, CycleReport, DispatchOutcome, FeatureError};

use super::acquisition::AcquisitionManager;
use super::dispatcher::AlertDispatcher;
use super::signal::SignalEngine;

/// UTC hour window `[start, end)` in which cycles are allowed to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradingHours {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl TradingHours {
    /// `None` when the schedule does not restrict hours.
    pub fn from_config(cfg: &ScheduleConfig) -> Option<Self> {
        cfg.limit_trading_hours.then_some(Self {
            start_hour: cfg.start_hour_utc,
            end_hour: cfg.end_hour_utc,
        })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let hour = at.hour();
        hour >= self.start_hour && hour < self.end_hour
    }
}

pub struct CycleOrchestrator {
    agent_name: String,
    instrument: String,
    acquisition: AcquisitionManager,
    features: Box<dyn FeatureSource>,
    scorer: Box<dyn Scorer>,
    engine: SignalEngine,
    dispatcher: AlertDispatcher,
    clock: Arc<dyn Clock>,
    trading_hours: Option<TradingHours>,
    history_interval: BarInterval,
    /// Consecutive failures before the operator is alerted; 0 disables.
    error_alert_threshold: u32,
    failure_streak: u32,
    streak_alerted: bool,
    last_failure: Option<String>,
    cycle_count: u64,
}

impl CycleOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agent_name: &str,
        instrument: &str,
        acquisition: AcquisitionManager,
        features: Box<dyn FeatureSource>,
        scorer: Box<dyn Scorer>,
        engine: SignalEngine,
        dispatcher: AlertDispatcher,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            agent_name: agent_name.to_string(),
            instrument: instrument.to_string(),
            acquisition,
            features,
            scorer,
            engine,
            dispatcher,
            clock,
            trading_hours: None,
            history_interval: BarInterval::FiveMinutes,
            error_alert_threshold: 0,
            failure_streak: 0,
            streak_alerted: false,
            last_failure: None,
            cycle_count: 0,
        }
    }

    pub fn with_trading_hours(mut self, hours: Option<TradingHours>) -> Self {
        self.trading_hours = hours;
        self
    }

    pub fn with_error_alerts(mut self, threshold: u32) -> Self {
        self.error_alert_threshold = threshold;
        self
    }

    /// Bar width requested when seeding the feature window.
    pub fn with_history_interval(mut self, interval: BarInterval) -> Self {
        self.history_interval = interval;
        self
    }

    /// Run one full cycle.
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.cycle_count += 1;
        let cycle_id = Uuid::new_v4();
        let started_at = self.clock.now();
        let mut report = CycleReport {
            cycle_id,
            cycle_number: self.cycle_count,
            started_at,
            finished_at: started_at,
            source: None,
            stale: None,
            signal: None,
            outcome: CycleOutcome::NoSignal,
        };

        report.outcome = self.execute(&mut report).await;
        report.finished_at = self.clock.now();

        self.track_failures(&report.outcome).await;

        info!(
            cycle = report.cycle_number,
            source = report.source.as_deref().unwrap_or("-"),
            stale = ?report.stale,
            outcome = %report.outcome,
            "Cycle complete"
        );
        report
    }

    async fn execute(&mut self, report: &mut CycleReport) -> CycleOutcome {
        if let Some(hours) = self.trading_hours {
            if !hours.contains(report.started_at) {
                info!(
                    start = hours.start_hour,
                    end = hours.end_hour,
                    "Outside trading hours, skipping"
                );
                return CycleOutcome::OutsideTradingHours;
            }
        }

        let snapshot = match self.acquisition.acquire(&self.instrument).await {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "Acquisition failed");
                self.last_failure = Some(e.to_string());
                return CycleOutcome::NoData;
            }
        };
        report.source = Some(snapshot.source.clone());
        report.stale = Some(snapshot.is_stale);

        self.warm_up().await;

        let features = match self.features.observe(&snapshot) {
            Ok(f) => f,
            Err(FeatureError::InsufficientHistory { have, need }) => {
                info!(have, need, "Feature window warming up");
                return CycleOutcome::NoSignal;
            }
            Err(e) => {
                warn!(error = %e, "Feature extraction failed");
                self.last_failure = Some(e.to_string());
                return CycleOutcome::Failed(e.to_string());
            }
        };

        let signal = match self.engine.score(&snapshot, &features, self.scorer.as_ref()) {
            Ok(Some(s)) => s,
            Ok(None) => return CycleOutcome::NoSignal,
            Err(e) => {
                error!(model = self.scorer.name(), error = %e, "Scoring failed");
                self.last_failure = Some(e.to_string());
                return CycleOutcome::Failed(e.to_string());
            }
        };

        let outcome = self.dispatcher.dispatch(&signal).await;
        report.signal = Some(signal);
        CycleOutcome::Dispatched(outcome)
    }

    /// Seed the feature window from upstream bars when it asks for them.
    async fn warm_up(&mut self) {
        let wanted = self.features.history_wanted();
        if wanted == 0 {
            return;
        }
        match self
            .acquisition
            .history(&self.instrument, self.history_interval, wanted)
            .await
        {
            Some(bars) => {
                self.features.seed(&bars);
                info!(
                    bars = bars.len(),
                    interval = %self.history_interval,
                    "Feature window seeded from price history"
                );
            }
            None => warn!("Feature window stays cold until enough live snapshots arrive"),
        }
    }

    async fn track_failures(&mut self, outcome: &CycleOutcome) {
        if !outcome.is_failure() {
            self.failure_streak = 0;
            self.streak_alerted = false;
            return;
        }

        self.failure_streak += 1;
        if self.error_alert_threshold == 0
            || self.streak_alerted
            || self.failure_streak < self.error_alert_threshold
        {
            return;
        }

        let last = self.last_failure.as_deref().unwrap_or("unknown");
        let text = format::error_streak_message(&self.agent_name, self.failure_streak, last);
        warn!(streak = self.failure_streak, "Failure streak reached, alerting operator");
        // One alert per streak even if the notice itself fails.
        self.streak_alerted = true;
        self.dispatcher.notify_operator(&text).await;
    }

    /// Plain notice through the alert transport.
    pub async fn notify_operator(&self, text: &str) -> bool {
        self.dispatcher.notify_operator(text).await
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    pub fn signals_sent(&self) -> u64 {
        self.dispatcher.sent_count()
    }

    pub fn failure_streak(&self) -> u32 {
        self.failure_streak
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn acquisition(&self) -> &AcquisitionManager {
        &self.acquisition
    }
}

/// Whether a report represents a delivered alert.
pub fn was_sent(report: &CycleReport) -> bool {
    report.outcome == CycleOutcome::Dispatched(DispatchOutcome::Sent)
}

//! Hand-written fakes for end-to-end pipeline tests.
//!
//! `FakeSource` replays a per-call script and records every call into a
//! shared log, so tests can assert the exact order sources were tried.
//! History calls are logged as `<name>:history`.
//! `FakeNotifier` records delivered messages and can be switched into a
//! failing mode.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use vigil::clock::{Clock, ManualClock};
use vigil::data::{BarInterval, SourceClient};
use vigil::model::{FeatureSource, FeatureVector, Scorer, ScorerOutput};
use vigil::notify::Notifier;
use vigil::types::{
    Direction, FeatureError, NotifyError, ScoringError, Snapshot, SourceError,
};

pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub struct FakeSource {
    name: String,
    script: Mutex<VecDeque<Option<Decimal>>>,
    /// Closing prices served by `history`, oldest first. Empty means the
    /// source has no history endpoint.
    closes: Vec<Decimal>,
    log: CallLog,
    clock: Arc<ManualClock>,
}

impl FakeSource {
    /// `None` entries fail; the last entry repeats once the script is spent.
    pub fn new(
        name: &str,
        script: Vec<Option<Decimal>>,
        log: &CallLog,
        clock: &Arc<ManualClock>,
    ) -> Box<dyn SourceClient> {
        Box::new(Self {
            name: name.to_string(),
            script: Mutex::new(script.into()),
            closes: Vec::new(),
            log: log.clone(),
            clock: clock.clone(),
        })
    }

    /// Always-up source that also serves `closes` as bar history.
    pub fn with_history(
        name: &str,
        price: Decimal,
        closes: Vec<Decimal>,
        log: &CallLog,
        clock: &Arc<ManualClock>,
    ) -> Box<dyn SourceClient> {
        Box::new(Self {
            name: name.to_string(),
            script: Mutex::new(vec![Some(price)].into()),
            closes,
            log: log.clone(),
            clock: clock.clone(),
        })
    }

    pub fn always_down(name: &str, log: &CallLog, clock: &Arc<ManualClock>) -> Box<dyn SourceClient> {
        Self::new(name, vec![None], log, clock)
    }

    pub fn always_up(
        name: &str,
        price: Decimal,
        log: &CallLog,
        clock: &Arc<ManualClock>,
    ) -> Box<dyn SourceClient> {
        Self::new(name, vec![Some(price)], log, clock)
    }
}

#[async_trait]
impl SourceClient for FakeSource {
    async fn fetch(&self, _instrument: &str) -> Result<Snapshot, SourceError> {
        self.log.lock().unwrap().push(self.name.clone());
        let next = {
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front().flatten()
            } else {
                script.front().copied().flatten()
            }
        };
        match next {
            Some(price) => Snapshot::live(&self.name, price, self.clock.now()),
            None => Err(SourceError::unavailable(&self.name, "HTTP 503")),
        }
    }

    /// The most recent `bars` closes, the last one closing just before now.
    async fn history(
        &self,
        _instrument: &str,
        interval: BarInterval,
        bars: usize,
    ) -> Result<Vec<Snapshot>, SourceError> {
        self.log.lock().unwrap().push(format!("{}:history", self.name));
        if self.closes.is_empty() {
            return Err(SourceError::unavailable(&self.name, "HTTP 404"));
        }
        let recent = &self.closes[self.closes.len().saturating_sub(bars)..];
        let now = self.clock.now();
        let n = recent.len() as i32;
        recent
            .iter()
            .zip(0..)
            .map(|(price, i)| {
                Snapshot::live(&self.name, *price, now - interval.duration() * (n - i))
            })
            .collect()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Default)]
pub struct FakeNotifier {
    sent: Mutex<Vec<(String, String)>>,
    failing: AtomicBool,
}

impl FakeNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn send(&self, destination: &str, text: &str) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Transport {
                transport: "fake".into(),
                message: "connection reset".into(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((destination.to_string(), text.to_string()));
        Ok(())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Feature source with a fixed volatility and no warm-up.
pub struct FlatFeatures {
    pub volatility: f64,
}

impl FeatureSource for FlatFeatures {
    fn observe(&mut self, _snapshot: &Snapshot) -> Result<FeatureVector, FeatureError> {
        Ok(FeatureVector {
            values: vec![0.0],
            volatility: self.volatility,
        })
    }

    fn feature_names(&self) -> &[&'static str] {
        &["flat"]
    }
}

/// Scorer that always predicts `direction` with `probability`.
pub struct FixedScorer {
    pub direction: Option<Direction>,
    pub probability: f64,
    pub expected_profit: f64,
}

impl FixedScorer {
    pub fn call(probability: f64) -> Self {
        Self {
            direction: Some(Direction::Call),
            probability,
            expected_profit: 0.4,
        }
    }
}

impl Scorer for FixedScorer {
    fn score(&self, _features: &FeatureVector) -> Result<ScorerOutput, ScoringError> {
        Ok(ScorerOutput {
            direction: self.direction,
            probability: self.probability,
            expected_profit: self.expected_profit,
        })
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

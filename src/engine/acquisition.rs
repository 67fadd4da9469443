//! Multi-source data acquisition.
//!
//! Walks the configured sources in strict priority order, retrying each
//! a bounded number of times, and returns the first live snapshot. Every
//! upstream call is preceded by a global rate-limit floor. When every
//! source is exhausted the last-known-good snapshot is served stale, and
//! only an empty cache surfaces `NoDataAvailable`.
//!
//! Price history for warming the feature window goes through the same
//! priority list and rate-limit floor, one attempt per source.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::AcquisitionConfig;
use crate::data::{BarInterval, SourceClient};
use crate::storage::SnapshotCache;
use crate::types::{AcquisitionError, Snapshot, SourceError};

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AcquisitionSettings {
    /// Attempts per source, including the first.
    pub max_retries: u32,
    /// Wait between attempts on the same source.
    pub retry_delay: Duration,
    /// Minimum gap between any two upstream calls.
    pub rate_limit_delay: Duration,
    /// Upper bound on a single fetch.
    pub request_timeout: Duration,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self::from(&AcquisitionConfig::default())
    }
}

impl From<&AcquisitionConfig> for AcquisitionSettings {
    fn from(cfg: &AcquisitionConfig) -> Self {
        Self {
            max_retries: cfg.max_retries.max(1),
            retry_delay: cfg.retry_delay(),
            rate_limit_delay: cfg.rate_limit_delay(),
            request_timeout: cfg.request_timeout(),
        }
    }
}

// ---------------------------------------------------------------------------
// Retry state machine
// ---------------------------------------------------------------------------

/// Per-source retry progress: `Attempting(n) → Success | Attempting(n+1) | Exhausted`.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryState {
    /// About to make attempt `n` (1-based).
    Attempting(u32),
    Success(Snapshot),
    /// Gave up; carries the last error.
    Exhausted(SourceError),
}

impl RetryState {
    pub fn start() -> Self {
        RetryState::Attempting(1)
    }

    /// Fold the result of the current attempt into the next state.
    /// Terminal states are absorbing.
    pub fn advance(self, result: Result<Snapshot, SourceError>, max_attempts: u32) -> Self {
        match (self, result) {
            (RetryState::Attempting(_), Ok(snapshot)) => RetryState::Success(snapshot),
            (RetryState::Attempting(n), Err(e)) if n >= max_attempts => RetryState::Exhausted(e),
            (RetryState::Attempting(n), Err(_)) => RetryState::Attempting(n + 1),
            (terminal, _) => terminal,
        }
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

pub struct AcquisitionManager {
    sources: Vec<Box<dyn SourceClient>>,
    settings: AcquisitionSettings,
    cache: SnapshotCache,
    clock: Arc<dyn Clock>,
    /// Start of the most recent upstream call, across cycles.
    last_call: Option<DateTime<Utc>>,
}

impl AcquisitionManager {
    /// Sources must already be in priority order.
    pub fn new(
        sources: Vec<Box<dyn SourceClient>>,
        settings: AcquisitionSettings,
        cache: SnapshotCache,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sources,
            settings,
            cache,
            clock,
            last_call: None,
        }
    }

    /// Produce the best available snapshot for `instrument`.
    pub async fn acquire(&mut self, instrument: &str) -> Result<Snapshot, AcquisitionError> {
        let mut total_attempts = 0u32;

        for source in &self.sources {
            let mut state = RetryState::start();

            loop {
                state = match state {
                    RetryState::Attempting(n) => {
                        if n > 1 {
                            self.clock.sleep(self.settings.retry_delay).await;
                        }
                        throttle(&*self.clock, &mut self.last_call, self.settings.rate_limit_delay)
                            .await;

                        total_attempts += 1;
                        let result =
                            fetch_bounded(source.as_ref(), instrument, self.settings.request_timeout)
                                .await;
                        if let Err(e) = &result {
                            warn!(
                                source = source.name(),
                                attempt = n,
                                max = self.settings.max_retries,
                                error = %e,
                                "Fetch attempt failed"
                            );
                        }
                        RetryState::Attempting(n).advance(result, self.settings.max_retries)
                    }
                    RetryState::Success(snapshot) => {
                        self.cache.store(instrument, snapshot.clone(), self.clock.now());
                        info!(
                            source = %snapshot.source,
                            price = %snapshot.price,
                            attempts = total_attempts,
                            "Live snapshot acquired"
                        );
                        return Ok(snapshot);
                    }
                    RetryState::Exhausted(e) => {
                        warn!(source = source.name(), error = %e, "Source exhausted, falling back");
                        break;
                    }
                };
            }
        }

        match self.cache.stale_copy(instrument) {
            Some(snapshot) => {
                warn!(
                    instrument,
                    source = %snapshot.source,
                    observed_at = %snapshot.timestamp,
                    "All sources failed, serving cached snapshot"
                );
                Ok(snapshot)
            }
            None => Err(AcquisitionError::NoDataAvailable {
                instrument: instrument.to_string(),
                attempts: total_attempts,
            }),
        }
    }

    /// Fetch up to `bars` recent closed bars from the first source that
    /// has any. History is best effort: `None` when no source can supply it.
    pub async fn history(
        &mut self,
        instrument: &str,
        interval: BarInterval,
        bars: usize,
    ) -> Option<Vec<Snapshot>> {
        for source in &self.sources {
            throttle(&*self.clock, &mut self.last_call, self.settings.rate_limit_delay).await;

            let call = source.history(instrument, interval, bars);
            let result = match tokio::time::timeout(self.settings.request_timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(SourceError::unavailable(
                    source.name(),
                    format!("timed out after {}ms", self.settings.request_timeout.as_millis()),
                )),
            };
            match result {
                Ok(history) if !history.is_empty() => {
                    info!(
                        source = source.name(),
                        %interval,
                        bars = history.len(),
                        "Price history acquired"
                    );
                    return Some(history);
                }
                Ok(_) => debug!(source = source.name(), "Empty price history"),
                Err(e) => debug!(source = source.name(), error = %e, "Price history unavailable"),
            }
        }
        warn!(instrument, "No source could supply price history");
        None
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    pub fn settings(&self) -> &AcquisitionSettings {
        &self.settings
    }

    /// Source names in priority order.
    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }
}

/// Wait until at least `floor` has passed since the previous call, then
/// stamp the new call.
async fn throttle(clock: &dyn Clock, last_call: &mut Option<DateTime<Utc>>, floor: Duration) {
    if let Some(prev) = *last_call {
        let elapsed = (clock.now() - prev).to_std().unwrap_or(Duration::ZERO);
        if elapsed < floor {
            let wait = floor - elapsed;
            debug!(wait_ms = wait.as_millis() as u64, "Rate-limit floor");
            clock.sleep(wait).await;
        }
    }
    *last_call = Some(clock.now());
}

/// One fetch, converted to `SourceUnavailable` if it outlives `timeout`.
async fn fetch_bounded(
    source: &dyn SourceClient,
    instrument: &str,
    timeout: Duration,
) -> Result<Snapshot, SourceError> {
    match tokio::time::timeout(timeout, source.fetch(instrument)).await {
        Ok(result) => result,
        Err(_) => Err(SourceError::unavailable(
            source.name(),
            format!("timed out after {}ms", timeout.as_millis()),
        )),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

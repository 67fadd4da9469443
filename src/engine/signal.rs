//! Signal engine — turns a snapshot and a scorer output into a typed signal.
//!
//! Filters, in order: staleness tolerance, scorer, minimum expected profit,
//! minimum volatility, no-trade class. Anything that survives becomes a
//! `Signal` with its strike snapped to the configured gap and its expiry on
//! the next configured weekday.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::{SignalConfig, MAX_WINDOW_SECS};
use crate::model::{FeatureVector, Scorer};
use crate::types::{ScoringError, Signal, Snapshot};

#[derive(Debug, Clone)]
pub struct SignalSettings {
    pub strike_gap: Decimal,
    pub expiry_weekday: Weekday,
    pub min_profit: f64,
    pub min_volatility: f64,
    /// Oldest cached snapshot that may still be acted on.
    pub max_snapshot_age: Duration,
}

impl From<&SignalConfig> for SignalSettings {
    fn from(cfg: &SignalConfig) -> Self {
        Self {
            strike_gap: cfg.strike_gap,
            expiry_weekday: cfg.weekly_expiry_weekday,
            min_profit: cfg.min_profit_threshold,
            min_volatility: cfg.min_volatility_threshold,
            max_snapshot_age: Duration::seconds(cfg.max_snapshot_age_secs.min(MAX_WINDOW_SECS) as i64),
        }
    }
}

pub struct SignalEngine {
    settings: SignalSettings,
    clock: Arc<dyn Clock>,
}

impl SignalEngine {
    pub fn new(settings: SignalSettings, clock: Arc<dyn Clock>) -> Self {
        Self { settings, clock }
    }

    pub fn settings(&self) -> &SignalSettings {
        &self.settings
    }

    /// Score one snapshot. `Ok(None)` means "no signal"; only scorer faults
    /// are errors.
    pub fn score(
        &self,
        snapshot: &Snapshot,
        features: &FeatureVector,
        scorer: &dyn Scorer,
    ) -> Result<Option<Signal>, ScoringError> {
        if snapshot.is_stale {
            let age = snapshot.age(self.clock.now());
            if age > self.settings.max_snapshot_age {
                info!(
                    source = %snapshot.source,
                    age_secs = age.num_seconds(),
                    max_secs = self.settings.max_snapshot_age.num_seconds(),
                    "Cached snapshot beyond tolerance, not scoring"
                );
                return Ok(None);
            }
        }

        let out = scorer.score(features)?;
        debug!(
            model = scorer.name(),
            direction = ?out.direction,
            probability = out.probability,
            expected_profit = out.expected_profit,
            volatility = features.volatility,
            "Scorer output"
        );

        if out.expected_profit < self.settings.min_profit {
            debug!(
                expected_profit = out.expected_profit,
                min = self.settings.min_profit,
                "Below profit threshold"
            );
            return Ok(None);
        }
        if features.volatility < self.settings.min_volatility {
            debug!(
                volatility = features.volatility,
                min = self.settings.min_volatility,
                "Below volatility threshold"
            );
            return Ok(None);
        }
        let Some(direction) = out.direction else {
            debug!("No-trade class predicted");
            return Ok(None);
        };

        let generated_at = snapshot.timestamp;
        Ok(Some(Signal {
            direction,
            confidence: confidence_from(out.probability),
            strike: strike_for(snapshot.price, self.settings.strike_gap),
            expiry: next_expiry(generated_at.date_naive(), self.settings.expiry_weekday),
            generated_at,
            price: snapshot.price,
            source: snapshot.source.clone(),
            degraded: snapshot.is_stale,
            expected_profit: out.expected_profit,
            volatility: features.volatility,
        }))
    }
}

/// Raw probability → percentage in [0, 100].
pub fn confidence_from(probability: f64) -> f64 {
    (probability * 100.0).clamp(0.0, 100.0)
}

/// Nearest multiple of `gap`; midpoints round away from zero.
pub fn strike_for(price: Decimal, gap: Decimal) -> Decimal {
    if gap <= Decimal::ZERO {
        return price;
    }
    let steps = (price / gap).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    (steps * gap).normalize()
}

/// First `weekday` on or after `from`.
pub fn next_expiry(from: NaiveDate, weekday: Weekday) -> NaiveDate {
    let current = from.weekday().num_days_from_monday() as i64;
    let target = weekday.num_days_from_monday() as i64;
    let days_ahead = (target - current).rem_euclid(7);
    from + Duration::days(days_ahead)
}

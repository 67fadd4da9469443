//! Shared types for the VIGIL agent.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that data, model, notify,
//! and engine modules can depend on them without circular references.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// A point-in-time market read for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// When the upstream observed the price. Stale copies keep the
    /// original live-fetch timestamp.
    pub timestamp: DateTime<Utc>,
    /// Always strictly positive.
    pub price: Decimal,
    /// Identifier of the source client that produced the reading.
    pub source: String,
    /// True when served from the last-known-good cache.
    pub is_stale: bool,
}

impl Snapshot {
    /// Build a live snapshot, rejecting non-positive prices.
    pub fn live(
        source: &str,
        price: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, SourceError> {
        if price <= Decimal::ZERO {
            return Err(SourceError::unavailable(
                source,
                format!("non-positive price {price}"),
            ));
        }
        Ok(Self {
            timestamp,
            price,
            source: source.to_string(),
            is_stale: false,
        })
    }

    /// A copy flagged as served from cache. The timestamp is untouched.
    pub fn to_stale(&self) -> Self {
        Self {
            is_stale: true,
            ..self.clone()
        }
    }

    /// Age of the reading relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.timestamp
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} @ {}{}",
            self.source,
            self.price,
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            if self.is_stale { " (stale)" } else { "" },
        )
    }
}

// ---------------------------------------------------------------------------
// Signal
// ---------------------------------------------------------------------------

/// Option direction recommended by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Call,
    Put,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Call => write!(f, "CALL"),
            Direction::Put => write!(f, "PUT"),
        }
    }
}

/// Case-insensitive parse, used for model class labels.
impl std::str::FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "call" | "buy_call" => Ok(Direction::Call),
            "put" | "buy_put" => Ok(Direction::Put),
            other => Err(anyhow::anyhow!("Unknown direction: {other}")),
        }
    }
}

/// An actionable recommendation built from one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub direction: Direction,
    /// Percentage in [0, 100], 100 × the scorer's raw probability.
    pub confidence: f64,
    /// Always an exact multiple of the configured strike gap.
    pub strike: Decimal,
    /// Next weekly expiry on or after `generated_at`.
    pub expiry: NaiveDate,
    /// Timestamp of the snapshot the signal was built from.
    pub generated_at: DateTime<Utc>,
    pub price: Decimal,
    pub source: String,
    /// Built from a cached snapshot that was still within tolerance.
    pub degraded: bool,
    pub expected_profit: f64,
    pub volatility: f64,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} exp {} ({:.1}% conf, spot {} via {})",
            self.direction,
            self.strike,
            self.expiry,
            self.confidence,
            self.price,
            self.source,
        )
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of handing a signal to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchOutcome {
    Sent,
    Deduplicated,
    Suppressed,
    DeliveryFailed,
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchOutcome::Sent => write!(f, "sent"),
            DispatchOutcome::Deduplicated => write!(f, "deduplicated"),
            DispatchOutcome::Suppressed => write!(f, "suppressed"),
            DispatchOutcome::DeliveryFailed => write!(f, "delivery-failed"),
        }
    }
}

/// What a single acquire → score → dispatch pass ended with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum CycleOutcome {
    OutsideTradingHours,
    NoData,
    Failed(String),
    NoSignal,
    Dispatched(DispatchOutcome),
}

impl CycleOutcome {
    /// Cycles that count towards the error streak.
    pub fn is_failure(&self) -> bool {
        matches!(self, CycleOutcome::NoData | CycleOutcome::Failed(_))
    }
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleOutcome::OutsideTradingHours => write!(f, "outside-trading-hours"),
            CycleOutcome::NoData => write!(f, "no-data"),
            CycleOutcome::Failed(reason) => write!(f, "failed: {reason}"),
            CycleOutcome::NoSignal => write!(f, "no-signal"),
            CycleOutcome::Dispatched(outcome) => write!(f, "{outcome}"),
        }
    }
}

/// Summary of a single cycle, logged and exposed on the status API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub cycle_number: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub source: Option<String>,
    pub stale: Option<bool>,
    pub signal: Option<Signal>,
    pub outcome: CycleOutcome,
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cycle #{}: source={} stale={} outcome={}",
            self.cycle_number,
            self.source.as_deref().unwrap_or("-"),
            self.stale.map(|s| s.to_string()).unwrap_or_else(|| "-".into()),
            self.outcome,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// A single upstream could not produce a snapshot.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SourceError {
    #[error("Source unavailable ({data_source}): {reason}")]
    Unavailable { data_source: String, reason: String },
}

impl SourceError {
    pub fn unavailable(data_source: &str, reason: impl Into<String>) -> Self {
        SourceError::Unavailable {
            data_source: data_source.to_string(),
            reason: reason.into(),
        }
    }
}

/// Every source failed and nothing was cached.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AcquisitionError {
    #[error("No data available for {instrument} after {attempts} attempts")]
    NoDataAvailable { instrument: String, attempts: u32 },
}

/// The external feature collaborator could not produce a vector.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FeatureError {
    #[error("Insufficient history: have {have} observations, need {need}")]
    InsufficientHistory { have: usize, need: usize },

    #[error("Invalid feature input: {0}")]
    Invalid(String),
}

/// The pre-trained scorer failed on a feature vector.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoringError {
    #[error("Feature length mismatch: model expects {expected}, got {actual}")]
    FeatureMismatch { expected: usize, actual: usize },

    #[error("Model error ({model}): {message}")]
    Model { model: String, message: String },
}

/// The notification transport rejected or never acknowledged a message.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NotifyError {
    #[error("Transport error ({transport}): {message}")]
    Transport { transport: String, message: String },

    #[error("Rejected by {transport}: {message}")]
    Rejected { transport: String, message: String },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

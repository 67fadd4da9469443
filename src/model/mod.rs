//! Pre-trained scoring collaborators.
//!
//! The signal engine only sees two seams: a [`FeatureSource`] that turns
//! observed snapshots into a feature vector, and a [`Scorer`] that turns
//! a feature vector into a class probability. Training happens offline;
//! the scorer here only evaluates an exported artifact.

pub mod features;
pub mod logistic;

use crate::types::{Direction, FeatureError, ScoringError, Snapshot};

/// Feature vector handed to the scorer.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub values: Vec<f64>,
    /// Realized volatility of the observation window, used by the
    /// minimum-volatility filter.
    pub volatility: f64,
}

/// Raw scorer output for one feature vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ScorerOutput {
    /// `None` when the no-trade class wins.
    pub direction: Option<Direction>,
    /// Probability of the winning class, in [0, 1].
    pub probability: f64,
    /// Expected profit of acting on the prediction, as a fraction.
    pub expected_profit: f64,
}

/// Derives features from the stream of observed snapshots.
pub trait FeatureSource: Send + Sync {
    fn observe(&mut self, snapshot: &Snapshot) -> Result<FeatureVector, FeatureError>;

    /// Ordered feature names this source produces.
    fn feature_names(&self) -> &[&'static str];

    /// How many past bars the source would like before its next `observe`.
    /// Zero once it can produce vectors on its own.
    fn history_wanted(&self) -> usize {
        0
    }

    /// Preload past observations.
    fn seed(&mut self, history: &[Snapshot]) {
        let _ = history;
    }
}

/// Evaluates a pre-trained model.
pub trait Scorer: Send + Sync {
    fn score(&self, features: &FeatureVector) -> Result<ScorerOutput, ScoringError>;

    /// Model identifier for logging.
    fn name(&self) -> &str;
}

//! Multinomial logistic scorer loaded from an exported JSON artifact.
//!
//! Artifact shape:
//!
//! ```json
//! {
//!   "name": "btc-weekly-v3",
//!   "features": ["return_1", "return_mean", "volatility", "momentum", "zscore"],
//!   "classes": ["none", "call", "put"],
//!   "weights": [[...], [...], [...]],
//!   "intercepts": [0.0, -0.4, -0.4],
//!   "expected_returns": [0.0, 0.35, 0.30]
//! }
//! ```
//!
//! The predicted class is the argmax of the softmax; its probability is the
//! raw probability reported to the signal engine. `expected_returns` holds
//! the mean option return per class observed during labelling, so expected
//! profit is `probability × expected_return`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use tracing::info;

use super::{FeatureVector, Scorer, ScorerOutput};
use crate::types::{Direction, ScoringError};

#[derive(Debug, Deserialize)]
struct Artifact {
    name: String,
    features: Vec<String>,
    classes: Vec<String>,
    weights: Vec<Vec<f64>>,
    intercepts: Vec<f64>,
    expected_returns: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct LogisticModel {
    name: String,
    features: Vec<String>,
    classes: Vec<Option<Direction>>,
    weights: Vec<Vec<f64>>,
    intercepts: Vec<f64>,
    expected_returns: Vec<f64>,
}

impl LogisticModel {
    /// Load and validate an artifact from disk.
    pub fn load(path: &str) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read model artifact: {path}"))?;
        let model = Self::from_json(&json)
            .with_context(|| format!("Invalid model artifact: {path}"))?;
        info!(
            path,
            model = %model.name,
            features = model.features.len(),
            classes = model.classes.len(),
            "Model loaded"
        );
        Ok(model)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let a: Artifact = serde_json::from_str(json).context("Failed to parse model JSON")?;

        let n_classes = a.classes.len();
        if n_classes < 2 {
            anyhow::bail!("Model needs at least two classes, got {n_classes}");
        }
        if a.weights.len() != n_classes
            || a.intercepts.len() != n_classes
            || a.expected_returns.len() != n_classes
        {
            anyhow::bail!(
                "Per-class arrays disagree: classes={n_classes} weights={} intercepts={} expected_returns={}",
                a.weights.len(),
                a.intercepts.len(),
                a.expected_returns.len()
            );
        }
        if let Some(row) = a.weights.iter().find(|row| row.len() != a.features.len()) {
            anyhow::bail!(
                "Weight row has {} entries, model declares {} features",
                row.len(),
                a.features.len()
            );
        }

        let classes = a
            .classes
            .iter()
            .map(|label| match label.to_lowercase().as_str() {
                "none" | "hold" | "no_action" => Ok(None),
                other => other.parse::<Direction>().map(Some),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: a.name,
            features: a.features,
            classes,
            weights: a.weights,
            intercepts: a.intercepts,
            expected_returns: a.expected_returns,
        })
    }

    /// Feature names the model was trained on, in order.
    pub fn features(&self) -> &[String] {
        &self.features
    }

    /// Fail unless the model consumes exactly `names`, in order.
    pub fn ensure_features(&self, names: &[&str]) -> Result<()> {
        if self.features.len() != names.len()
            || self.features.iter().zip(names).any(|(a, b)| a != b)
        {
            anyhow::bail!(
                "Model {} expects features {:?}, feature source produces {:?}",
                self.name,
                self.features,
                names
            );
        }
        Ok(())
    }

    fn probabilities(&self, x: &[f64]) -> Vec<f64> {
        let logits: Vec<f64> = self
            .weights
            .iter()
            .zip(&self.intercepts)
            .map(|(row, b)| row.iter().zip(x).map(|(w, v)| w * v).sum::<f64>() + b)
            .collect();
        let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
        let total: f64 = exps.iter().sum();
        exps.into_iter().map(|e| e / total).collect()
    }
}

impl Scorer for LogisticModel {
    fn score(&self, features: &FeatureVector) -> Result<ScorerOutput, ScoringError> {
        if features.values.len() != self.features.len() {
            return Err(ScoringError::FeatureMismatch {
                expected: self.features.len(),
                actual: features.values.len(),
            });
        }
        if features.values.iter().any(|v| !v.is_finite()) {
            return Err(ScoringError::Model {
                model: self.name.clone(),
                message: "non-finite feature value".to_string(),
            });
        }

        let probs = self.probabilities(&features.values);
        let (best, probability) = probs
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |acc, (i, p)| if p > acc.1 { (i, p) } else { acc });

        if !probability.is_finite() {
            return Err(ScoringError::Model {
                model: self.name.clone(),
                message: "non-finite class probability".to_string(),
            });
        }

        Ok(ScorerOutput {
            direction: self.classes[best],
            probability,
            expected_profit: probability * self.expected_returns[best],
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

//! Rolling price-window features.
//!
//! Keeps the last `capacity` distinct observations and derives a small
//! fixed vector from their log returns. Re-reads of the same observation
//! (a cached snapshot served twice) are not appended.
//!
//! A cold window asks for a full window of history; seeding merges it
//! with whatever was already observed, ordered by time.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use std::collections::VecDeque;

use super::{FeatureSource, FeatureVector};
use crate::types::{FeatureError, Snapshot};

pub const FEATURE_NAMES: &[&str] = &["return_1", "return_mean", "volatility", "momentum", "zscore"];

/// Observations needed before a vector can be produced (two returns).
const MIN_OBSERVATIONS: usize = 3;

pub struct RollingFeatures {
    capacity: usize,
    window: VecDeque<(DateTime<Utc>, f64)>,
}

impl RollingFeatures {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(MIN_OBSERVATIONS);
        Self {
            capacity,
            window: VecDeque::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    fn usable(snapshot: &Snapshot) -> Option<f64> {
        snapshot.price.to_f64().filter(|p| p.is_finite() && *p > 0.0)
    }

    fn push(&mut self, at: DateTime<Utc>, price: f64) {
        if let Some((last_at, _)) = self.window.back() {
            if at <= *last_at {
                return;
            }
        }
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back((at, price));
    }

    fn compute(&self) -> FeatureVector {
        let prices: Vec<f64> = self.window.iter().map(|(_, p)| *p).collect();
        let returns: Vec<f64> = prices.windows(2).map(|w| (w[1] / w[0]).ln()).collect();

        let n = returns.len() as f64;
        let return_mean = returns.iter().sum::<f64>() / n;
        let volatility = (returns.iter().map(|r| (r - return_mean).powi(2)).sum::<f64>() / n).sqrt();
        let return_1 = *returns.last().unwrap_or(&0.0);

        let first = prices[0];
        let last = prices[prices.len() - 1];
        let momentum = last / first - 1.0;

        let m = prices.len() as f64;
        let price_mean = prices.iter().sum::<f64>() / m;
        let price_std = (prices.iter().map(|p| (p - price_mean).powi(2)).sum::<f64>() / m).sqrt();
        let zscore = if price_std > 0.0 { (last - price_mean) / price_std } else { 0.0 };

        FeatureVector {
            values: vec![return_1, return_mean, volatility, momentum, zscore],
            volatility,
        }
    }
}

impl FeatureSource for RollingFeatures {
    fn observe(&mut self, snapshot: &Snapshot) -> Result<FeatureVector, FeatureError> {
        let price = Self::usable(snapshot)
            .ok_or_else(|| FeatureError::Invalid(format!("price {} not usable", snapshot.price)))?;

        self.push(snapshot.timestamp, price);

        if self.window.len() < MIN_OBSERVATIONS {
            return Err(FeatureError::InsufficientHistory {
                have: self.window.len(),
                need: MIN_OBSERVATIONS,
            });
        }
        Ok(self.compute())
    }

    fn feature_names(&self) -> &[&'static str] {
        FEATURE_NAMES
    }

    fn history_wanted(&self) -> usize {
        if self.window.len() < MIN_OBSERVATIONS {
            self.capacity
        } else {
            0
        }
    }

    fn seed(&mut self, history: &[Snapshot]) {
        let mut merged: Vec<(DateTime<Utc>, f64)> = self.window.drain(..).collect();
        merged.extend(
            history
                .iter()
                .filter_map(|s| Self::usable(s).map(|p| (s.timestamp, p))),
        );
        merged.sort_by_key(|(at, _)| *at);
        merged.dedup_by_key(|(at, _)| *at);

        let skip = merged.len().saturating_sub(self.capacity);
        self.window.extend(merged.into_iter().skip(skip));
    }
}

//! Record of recently delivered signals, used for deduplication.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::types::{Direction, Signal};

/// Identity of a signal for dedup purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DispatchKey {
    pub direction: Direction,
    pub strike: Decimal,
    pub expiry: NaiveDate,
}

impl From<&Signal> for DispatchKey {
    fn from(signal: &Signal) -> Self {
        Self {
            direction: signal.direction,
            strike: signal.strike.normalize(),
            expiry: signal.expiry,
        }
    }
}

/// Delivered-signal log. Only successful deliveries are recorded.
#[derive(Debug, Default)]
pub struct DispatchLog {
    sent: HashMap<DispatchKey, DateTime<Utc>>,
}

impl DispatchLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, key: DispatchKey, sent_at: DateTime<Utc>) {
        self.sent.insert(key, sent_at);
    }

    /// True if `key` was delivered less than `window` before `now`.
    pub fn is_recent(&self, key: &DispatchKey, now: DateTime<Utc>, window: Duration) -> bool {
        self.sent
            .get(key)
            .map(|sent_at| now - *sent_at < window)
            .unwrap_or(false)
    }

    /// Drop records whose window has elapsed. Returns how many were removed.
    pub fn expire(&mut self, now: DateTime<Utc>, window: Duration) -> usize {
        let before = self.sent.len();
        self.sent.retain(|_, sent_at| now - *sent_at < window);
        before - self.sent.len()
    }

    pub fn len(&self) -> usize {
        self.sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.is_empty()
    }
}

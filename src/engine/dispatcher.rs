//! Alert dispatcher — confidence gate, dedup, delivery.
//!
//! A key `(direction, strike, expiry)` moves `NoRecord → Sent` on a
//! confirmed delivery and back to `NoRecord` once the dedup window has
//! elapsed. A failed delivery leaves no record, so the next cycle can retry.

use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::{AlertsConfig, MAX_WINDOW_SECS};
use crate::notify::{format, Notifier};
use crate::storage::{DispatchKey, DispatchLog};
use crate::types::{DispatchOutcome, Signal};

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Minimum confidence percentage for delivery.
    pub confidence_threshold: f64,
    pub dedup_window: Duration,
    /// Transport-specific destination (Telegram chat id).
    pub destination: String,
    pub instrument: String,
    pub instrument_name: String,
}

impl DispatchSettings {
    pub fn from_config(
        cfg: &AlertsConfig,
        destination: String,
        instrument: &str,
        instrument_name: &str,
    ) -> Self {
        Self {
            confidence_threshold: cfg.confidence_threshold,
            dedup_window: Duration::seconds(cfg.dedup_window_secs.min(MAX_WINDOW_SECS) as i64),
            destination,
            instrument: instrument.to_string(),
            instrument_name: instrument_name.to_string(),
        }
    }
}

pub struct AlertDispatcher {
    notifier: Arc<dyn Notifier>,
    log: DispatchLog,
    clock: Arc<dyn Clock>,
    settings: DispatchSettings,
    sent: u64,
}

impl AlertDispatcher {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        log: DispatchLog,
        clock: Arc<dyn Clock>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            notifier,
            log,
            clock,
            settings,
            sent: 0,
        }
    }

    pub async fn dispatch(&mut self, signal: &Signal) -> DispatchOutcome {
        let now = self.clock.now();
        let expired = self.log.expire(now, self.settings.dedup_window);
        if expired > 0 {
            debug!(expired, "Dispatch records expired");
        }

        if signal.confidence < self.settings.confidence_threshold {
            info!(
                confidence = signal.confidence,
                threshold = self.settings.confidence_threshold,
                "Signal below confidence threshold, suppressed"
            );
            return DispatchOutcome::Suppressed;
        }

        let key = DispatchKey::from(signal);
        if self.log.is_recent(&key, now, self.settings.dedup_window) {
            info!(
                direction = %key.direction,
                strike = %key.strike,
                expiry = %key.expiry,
                "Duplicate signal within dedup window"
            );
            return DispatchOutcome::Deduplicated;
        }

        let text = format::signal_message(
            signal,
            &self.settings.instrument,
            &self.settings.instrument_name,
            now,
        );
        match self.notifier.send(&self.settings.destination, &text).await {
            Ok(()) => {
                self.log.record(key, now);
                self.sent += 1;
                info!(
                    transport = self.notifier.name(),
                    signal = %signal,
                    "Alert sent"
                );
                DispatchOutcome::Sent
            }
            Err(e) => {
                error!(
                    transport = self.notifier.name(),
                    error = %e,
                    "Alert delivery failed"
                );
                DispatchOutcome::DeliveryFailed
            }
        }
    }

    /// Plain operator message; bypasses the threshold and dedup.
    /// Returns whether the transport accepted it.
    pub async fn notify_operator(&self, text: &str) -> bool {
        match self.notifier.send(&self.settings.destination, text).await {
            Ok(()) => true,
            Err(e) => {
                warn!(transport = self.notifier.name(), error = %e, "Operator notice failed");
                false
            }
        }
    }

    /// Signals delivered since startup.
    pub fn sent_count(&self) -> u64 {
        self.sent
    }

    pub fn pending_records(&self) -> usize {
        self.log.len()
    }
}

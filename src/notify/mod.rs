//! Notification transports.
//!
//! Defines the `Notifier` trait and provides implementations for:
//! - Telegram — production delivery via the Bot API
//! - Log — dry-run mode, alerts go to the tracing log only

pub mod format;
pub mod telegram;

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

use crate::types::NotifyError;

/// Abstraction over an outbound messaging API.
///
/// `send` either confirms delivery or returns an error; it never retries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, destination: &str, text: &str) -> Result<(), NotifyError>;

    /// Transport name for logging.
    fn name(&self) -> &str;
}

/// Dry-run transport: every message is logged and counted as delivered.
#[derive(Debug, Default)]
pub struct LogNotifier {
    delivered: AtomicU64,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, destination: &str, text: &str) -> Result<(), NotifyError> {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        info!(destination, "[DRY RUN] Would send alert:\n{text}");
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (Telegram bot token, chat id) are referenced by env-var name in
//! the config and resolved at runtime via `std::env::var`. Those env-var
//! names are never serialized, so the config can be shown over HTTP.

use anyhow::{Context, Result};
use chrono::Weekday;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use crate::data::{BarInterval, SourceKind};

/// Upper bound on configured time windows (30 days).
pub const MAX_WINDOW_SECS: u64 = 30 * 24 * 3600;

/// Upper bound on the feature window, the most bars one history request returns.
pub const MAX_FEATURE_WINDOW: usize = 1000;

/// Top-level application configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    pub signal: SignalConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    /// Instrument in `BASE-QUOTE` form, e.g. `BTC-USD`.
    pub instrument: String,
    /// Human-readable name used in alert text.
    #[serde(default = "default_instrument_name")]
    pub instrument_name: String,
    #[serde(default = "default_fetch_interval_secs")]
    pub fetch_interval_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AcquisitionConfig {
    /// Source priority list, most reliable first.
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceKind>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_rate_limit_delay_secs")]
    pub rate_limit_delay_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SignalConfig {
    /// Path to the exported scorer artifact (JSON).
    pub model_path: String,
    pub strike_gap: Decimal,
    pub weekly_expiry_weekday: Weekday,
    /// Minimum expected profit as a fraction (0.20 = 20%).
    pub min_profit_threshold: f64,
    /// Minimum realized volatility of the feature window.
    pub min_volatility_threshold: f64,
    /// Maximum age of a cached snapshot that may still be acted on.
    pub max_snapshot_age_secs: u64,
    #[serde(default = "default_feature_window")]
    pub feature_window: usize,
    /// Bar width used to seed the feature window from upstream history.
    #[serde(default = "default_history_interval")]
    pub history_interval: BarInterval,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AlertsConfig {
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,
    #[serde(default = "default_token_env", skip_serializing)]
    pub telegram_bot_token_env: String,
    #[serde(default = "default_chat_id_env", skip_serializing)]
    pub telegram_chat_id_env: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Log alerts instead of delivering them.
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub notify_on_startup: bool,
    /// Consecutive failed cycles before the operator is alerted.
    #[serde(default = "default_error_alert_threshold")]
    pub error_alert_threshold: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ScheduleConfig {
    #[serde(default)]
    pub limit_trading_hours: bool,
    #[serde(default)]
    pub start_hour_utc: u32,
    #[serde(default = "default_end_hour")]
    pub end_hour_utc: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DashboardConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_instrument_name() -> String { "Bitcoin".to_string() }
fn default_fetch_interval_secs() -> u64 { 600 }
fn default_sources() -> Vec<SourceKind> {
    vec![SourceKind::Binance, SourceKind::Coinbase, SourceKind::Yahoo]
}
fn default_max_retries() -> u32 { 3 }
fn default_retry_delay_secs() -> u64 { 10 }
fn default_rate_limit_delay_secs() -> u64 { 5 }
fn default_request_timeout_secs() -> u64 { 10 }
fn default_feature_window() -> usize { 48 }
fn default_history_interval() -> BarInterval { BarInterval::FiveMinutes }
fn default_confidence_threshold() -> f64 { 85.0 }
fn default_dedup_window_secs() -> u64 { 3600 }
fn default_token_env() -> String { "TELEGRAM_BOT_TOKEN".to_string() }
fn default_chat_id_env() -> String { "TELEGRAM_CHAT_ID".to_string() }
fn default_error_alert_threshold() -> u32 { 3 }
fn default_end_hour() -> u32 { 24 }
fn default_port() -> u16 { 8080 }

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            rate_limit_delay_secs: default_rate_limit_delay_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            dedup_window_secs: default_dedup_window_secs(),
            telegram_bot_token_env: default_token_env(),
            telegram_chat_id_env: default_chat_id_env(),
            request_timeout_secs: default_request_timeout_secs(),
            dry_run: false,
            notify_on_startup: false,
            error_alert_threshold: default_error_alert_threshold(),
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_port(),
        }
    }
}

impl AcquisitionConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_secs(self.rate_limit_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid config file: {path}"))
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)
            .context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make every cycle meaningless.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.agent.instrument.split('-').count() != 2 {
            problems.push(format!(
                "agent.instrument must be BASE-QUOTE, got {:?}",
                self.agent.instrument
            ));
        }
        if self.agent.fetch_interval_secs == 0 {
            problems.push("agent.fetch_interval_secs must be > 0".to_string());
        }
        if self.acquisition.sources.is_empty() {
            problems.push("acquisition.sources must list at least one source".to_string());
        }
        if self.acquisition.max_retries == 0 {
            problems.push("acquisition.max_retries must be >= 1".to_string());
        }
        if self.acquisition.request_timeout_secs == 0 {
            problems.push("acquisition.request_timeout_secs must be > 0".to_string());
        }
        if self.signal.strike_gap <= Decimal::ZERO {
            problems.push("signal.strike_gap must be positive".to_string());
        }
        if !(3..=MAX_FEATURE_WINDOW).contains(&self.signal.feature_window) {
            problems.push(format!(
                "signal.feature_window must be within 3..={MAX_FEATURE_WINDOW}"
            ));
        }
        if self.signal.max_snapshot_age_secs > MAX_WINDOW_SECS {
            problems.push(format!(
                "signal.max_snapshot_age_secs must be <= {MAX_WINDOW_SECS}"
            ));
        }
        if !(0.0..=100.0).contains(&self.alerts.confidence_threshold) {
            problems.push("alerts.confidence_threshold must be within 0..=100".to_string());
        }
        if !(1..=MAX_WINDOW_SECS).contains(&self.alerts.dedup_window_secs) {
            problems.push(format!(
                "alerts.dedup_window_secs must be within 1..={MAX_WINDOW_SECS}"
            ));
        }
        if self.schedule.limit_trading_hours
            && (self.schedule.start_hour_utc >= self.schedule.end_hour_utc
                || self.schedule.end_hour_utc > 24)
        {
            problems.push(
                "schedule requires start_hour_utc < end_hour_utc <= 24".to_string(),
            );
        }

        if !problems.is_empty() {
            anyhow::bail!("Configuration invalid: {}", problems.join("; "));
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}

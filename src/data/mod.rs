//! Market data sources.
//!
//! Defines the `SourceClient` trait and one adapter per upstream
//! provider. Adapters do a single bounded round-trip and nothing else:
//! retries, fallback and caching live in the acquisition manager.

pub mod binance;
pub mod coinbase;
pub mod yahoo;
pub mod deribit;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::types::{Snapshot, SourceError};

/// Abstraction over a single upstream price provider.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Fetch one snapshot for `instrument` (`BASE-QUOTE`).
    async fn fetch(&self, instrument: &str) -> Result<Snapshot, SourceError>;

    /// Up to `bars` closed bars ending before now, oldest first, as live
    /// snapshots stamped at each bar's close. Used to warm the feature
    /// window; sources without a candle endpoint report themselves
    /// unavailable.
    async fn history(
        &self,
        instrument: &str,
        interval: BarInterval,
        bars: usize,
    ) -> Result<Vec<Snapshot>, SourceError> {
        let _ = (instrument, interval, bars);
        Err(SourceError::unavailable(self.name(), "price history not supported"))
    }

    /// Source identifier recorded on every snapshot.
    fn name(&self) -> &str;
}

/// Candle width for history requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BarInterval {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
}

impl BarInterval {
    pub fn minutes(self) -> i64 {
        match self {
            BarInterval::OneMinute => 1,
            BarInterval::FiveMinutes => 5,
            BarInterval::FifteenMinutes => 15,
            BarInterval::ThirtyMinutes => 30,
            BarInterval::OneHour => 60,
        }
    }

    pub fn duration(self) -> chrono::Duration {
        chrono::Duration::minutes(self.minutes())
    }
}

impl fmt::Display for BarInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BarInterval::OneMinute => write!(f, "1m"),
            BarInterval::FiveMinutes => write!(f, "5m"),
            BarInterval::FifteenMinutes => write!(f, "15m"),
            BarInterval::ThirtyMinutes => write!(f, "30m"),
            BarInterval::OneHour => write!(f, "1h"),
        }
    }
}

/// Providers that can be named in the source priority list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Binance,
    Coinbase,
    Yahoo,
    Deribit,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Binance => write!(f, "binance"),
            SourceKind::Coinbase => write!(f, "coinbase"),
            SourceKind::Yahoo => write!(f, "yahoo"),
            SourceKind::Deribit => write!(f, "deribit"),
        }
    }
}

/// Build the configured source clients, preserving priority order.
pub fn build_sources(kinds: &[SourceKind], timeout: Duration) -> Result<Vec<Box<dyn SourceClient>>> {
    kinds
        .iter()
        .map(|kind| -> Result<Box<dyn SourceClient>> {
            let client: Box<dyn SourceClient> = match kind {
                SourceKind::Binance => Box::new(binance::BinanceClient::new(timeout)?),
                SourceKind::Coinbase => Box::new(coinbase::CoinbaseClient::new(timeout)?),
                SourceKind::Yahoo => Box::new(yahoo::YahooClient::new(timeout)?),
                SourceKind::Deribit => Box::new(deribit::DeribitClient::new(timeout)?),
            };
            Ok(client)
        })
        .collect()
}

/// Shared HTTP client construction: every upstream call is time-bounded.
pub(crate) fn http_client(name: &str, timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .user_agent("VIGIL/0.1.0")
        .build()
        .with_context(|| format!("Failed to build {name} HTTP client"))
}

/// Split `BTC-USD` into `("BTC", "USD")`, upper-cased.
pub(crate) fn split_instrument(instrument: &str) -> Option<(String, String)> {
    let (base, quote) = instrument.split_once('-')?;
    if base.is_empty() || quote.is_empty() {
        return None;
    }
    Some((base.to_uppercase(), quote.to_uppercase()))
}

/// GET a URL and decode the JSON body, mapping every failure mode to
/// `SourceError::Unavailable`.
pub(crate) async fn get_json<T: serde::de::DeserializeOwned>(
    http: &Client,
    source: &str,
    url: &str,
) -> Result<T, SourceError> {
    let resp = http
        .get(url)
        .send()
        .await
        .map_err(|e| SourceError::unavailable(source, format!("request failed: {e}")))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let body: String = body.chars().take(200).collect();
        return Err(SourceError::unavailable(source, format!("HTTP {status}: {body}")));
    }

    resp.json::<T>()
        .await
        .map_err(|e| SourceError::unavailable(source, format!("bad response body: {e}")))
}

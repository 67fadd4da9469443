//! Binance spot ticker source.
//!
//! API: `https://api.binance.com/api/v3/ticker/price?symbol=BTCUSDT`
//! History: `https://api.binance.com/api/v3/klines?symbol=BTCUSDT&interval=5m&limit=N`
//! Auth: none. Rate limit: weight-based, 6000/min per IP.
//! USD-quoted instruments map to the USDT pair.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use super::{get_json, http_client, split_instrument, BarInterval, SourceClient};
use crate::types::{Snapshot, SourceError};

const BASE_URL: &str = "https://api.binance.com/api/v3/ticker/price";
const KLINES_URL: &str = "https://api.binance.com/api/v3/klines";
const SOURCE_NAME: &str = "binance";
/// Largest `limit` the klines endpoint accepts.
const MAX_KLINES: usize = 1000;

#[derive(Debug, Deserialize)]
struct TickerPrice {
    symbol: String,
    price: String,
}

pub struct BinanceClient {
    http: Client,
}

impl BinanceClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: http_client(SOURCE_NAME, timeout)?,
        })
    }

    /// `BTC-USD` → `BTCUSDT`, `ETH-BTC` → `ETHBTC`.
    pub fn symbol_for(instrument: &str) -> Option<String> {
        let (base, quote) = split_instrument(instrument)?;
        let quote = if quote == "USD" { "USDT".to_string() } else { quote };
        Some(format!("{base}{quote}"))
    }

    /// Parse a ticker body. The endpoint carries no server time, so the
    /// observation time is supplied by the caller.
    pub fn parse_ticker(body: &str, observed_at: DateTime<Utc>) -> Result<Snapshot, SourceError> {
        let ticker: TickerPrice = serde_json::from_str(body)
            .map_err(|e| SourceError::unavailable(SOURCE_NAME, format!("bad ticker JSON: {e}")))?;
        Self::to_snapshot(ticker, observed_at)
    }

    fn to_snapshot(ticker: TickerPrice, observed_at: DateTime<Utc>) -> Result<Snapshot, SourceError> {
        let price = Decimal::from_str(ticker.price.trim()).map_err(|e| {
            SourceError::unavailable(SOURCE_NAME, format!("bad price {:?}: {e}", ticker.price))
        })?;
        debug!(symbol = %ticker.symbol, %price, "Binance ticker");
        Snapshot::live(SOURCE_NAME, price.normalize(), observed_at)
    }

    /// Parse a klines body into close-price snapshots.
    ///
    /// Each row is `[openTime, open, high, low, close, volume, closeTime, ...]`
    /// with millisecond times and string prices. The bar still forming
    /// (`closeTime` after `now`) is dropped and at most `bars` of the most
    /// recent closed bars are returned, oldest first.
    pub fn parse_klines(
        body: &str,
        now: DateTime<Utc>,
        bars: usize,
    ) -> Result<Vec<Snapshot>, SourceError> {
        let rows: Vec<Vec<serde_json::Value>> = serde_json::from_str(body)
            .map_err(|e| SourceError::unavailable(SOURCE_NAME, format!("bad klines JSON: {e}")))?;
        Self::klines_to_snapshots(rows, now, bars)
    }

    fn klines_to_snapshots(
        rows: Vec<Vec<serde_json::Value>>,
        now: DateTime<Utc>,
        bars: usize,
    ) -> Result<Vec<Snapshot>, SourceError> {
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let close_ms = row.get(6).and_then(|v| v.as_i64());
            let close = row.get(4).and_then(|v| v.as_str());
            let (Some(close_ms), Some(close)) = (close_ms, close) else {
                return Err(SourceError::unavailable(SOURCE_NAME, "malformed kline row"));
            };
            let closed_at = Utc.timestamp_millis_opt(close_ms).single().ok_or_else(|| {
                SourceError::unavailable(SOURCE_NAME, format!("bad kline close time {close_ms}"))
            })?;
            if closed_at > now {
                continue;
            }
            let price = Decimal::from_str(close.trim()).map_err(|e| {
                SourceError::unavailable(SOURCE_NAME, format!("bad kline close {close:?}: {e}"))
            })?;
            out.push(Snapshot::live(SOURCE_NAME, price.normalize(), closed_at)?);
        }
        let skip = out.len().saturating_sub(bars);
        Ok(out.split_off(skip))
    }
}

#[async_trait]
impl SourceClient for BinanceClient {
    async fn fetch(&self, instrument: &str) -> Result<Snapshot, SourceError> {
        let symbol = Self::symbol_for(instrument).ok_or_else(|| {
            SourceError::unavailable(SOURCE_NAME, format!("unsupported instrument {instrument}"))
        })?;
        let url = format!("{BASE_URL}?symbol={symbol}");
        let ticker: TickerPrice = get_json(&self.http, SOURCE_NAME, &url).await?;
        Self::to_snapshot(ticker, Utc::now())
    }

    async fn history(
        &self,
        instrument: &str,
        interval: BarInterval,
        bars: usize,
    ) -> Result<Vec<Snapshot>, SourceError> {
        let symbol = Self::symbol_for(instrument).ok_or_else(|| {
            SourceError::unavailable(SOURCE_NAME, format!("unsupported instrument {instrument}"))
        })?;
        // One extra row covers the bar still forming.
        let limit = (bars + 1).min(MAX_KLINES);
        let url = format!("{KLINES_URL}?symbol={symbol}&interval={interval}&limit={limit}");
        let rows: Vec<Vec<serde_json::Value>> = get_json(&self.http, SOURCE_NAME, &url).await?;
        let snapshots = Self::klines_to_snapshots(rows, Utc::now(), bars)?;
        debug!(%symbol, %interval, bars = snapshots.len(), "Binance klines");
        Ok(snapshots)
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }
}

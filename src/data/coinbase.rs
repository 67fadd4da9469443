//! Coinbase Exchange ticker source.
//!
//! API: `https://api.exchange.coinbase.com/products/{product}/ticker`
//! Auth: none for public market data. Rate limit: 10 req/s per IP.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

use super::{get_json, http_client, split_instrument, SourceClient};
use crate::types::{Snapshot, SourceError};

const BASE_URL: &str = "https://api.exchange.coinbase.com/products";
const SOURCE_NAME: &str = "coinbase";

#[derive(Debug, Deserialize)]
struct Ticker {
    price: String,
    /// Time of the last trade. Absent on some illiquid products.
    #[serde(default)]
    time: Option<DateTime<Utc>>,
}

pub struct CoinbaseClient {
    http: Client,
}

impl CoinbaseClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: http_client(SOURCE_NAME, timeout)?,
        })
    }

    pub fn product_for(instrument: &str) -> Option<String> {
        let (base, quote) = split_instrument(instrument)?;
        Some(format!("{base}-{quote}"))
    }

    /// Parse a ticker body; `fallback_time` is used when the body has no
    /// trade time.
    pub fn parse_ticker(body: &str, fallback_time: DateTime<Utc>) -> Result<Snapshot, SourceError> {
        let ticker: Ticker = serde_json::from_str(body)
            .map_err(|e| SourceError::unavailable(SOURCE_NAME, format!("bad ticker JSON: {e}")))?;
        Self::to_snapshot(ticker, fallback_time)
    }

    fn to_snapshot(ticker: Ticker, fallback_time: DateTime<Utc>) -> Result<Snapshot, SourceError> {
        let price = Decimal::from_str(ticker.price.trim()).map_err(|e| {
            SourceError::unavailable(SOURCE_NAME, format!("bad price {:?}: {e}", ticker.price))
        })?;
        Snapshot::live(SOURCE_NAME, price.normalize(), ticker.time.unwrap_or(fallback_time))
    }
}

#[async_trait]
impl SourceClient for CoinbaseClient {
    async fn fetch(&self, instrument: &str) -> Result<Snapshot, SourceError> {
        let product = Self::product_for(instrument).ok_or_else(|| {
            SourceError::unavailable(SOURCE_NAME, format!("unsupported instrument {instrument}"))
        })?;
        let url = format!("{BASE_URL}/{product}/ticker");
        let ticker: Ticker = get_json(&self.http, SOURCE_NAME, &url).await?;
        Self::to_snapshot(ticker, Utc::now())
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn test_product_mapping() {
        assert_eq!(CoinbaseClient::product_for("btc-usd").as_deref(), Some("BTC-USD"));
        assert_eq!(CoinbaseClient::product_for("nonsense"), None);
    }

    #[test]
    fn test_parse_ticker_uses_trade_time() {
        let body = r#"{
            "ask": "61343.00", "bid": "61342.00", "volume": "8123.1",
            "trade_id": 612345, "price": "61342.55", "size": "0.01",
            "time": "2026-02-01T09:59:58.123456Z"
        }"#;
        let fallback = Utc.with_ymd_and_hms(2026, 2, 1, 10, 0, 0).unwrap();
        let snap = CoinbaseClient::parse_ticker(body, fallback).unwrap();
        assert_eq!(snap.price, dec!(61342.55));
        assert_eq!(snap.source, "coinbase");
        assert!(snap.timestamp < fallback);
    }

    #[test]
    fn test_parse_ticker_without_time() {
        let fallback = Utc.with_ymd_and_hms(2026, 2, 1, 10, 0, 0).unwrap();
        let snap = CoinbaseClient::parse_ticker(r#"{"price":"100.5"}"#, fallback).unwrap();
        assert_eq!(snap.timestamp, fallback);
    }

    #[test]
    fn test_parse_error_body() {
        let err = CoinbaseClient::parse_ticker(r#"{"message":"NotFound"}"#, Utc::now()).unwrap_err();
        assert!(err.to_string().contains("coinbase"));
    }
}

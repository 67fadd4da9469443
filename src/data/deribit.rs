//! Deribit index price source.
//!
//! API: `https://www.deribit.com/api/v2/public/get_index_price?index_name=btc_usd`
//! Auth: none. The index is the settlement reference for Deribit options,
//! which makes it the natural cross-check for strike selection.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use rust_decimal::prelude::*;
use serde::Deserialize;
use std::time::Duration;

use super::{get_json, http_client, split_instrument, SourceClient};
use crate::types::{Snapshot, SourceError};

const BASE_URL: &str = "https://www.deribit.com/api/v2/public/get_index_price";
const SOURCE_NAME: &str = "deribit";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexResponse {
    #[serde(default)]
    result: Option<IndexResult>,
    #[serde(default)]
    error: Option<serde_json::Value>,
    /// Server send time, microseconds since epoch.
    #[serde(default)]
    us_out: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct IndexResult {
    index_price: f64,
}

pub struct DeribitClient {
    http: Client,
}

impl DeribitClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: http_client(SOURCE_NAME, timeout)?,
        })
    }

    /// `BTC-USD` → `btc_usd`. Deribit only publishes USD/USDC indices.
    pub fn index_for(instrument: &str) -> Option<String> {
        let (base, quote) = split_instrument(instrument)?;
        match quote.as_str() {
            "USD" | "USDC" => Some(format!("{}_{}", base.to_lowercase(), quote.to_lowercase())),
            _ => None,
        }
    }

    pub fn parse_index(body: &str, fallback_time: DateTime<Utc>) -> Result<Snapshot, SourceError> {
        let resp: IndexResponse = serde_json::from_str(body)
            .map_err(|e| SourceError::unavailable(SOURCE_NAME, format!("bad index JSON: {e}")))?;
        Self::to_snapshot(resp, fallback_time)
    }

    fn to_snapshot(resp: IndexResponse, fallback_time: DateTime<Utc>) -> Result<Snapshot, SourceError> {
        if let Some(err) = resp.error {
            return Err(SourceError::unavailable(SOURCE_NAME, format!("API error: {err}")));
        }
        let result = resp
            .result
            .ok_or_else(|| SourceError::unavailable(SOURCE_NAME, "missing result"))?;
        let price = Decimal::from_f64(result.index_price)
            .ok_or_else(|| {
                SourceError::unavailable(SOURCE_NAME, format!("unrepresentable price {}", result.index_price))
            })?
            .round_dp(8);

        let timestamp = resp
            .us_out
            .and_then(|us| Utc.timestamp_micros(us).single())
            .unwrap_or(fallback_time);

        Snapshot::live(SOURCE_NAME, price.normalize(), timestamp)
    }
}

#[async_trait]
impl SourceClient for DeribitClient {
    async fn fetch(&self, instrument: &str) -> Result<Snapshot, SourceError> {
        let index = Self::index_for(instrument).ok_or_else(|| {
            SourceError::unavailable(SOURCE_NAME, format!("no index for {instrument}"))
        })?;
        let url = format!("{BASE_URL}?index_name={index}");
        let resp: IndexResponse = get_json(&self.http, SOURCE_NAME, &url).await?;
        Self::to_snapshot(resp, Utc::now())
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }
}

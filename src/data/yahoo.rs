//! Yahoo Finance chart source.
//!
//! API: `https://query1.finance.yahoo.com/v8/finance/chart/{symbol}`
//! Auth: none, but unauthenticated access is aggressively throttled.
//! Slowest and least reliable of the sources; keep it last in priority.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use rust_decimal::prelude::*;
use serde::Deserialize;
use std::time::Duration;

use super::{get_json, http_client, split_instrument, BarInterval, SourceClient};
use crate::types::{Snapshot, SourceError};

const BASE_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const SOURCE_NAME: &str = "yahoo";

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    /// Bar open times, unix seconds.
    #[serde(default)]
    timestamp: Option<Vec<i64>>,
    #[serde(default)]
    indicators: Option<Indicators>,
}

#[derive(Debug, Default, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
}

/// Close series aligned with `timestamp`; gaps come back as `null`.
#[derive(Debug, Default, Deserialize)]
struct Quote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    #[serde(default)]
    regular_market_price: Option<f64>,
    /// Unix seconds.
    #[serde(default)]
    regular_market_time: Option<i64>,
}

pub struct YahooClient {
    http: Client,
}

impl YahooClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: http_client(SOURCE_NAME, timeout)?,
        })
    }

    pub fn symbol_for(instrument: &str) -> Option<String> {
        let (base, quote) = split_instrument(instrument)?;
        Some(format!("{base}-{quote}"))
    }

    pub fn parse_chart(body: &str, fallback_time: DateTime<Utc>) -> Result<Snapshot, SourceError> {
        let resp: ChartResponse = serde_json::from_str(body)
            .map_err(|e| SourceError::unavailable(SOURCE_NAME, format!("bad chart JSON: {e}")))?;
        Self::to_snapshot(resp, fallback_time)
    }

    fn to_snapshot(resp: ChartResponse, fallback_time: DateTime<Utc>) -> Result<Snapshot, SourceError> {
        if let Some(err) = resp.chart.error.filter(|e| !e.is_null()) {
            return Err(SourceError::unavailable(SOURCE_NAME, format!("chart error: {err}")));
        }
        let meta = resp
            .chart
            .result
            .and_then(|r| r.into_iter().next())
            .map(|r| r.meta)
            .ok_or_else(|| SourceError::unavailable(SOURCE_NAME, "empty chart result"))?;

        let raw = meta
            .regular_market_price
            .ok_or_else(|| SourceError::unavailable(SOURCE_NAME, "missing regularMarketPrice"))?;
        let price = Decimal::from_f64(raw)
            .ok_or_else(|| SourceError::unavailable(SOURCE_NAME, format!("unrepresentable price {raw}")))?
            .round_dp(8);

        let timestamp = meta
            .regular_market_time
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or(fallback_time);

        Snapshot::live(SOURCE_NAME, price.normalize(), timestamp)
    }

    /// Parse chart bars into close-price snapshots stamped at each bar's
    /// close. Null closes are skipped, as is the bar still forming at `now`.
    pub fn parse_bars(
        body: &str,
        interval: BarInterval,
        now: DateTime<Utc>,
        bars: usize,
    ) -> Result<Vec<Snapshot>, SourceError> {
        let resp: ChartResponse = serde_json::from_str(body)
            .map_err(|e| SourceError::unavailable(SOURCE_NAME, format!("bad chart JSON: {e}")))?;
        Self::to_bars(resp, interval, now, bars)
    }

    fn to_bars(
        resp: ChartResponse,
        interval: BarInterval,
        now: DateTime<Utc>,
        bars: usize,
    ) -> Result<Vec<Snapshot>, SourceError> {
        if let Some(err) = resp.chart.error.filter(|e| !e.is_null()) {
            return Err(SourceError::unavailable(SOURCE_NAME, format!("chart error: {err}")));
        }
        let result = resp
            .chart
            .result
            .and_then(|r| r.into_iter().next())
            .ok_or_else(|| SourceError::unavailable(SOURCE_NAME, "empty chart result"))?;

        let opens = result.timestamp.unwrap_or_default();
        let closes = result
            .indicators
            .and_then(|i| i.quote.into_iter().next())
            .map(|q| q.close)
            .unwrap_or_default();
        if opens.len() != closes.len() {
            return Err(SourceError::unavailable(
                SOURCE_NAME,
                format!("{} timestamps but {} closes", opens.len(), closes.len()),
            ));
        }

        let mut out = Vec::with_capacity(opens.len());
        for (open, close) in opens.into_iter().zip(closes) {
            let Some(raw) = close else { continue };
            let Some(opened_at) = Utc.timestamp_opt(open, 0).single() else { continue };
            let closed_at = opened_at + interval.duration();
            if closed_at > now {
                continue;
            }
            let Some(price) = Decimal::from_f64(raw) else { continue };
            out.push(Snapshot::live(SOURCE_NAME, price.round_dp(8).normalize(), closed_at)?);
        }
        let skip = out.len().saturating_sub(bars);
        Ok(out.split_off(skip))
    }

    /// Yahoo spells the hourly interval `60m`.
    fn interval_code(interval: BarInterval) -> &'static str {
        match interval {
            BarInterval::OneMinute => "1m",
            BarInterval::FiveMinutes => "5m",
            BarInterval::FifteenMinutes => "15m",
            BarInterval::ThirtyMinutes => "30m",
            BarInterval::OneHour => "60m",
        }
    }

    /// Smallest chart range that covers `bars` bars plus the one forming.
    fn range_for(interval: BarInterval, bars: usize) -> &'static str {
        let minutes = (bars as i64 + 1) * interval.minutes();
        match minutes {
            m if m <= 24 * 60 => "1d",
            m if m <= 5 * 24 * 60 => "5d",
            _ => "1mo",
        }
    }
}

#[async_trait]
impl SourceClient for YahooClient {
    async fn fetch(&self, instrument: &str) -> Result<Snapshot, SourceError> {
        let symbol = Self::symbol_for(instrument).ok_or_else(|| {
            SourceError::unavailable(SOURCE_NAME, format!("unsupported instrument {instrument}"))
        })?;
        let url = format!(
            "{BASE_URL}/{}?interval=1m&range=1d",
            urlencoding::encode(&symbol)
        );
        let resp: ChartResponse = get_json(&self.http, SOURCE_NAME, &url).await?;
        Self::to_snapshot(resp, Utc::now())
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
        let url = format!(
            "{BASE_URL}/{}?interval={}&range={}",
            urlencoding::encode(&symbol),
            Self::interval_code(interval),
            Self::range_for(interval, bars),
        );
        let resp: ChartResponse = get_json(&self.http, SOURCE_NAME, &url).await?;
        Self::to_bars(resp, interval, Utc::now(), bars)
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }
}

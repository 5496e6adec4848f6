//! Yahoo Finance chart API client

use super::{http_client, status_error, MarketData, PriceBar, PriceHistory};
use crate::error::OrchestrationError;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

pub const YAHOO_CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

// Yahoo rejects requests without a browser-like agent
const USER_AGENT: &str = "Mozilla/5.0 (compatible; portfolio-agent/0.1)";

//
// ================= Wire Types =================
//

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    chart_previous_close: Option<f64>,
    #[serde(default)]
    previous_close: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
}

#[derive(Debug, Default, Deserialize)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

fn parse_chart(symbol: &str, body: ChartEnvelope) -> Result<PriceHistory> {
    if let Some(err) = body.chart.error {
        return Err(OrchestrationError::ToolError(
            err.description
                .unwrap_or_else(|| format!("No data found for {}", symbol)),
        ));
    }

    let result = body
        .chart
        .result
        .and_then(|mut r| if r.is_empty() { None } else { Some(r.swap_remove(0)) })
        .ok_or_else(|| OrchestrationError::ToolError(format!("No data found for {}", symbol)))?;

    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();

    // Intervals with no trades come back as nulls; skip them
    let bars = result
        .timestamp
        .iter()
        .enumerate()
        .filter_map(|(i, ts)| {
            let close = quote.close.get(i).copied().flatten()?;
            let timestamp = DateTime::<Utc>::from_timestamp(*ts, 0)?;
            let pick = |v: &Vec<Option<f64>>| v.get(i).copied().flatten().unwrap_or(close);
            Some(PriceBar {
                timestamp,
                open: pick(&quote.open),
                high: pick(&quote.high),
                low: pick(&quote.low),
                close,
                volume: quote.volume.get(i).copied().flatten().unwrap_or(0),
            })
        })
        .collect();

    Ok(PriceHistory {
        symbol: symbol.to_string(),
        currency: result.meta.currency.unwrap_or_else(|| "USD".to_string()),
        previous_close: result.meta.previous_close.or(result.meta.chart_previous_close),
        bars,
    })
}

pub struct YahooClient {
    client: Client,
    base_url: String,
}

impl YahooClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(YAHOO_CHART_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MarketData for YahooClient {
    async fn history(&self, symbol: &str, range: &str, interval: &str) -> Result<PriceHistory> {
        let symbol = symbol.trim().to_uppercase();
        debug!(symbol = %symbol, range, interval, "Fetching chart");

        let response = self
            .client
            .get(format!("{}/{}", self.base_url, symbol))
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .query(&[("range", range), ("interval", interval)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let body: ChartEnvelope = response.json().await?;
        parse_chart(&symbol, body)
    }
}

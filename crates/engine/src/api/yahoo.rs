//! Yahoo Finance chart API client (public, no authentication)

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use super::SpotPriceSource;
use crate::error::{AnalyticsError, AnalyticsResult};
use crate::types::PricePoint;

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

/// Yahoo chart endpoint client
#[derive(Clone)]
pub struct YahooQuoteClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Option<ChartIndicators>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    regular_market_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<QuoteSeries>,
}

/// Yahoo leaves `null` holes in these arrays for halted or partial bars
#[derive(Debug, Default, Deserialize)]
struct QuoteSeries {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<i64>>,
}

impl Default for YahooQuoteClient {
    fn default() -> Self {
        Self::new()
    }
}

impl YahooQuoteClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(15))
                .user_agent(concat!("options-lab/", env!("CARGO_PKG_VERSION")))
                .build()
                .expect("Failed to build HTTP client"),
            base_url: base_url.into(),
        }
    }

    async fn fetch_chart(&self, symbol: &str, range: &str) -> Result<ChartResult> {
        let url = format!(
            "{}/v8/finance/chart/{}?interval=1d&range={}",
            self.base_url, symbol, range
        );

        debug!(symbol, range, "Fetching chart from Yahoo");

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Yahoo API error {}: {}", status, body);
        }

        let body: ChartResponse = response.json().await?;
        first_result(body)
    }

    /// Latest regular-market price for a symbol
    pub async fn get_price(&self, symbol: &str) -> Result<f64> {
        let chart = self.fetch_chart(symbol, "1d").await?;
        chart
            .meta
            .regular_market_price
            .filter(|p| p.is_finite() && *p > 0.0)
            .with_context(|| format!("No market price in Yahoo response for {symbol}"))
    }

    /// Daily bars for `range` (e.g. "6mo", "1y"), oldest first
    pub async fn get_daily_history(&self, symbol: &str, range: &str) -> Result<Vec<PricePoint>> {
        let chart = self.fetch_chart(symbol, range).await?;
        let points = chart_to_points(chart);
        info!(symbol, count = points.len(), "Fetched daily history");
        Ok(points)
    }
}

#[async_trait]
impl SpotPriceSource for YahooQuoteClient {
    async fn spot_price(&self, symbol: &str) -> AnalyticsResult<f64> {
        self.get_price(symbol)
            .await
            .map_err(|e| AnalyticsError::UpstreamUnavailable(format!("{symbol}: {e:#}")))
    }
}

fn first_result(body: ChartResponse) -> Result<ChartResult> {
    if let Some(err) = body.chart.error {
        anyhow::bail!("Yahoo chart error {}: {}", err.code, err.description);
    }
    body.chart
        .result
        .and_then(|r| r.into_iter().next())
        .context("Empty Yahoo chart result")
}

/// Zip Yahoo's parallel arrays into bars, skipping rows with holes
fn chart_to_points(chart: ChartResult) -> Vec<PricePoint> {
    let quote = chart
        .indicators
        .and_then(|i| i.quote.into_iter().next())
        .unwrap_or_default();

    chart
        .timestamp
        .iter()
        .enumerate()
        .filter_map(|(i, &ts)| {
            Some(PricePoint {
                date: DateTime::from_timestamp(ts, 0)?.date_naive(),
                timestamp_seconds: ts,
                open: (*quote.open.get(i)?)?,
                high: (*quote.high.get(i)?)?,
                low: (*quote.low.get(i)?)?,
                close: (*quote.close.get(i)?)?,
                volume: (*quote.volume.get(i)?)?,
            })
        })
        .collect()
}

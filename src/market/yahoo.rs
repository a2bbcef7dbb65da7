use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info};

use super::{MarketDataError, PriceSource};
use crate::core::TickerHistory;

const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const USER_AGENT: &str = concat!("fire-sim/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Daily closes from Yahoo's chart endpoint. One request per ticker, no retries.
pub struct YahooSource {
    client: reqwest::Client,
}

impl YahooSource {
    pub fn new(proxy: Option<&str>) -> Result<Self, MarketDataError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT);

        if let Some(url) = proxy {
            let proxy = reqwest::Proxy::all(url).map_err(|e| MarketDataError::Proxy {
                url: url.to_string(),
                message: e.to_string(),
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(|e| MarketDataError::Network {
            ticker: String::new(),
            message: e.to_string(),
        })?;
        Ok(Self { client })
    }

    async fn fetch_one(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<TickerHistory, MarketDataError> {
        let period1 = start.and_time(NaiveTime::MIN).and_utc().timestamp();
        // period2 is exclusive, so ask for the whole of `end`.
        let period2 = end.and_time(NaiveTime::MIN).and_utc().timestamp() + 86_400;
        let url = format!("{CHART_URL}/{ticker}?period1={period1}&period2={period2}&interval=1d");

        let network = |e: reqwest::Error| MarketDataError::Network {
            ticker: ticker.to_string(),
            message: e.to_string(),
        };

        let resp = self.client.get(&url).send().await.map_err(network)?;
        let status = resp.status();
        let body = resp.text().await.map_err(network)?;
        check_status(ticker, status, &body)?;

        parse_chart(ticker, &body)
    }
}

// Error statuses with a JSON body carry a chart error that parse_chart reports.
fn check_status(ticker: &str, status: StatusCode, body: &str) -> Result<(), MarketDataError> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(MarketDataError::RateLimited(ticker.to_string()));
    }
    if !status.is_success() && !body.trim_start().starts_with('{') {
        return Err(MarketDataError::BadResponse {
            ticker: ticker.to_string(),
            message: format!("HTTP {status}"),
        });
    }
    Ok(())
}

#[async_trait]
impl PriceSource for YahooSource {
    async fn fetch_closes(
        &self,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<TickerHistory>, MarketDataError> {
        let mut histories = Vec::with_capacity(tickers.len());
        for ticker in tickers {
            info!(ticker = %ticker, %start, %end, "downloading daily closes");
            let history = self.fetch_one(ticker, start, end).await?;
            debug!(ticker = %ticker, rows = history.closes.len(), "download complete");
            histories.push(history);
        }
        Ok(histories)
    }
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
    code: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
    #[serde(default)]
    adjclose: Vec<AdjClose>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

fn parse_chart(ticker: &str, body: &str) -> Result<TickerHistory, MarketDataError> {
    let response: ChartResponse = serde_json::from_str(body)
        .map_err(|e| MarketDataError::Parse(format!("{ticker}: {e}")))?;

    if let Some(error) = response.chart.error {
        let message = error
            .description
            .or(error.code)
            .unwrap_or_else(|| "unknown chart error".to_string());
        return Err(MarketDataError::BadResponse {
            ticker: ticker.to_string(),
            message,
        });
    }

    let result = response
        .chart
        .result
        .and_then(|mut r| r.pop())
        .ok_or_else(|| MarketDataError::BadResponse {
            ticker: ticker.to_string(),
            message: "missing result".to_string(),
        })?;

    let closes = match result.indicators.adjclose.into_iter().next() {
        Some(adjusted) if !adjusted.adjclose.is_empty() => adjusted.adjclose,
        _ => result
            .indicators
            .quote
            .into_iter()
            .next()
            .map(|q| q.close)
            .ok_or_else(|| MarketDataError::BadResponse {
                ticker: ticker.to_string(),
                message: "missing quote".to_string(),
            })?,
    };

    let mut out = Vec::with_capacity(result.timestamp.len());
    for (i, ts) in result.timestamp.iter().enumerate() {
        let Some(close) = closes.get(i).copied().flatten() else {
            continue;
        };
        let date = DateTime::from_timestamp(*ts, 0)
            .ok_or_else(|| MarketDataError::Parse(format!("{ticker}: bad timestamp {ts}")))?
            .date_naive();
        out.push((date, close));
    }
    out.sort_by_key(|(date, _)| *date);

    Ok(TickerHistory {
        ticker: ticker.to_string(),
        closes: out,
    })
}

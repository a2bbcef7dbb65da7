mod csv_file;
mod yahoo;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::core::TickerHistory;

pub use csv_file::CsvSource;
pub use yahoo::YahooSource;

#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error("network error fetching {ticker}: {message}")]
    Network { ticker: String, message: String },

    #[error("rate limited while fetching {0}")]
    RateLimited(String),

    #[error("bad response for {ticker}: {message}")]
    BadResponse { ticker: String, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("no column for ticker {ticker} in {path}")]
    MissingColumn { ticker: String, path: String },

    #[error("invalid proxy {url}: {message}")]
    Proxy { url: String, message: String },

    #[error("failed to read {path}: {message}")]
    Io { path: String, message: String },
}

/// Source of daily closing prices. Implementations return whatever trading
/// days they have; calendar alignment happens in `PriceSeries::reindexed`.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch_closes(
        &self,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<TickerHistory>, MarketDataError>;
}

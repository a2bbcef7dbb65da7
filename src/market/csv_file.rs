use std::path::PathBuf;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::info;

use super::{MarketDataError, PriceSource};
use crate::core::TickerHistory;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Closes read from a wide CSV file: a `date` column followed by one column
/// per ticker. Empty cells are days without a close.
pub struct CsvSource {
    path: PathBuf,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read(
        &self,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<TickerHistory>, MarketDataError> {
        let path = self.path.display().to_string();
        let io_err = |e: csv::Error| MarketDataError::Io {
            path: path.clone(),
            message: e.to_string(),
        };

        let mut reader = csv::Reader::from_path(&self.path).map_err(io_err)?;
        let headers = reader.headers().map_err(io_err)?.clone();

        let date_idx = headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case("date"))
            .ok_or_else(|| MarketDataError::Parse(format!("{path}: missing date column")))?;
        let columns = tickers
            .iter()
            .map(|ticker| {
                headers
                    .iter()
                    .position(|h| h.trim() == ticker)
                    .ok_or_else(|| MarketDataError::MissingColumn {
                        ticker: ticker.clone(),
                        path: path.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut histories: Vec<TickerHistory> = tickers
            .iter()
            .map(|ticker| TickerHistory {
                ticker: ticker.clone(),
                closes: Vec::new(),
            })
            .collect();

        for (row_idx, record) in reader.records().enumerate() {
            let record = record.map_err(io_err)?;
            let line = row_idx + 2;
            let raw_date = record.get(date_idx).unwrap_or_default().trim();
            let date = NaiveDate::parse_from_str(raw_date, DATE_FORMAT).map_err(|e| {
                MarketDataError::Parse(format!("{path}:{line}: bad date {raw_date:?}: {e}"))
            })?;
            if date < start || date > end {
                continue;
            }

            for (history, &col) in histories.iter_mut().zip(&columns) {
                let cell = record.get(col).unwrap_or_default().trim();
                if cell.is_empty() {
                    continue;
                }
                let close = cell.parse::<f64>().map_err(|e| {
                    MarketDataError::Parse(format!(
                        "{path}:{line}: bad close {cell:?} for {}: {e}",
                        history.ticker
                    ))
                })?;
                history.closes.push((date, close));
            }
        }

        for history in &mut histories {
            history.closes.sort_by_key(|(date, _)| *date);
        }
        info!(path = %path, tickers = tickers.len(), "loaded closes from csv");
        Ok(histories)
    }
}

#[async_trait]
impl PriceSource for CsvSource {
    async fn fetch_closes(
        &self,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<TickerHistory>, MarketDataError> {
        self.read(tickers, start, end)
    }
}

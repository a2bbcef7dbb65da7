use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, warn};

use super::error::{FireError, Result};
use super::types::PortfolioAllocation;

/// Length of every rolling window, in calendar days.
pub const WINDOW_DAYS: usize = 365;
const DAYS_PER_YEAR: f64 = 365.0;

/// Raw closes for one ticker as delivered by a price source, trading days only.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerHistory {
    pub ticker: String,
    pub closes: Vec<(NaiveDate, f64)>,
}

/// Closing prices on a gap-free daily calendar.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    dates: Vec<NaiveDate>,
    tickers: Vec<String>,
    closes: Vec<Vec<f64>>,
}

impl PriceSeries {
    /// Reindexes trading-day closes onto every calendar day in `[start, end]`.
    ///
    /// Gaps take the most recent known close; a leading gap takes the first
    /// close that follows it. Closes outside the range are ignored.
    pub fn reindexed(histories: &[TickerHistory], start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(FireError::InvalidDateRange { start, end });
        }

        let dates: Vec<NaiveDate> = start.iter_days().take_while(|d| *d <= end).collect();
        let mut tickers = Vec::with_capacity(histories.len());
        let mut closes = Vec::with_capacity(histories.len());

        for history in histories {
            let mut by_date = BTreeMap::new();
            for &(date, price) in &history.closes {
                if date < start || date > end {
                    continue;
                }
                if !price.is_finite() || price <= 0.0 {
                    return Err(FireError::InvalidPrice {
                        ticker: history.ticker.clone(),
                        date,
                        price,
                    });
                }
                by_date.insert(date, price);
            }

            let column = fill_column(&history.ticker, &dates, &by_date)?;
            tickers.push(history.ticker.clone());
            closes.push(column);
        }

        Ok(Self {
            dates,
            tickers,
            closes,
        })
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn column(&self, ticker: &str) -> Option<&[f64]> {
        self.tickers
            .iter()
            .position(|t| t == ticker)
            .map(|idx| self.closes[idx].as_slice())
    }
}

fn fill_column(
    ticker: &str,
    dates: &[NaiveDate],
    by_date: &BTreeMap<NaiveDate, f64>,
) -> Result<Vec<f64>> {
    let mut last_known = None;
    let forward: Vec<Option<f64>> = dates
        .iter()
        .map(|date| {
            if let Some(&price) = by_date.get(date) {
                last_known = Some(price);
            }
            last_known
        })
        .collect();

    let leading_gap = forward.iter().take_while(|p| p.is_none()).count();
    let Some(first_known) = forward.get(leading_gap).copied().flatten() else {
        return Err(FireError::MissingTicker(ticker.to_string()));
    };
    if leading_gap > 0 {
        warn!(
            ticker,
            days = leading_gap,
            "no close at start of range, back-filling from first known price"
        );
    }
    debug!(
        ticker,
        observed = by_date.len(),
        filled = dates.len() - by_date.len(),
        "reindexed to daily calendar"
    );

    Ok(forward
        .into_iter()
        .map(|p| p.unwrap_or(first_known))
        .collect())
}

/// Portfolio return over one 365-day window, in percent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollingReturn {
    pub start: NaiveDate,
    pub per_ticker: Vec<f64>,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerAverage {
    pub ticker: String,
    pub average_return: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnAverages {
    pub windows: usize,
    pub per_ticker: Vec<TickerAverage>,
    pub total: f64,
}

/// Slides a 365-day window over `series` and measures the allocated
/// portfolio's return in each one.
///
/// `notional` is split across the holdings by weight at each window's first
/// day and the share counts are then held to the window's last day. A series
/// of `365 + k` days yields `k` windows.
pub fn rolling_returns(
    series: &PriceSeries,
    allocation: &PortfolioAllocation,
    notional: f64,
) -> Result<Vec<RollingReturn>> {
    if !notional.is_finite() || notional <= 0.0 {
        return Err(FireError::InvalidInput(
            "rolling return notional must be > 0".to_string(),
        ));
    }

    let columns = allocation
        .holdings()
        .iter()
        .map(|holding| {
            series
                .column(&holding.ticker)
                .map(|closes| (holding.weight, closes))
                .ok_or_else(|| FireError::MissingTicker(holding.ticker.clone()))
        })
        .collect::<Result<Vec<_>>>()?;

    let windows = series.len().saturating_sub(WINDOW_DAYS);
    if windows == 0 {
        return Err(FireError::InsufficientHistory { days: series.len() });
    }

    let mut observations = Vec::with_capacity(windows);
    for first in 0..windows {
        let last = first + WINDOW_DAYS - 1;
        let mut start_value = 0.0;
        let mut end_value = 0.0;
        let mut per_ticker = Vec::with_capacity(columns.len());

        for &(weight, closes) in &columns {
            let shares = weight * notional / closes[first];
            start_value += shares * closes[first];
            end_value += shares * closes[last];
            per_ticker.push(annualized_percent(closes[first], closes[last]));
        }

        observations.push(RollingReturn {
            start: series.dates()[first],
            per_ticker,
            total: annualized_percent(start_value, end_value),
        });
    }

    Ok(observations)
}

// The window is always one year long, so the annualization is an identity.
fn annualized_percent(start: f64, end: f64) -> f64 {
    100.0 * (end - start) / start / WINDOW_DAYS as f64 * DAYS_PER_YEAR
}

pub fn total_returns(observations: &[RollingReturn]) -> Vec<f64> {
    observations.iter().map(|o| o.total).collect()
}

/// Average return of every ticker and of the whole portfolio across windows.
pub fn mean_returns(allocation: &PortfolioAllocation, observations: &[RollingReturn]) -> ReturnAverages {
    let n = observations.len();
    let mean = |sum: f64| if n == 0 { 0.0 } else { sum / n as f64 };

    let per_ticker = allocation
        .holdings()
        .iter()
        .enumerate()
        .map(|(idx, holding)| TickerAverage {
            ticker: holding.ticker.clone(),
            average_return: mean(
                observations
                    .iter()
                    .filter_map(|o| o.per_ticker.get(idx))
                    .sum(),
            ),
        })
        .collect();

    ReturnAverages {
        windows: n,
        per_ticker,
        total: mean(observations.iter().map(|o| o.total).sum()),
    }
}

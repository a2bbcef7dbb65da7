use thiserror::Error;

#[derive(Debug, Error)]
pub enum FireError {
    #[error("portfolio allocation is empty")]
    EmptyAllocation,

    #[error("weight for {ticker} must be finite and >= 0, got {weight}")]
    InvalidWeight { ticker: String, weight: f64 },

    #[error("portfolio allocation adds up to {:.2}%, expected 100%", total * 100.0)]
    AllocationSum { total: f64 },

    #[error("no price data for ticker {0}")]
    MissingTicker(String),

    #[error("invalid close price {price} for {ticker} on {date}")]
    InvalidPrice {
        ticker: String,
        date: chrono::NaiveDate,
        price: f64,
    },

    #[error("invalid date range: {start} is after {end}")]
    InvalidDateRange {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },

    #[error("insufficient price history: {days} days available, more than 365 required")]
    InsufficientHistory { days: usize },

    #[error("no return observations to sample from")]
    EmptyObservations,

    #[error("{0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, FireError>;

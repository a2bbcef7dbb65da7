mod engine;
mod error;
mod goal;
mod history;
mod report;
mod types;

pub use engine::{SAVINGS_ACCOUNT_RATE, simulate};
pub use error::{FireError, Result};
pub use goal::{
    FIRE_WITHDRAWAL_RATE, FireOutcome, evaluate_fire_goal, fire_target, first_crossing_month,
    success_rate,
};
pub use history::{
    PriceSeries, ReturnAverages, RollingReturn, TickerAverage, TickerHistory, WINDOW_DAYS,
    mean_returns, rolling_returns, total_returns,
};
pub use report::{
    BatchSummary, BucketTail, HISTOGRAM_BINS, Histogram, HistogramBucket, Marker, MarkerKind,
    SimulationReport, format_currency, percentile, render_text, welcome_text,
};
pub use types::{
    BOND_FUND, Holding, INTL_STOCK_FUND, MonthlyMatrix, PortfolioAllocation, SimulatedPath,
    SimulationBatch, SimulationInputs, US_STOCK_FUND,
};

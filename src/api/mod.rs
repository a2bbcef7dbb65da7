mod cli;
mod export;
mod http;

use chrono::{Days, Months, NaiveDate};
use thiserror::Error;
use tracing::info;

use crate::core::{
    BatchSummary, FireError, PortfolioAllocation, PriceSeries, SimulationBatch, SimulationInputs,
    SimulationReport, evaluate_fire_goal, mean_returns, rolling_returns, simulate, total_returns,
};
use crate::market::{MarketDataError, PriceSource};

pub use cli::{Cli, run_cli};
pub use export::write_paths_csv;
pub use http::run_http_server;

pub const DEFAULT_LOOKBACK_YEARS: u32 = 18;
pub const DEFAULT_SIMULATIONS: u32 = 10_000;
pub const DEFAULT_YEARS: u32 = 20;
pub const MAX_YEARS: u32 = 100;
pub const MAX_SIMULATIONS: u32 = 100_000;
pub const MAX_LOOKBACK_YEARS: u32 = 100;
// Bounds simulations x years so one batch of paths stays around 100 MB.
pub const MAX_SIMULATED_YEARS: u64 = 1_000_000;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Fire(#[from] FireError),

    #[error(transparent)]
    Market(#[from] MarketDataError),

    #[error("{0}")]
    Config(String),

    #[error("failed to write {path}: {message}")]
    Export { path: String, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode report: {0}")]
    Json(#[from] serde_json::Error),

    #[error("simulation task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone)]
pub struct RunParams {
    pub current_balance: f64,
    pub annual_contribution: f64,
    pub years: u32,
    pub annual_expenses: f64,
    pub bond_percent: Option<f64>,
    pub funds: Vec<(String, f64)>,
    pub simulations: u32,
    pub lookback_years: u32,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub inputs: SimulationInputs,
    pub annual_expenses: f64,
    pub allocation: PortfolioAllocation,
    pub lookback_years: u32,
}

pub struct SimulationRun {
    pub report: SimulationReport,
    pub batch: SimulationBatch,
}

pub fn build_run_config(params: RunParams) -> Result<RunConfig, AppError> {
    if !params.current_balance.is_finite() || params.current_balance < 0.0 {
        return Err(AppError::Config("--current-balance must be >= 0".to_string()));
    }
    if !params.annual_contribution.is_finite() || params.annual_contribution < 0.0 {
        return Err(AppError::Config(
            "--annual-contribution must be >= 0".to_string(),
        ));
    }
    if params.years == 0 || params.years > MAX_YEARS {
        return Err(AppError::Config(format!(
            "--years must be between 1 and {MAX_YEARS}"
        )));
    }
    if !params.annual_expenses.is_finite() || params.annual_expenses < 0.0 {
        return Err(AppError::Config("--annual-expenses must be >= 0".to_string()));
    }
    if params.simulations == 0 || params.simulations > MAX_SIMULATIONS {
        return Err(AppError::Config(format!(
            "--simulations must be between 1 and {MAX_SIMULATIONS}"
        )));
    }
    if params.simulations as u64 * params.years as u64 > MAX_SIMULATED_YEARS {
        return Err(AppError::Config(format!(
            "--simulations x --years must be at most {MAX_SIMULATED_YEARS}"
        )));
    }
    if !(2..=MAX_LOOKBACK_YEARS).contains(&params.lookback_years) {
        return Err(AppError::Config(format!(
            "--lookback-years must be between 2 and {MAX_LOOKBACK_YEARS}"
        )));
    }

    let allocation = if params.funds.is_empty() {
        let bond_percent = params.bond_percent.ok_or_else(|| {
            AppError::Config("--bond-percent is required when no --fund is given".to_string())
        })?;
        PortfolioAllocation::from_bond_percent(bond_percent)?
    } else {
        PortfolioAllocation::new(params.funds)?
    };

    let seed = params.seed.unwrap_or_else(|| {
        let seed: u64 = rand::random();
        info!(seed, "no seed given, generated one");
        seed
    });

    Ok(RunConfig {
        inputs: SimulationInputs {
            start_amount: params.current_balance,
            annual_contribution: params.annual_contribution,
            years: params.years,
            simulations: params.simulations,
            seed,
        },
        annual_expenses: params.annual_expenses,
        allocation,
        lookback_years: params.lookback_years,
    })
}

pub fn history_range(today: NaiveDate, lookback_years: u32) -> Result<(NaiveDate, NaiveDate), AppError> {
    let start = today
        .checked_sub_months(Months::new(lookback_years.saturating_mul(12)))
        .ok_or_else(|| AppError::Config("--lookback-years reaches before the calendar".to_string()))?;
    let end = today
        .checked_sub_days(Days::new(1))
        .ok_or_else(|| AppError::Config("no history before today".to_string()))?;
    Ok((start, end))
}

pub async fn fetch_price_series(
    config: &RunConfig,
    source: &dyn PriceSource,
    today: NaiveDate,
) -> Result<PriceSeries, AppError> {
    let (start, end) = history_range(today, config.lookback_years)?;
    let tickers = config.allocation.tickers();
    info!(tickers = ?tickers, %start, %end, "fetching price history");

    let histories = source.fetch_closes(&tickers, start, end).await?;
    let series = PriceSeries::reindexed(&histories, start, end)?;
    info!(days = series.len(), "price history reindexed to daily calendar");
    Ok(series)
}

pub fn simulate_from_prices(
    config: &RunConfig,
    series: &PriceSeries,
    today: NaiveDate,
) -> Result<SimulationRun, AppError> {
    let notional = if config.inputs.start_amount > 0.0 {
        config.inputs.start_amount
    } else {
        1.0
    };
    let observations = rolling_returns(series, &config.allocation, notional)?;
    let historical = mean_returns(&config.allocation, &observations);
    info!(
        windows = historical.windows,
        average_return = historical.total,
        "generated historical 365 day returns"
    );

    let batch = simulate(&total_returns(&observations), &config.inputs)?;
    let fire = evaluate_fire_goal(&batch, config.annual_expenses, today)?;
    if let Some(outcome) = &fire {
        info!(
            target = outcome.target,
            success_rate = outcome.success_rate,
            "evaluated FIRE goal"
        );
    }

    let summary = BatchSummary::from_batch(&batch, &config.inputs, fire);
    Ok(SimulationRun {
        report: SimulationReport {
            allocation: config.allocation.clone(),
            historical,
            summary,
        },
        batch,
    })
}

pub async fn run_simulation(
    config: &RunConfig,
    source: &dyn PriceSource,
    today: NaiveDate,
) -> Result<SimulationRun, AppError> {
    let series = fetch_price_series(config, source, today).await?;
    simulate_from_prices(config, &series, today)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::Write;

    use chrono::NaiveDate;

    pub fn synthetic_prices_csv(
        tickers: &[(&str, f64, f64)],
        start: NaiveDate,
        end: NaiveDate,
    ) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        let header: Vec<&str> = tickers.iter().map(|(t, _, _)| *t).collect();
        writeln!(file, "date,{}", header.join(",")).expect("write header");

        for (i, date) in start.iter_days().take_while(|d| *d <= end).enumerate() {
            let t = i as f64 / 365.0;
            let cells: Vec<String> = tickers
                .iter()
                .map(|(_, base, growth)| {
                    let wiggle = 1.0 + 0.03 * (i as f64 / 17.0).sin();
                    format!("{:.4}", base * (1.0 + growth).powf(t) * wiggle)
                })
                .collect();
            writeln!(file, "{},{}", date.format("%Y-%m-%d"), cells.join(",")).expect("write row");
        }
        file
    }
}

use chrono::{Datelike, Days, Months, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::info;

use super::error::{FireError, Result};
use super::types::{MonthlyMatrix, SimulatedPath, SimulationBatch, SimulationInputs};

pub const SAVINGS_ACCOUNT_RATE: f64 = 0.02;
const MONTHS_PER_YEAR: u32 = 12;

pub fn simulate(observations: &[f64], inputs: &SimulationInputs) -> Result<SimulationBatch> {
    inputs.validate()?;
    if observations.is_empty() {
        return Err(FireError::EmptyObservations);
    }
    if observations.iter().any(|r| !r.is_finite()) {
        return Err(FireError::InvalidInput(
            "return observations must be finite".to_string(),
        ));
    }

    info!(
        simulations = inputs.simulations,
        years = inputs.years,
        observations = observations.len(),
        seed = inputs.seed,
        "running monte carlo simulation"
    );

    let paths = (0..inputs.simulations)
        .into_par_iter()
        .map(|run_id| {
            let mut rng = StdRng::seed_from_u64(derive_seed(inputs.seed, run_id));
            let annual_rates = draw_annual_rates(observations, inputs.years, &mut rng);
            compound_path(inputs, &annual_rates)
        })
        .collect();

    Ok(SimulationBatch {
        years: inputs.years,
        start_amount: inputs.start_amount,
        paths,
    })
}

fn draw_annual_rates<R: Rng + ?Sized>(observations: &[f64], years: u32, rng: &mut R) -> Vec<f64> {
    (0..years)
        .map(|_| observations[rng.random_range(0..observations.len())])
        .collect()
}

fn compound_path(inputs: &SimulationInputs, annual_rates: &[f64]) -> SimulatedPath {
    let monthly_contribution = inputs.annual_contribution / MONTHS_PER_YEAR as f64;
    let savings_growth = 1.0 + SAVINGS_ACCOUNT_RATE / MONTHS_PER_YEAR as f64;

    let mut balance = inputs.start_amount;
    let mut savings = inputs.start_amount;
    let mut rate_proxy = 1.0;
    let mut values = Vec::with_capacity(annual_rates.len() * MONTHS_PER_YEAR as usize + 1);
    values.push(balance);

    for &annual_rate in annual_rates {
        let growth = 1.0 + annual_rate / MONTHS_PER_YEAR as f64 / 100.0;
        for _ in 0..MONTHS_PER_YEAR {
            rate_proxy *= growth;
            balance = balance * growth + monthly_contribution;
            savings = savings * savings_growth + monthly_contribution;
            values.push(balance);
        }
    }

    SimulatedPath {
        values,
        rate_proxy,
        savings_comparison: savings,
    }
}

fn derive_seed(base_seed: u64, run_id: u32) -> u64 {
    let mixed = base_seed ^ ((run_id as u64) << 32) ^ run_id as u64;
    splitmix64(mixed)
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

impl SimulationBatch {
    pub fn final_values(&self) -> Vec<f64> {
        self.paths.iter().map(SimulatedPath::final_value).collect()
    }

    pub fn path_len(&self) -> usize {
        self.years as usize * MONTHS_PER_YEAR as usize + 1
    }

    pub fn monthly_matrix(&self, today: NaiveDate) -> Result<MonthlyMatrix> {
        let first = today
            .checked_add_months(Months::new(1))
            .and_then(month_end)
            .ok_or_else(|| date_out_of_range(today))?;

        let months = (0..self.path_len() as u32)
            .map(|offset| {
                first
                    .checked_add_months(Months::new(offset))
                    .and_then(month_end)
                    .ok_or_else(|| date_out_of_range(first))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut columns: Vec<Vec<f64>> = self
            .paths
            .iter()
            .map(|path| path.values.iter().map(|v| v.round()).collect())
            .collect();
        columns.sort_by(|a: &Vec<f64>, b: &Vec<f64>| {
            let a_end = a.last().copied().unwrap_or(0.0);
            let b_end = b.last().copied().unwrap_or(0.0);
            a_end.total_cmp(&b_end)
        });

        Ok(MonthlyMatrix { months, columns })
    }
}

fn month_end(date: NaiveDate) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1)?
        .checked_add_months(Months::new(1))?
        .checked_sub_days(Days::new(1))
}

fn date_out_of_range(date: NaiveDate) -> FireError {
    FireError::InvalidInput(format!("monthly axis starting {date} overflows the calendar"))
}

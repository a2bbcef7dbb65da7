use chrono::{Months, NaiveDate};
use serde::Serialize;

use super::error::{FireError, Result};
use super::types::{SimulatedPath, SimulationBatch};

/// Safe withdrawal rate used to turn annual spending into a portfolio target.
pub const FIRE_WITHDRAWAL_RATE: f64 = 0.03;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FireOutcome {
    pub annual_expense: f64,
    pub withdrawal_rate: f64,
    pub target: f64,
    pub success_rate: f64,
    pub paths_reaching_target: usize,
    pub average_months_to_target: Option<f64>,
    pub target_date: Option<NaiveDate>,
    #[serde(skip)]
    pub first_crossing_months: Vec<Option<usize>>,
}

pub fn fire_target(annual_expense: f64) -> f64 {
    annual_expense / FIRE_WITHDRAWAL_RATE
}

pub fn success_rate(batch: &SimulationBatch, target: f64) -> f64 {
    if batch.paths.is_empty() {
        return 0.0;
    }
    let winners = batch
        .paths
        .iter()
        .filter(|path| path.final_value() >= target)
        .count();
    winners as f64 / batch.paths.len() as f64
}

pub fn first_crossing_month(path: &SimulatedPath, target: f64) -> Option<usize> {
    path.values.iter().position(|&value| value >= target)
}

/// Evaluates the FIRE goal for `annual_expense`, or returns `None` when no
/// spending target was given.
///
/// The average crossing month only covers runs that reach the target at some
/// point; runs that never do are left out rather than counted at the horizon.
pub fn evaluate_fire_goal(
    batch: &SimulationBatch,
    annual_expense: f64,
    today: NaiveDate,
) -> Result<Option<FireOutcome>> {
    if !annual_expense.is_finite() || annual_expense < 0.0 {
        return Err(FireError::InvalidInput(
            "annual expenses must be a finite amount >= 0".to_string(),
        ));
    }
    if annual_expense == 0.0 {
        return Ok(None);
    }

    let target = fire_target(annual_expense);
    let first_crossing_months: Vec<Option<usize>> = batch
        .paths
        .iter()
        .map(|path| first_crossing_month(path, target))
        .collect();

    let reached: Vec<usize> = first_crossing_months.iter().flatten().copied().collect();
    let average_months_to_target = if reached.is_empty() {
        None
    } else {
        Some(reached.iter().sum::<usize>() as f64 / reached.len() as f64)
    };
    let target_date = average_months_to_target
        .and_then(|months| today.checked_add_months(Months::new(months.trunc() as u32)));

    Ok(Some(FireOutcome {
        annual_expense,
        withdrawal_rate: FIRE_WITHDRAWAL_RATE,
        target,
        success_rate: success_rate(batch, target),
        paths_reaching_target: reached.len(),
        average_months_to_target,
        target_date,
        first_crossing_months,
    }))
}

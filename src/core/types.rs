use chrono::NaiveDate;
use serde::Serialize;

use super::error::{FireError, Result};

/// Allowed drift of the allocation weight sum away from 1.0.
pub const ALLOCATION_TOLERANCE: f64 = 1e-9;

/// Bond share above which the default portfolio stops shifting out of stocks.
pub const MAX_BOND_FRACTION: f64 = 0.85;

pub const US_STOCK_FUND: &str = "VTSAX";
pub const INTL_STOCK_FUND: &str = "VGTSX";
pub const BOND_FUND: &str = "VBMFX";

#[derive(Debug, Clone)]
pub struct SimulationInputs {
    pub start_amount: f64,
    pub annual_contribution: f64,
    pub years: u32,
    pub simulations: u32,
    pub seed: u64,
}

impl SimulationInputs {
    pub fn validate(&self) -> Result<()> {
        if !self.start_amount.is_finite() || self.start_amount < 0.0 {
            return Err(FireError::InvalidInput(
                "starting balance must be a finite amount >= 0".to_string(),
            ));
        }
        if !self.annual_contribution.is_finite() || self.annual_contribution < 0.0 {
            return Err(FireError::InvalidInput(
                "annual contribution must be a finite amount >= 0".to_string(),
            ));
        }
        if self.years == 0 {
            return Err(FireError::InvalidInput(
                "years to model must be > 0".to_string(),
            ));
        }
        if self.simulations == 0 {
            return Err(FireError::InvalidInput(
                "number of simulations must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn months(&self) -> usize {
        self.years as usize * 12
    }

    /// Balance with contributions but no growth at all.
    pub fn do_nothing_amount(&self) -> f64 {
        self.start_amount + self.annual_contribution * self.years as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub ticker: String,
    pub weight: f64,
}

/// Ticker weights, kept in the order they were given.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioAllocation {
    holdings: Vec<Holding>,
}

impl PortfolioAllocation {
    pub fn new<I, S>(weights: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let holdings: Vec<Holding> = weights
            .into_iter()
            .map(|(ticker, weight)| Holding {
                ticker: ticker.into(),
                weight,
            })
            .collect();

        if holdings.is_empty() {
            return Err(FireError::EmptyAllocation);
        }
        for holding in &holdings {
            if !holding.weight.is_finite() || holding.weight < 0.0 {
                return Err(FireError::InvalidWeight {
                    ticker: holding.ticker.clone(),
                    weight: holding.weight,
                });
            }
        }

        let total: f64 = holdings.iter().map(|h| h.weight).sum();
        if (total - 1.0).abs() > ALLOCATION_TOLERANCE {
            return Err(FireError::AllocationSum { total });
        }

        Ok(Self { holdings })
    }

    /// Total-market / international / bond split driven by the bond share.
    pub fn from_bond_percent(bond_percent: f64) -> Result<Self> {
        if !bond_percent.is_finite() || !(0.0..=100.0).contains(&bond_percent) {
            return Err(FireError::InvalidInput(
                "bond percentage must be between 0 and 100".to_string(),
            ));
        }
        let bonds = (bond_percent / 100.0).min(MAX_BOND_FRACTION);
        Self::new([
            (US_STOCK_FUND, (MAX_BOND_FRACTION - bonds).max(0.0)),
            (INTL_STOCK_FUND, 1.0 - MAX_BOND_FRACTION),
            (BOND_FUND, bonds),
        ])
    }

    pub fn holdings(&self) -> &[Holding] {
        &self.holdings
    }

    pub fn tickers(&self) -> Vec<String> {
        self.holdings.iter().map(|h| h.ticker.clone()).collect()
    }

    pub fn weight_of(&self, ticker: &str) -> Option<f64> {
        self.holdings
            .iter()
            .find(|h| h.ticker == ticker)
            .map(|h| h.weight)
    }
}

/// One simulated run: monthly balances plus the scalars tracked alongside.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedPath {
    pub values: Vec<f64>,
    pub rate_proxy: f64,
    pub savings_comparison: f64,
}

impl SimulatedPath {
    pub fn final_value(&self) -> f64 {
        self.values.last().copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationBatch {
    pub years: u32,
    pub start_amount: f64,
    pub paths: Vec<SimulatedPath>,
}

/// Rounded paths on a month-end axis, columns sorted by ending value.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyMatrix {
    pub months: Vec<NaiveDate>,
    pub columns: Vec<Vec<f64>>,
}

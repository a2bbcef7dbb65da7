use std::fmt::Write as _;

use serde::Serialize;

use super::goal::FireOutcome;
use super::history::ReturnAverages;
use super::types::{PortfolioAllocation, SimulationBatch, SimulationInputs};

pub const HISTOGRAM_BINS: usize = 15;
const BAR_WIDTH: usize = 40;
const BAR_CHARS: [&str; 9] = [" ", "▏", "▎", "▍", "▌", "▋", "▊", "▉", "█"];
const RULE: &str = "--------------------------------------";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BucketTail {
    Low,
    Middle,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramBucket {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
    pub percent: f64,
    pub tail: BucketTail,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Histogram {
    pub buckets: Vec<HistogramBucket>,
}

impl Histogram {
    /// Equal-width buckets spanning `values`; the last bucket includes the
    /// maximum. Buckets entirely below `low_cut` or above `high_cut` are
    /// tagged as tails.
    pub fn from_values(values: &[f64], bins: usize, low_cut: f64, high_cut: f64) -> Self {
        if values.is_empty() || bins == 0 {
            return Self {
                buckets: Vec::new(),
            };
        }

        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let (lo, hi) = if max > min {
            (min, max)
        } else {
            (min - 0.5, max + 0.5)
        };
        let width = (hi - lo) / bins as f64;

        let mut counts = vec![0_usize; bins];
        for &value in values {
            let idx = (((value - lo) / width).floor() as usize).min(bins - 1);
            counts[idx] += 1;
        }

        let total = values.len() as f64;
        let buckets = counts
            .into_iter()
            .enumerate()
            .map(|(idx, count)| {
                let lower = lo + width * idx as f64;
                let upper = if idx + 1 == bins {
                    hi
                } else {
                    lo + width * (idx + 1) as f64
                };
                let tail = if upper < low_cut {
                    BucketTail::Low
                } else if lower > high_cut {
                    BucketTail::High
                } else {
                    BucketTail::Middle
                };
                HistogramBucket {
                    lower,
                    upper,
                    count,
                    percent: 100.0 * count as f64 / total,
                    tail,
                }
            })
            .collect();

        Self { buckets }
    }

    pub fn total_count(&self) -> usize {
        self.buckets.iter().map(|b| b.count).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MarkerKind {
    Median,
    Mean,
    SavingsAccount,
    DoNothing,
    FireTarget,
}

impl MarkerKind {
    fn label(self) -> &'static str {
        match self {
            MarkerKind::Median => "Median",
            MarkerKind::Mean => "Average",
            MarkerKind::SavingsAccount => "2% Savings",
            MarkerKind::DoNothing => "Do Nothing",
            MarkerKind::FireTarget => "3% FIRE Amount",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Marker {
    pub kind: MarkerKind,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub start_amount: f64,
    pub annual_contribution: f64,
    pub years: u32,
    pub simulations: u32,
    pub seed: u64,
    pub mean_invested: f64,
    pub median_invested: f64,
    pub p10_invested: f64,
    pub p90_invested: f64,
    pub mean_rate_proxy: f64,
    pub mean_savings_account: f64,
    pub do_nothing_amount: f64,
    pub fire: Option<FireOutcome>,
    pub histogram: Histogram,
    pub markers: Vec<Marker>,
}

impl BatchSummary {
    pub fn from_batch(
        batch: &SimulationBatch,
        inputs: &SimulationInputs,
        fire: Option<FireOutcome>,
    ) -> Self {
        let mut finals = batch.final_values();
        let rates: Vec<f64> = batch.paths.iter().map(|p| p.rate_proxy).collect();
        let savings: Vec<f64> = batch.paths.iter().map(|p| p.savings_comparison).collect();

        let mean_invested = mean(&finals);
        let median_invested = percentile(&mut finals, 50.0);
        let p10_invested = percentile(&mut finals, 10.0);
        let p90_invested = percentile(&mut finals, 90.0);
        let mean_savings_account = mean(&savings);
        let do_nothing_amount = inputs.do_nothing_amount();

        let histogram = Histogram::from_values(&finals, HISTOGRAM_BINS, p10_invested, p90_invested);

        let mut markers = vec![
            Marker {
                kind: MarkerKind::Median,
                value: median_invested,
            },
            Marker {
                kind: MarkerKind::Mean,
                value: mean_invested,
            },
            Marker {
                kind: MarkerKind::SavingsAccount,
                value: mean_savings_account,
            },
            Marker {
                kind: MarkerKind::DoNothing,
                value: do_nothing_amount,
            },
        ];
        if let Some(outcome) = &fire {
            markers.push(Marker {
                kind: MarkerKind::FireTarget,
                value: outcome.target,
            });
        }

        Self {
            start_amount: inputs.start_amount,
            annual_contribution: inputs.annual_contribution,
            years: inputs.years,
            simulations: inputs.simulations,
            seed: inputs.seed,
            mean_invested,
            median_invested,
            p10_invested,
            p90_invested,
            mean_rate_proxy: mean(&rates),
            mean_savings_account,
            do_nothing_amount,
            fire,
            histogram,
            markers,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    pub allocation: PortfolioAllocation,
    pub historical: ReturnAverages,
    pub summary: BatchSummary,
}

pub fn welcome_text(inputs: &SimulationInputs) -> String {
    format!(
        "{RULE}\nRunning simulation to forecast \na starting portfolio value of {} \ncontributing {} annually for {} years\n{RULE}",
        format_currency(inputs.start_amount),
        format_currency(inputs.annual_contribution),
        inputs.years
    )
}

pub fn render_text(report: &SimulationReport) -> String {
    let summary = &report.summary;
    let mut out = String::new();

    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "Portfolio allocation");
    for holding in report.allocation.holdings() {
        let _ = writeln!(out, "  {:<8} {:>6.2}%", holding.ticker, holding.weight * 100.0);
    }

    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(
        out,
        "Overall Average Returns for all {} time periods.",
        report.historical.windows
    );
    for average in &report.historical.per_ticker {
        let _ = writeln!(out, "  {:<12} {:>8.2}", average.ticker, average.average_return);
    }
    let _ = writeln!(out, "  {:<12} {:>8.2}", "Total_value", report.historical.total);

    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "Overall Average Results of Simulation");
    let _ = writeln!(out, "  {:<12} {:>16.2}", "Rate", summary.mean_rate_proxy);
    let _ = writeln!(out, "  {:<12} {:>16.2}", "Invested", summary.mean_invested);
    let _ = writeln!(out, "  {:<12} {:>16.2}", "Savings_Acct", summary.mean_savings_account);
    let _ = writeln!(out, "  Median: {}", format_currency(summary.median_invested));
    let _ = writeln!(
        out,
        "  10th-90th percentile: {} - {}",
        format_currency(summary.p10_invested),
        format_currency(summary.p90_invested)
    );

    if let Some(fire) = &summary.fire {
        let _ = writeln!(out, "{RULE}");
        let _ = writeln!(out, "FIRE Goal used: {}", format_currency(fire.target));
        let _ = writeln!(
            out,
            "% of scenarios meeting FIRE Goal: {:.2}%",
            fire.success_rate * 100.0
        );
        match fire.target_date {
            Some(date) => {
                let _ = writeln!(
                    out,
                    "Average Date to reach FIRE Goal: {}",
                    date.format("%m/%Y")
                );
            }
            None => {
                let _ = writeln!(out, "Average Date to reach FIRE Goal: not reached");
            }
        }
    }

    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "Simulated Return Value Probabilities");
    out.push_str(&render_histogram(&summary.histogram));
    for marker in &summary.markers {
        let _ = writeln!(
            out,
            "  <- {:<15} {}",
            marker.kind.label(),
            format_currency(marker.value)
        );
    }

    out
}

fn render_histogram(histogram: &Histogram) -> String {
    let max_count = histogram
        .buckets
        .iter()
        .map(|b| b.count)
        .max()
        .unwrap_or(0);
    let mut out = String::new();

    for bucket in &histogram.buckets {
        let tag = match bucket.tail {
            BucketTail::Low => " low",
            BucketTail::Middle => "",
            BucketTail::High => " high",
        };
        let _ = writeln!(
            out,
            "  {:>15} - {:<15} |{:<width$}| {:>6} {:>4.0}%{tag}",
            format_currency(bucket.lower),
            format_currency(bucket.upper),
            bar(bucket.count, max_count),
            bucket.count,
            bucket.percent,
            width = BAR_WIDTH,
        );
    }

    out
}

fn bar(count: usize, max_count: usize) -> String {
    if max_count == 0 {
        return String::new();
    }
    let eighths = (count * BAR_WIDTH * 8) / max_count;
    let mut out = BAR_CHARS[8].repeat(eighths / 8);
    if eighths % 8 > 0 {
        out.push_str(BAR_CHARS[eighths % 8]);
    }
    out
}

/// Whole-dollar amount with thousands separators, truncated toward zero.
pub fn format_currency(value: f64) -> String {
    let dollars = value.abs().trunc() as u64;
    let digits = dollars.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    if value <= -1.0 {
        format!("-${grouped}")
    } else {
        format!("${grouped}")
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn percentile(values: &mut [f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    values.sort_by(|a, b| a.total_cmp(b));

    let n = values.len();
    if n == 1 {
        return values[0];
    }

    let rank = (p / 100.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        values[lower]
    } else {
        let w = rank - lower as f64;
        values[lower] * (1.0 - w) + values[upper] * w
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::simulate;
    use crate::core::goal::evaluate_fire_goal;
    use crate::core::history::TickerAverage;
    use chrono::NaiveDate;
    use proptest::prelude::{prop_assert_eq, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn sample_inputs() -> SimulationInputs {
        SimulationInputs {
            start_amount: 25_000.0,
            annual_contribution: 10_000.0,
            years: 20,
            simulations: 400,
            seed: 2024,
        }
    }

    fn sample_report(annual_expense: f64) -> SimulationReport {
        let inputs = sample_inputs();
        let batch = simulate(&[-20.0, -5.0, 3.0, 8.0, 10.0, 14.0, 25.0], &inputs).unwrap();
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let fire = evaluate_fire_goal(&batch, annual_expense, today).unwrap();
        let allocation = PortfolioAllocation::from_bond_percent(15.0).unwrap();
        SimulationReport {
            historical: ReturnAverages {
                windows: 3,
                per_ticker: allocation
                    .holdings()
                    .iter()
                    .map(|h| TickerAverage {
                        ticker: h.ticker.clone(),
                        average_return: 6.5,
                    })
                    .collect(),
                total: 6.5,
            },
            allocation,
            summary: BatchSummary::from_batch(&batch, &inputs, fire),
        }
    }

    #[test]
    fn percentile_interpolates_between_ranks() {
        let mut values = vec![4.0, 1.0, 3.0, 2.0];
        assert_approx(percentile(&mut values, 50.0), 2.5);
        assert_approx(percentile(&mut values, 0.0), 1.0);
        assert_approx(percentile(&mut values, 100.0), 4.0);
        assert_approx(percentile(&mut values, 10.0), 1.3);
        assert_approx(percentile(&mut [], 50.0), 0.0);
    }

    #[test]
    fn format_currency_groups_thousands() {
        assert_eq!(format_currency(0.0), "$0");
        assert_eq!(format_currency(999.99), "$999");
        assert_eq!(format_currency(1_000.0), "$1,000");
        assert_eq!(format_currency(1_234_567.8), "$1,234,567");
        assert_eq!(format_currency(-45_000.0), "-$45,000");
    }

    #[test]
    fn histogram_tags_tails_and_keeps_maximum_in_last_bucket() {
        let values: Vec<f64> = (0..=100).map(|v| v as f64).collect();
        let histogram = Histogram::from_values(&values, 10, 15.0, 85.0);

        assert_eq!(histogram.buckets.len(), 10);
        assert_eq!(histogram.total_count(), 101);
        assert_eq!(histogram.buckets[9].count, 11);
        assert_approx(histogram.buckets[9].upper, 100.0);
        assert_eq!(histogram.buckets[0].tail, BucketTail::Low);
        assert_eq!(histogram.buckets[1].tail, BucketTail::Middle);
        assert_eq!(histogram.buckets[8].tail, BucketTail::Middle);
        assert_eq!(histogram.buckets[9].tail, BucketTail::High);
    }

    #[test]
    fn histogram_of_identical_values_uses_unit_range() {
        let histogram = Histogram::from_values(&[7.0, 7.0, 7.0], 15, 7.0, 7.0);
        assert_eq!(histogram.total_count(), 3);
        assert_approx(histogram.buckets[0].lower, 6.5);
        assert_approx(histogram.buckets[14].upper, 7.5);
        assert_eq!(histogram.buckets[7].count, 3);
        assert_approx(histogram.buckets[7].percent, 100.0);
    }

    #[test]
    fn summary_statistics_match_batch() {
        let report = sample_report(40_000.0);
        let summary = &report.summary;

        assert_eq!(summary.histogram.buckets.len(), HISTOGRAM_BINS);
        assert_eq!(summary.histogram.total_count(), 400);
        assert!(summary.p10_invested <= summary.median_invested);
        assert!(summary.median_invested <= summary.p90_invested);
        assert_approx(summary.do_nothing_amount, 25_000.0 + 10_000.0 * 20.0);
        assert_eq!(summary.markers.len(), 5);
        assert_eq!(summary.markers[4].kind, MarkerKind::FireTarget);
        assert_approx(summary.markers[4].value, 40_000.0 / 0.03);
    }

    #[test]
    fn summary_without_expense_omits_fire_marker() {
        let report = sample_report(0.0);
        assert!(report.summary.fire.is_none());
        assert!(
            report
                .summary
                .markers
                .iter()
                .all(|m| m.kind != MarkerKind::FireTarget)
        );
        assert!(!render_text(&report).contains("FIRE Goal used"));
    }

    #[test]
    fn text_report_contains_headline_lines() {
        let report = sample_report(40_000.0);
        let text = render_text(&report);
        assert!(text.contains("Overall Average Returns for all 3 time periods."));
        assert!(text.contains("Overall Average Results of Simulation"));
        assert!(text.contains("FIRE Goal used: $1,333,333"));
        assert!(text.contains("% of scenarios meeting FIRE Goal:"));
        assert!(text.contains("Average Date to reach FIRE Goal:"));
        assert!(text.contains("Simulated Return Value Probabilities"));
        assert!(text.contains("<- Do Nothing"));
        assert!(text.contains("VTSAX"));
    }

    #[test]
    fn welcome_text_formats_amounts() {
        let text = welcome_text(&sample_inputs());
        assert!(text.contains("a starting portfolio value of $25,000"));
        assert!(text.contains("contributing $10,000 annually for 20 years"));
    }

    #[test]
    fn summary_serializes_with_camel_case_keys() {
        let report = sample_report(40_000.0);
        let json = serde_json::to_string(&report).expect("report should serialize");
        assert!(json.contains("\"medianInvested\""));
        assert!(json.contains("\"meanSavingsAccount\""));
        assert!(json.contains("\"successRate\""));
        assert!(json.contains("\"targetDate\""));
        assert!(json.contains("\"perTicker\""));
        assert!(!json.contains("firstCrossingMonths"));
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(32))]

        #[test]
        fn prop_histogram_counts_every_value(
            values in proptest::collection::vec(-1_000_000.0_f64..5_000_000.0, 1..300),
            bins in 1_usize..30,
        ) {
            let histogram = Histogram::from_values(&values, bins, 0.0, 0.0);
            prop_assert_eq!(histogram.buckets.len(), bins);
            prop_assert_eq!(histogram.total_count(), values.len());
        }
    }
}

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use chrono::Local;
use clap::{Args, Parser, Subcommand};

use super::{
    AppError, DEFAULT_LOOKBACK_YEARS, DEFAULT_SIMULATIONS, RunParams, build_run_config,
    run_http_server, run_simulation, write_paths_csv,
};
use crate::core::{render_text, welcome_text};
use crate::market::{CsvSource, PriceSource, YahooSource};

#[derive(Parser, Debug)]
#[command(
    name = "fire-sim",
    version,
    about = "Monte Carlo FIRE simulator bootstrapped from historical one-year fund returns",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
    #[command(flatten)]
    run: RunArgs,
    #[arg(
        long,
        global = true,
        env = "FIRE_SIM_PROXY",
        help = "HTTP(S) proxy for market data requests"
    )]
    proxy: Option<String>,
    #[arg(
        long,
        global = true,
        help = "Read daily closes from a CSV file (date column plus one column per ticker) instead of downloading"
    )]
    prices_csv: Option<PathBuf>,
    #[arg(short, long, global = true, help = "Log at debug level; RUST_LOG overrides")]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the simulator as a JSON API
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    #[arg(long, help = "Current investment balance; prompted for when omitted")]
    current_balance: Option<f64>,
    #[arg(long, help = "Current annual contributions; prompted for when omitted")]
    annual_contribution: Option<f64>,
    #[arg(long, help = "How many years out to model; prompted for when omitted")]
    years: Option<u32>,
    #[arg(
        long,
        help = "Current annual expenses, 0 to skip the FIRE goal; prompted for when omitted"
    )]
    annual_expenses: Option<f64>,
    #[arg(
        long,
        help = "Percent of the portfolio in bonds (capped at 85); prompted for when no --fund is given"
    )]
    bond_percent: Option<f64>,
    #[arg(
        long = "fund",
        value_name = "TICKER=WEIGHT",
        value_parser = parse_fund,
        help = "Custom holding as a fraction, repeatable; weights must add up to 1"
    )]
    funds: Vec<(String, f64)>,
    #[arg(long, default_value_t = DEFAULT_SIMULATIONS)]
    simulations: u32,
    #[arg(
        long,
        default_value_t = DEFAULT_LOOKBACK_YEARS,
        help = "Years of price history to derive returns from"
    )]
    lookback_years: u32,
    #[arg(long, env = "FIRE_SIM_SEED", help = "Seed for reproducible runs")]
    seed: Option<u64>,
    #[arg(long, help = "Write every simulated monthly path to this CSV file")]
    export_paths: Option<PathBuf>,
    #[arg(long, help = "Print the report as JSON")]
    json: bool,
}

pub async fn run_cli(cli: Cli) -> Result<(), AppError> {
    let source = price_source(cli.prices_csv.as_deref(), cli.proxy.as_deref())?;
    match cli.command {
        Some(Command::Serve { port }) => {
            run_http_server(port, source).await?;
            Ok(())
        }
        None => run_once(cli.run, source.as_ref()).await,
    }
}

fn price_source(
    prices_csv: Option<&Path>,
    proxy: Option<&str>,
) -> Result<Arc<dyn PriceSource>, AppError> {
    let source: Arc<dyn PriceSource> = match prices_csv {
        Some(path) => Arc::new(CsvSource::new(path)),
        None => Arc::new(YahooSource::new(proxy)?),
    };
    Ok(source)
}

async fn run_once(args: RunArgs, source: &dyn PriceSource) -> Result<(), AppError> {
    let params = {
        let stdin = std::io::stdin();
        let mut input = stdin.lock();
        let mut output = std::io::stdout();
        collect_params(&args, &mut input, &mut output)?
    };
    let config = build_run_config(params)?;

    if !args.json {
        println!("{}", welcome_text(&config.inputs));
    }

    let today = Local::now().date_naive();
    let run = run_simulation(&config, source, today).await?;

    if let Some(path) = &args.export_paths {
        write_paths_csv(path, &run.batch.monthly_matrix(today)?)?;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&run.report)?);
    } else {
        print!("{}", render_text(&run.report));
    }
    Ok(())
}

fn collect_params<R: BufRead, W: Write>(
    args: &RunArgs,
    input: &mut R,
    output: &mut W,
) -> Result<RunParams, AppError> {
    let current_balance = or_prompt(args.current_balance, input, output, "Current investment balance")?;
    let annual_contribution =
        or_prompt(args.annual_contribution, input, output, "Current annual contributions")?;
    let years = or_prompt(args.years, input, output, "How many years out to model")?;
    let annual_expenses = or_prompt(args.annual_expenses, input, output, "Current annual expenses")?;
    let bond_percent = if args.funds.is_empty() {
        Some(or_prompt(args.bond_percent, input, output, "% of the portfolio in bonds")?)
    } else {
        args.bond_percent
    };

    Ok(RunParams {
        current_balance,
        annual_contribution,
        years,
        annual_expenses,
        bond_percent,
        funds: args.funds.clone(),
        simulations: args.simulations,
        lookback_years: args.lookback_years,
        seed: args.seed,
    })
}

fn or_prompt<T, R, W>(value: Option<T>, input: &mut R, output: &mut W, label: &str) -> Result<T, AppError>
where
    T: FromStr,
    R: BufRead,
    W: Write,
{
    match value {
        Some(v) => Ok(v),
        None => prompt_value(input, output, label),
    }
}

fn prompt_value<T, R, W>(input: &mut R, output: &mut W, label: &str) -> Result<T, AppError>
where
    T: FromStr,
    R: BufRead,
    W: Write,
{
    loop {
        write!(output, "{label}: ")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Err(AppError::Config(format!("no value given for \"{label}\"")));
        }
        match line.trim().replace(',', "").parse::<T>() {
            Ok(v) => return Ok(v),
            Err(_) => writeln!(output, "Please enter a number.")?,
        }
    }
}

fn parse_fund(raw: &str) -> Result<(String, f64), String> {
    let (ticker, weight) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected TICKER=WEIGHT, got {raw:?}"))?;
    let ticker = ticker.trim().to_uppercase();
    if ticker.is_empty() {
        return Err(format!("missing ticker in {raw:?}"));
    }
    let weight = weight
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid weight in {raw:?}: {e}"))?;
    Ok((ticker, weight))
}

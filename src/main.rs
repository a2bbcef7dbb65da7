use clap::Parser;
use fire_sim::api::{Cli, run_cli};
use fire_sim::logging::{LoggingConfig, init_logging};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = init_logging(&LoggingConfig::new(cli.verbose)) {
        eprintln!("Failed to initialise logging: {e}");
    }

    if let Err(e) = run_cli(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

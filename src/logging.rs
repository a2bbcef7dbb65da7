use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub default_level: String,
    pub ansi: bool,
}

impl LoggingConfig {
    pub fn new(verbose: bool) -> Self {
        Self {
            default_level: if verbose { "debug" } else { "info" }.to_string(),
            ansi: true,
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_level))
    }
}

/// Installs the global subscriber. Logs go to stderr so stdout carries only
/// the report.
pub fn init_logging(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(config.filter())
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(config.ansi)
                .with_target(false),
        )
        .try_init()?;
    Ok(())
}

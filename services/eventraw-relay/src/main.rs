//! EventRaw relay command line.
//!
//! ```text
//! eventraw-relay [--config <path>] <start_time> <end_time>
//! ```
//!
//! Publishes every raw event whose start timestamp lies in the inclusive
//! range, then prints a summary of the run.

use anyhow::{Context, Result};
use clap::Parser;
use nier_eventraw_relay::config::ServiceConfig;
use nier_eventraw_relay::{AmqpProducer, Relay, RelayConfig, RunSummary, TimeRange};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(
    name = "eventraw-relay",
    version,
    about = "Relay raw event records to the backhaul broker",
    after_help = "Example: eventraw-relay 1761868800 1762127999",
    allow_negative_numbers = true
)]
struct Cli {
    /// Additional configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Start of the range (inclusive), matched against EventStartTimeStamp
    start_time: String,

    /// End of the range (inclusive)
    end_time: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = RelayConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    init_logging(&config.service)?;
    config.validate().context("Invalid configuration")?;

    info!(
        service = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        "Starting EventRaw relay"
    );

    let producer = AmqpProducer::connect(&config.amqp_uri())
        .await
        .with_context(|| format!("Failed to connect to broker at {}:{}", config.amqp.host, config.amqp.port))?;

    let relay = Relay::new(config, Arc::new(producer));
    let summary = relay
        .run(TimeRange::parse(&cli.start_time, &cli.end_time))
        .await
        .context("Relay run failed")?;

    print_summary(&summary);
    Ok(())
}

/// Initialize the tracing/logging subsystem.
fn init_logging(config: &ServiceConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level)
            .with_context(|| format!("Invalid log level: {}", config.log_level))?,
    };

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.log_format == "json" {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber.with(fmt::layer().with_target(false)).init();
    }

    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("Total rows of records found: {}", summary.rows_found);
    println!(
        "Published: {}  Dropped: {}  Skipped: {}",
        summary.published, summary.dropped, summary.skipped
    );
    println!("Device Info: {}", summary.identity);
    println!("Device Company Serial: {}", summary.identity.company_serial);
}

//! Vireo resolver service daemon.

use anyhow::Result;
use clap::Parser;
use std::str::FromStr;
use tokio::signal;
use tracing::info;
use vireo::log::{self, LogSeverity};
use vireo::service::ResolverService;

/// On-device stub DNS resolver service.
#[derive(Parser, Debug)]
#[command(name = "vireod")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log severity (verbose, debug, info, warning, error).
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let severity = LogSeverity::from_str(&cli.log_level)
        .map_err(|()| anyhow::anyhow!("unknown log level {:?}", cli.log_level))?;
    log::init(severity);

    let service = ResolverService::new();
    info!(version = env!("CARGO_PKG_VERSION"), "vireo resolver service started");

    // The platform control surface drives the service from here on;
    // the daemon just keeps the runtime alive until it is told to go.
    signal::ctrl_c().await?;
    info!("shutdown signal received");
    drop(service);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["vireod"]).unwrap();
        assert_eq!(cli.log_level, "info");

        let cli = Cli::try_parse_from(["vireod", "-l", "debug"]).unwrap();
        assert_eq!(cli.log_level, "debug");
    }
}

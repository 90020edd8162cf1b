//! # spyn - synfire integration harness
//!
//! Runs synfire chain scenarios against the reference simulator and checks
//! or converts their recordings.

use clap::Parser;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use spyn_cli::config::CliConfig;
use spyn_cli::SpynCli;

fn main() {
    let cli = SpynCli::parse();

    let config = match CliConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Failed to load configuration: {}", err);
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over --verbose and the config file
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level(&config)));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Err(err) = cli.execute(&config) {
        error!("Command failed: {}", err);
        std::process::exit(1);
    }
}

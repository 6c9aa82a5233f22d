//! singmic: virtual microphone session server.
//!
//! Phones running the companion app connect over UDP, pick a screen, and stream
//! raw microphone audio while a performance is running. The operator drives the
//! performance lifecycle from the stdin console.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use singmic_server::{cli, runtime};

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,singmic_server=info")
        }))
        .init();

    let config = runtime::resolve_config(&args)?;
    runtime::run_server(config, !args.no_console)
}

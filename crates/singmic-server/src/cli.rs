use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "singmic", version = VERSION)]
pub struct Args {
    /// TOML config file; CLI flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// UDP bind address for the session engine, e.g. 0.0.0.0:12000
    #[arg(long)]
    pub bind: Option<SocketAddr>,

    /// Number of microphones offered to connected devices
    #[arg(long)]
    pub mic_capacity: Option<u32>,

    /// Directory for per-device raw audio captures
    #[arg(long)]
    pub capture_dir: Option<PathBuf>,

    /// Do not read operator commands from stdin (stop with Ctrl-C)
    #[arg(long)]
    pub no_console: bool,
}

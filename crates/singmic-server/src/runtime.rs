//! Server runtime helpers.
//!
//! Resolves configuration, starts the session engine thread, and wires the
//! operator console and Ctrl-C handler to it.

use anyhow::{Context, Result, anyhow};

use crate::cli::Args;
use crate::config::{EngineConfig, ServerConfig};
use crate::console;
use crate::engine::{self, Engine, EngineHandle};
use crate::transport::UdpTransport;

/// Merge the optional config file with CLI overrides.
pub fn resolve_config(args: &Args) -> Result<EngineConfig> {
    let file = match args.config.as_deref() {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    let mut config = EngineConfig::from_server_config(&file)?;
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(capacity) = args.mic_capacity {
        config.mic_capacity = capacity;
    }
    if let Some(dir) = args.capture_dir.clone() {
        config.capture_dir = dir;
    }
    Ok(config)
}

/// Bind the UDP socket and start the engine on its own thread.
pub fn spawn_engine(
    config: EngineConfig,
) -> Result<(EngineHandle, std::thread::JoinHandle<Result<()>>)> {
    let transport = UdpTransport::bind(config.bind)?;
    tracing::info!(bind = %transport.local_addr()?, "session engine listening");
    let (handle, cmd_rx) = engine::channel();
    let join = std::thread::Builder::new()
        .name("session-engine".to_string())
        .spawn(move || Engine::new(transport, config).run(cmd_rx))
        .context("spawn session engine thread")?;
    Ok((handle, join))
}

/// Run the server until the console exits or Ctrl-C is pressed.
pub fn run_server(config: EngineConfig, with_console: bool) -> Result<()> {
    let (handle, join) = spawn_engine(config)?;

    {
        let handle = handle.clone();
        let _ = ctrlc::set_handler(move || {
            tracing::info!("interrupt received");
            let _ = handle.shutdown();
        });
    }

    if with_console {
        let handle = handle.clone();
        std::thread::Builder::new()
            .name("console".to_string())
            .spawn(move || {
                let stdin = std::io::stdin();
                if let Err(e) = console::run_console(&handle, stdin.lock(), std::io::stdout()) {
                    tracing::warn!("console error: {e:#}");
                    let _ = handle.shutdown();
                }
            })
            .context("spawn console thread")?;
    }

    join.join()
        .map_err(|_| anyhow!("session engine thread panicked"))??;
    Ok(())
}

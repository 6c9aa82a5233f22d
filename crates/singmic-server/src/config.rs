//! Configuration loading and parsing.
//!
//! An optional TOML file provides the base values; CLI flags override them.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_BIND: &str = "0.0.0.0:12000";
/// Port the mic app listens on; replies always go here.
pub const DEFAULT_PEER_PORT: u16 = 12000;
pub const DEFAULT_MIC_CAPACITY: u32 = 2;
const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(10);
const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(300);
const DEFAULT_IDLE_SLEEP: Duration = Duration::from_millis(1);

/// Server configuration file schema. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// UDP bind address (host:port).
    pub bind: Option<String>,
    /// Port peers receive on.
    pub peer_port: Option<u16>,
    /// Number of microphones offered to peers.
    pub mic_capacity: Option<u32>,
    /// Directory for per-peer capture files.
    pub capture_dir: Option<String>,
    /// Idle time before a keepalive probe is sent (seconds).
    pub keepalive_secs: Option<u64>,
    /// Debounce before a peer-state broadcast (milliseconds).
    pub settle_ms: Option<u64>,
    /// Sleep between polls of an idle socket (milliseconds).
    pub idle_sleep_ms: Option<u64>,
}

impl ServerConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg = toml::from_str::<ServerConfig>(&raw)
            .with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }
}

/// Resolved settings for the session engine.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub bind: SocketAddr,
    pub peer_port: u16,
    pub mic_capacity: u32,
    pub keepalive_interval: Duration,
    pub settle_delay: Duration,
    pub idle_sleep: Duration,
    pub capture_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PEER_PORT)),
            peer_port: DEFAULT_PEER_PORT,
            mic_capacity: DEFAULT_MIC_CAPACITY,
            keepalive_interval: DEFAULT_KEEPALIVE,
            settle_delay: DEFAULT_SETTLE_DELAY,
            idle_sleep: DEFAULT_IDLE_SLEEP,
            capture_dir: PathBuf::from("."),
        }
    }
}

impl EngineConfig {
    /// Apply file values on top of the defaults.
    pub fn from_server_config(cfg: &ServerConfig) -> Result<Self> {
        let mut out = Self::default();
        if let Some(bind) = cfg.bind.as_deref() {
            out.bind = bind.parse().with_context(|| format!("parse bind {bind}"))?;
        }
        if let Some(port) = cfg.peer_port {
            out.peer_port = port;
        }
        if let Some(capacity) = cfg.mic_capacity {
            out.mic_capacity = capacity;
        }
        if let Some(dir) = capture_dir_from_config(cfg) {
            out.capture_dir = dir;
        }
        if let Some(secs) = cfg.keepalive_secs {
            out.keepalive_interval = Duration::from_secs(secs);
        }
        if let Some(ms) = cfg.settle_ms {
            out.settle_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = cfg.idle_sleep_ms {
            out.idle_sleep = Duration::from_millis(ms);
        }
        Ok(out)
    }
}

/// Extract the capture directory, ignoring blank values.
fn capture_dir_from_config(cfg: &ServerConfig) -> Option<PathBuf> {
    cfg.capture_dir.as_deref().and_then(|dir| {
        let trimmed = dir.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(PathBuf::from(trimmed))
        }
    })
}

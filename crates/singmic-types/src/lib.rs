use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use singmic_proto::PeerState;

/// Lifecycle of the karaoke recording performance.
///
/// Only the operator moves this; peers never trigger a transition.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceState {
    /// Microphones are not offered to peers.
    #[default]
    Disabled,
    /// Microphones are offered; nothing is recorded yet.
    Enabled,
    /// Peers sing; audio is captured per peer.
    Started,
    /// Capture finished for the current song.
    Stopped,
}

impl PerformanceState {
    /// Console verb for this state (`disable`, `enable`, `start`, `stop`).
    pub fn verb(self) -> &'static str {
        match self {
            PerformanceState::Disabled => "disable",
            PerformanceState::Enabled => "enable",
            PerformanceState::Started => "start",
            PerformanceState::Stopped => "stop",
        }
    }
}

impl fmt::Display for PerformanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

impl FromStr for PerformanceState {
    type Err = String;

    /// Accepts both the console verb and the state name, case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disable" | "disabled" => Ok(PerformanceState::Disabled),
            "enable" | "enabled" => Ok(PerformanceState::Enabled),
            "start" | "started" => Ok(PerformanceState::Started),
            "stop" | "stopped" => Ok(PerformanceState::Stopped),
            other => Err(format!("unknown performance state `{other}`")),
        }
    }
}

/// Point-in-time view of one connected peer.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerStatus {
    /// Peer IP address (session identity).
    pub address: String,
    /// Position in the peer list, as broadcast in peer-state packets.
    pub slot: usize,
    /// Screen the device currently shows.
    pub peer_state: PeerState,
    /// Next outbound sequence number.
    pub sequence: u32,
    /// `true` while a capture file is open for this peer.
    pub capturing: bool,
    /// Seconds since the session was created.
    pub connected_secs: u64,
}

/// Engine status reported on operator request.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineStatus {
    pub performance: PerformanceState,
    pub mic_capacity: u32,
    /// Capacity minus peers in mic state; negative when overcommitted.
    pub mic_available: i32,
    pub peers: Vec<PeerStatus>,
}

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, Sender};
use singmic_types::{EngineStatus, PerformanceState};

/// Commands accepted by the session engine loop.
///
/// This is the only way other threads reach the engine; it drains the
/// channel once per loop iteration.
#[derive(Debug)]
pub enum EngineCommand {
    /// The playlist changed; peers should refetch it.
    PlaylistChanged,
    SetPerformance(PerformanceState),
    /// Announce the playlist entry now playing.
    AnnounceCurrentSong { entry_id: u32 },
    AnnounceCatalogueRefresh,
    Snapshot(Sender<EngineStatus>),
    Shutdown,
}

/// Cloneable handle for sending commands to the engine thread.
#[derive(Clone, Debug)]
pub struct EngineHandle {
    cmd_tx: Sender<EngineCommand>,
}

/// Create a connected handle/receiver pair.
pub fn channel() -> (EngineHandle, Receiver<EngineCommand>) {
    let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
    (EngineHandle { cmd_tx }, cmd_rx)
}

impl EngineHandle {
    pub fn notify_playlist_changed(&self) -> Result<()> {
        self.send(EngineCommand::PlaylistChanged)
    }

    pub fn set_performance_state(&self, target: PerformanceState) -> Result<()> {
        self.send(EngineCommand::SetPerformance(target))
    }

    pub fn announce_current_song(&self, entry_id: u32) -> Result<()> {
        self.send(EngineCommand::AnnounceCurrentSong { entry_id })
    }

    pub fn announce_catalogue_refresh(&self) -> Result<()> {
        self.send(EngineCommand::AnnounceCatalogueRefresh)
    }

    /// Ask the engine to stop after its current iteration.
    pub fn shutdown(&self) -> Result<()> {
        self.send(EngineCommand::Shutdown)
    }

    /// Request a status snapshot, waiting at most `timeout`.
    pub fn snapshot(&self, timeout: Duration) -> Result<EngineStatus> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.send(EngineCommand::Snapshot(tx))?;
        rx.recv_timeout(timeout).context("engine status reply")
    }

    fn send(&self, cmd: EngineCommand) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| anyhow!("session engine is not running"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_methods_enqueue_commands_in_order() {
        let (handle, rx) = channel();
        handle.notify_playlist_changed().unwrap();
        handle
            .set_performance_state(PerformanceState::Started)
            .unwrap();
        handle.announce_current_song(12).unwrap();

        assert!(matches!(rx.try_recv(), Ok(EngineCommand::PlaylistChanged)));
        assert!(matches!(
            rx.try_recv(),
            Ok(EngineCommand::SetPerformance(PerformanceState::Started))
        ));
        assert!(matches!(
            rx.try_recv(),
            Ok(EngineCommand::AnnounceCurrentSong { entry_id: 12 })
        ));
    }

    #[test]
    fn send_fails_once_engine_is_gone() {
        let (handle, rx) = channel();
        drop(rx);
        assert!(handle.shutdown().is_err());
    }

    #[test]
    fn snapshot_times_out_without_engine_reply() {
        let (handle, _rx) = channel();
        assert!(handle.snapshot(Duration::from_millis(10)).is_err());
    }
}

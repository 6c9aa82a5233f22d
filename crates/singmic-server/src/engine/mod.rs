//! UDP session engine.
//!
//! A single loop owns every session: it drains operator commands, polls the
//! socket once, fully handles at most one datagram, and runs timers (keepalive
//! sweep when idle, debounced peer-state broadcast when due). Nothing else
//! touches session state, so sequence numbers and slot indices need no locks.
//!
//! Peers are never evicted; a peer that stops answering keepalives stays in the
//! registry until it sends Disconnect.

mod handle;
mod peers;
mod performance;
mod reliability;


use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, TryRecvError};
use singmic_proto::{Packet, PacketType};
use singmic_types::{EngineStatus, PeerStatus, PerformanceState};

use crate::capture::CaptureStore;
use crate::config::EngineConfig;
use crate::session::SessionRegistry;
use crate::transport::Transport;

pub use handle::{EngineCommand, EngineHandle, channel};

/// Largest datagram the engine accepts.
const RECV_BUFFER_LEN: usize = 15_000;

pub struct Engine<T: Transport> {
    transport: T,
    config: EngineConfig,
    sessions: SessionRegistry,
    captures: CaptureStore,
    performance: PerformanceState,
    /// When the pending peer-state broadcast should go out.
    peers_broadcast_due: Option<Instant>,
}

impl<T: Transport> Engine<T> {
    pub fn new(transport: T, config: EngineConfig) -> Self {
        let captures = CaptureStore::new(config.capture_dir.clone());
        Self {
            transport,
            config,
            sessions: SessionRegistry::default(),
            captures,
            performance: PerformanceState::default(),
            peers_broadcast_due: None,
        }
    }

    /// Run until a shutdown command arrives or every handle is dropped.
    pub fn run(mut self, commands: Receiver<EngineCommand>) -> Result<()> {
        let mut buf = vec![0u8; RECV_BUFFER_LEN];
        tracing::info!(
            mic_capacity = self.config.mic_capacity,
            capture_dir = ?self.config.capture_dir,
            "session engine running"
        );

        'running: loop {
            loop {
                match commands.try_recv() {
                    Ok(cmd) => {
                        if !self.apply_command(cmd, Instant::now()) {
                            break 'running;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        tracing::info!("command channel closed");
                        break 'running;
                    }
                }
            }

            self.poll_once(&mut buf);
            self.run_due_broadcasts(Instant::now());
        }

        self.shutdown();
        Ok(())
    }

    fn poll_once(&mut self, buf: &mut [u8]) {
        match self.transport.recv_from(buf) {
            Ok(Some((n, from))) => {
                if let Err(e) = self.handle_datagram(from, &buf[..n], Instant::now()) {
                    tracing::warn!(peer = %from, "datagram dropped: {e:#}");
                }
            }
            Ok(None) => {
                std::thread::sleep(self.config.idle_sleep);
                self.keepalive_sweep(Instant::now());
            }
            Err(e) => {
                tracing::warn!("udp receive error: {e}");
                std::thread::sleep(self.config.idle_sleep);
            }
        }
    }

    /// Apply one operator command. Returns `false` when the loop should stop.
    pub(crate) fn apply_command(&mut self, cmd: EngineCommand, now: Instant) -> bool {
        match cmd {
            EngineCommand::PlaylistChanged => self.refresh_playlist(now),
            EngineCommand::SetPerformance(target) => self.set_performance_state(target, now),
            EngineCommand::AnnounceCurrentSong { entry_id } => {
                self.announce_current_song(entry_id, now)
            }
            EngineCommand::AnnounceCatalogueRefresh => self.announce_catalogue_refresh(now),
            EngineCommand::Snapshot(reply) => {
                let _ = reply.send(self.status(now));
            }
            EngineCommand::Shutdown => {
                tracing::info!("session engine stopping");
                return false;
            }
        }
        true
    }

    /// Decode and fully dispatch one datagram.
    pub(crate) fn handle_datagram(
        &mut self,
        from: SocketAddr,
        datagram: &[u8],
        now: Instant,
    ) -> Result<()> {
        let packet = Packet::decode(datagram).context("decode packet")?;
        let ip = from.ip();
        let kind = packet.packet_type;

        let peer_port = self.config.peer_port;
        let session = self.sessions.resolve(ip, now);
        if kind.requires_ack() {
            tracing::debug!(
                peer = %ip,
                kind = ?kind,
                len = packet.total_len,
                seq = packet.sequence,
                payload = %reliability::Hex(&packet.payload),
                "recv"
            );
            reliability::send_packet(
                &mut self.transport,
                peer_port,
                session,
                PacketType::Ack,
                &[],
                now,
            );
        }

        match kind {
            PacketType::Audio => self.capture_audio(ip, &packet.payload),
            PacketType::Connect | PacketType::ConnectionCode => self.accept_connection(ip, now),
            PacketType::Disconnect => self.disconnect(ip),
            PacketType::StateSelection => self.select_peer_state(ip, &packet.payload, now)?,
            PacketType::Rtt
            | PacketType::Ack
            | PacketType::ConnectionChallenge
            | PacketType::ConnectionSuccessful
            | PacketType::Error
            | PacketType::MicSet
            | PacketType::TimeSync
            | PacketType::Performance
            | PacketType::PeersState
            | PacketType::CatalogueRefresh
            | PacketType::PlaylistRefresh
            | PacketType::MicState
            | PacketType::CurrentPlaylist
            | PacketType::Telemetry
            | PacketType::Session => {
                tracing::debug!(peer = %ip, kind = ?kind, "no handler");
            }
        }
        Ok(())
    }

    /// Accept any peer without a challenge.
    fn accept_connection(&mut self, ip: IpAddr, now: Instant) {
        tracing::info!(peer = %ip, "peer connected");
        self.send_to_peer(
            ip,
            PacketType::ConnectionSuccessful,
            &singmic_proto::encode_connection_result(true),
            now,
        );
    }

    fn disconnect(&mut self, ip: IpAddr) {
        if self.sessions.remove(ip).is_some() {
            tracing::info!(peer = %ip, peers = self.sessions.len(), "peer left");
        }
    }

    /// Append raw samples to the peer's capture, or drop them if none is open.
    fn capture_audio(&mut self, ip: IpAddr, payload: &[u8]) {
        let Some(session) = self.sessions.get_mut(ip) else {
            return;
        };
        let Some(stream) = session.capture.as_mut() else {
            tracing::trace!(peer = %ip, "audio without open capture discarded");
            return;
        };
        if let Err(e) = stream.write(singmic_proto::audio_samples(payload)) {
            tracing::warn!(peer = %ip, "capture write failed: {e}");
            session.close_capture();
        }
    }

    fn refresh_playlist(&mut self, now: Instant) {
        tracing::info!("playlist changed");
        self.broadcast(PacketType::PlaylistRefresh, &[], now);
    }

    fn announce_current_song(&mut self, entry_id: u32, now: Instant) {
        tracing::info!(entry_id, "announcing current song");
        self.broadcast(
            PacketType::CurrentPlaylist,
            &singmic_proto::encode_entry_id(entry_id),
            now,
        );
    }

    fn announce_catalogue_refresh(&mut self, now: Instant) {
        tracing::info!("announcing catalogue refresh");
        self.broadcast(PacketType::CatalogueRefresh, &[], now);
    }

    pub(crate) fn status(&self, now: Instant) -> EngineStatus {
        let peers = self
            .sessions
            .iter()
            .enumerate()
            .map(|(slot, s)| PeerStatus {
                address: s.ip.to_string(),
                slot,
                peer_state: s.peer_state,
                sequence: s.sequence,
                capturing: s.capture.is_some(),
                connected_secs: now.saturating_duration_since(s.connected_at).as_secs(),
            })
            .collect();
        EngineStatus {
            performance: self.performance,
            mic_capacity: self.config.mic_capacity,
            mic_available: self.mic_available(),
            peers,
        }
    }

    /// Close every capture stream; sessions stay registered.
    fn shutdown(&mut self) {
        self.close_captures();
        tracing::info!(peers = self.sessions.len(), "session engine stopped");
    }
}

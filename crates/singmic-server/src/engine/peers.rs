//! Peer-state fan-out.
//!
//! A state selection is recorded immediately but broadcast only after the
//! settle delay. The first selection arms the deadline and later ones ride
//! along, so a device flicking between screens produces one broadcast per
//! window without holding the broadcast back indefinitely.

use std::net::IpAddr;
use std::time::Instant;

use anyhow::{Context, Result};
use singmic_proto::{MAX_PEER_STATES, PacketType, PeerState};
use singmic_types::PerformanceState;

use super::Engine;
use super::reliability::send_packet;
use crate::transport::Transport;

impl<T: Transport> Engine<T> {
    pub(super) fn select_peer_state(
        &mut self,
        ip: IpAddr,
        payload: &[u8],
        now: Instant,
    ) -> Result<()> {
        let state = singmic_proto::decode_state_selection(payload).context("state selection")?;
        if let Some(session) = self.sessions.get_mut(ip) {
            session.peer_state = state;
        }
        tracing::info!(peer = %ip, state = state.name(), "peer state selected");
        if self.peers_broadcast_due.is_none() {
            self.peers_broadcast_due = Some(now + self.config.settle_delay);
        }
        Ok(())
    }

    /// Run the pending peer-state broadcast once its deadline has passed.
    pub(crate) fn run_due_broadcasts(&mut self, now: Instant) {
        if self.peers_broadcast_due.is_some_and(|due| now >= due) {
            self.peers_broadcast_due = None;
            self.broadcast_peer_states(now);
        }
    }

    /// Send every peer its slot plus the full state vector, then mic state.
    ///
    /// The payload holds at most [`MAX_PEER_STATES`] entries; peers beyond
    /// that have no slot on the wire and are skipped.
    pub(crate) fn broadcast_peer_states(&mut self, now: Instant) {
        let peer_port = self.config.peer_port;
        let states = self.sessions.peer_states();
        if states.len() > MAX_PEER_STATES {
            tracing::warn!(
                peers = states.len(),
                max = MAX_PEER_STATES,
                "too many peers for one peer-state packet; extra peers skipped"
            );
        }
        for (slot, session) in self.sessions.iter_mut().enumerate().take(MAX_PEER_STATES) {
            let Ok(slot) = u8::try_from(slot) else {
                break;
            };
            let payload = singmic_proto::encode_peers_state(slot, &states);
            send_packet(
                &mut self.transport,
                peer_port,
                session,
                PacketType::PeersState,
                &payload,
                now,
            );
        }
        self.broadcast_mic_state(now);
    }

    /// Offer remaining microphones; suppressed while performance is disabled.
    fn broadcast_mic_state(&mut self, now: Instant) {
        if self.performance == PerformanceState::Disabled {
            tracing::debug!("mic state not sent: performance disabled");
            return;
        }
        let payload =
            singmic_proto::encode_mic_state(self.mic_available(), self.config.mic_capacity);
        self.broadcast(PacketType::MicState, &payload, now);
    }

    /// Capacity minus peers holding a mic. Not clamped.
    pub(crate) fn mic_available(&self) -> i32 {
        let in_use = i32::try_from(self.sessions.count_in(PeerState::Mic)).unwrap_or(i32::MAX);
        let capacity = i32::try_from(self.config.mic_capacity).unwrap_or(i32::MAX);
        capacity.saturating_sub(in_use)
    }
}

//! Outbound sequencing, acks and keepalive probes.
//!
//! Send and forget: nothing is retransmitted and inbound duplicates are not
//! filtered. Acks only tell the peer its packet arrived.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

use singmic_proto::{Packet, PacketType};

use super::Engine;
use crate::session::Session;
use crate::transport::Transport;

/// Stamp, encode and send one packet to a peer.
///
/// A failed send is logged; the sequence number is consumed either way.
pub(super) fn send_packet<T: Transport>(
    transport: &mut T,
    peer_port: u16,
    session: &mut Session,
    kind: PacketType,
    payload: &[u8],
    now: Instant,
) {
    let sequence = session.stamp(kind, now);
    let packet = Packet::new(kind, sequence, payload.to_vec());
    tracing::debug!(
        peer = %session.ip,
        kind = ?kind,
        seq = sequence,
        payload = %Hex(payload),
        "send"
    );
    let dest = SocketAddr::new(session.ip, peer_port);
    if let Err(e) = transport.send_to(&packet.encode(), dest) {
        tracing::warn!(peer = %dest, kind = ?kind, "udp send failed: {e}");
    }
}

/// Space-separated uppercase hex, for payload dumps.
pub(super) struct Hex<'a>(pub(super) &'a [u8]);

impl fmt::Display for Hex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{b:02X}")?;
        }
        Ok(())
    }
}

impl<T: Transport> Engine<T> {
    /// Send to one registered peer; unknown peers are ignored.
    pub(super) fn send_to_peer(
        &mut self,
        ip: IpAddr,
        kind: PacketType,
        payload: &[u8],
        now: Instant,
    ) {
        let peer_port = self.config.peer_port;
        if let Some(session) = self.sessions.get_mut(ip) {
            send_packet(&mut self.transport, peer_port, session, kind, payload, now);
        }
    }

    /// Send the same payload to every peer, in registry order.
    pub(super) fn broadcast(&mut self, kind: PacketType, payload: &[u8], now: Instant) {
        let peer_port = self.config.peer_port;
        for session in self.sessions.iter_mut() {
            send_packet(&mut self.transport, peer_port, session, kind, payload, now);
        }
        tracing::debug!(kind = ?kind, recipients = self.sessions.len(), "broadcast");
    }

    /// Probe every peer that has not been sent anything for a while.
    pub(crate) fn keepalive_sweep(&mut self, now: Instant) {
        let peer_port = self.config.peer_port;
        let interval = self.config.keepalive_interval;
        for session in self.sessions.iter_mut() {
            if now.saturating_duration_since(session.last_ping) > interval {
                send_packet(
                    &mut self.transport,
                    peer_port,
                    session,
                    PacketType::Rtt,
                    &[],
                    now,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_formats_bytes() {
        assert_eq!(Hex(&[0x01, 0xAB, 0xFF]).to_string(), "01 AB FF");
        assert_eq!(Hex(&[]).to_string(), "");
    }
}

//! Connected peers, keyed by IP address.
//!
//! Registry order is insertion order and doubles as each peer's slot index in
//! peer-state broadcasts. A peer that disconnects and comes back is appended at
//! the end again.

use std::net::IpAddr;
use std::time::Instant;

use singmic_proto::{PacketType, PeerState};

use crate::capture::CaptureStream;

/// Per-peer protocol state. Every field is initialized per instance.
#[derive(Debug)]
pub(crate) struct Session {
    pub(crate) ip: IpAddr,
    /// Next outbound sequence number.
    pub(crate) sequence: u32,
    /// Last time anything was sent to this peer.
    pub(crate) last_ping: Instant,
    pub(crate) connected_at: Instant,
    pub(crate) peer_state: PeerState,
    pub(crate) capture: Option<CaptureStream>,
}

impl Session {
    pub(crate) fn new(ip: IpAddr, now: Instant) -> Self {
        Self {
            ip,
            sequence: 0,
            last_ping: now,
            connected_at: now,
            peer_state: PeerState::default(),
            capture: None,
        }
    }

    /// Stamp an outbound packet: returns the sequence to put on the wire.
    ///
    /// Acks reuse the current value; everything else consumes it.
    pub(crate) fn stamp(&mut self, kind: PacketType, now: Instant) -> u32 {
        let seq = self.sequence;
        if kind != PacketType::Ack {
            self.sequence = self.sequence.wrapping_add(1);
        }
        self.last_ping = now;
        seq
    }

    /// Replace any open capture with `stream`.
    pub(crate) fn start_capture(&mut self, stream: CaptureStream) {
        self.close_capture();
        self.capture = Some(stream);
    }

    /// Flush and close the capture stream, if one is open.
    pub(crate) fn close_capture(&mut self) {
        let Some(stream) = self.capture.take() else {
            return;
        };
        let path = stream.path().to_path_buf();
        match stream.close() {
            Ok(bytes) => tracing::info!(peer = %self.ip, path = ?path, bytes, "capture closed"),
            Err(e) => tracing::warn!(peer = %self.ip, path = ?path, "capture close failed: {e}"),
        }
    }
}

/// Insertion-ordered session table.
#[derive(Debug, Default)]
pub(crate) struct SessionRegistry {
    sessions: Vec<Session>,
}

impl SessionRegistry {
    /// Return the session for `ip`, creating it on first contact.
    pub(crate) fn resolve(&mut self, ip: IpAddr, now: Instant) -> &mut Session {
        let idx = match self.position(ip) {
            Some(idx) => idx,
            None => {
                self.sessions.push(Session::new(ip, now));
                tracing::info!(peer = %ip, peers = self.sessions.len(), "peer entered");
                self.sessions.len() - 1
            }
        };
        &mut self.sessions[idx]
    }

    /// Drop the session for `ip`, closing its capture first.
    pub(crate) fn remove(&mut self, ip: IpAddr) -> Option<Session> {
        let idx = self.position(ip)?;
        let mut session = self.sessions.remove(idx);
        session.close_capture();
        Some(session)
    }

    #[cfg(test)]
    pub(crate) fn get(&self, ip: IpAddr) -> Option<&Session> {
        self.sessions.iter().find(|s| s.ip == ip)
    }

    pub(crate) fn get_mut(&mut self, ip: IpAddr) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.ip == ip)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.sessions.iter_mut()
    }

    pub(crate) fn len(&self) -> usize {
        self.sessions.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// 0-based slot index of `ip` in registry order.
    #[cfg(test)]
    pub(crate) fn slot_of(&self, ip: IpAddr) -> Option<usize> {
        self.position(ip)
    }

    /// Peer states in slot order.
    pub(crate) fn peer_states(&self) -> Vec<PeerState> {
        self.sessions.iter().map(|s| s.peer_state).collect()
    }

    pub(crate) fn count_in(&self, state: PeerState) -> usize {
        self.sessions.iter().filter(|s| s.peer_state == state).count()
    }

    fn position(&self, ip: IpAddr) -> Option<usize> {
        self.sessions.iter().position(|s| s.ip == ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureStore, scratch_dir};

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([192, 168, 0, last])
    }

    #[test]
    fn resolve_creates_once_with_defaults() {
        let mut reg = SessionRegistry::default();
        let now = Instant::now();
        {
            let s = reg.resolve(ip(1), now);
            assert_eq!(s.sequence, 0);
            assert_eq!(s.peer_state, PeerState::Home);
            assert!(s.capture.is_none());
            s.sequence = 5;
        }
        assert_eq!(reg.resolve(ip(1), now).sequence, 5);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn new_sessions_do_not_share_state() {
        let mut reg = SessionRegistry::default();
        let now = Instant::now();
        reg.resolve(ip(1), now).peer_state = PeerState::Mic;
        let later = now + std::time::Duration::from_secs(3);
        let b = reg.resolve(ip(2), later);
        assert_eq!(b.peer_state, PeerState::Home);
        assert_eq!(b.connected_at, later);
        assert_eq!(reg.get(ip(1)).unwrap().connected_at, now);
    }

    #[test]
    fn slots_follow_insertion_order() {
        let mut reg = SessionRegistry::default();
        let now = Instant::now();
        for n in 1..=3 {
            reg.resolve(ip(n), now);
        }
        assert_eq!(reg.slot_of(ip(1)), Some(0));
        assert_eq!(reg.slot_of(ip(3)), Some(2));

        reg.remove(ip(1));
        assert_eq!(reg.slot_of(ip(2)), Some(0));
        assert_eq!(reg.slot_of(ip(3)), Some(1));

        reg.resolve(ip(1), now);
        assert_eq!(reg.slot_of(ip(1)), Some(2));
        assert_eq!(reg.slot_of(ip(9)), None);
    }

    #[test]
    fn stamp_skips_sequence_for_acks() {
        let now = Instant::now();
        let mut s = Session::new(ip(1), now);
        assert_eq!(s.stamp(PacketType::Ack, now), 0);
        assert_eq!(s.stamp(PacketType::Rtt, now), 0);
        assert_eq!(s.stamp(PacketType::Ack, now), 1);
        assert_eq!(s.stamp(PacketType::PeersState, now), 1);
        assert_eq!(s.sequence, 2);
    }

    #[test]
    fn stamp_refreshes_last_ping() {
        let now = Instant::now();
        let mut s = Session::new(ip(1), now);
        let later = now + std::time::Duration::from_secs(11);
        s.stamp(PacketType::Ack, later);
        assert_eq!(s.last_ping, later);
    }

    #[test]
    fn remove_closes_capture() {
        let dir = scratch_dir("session-remove");
        let store = CaptureStore::new(&dir);
        let mut reg = SessionRegistry::default();
        let s = reg.resolve(ip(7), Instant::now());
        s.start_capture(store.open(ip(7)).unwrap());
        s.capture.as_mut().unwrap().write(&[1, 2]).unwrap();

        let removed = reg.remove(ip(7)).unwrap();
        assert!(removed.capture.is_none());
        assert!(reg.is_empty());
        assert_eq!(std::fs::read(store.path_for(ip(7))).unwrap(), vec![1, 2]);
        assert!(reg.remove(ip(7)).is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn count_in_tracks_mic_holders() {
        let mut reg = SessionRegistry::default();
        let now = Instant::now();
        reg.resolve(ip(1), now).peer_state = PeerState::Mic;
        reg.resolve(ip(2), now).peer_state = PeerState::Playlist;
        reg.resolve(ip(3), now).peer_state = PeerState::Mic;
        assert_eq!(reg.count_in(PeerState::Mic), 2);
        assert_eq!(
            reg.peer_states(),
            vec![PeerState::Mic, PeerState::Playlist, PeerState::Mic]
        );
    }
}

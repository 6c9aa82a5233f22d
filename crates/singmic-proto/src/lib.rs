//! Wire protocol primitives for the virtual microphone session server.
//!
//! Every datagram is one packet. Packet format (all integers big-endian):
//! - total_len: u32 (header + payload)
//! - type_id:   u32 (see [`PacketType`])
//! - sequence:  u32 (sender-assigned; acks do not consume one)
//! - payload:   [u8; total_len - 12]
//!
//! Payload helpers for the packet kinds the server emits live next to the
//! header codec so both sides of a conversation can share them in tests.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Size of the fixed packet header in bytes.
pub const HEADER_LEN: usize = 12;

/// Byte offset of raw samples inside an `Audio` payload.
///
/// The payload starts with a 24-byte envelope (length, type, sequence and
/// timing fields) that the server does not interpret.
pub const AUDIO_SAMPLES_OFFSET: usize = 4 + 8 + 8 + 4;

/// Most peer states a `PeersState` payload can carry (the count is one byte).
pub const MAX_PEER_STATES: usize = u8::MAX as usize;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("truncated packet ({len} bytes)")]
    Truncated { len: usize },
    #[error("unknown packet type {0}")]
    UnknownPacketType(u32),
    #[error("unknown peer state {0}")]
    UnknownPeerState(i32),
}

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Connect = 0,
    /// Peer → server.
    Disconnect = 1,
    Rtt = 2,
    Ack = 3,
    ConnectionChallenge = 4,
    /// Peer → server.
    ConnectionCode = 5,
    ConnectionSuccessful = 6,
    Error = 7,

    /// Peer → server: captured microphone samples.
    Audio = 256,
    MicSet = 257,
    TimeSync = 258,
    Performance = 259,
    StateSelection = 260,
    PeersState = 261,
    CatalogueRefresh = 262,
    PlaylistRefresh = 263,
    MicState = 264,
    CurrentPlaylist = 265,
    /// Peer → server.
    Telemetry = 266,
    Session = 267,
}

impl PacketType {
    pub fn from_u32(id: u32) -> Result<Self, DecodeError> {
        let t = match id {
            0 => PacketType::Connect,
            1 => PacketType::Disconnect,
            2 => PacketType::Rtt,
            3 => PacketType::Ack,
            4 => PacketType::ConnectionChallenge,
            5 => PacketType::ConnectionCode,
            6 => PacketType::ConnectionSuccessful,
            7 => PacketType::Error,
            256 => PacketType::Audio,
            257 => PacketType::MicSet,
            258 => PacketType::TimeSync,
            259 => PacketType::Performance,
            260 => PacketType::StateSelection,
            261 => PacketType::PeersState,
            262 => PacketType::CatalogueRefresh,
            263 => PacketType::PlaylistRefresh,
            264 => PacketType::MicState,
            265 => PacketType::CurrentPlaylist,
            266 => PacketType::Telemetry,
            267 => PacketType::Session,
            other => return Err(DecodeError::UnknownPacketType(other)),
        };
        Ok(t)
    }

    pub fn id(self) -> u32 {
        self as u32
    }

    /// Whether a received packet of this kind must be acknowledged.
    ///
    /// Audio is too frequent to ack and acks are never acked themselves.
    pub fn requires_ack(self) -> bool {
        !matches!(self, PacketType::Audio | PacketType::Ack)
    }
}

/// Screen a connected device is currently showing.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerState {
    #[default]
    Home = -1,
    Mic = 1,
    Vfx = 3,
    Playlist = 4,
}

impl PeerState {
    pub fn from_i32(v: i32) -> Result<Self, DecodeError> {
        match v {
            -1 => Ok(PeerState::Home),
            1 => Ok(PeerState::Mic),
            3 => Ok(PeerState::Vfx),
            4 => Ok(PeerState::Playlist),
            other => Err(DecodeError::UnknownPeerState(other)),
        }
    }

    pub fn value(self) -> i32 {
        self as i32
    }

    pub fn name(self) -> &'static str {
        match self {
            PeerState::Home => "home",
            PeerState::Mic => "mic",
            PeerState::Vfx => "vfx",
            PeerState::Playlist => "playlist",
        }
    }
}

/// Start/stop marker carried by a `Performance` packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformanceSignal {
    Start,
    Stop,
}

/// One decoded (or about to be encoded) datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub total_len: u32,
    pub packet_type: PacketType,
    pub sequence: u32,
    pub payload: Vec<u8>,
}

impl Packet {
    /// Build a packet, deriving `total_len` from the payload.
    pub fn new(packet_type: PacketType, sequence: u32, payload: Vec<u8>) -> Self {
        let total_len = (HEADER_LEN + payload.len()) as u32;
        Self {
            total_len,
            packet_type,
            sequence,
            payload,
        }
    }

    /// Encode header + payload into a single buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.extend_from_slice(&self.total_len.to_be_bytes());
        out.extend_from_slice(&self.packet_type.id().to_be_bytes());
        out.extend_from_slice(&self.sequence.to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Decode a datagram.
    ///
    /// `total_len` is kept as received; everything after the header is payload.
    pub fn decode(datagram: &[u8]) -> Result<Self, DecodeError> {
        if datagram.len() < HEADER_LEN {
            return Err(DecodeError::Truncated {
                len: datagram.len(),
            });
        }
        let total_len = read_u32(&datagram[0..4]);
        let packet_type = PacketType::from_u32(read_u32(&datagram[4..8]))?;
        let sequence = read_u32(&datagram[8..12]);
        Ok(Self {
            total_len,
            packet_type,
            sequence,
            payload: datagram[HEADER_LEN..].to_vec(),
        })
    }
}

fn read_u32(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

fn read_i32(b: &[u8]) -> i32 {
    i32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

/// Encode a `ConnectionSuccessful` payload: a single accepted flag byte.
pub fn encode_connection_result(accepted: bool) -> Vec<u8> {
    vec![if accepted { 1 } else { 0 }]
}

/// Encode a `PeersState` payload:
/// - slot:   u8 (receiver's index in the peer list)
/// - count:  u8
/// - states: i32 × count
///
/// Only the first [`MAX_PEER_STATES`] states are written, so the count byte
/// always matches the entries that follow.
pub fn encode_peers_state(slot: u8, states: &[PeerState]) -> Vec<u8> {
    let states = &states[..states.len().min(MAX_PEER_STATES)];
    let mut out = Vec::with_capacity(2 + 4 * states.len());
    out.push(slot);
    out.push(states.len() as u8);
    for state in states {
        out.extend_from_slice(&state.value().to_be_bytes());
    }
    out
}

/// Decode a `PeersState` payload into `(slot, states)`.
pub fn decode_peers_state(payload: &[u8]) -> Result<(u8, Vec<PeerState>), DecodeError> {
    if payload.len() < 2 {
        return Err(DecodeError::Truncated { len: payload.len() });
    }
    let slot = payload[0];
    let count = payload[1] as usize;
    if payload.len() < 2 + 4 * count {
        return Err(DecodeError::Truncated { len: payload.len() });
    }
    let states = payload[2..2 + 4 * count]
        .chunks_exact(4)
        .map(|c| PeerState::from_i32(read_i32(c)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((slot, states))
}

/// Encode a `MicState` payload: available (i32) + capacity (u32).
///
/// `available` is signed so an overcommitted capacity is reported as-is.
pub fn encode_mic_state(available: i32, capacity: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(8);
    out.extend_from_slice(&available.to_be_bytes());
    out.extend_from_slice(&capacity.to_be_bytes());
    out
}

/// Decode a `MicState` payload. Trailing bytes are ignored.
pub fn decode_mic_state(payload: &[u8]) -> Result<(i32, u32), DecodeError> {
    if payload.len() < 8 {
        return Err(DecodeError::Truncated { len: payload.len() });
    }
    Ok((read_i32(&payload[0..4]), read_u32(&payload[4..8])))
}

/// Encode a `MicSet` payload.
pub fn encode_mic_set(value: u32) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

/// Encode a `Performance` payload: `0` starts, `1` stops.
pub fn encode_performance(signal: PerformanceSignal) -> Vec<u8> {
    match signal {
        PerformanceSignal::Start => vec![0],
        PerformanceSignal::Stop => vec![1],
    }
}

/// Encode a `CurrentPlaylist` payload: the playlist entry id now playing.
pub fn encode_entry_id(entry_id: u32) -> Vec<u8> {
    entry_id.to_be_bytes().to_vec()
}

/// Decode a `StateSelection` payload (leading i32 peer state).
pub fn decode_state_selection(payload: &[u8]) -> Result<PeerState, DecodeError> {
    if payload.len() < 4 {
        return Err(DecodeError::Truncated { len: payload.len() });
    }
    PeerState::from_i32(read_i32(&payload[0..4]))
}

/// Raw sample bytes of an `Audio` payload; empty when the envelope is short.
pub fn audio_samples(payload: &[u8]) -> &[u8] {
    payload.get(AUDIO_SAMPLES_OFFSET..).unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_encode_layout() {
        let pkt = Packet::new(PacketType::MicState, 7, vec![0xAA, 0xBB]);
        let bytes = pkt.encode();
        assert_eq!(&bytes[0..4], &14u32.to_be_bytes());
        assert_eq!(&bytes[4..8], &264u32.to_be_bytes());
        assert_eq!(&bytes[8..12], &7u32.to_be_bytes());
        assert_eq!(&bytes[12..], &[0xAA, 0xBB]);
    }

    #[test]
    fn packet_decode_then_encode_preserves_bytes() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&16u32.to_be_bytes());
        raw.extend_from_slice(&260u32.to_be_bytes());
        raw.extend_from_slice(&41u32.to_be_bytes());
        raw.extend_from_slice(&1i32.to_be_bytes());
        let pkt = Packet::decode(&raw).unwrap();
        assert_eq!(pkt.packet_type, PacketType::StateSelection);
        assert_eq!(pkt.sequence, 41);
        assert_eq!(pkt.encode(), raw);
    }

    #[test]
    fn packet_encode_then_decode_roundtrip() {
        let pkt = Packet::new(PacketType::CurrentPlaylist, u32::MAX, encode_entry_id(9));
        assert_eq!(Packet::decode(&pkt.encode()).unwrap(), pkt);
    }

    #[test]
    fn packet_decode_keeps_declared_length() {
        let mut raw = Packet::new(PacketType::Telemetry, 1, vec![1, 2, 3]).encode();
        raw[3] = 99;
        let pkt = Packet::decode(&raw).unwrap();
        assert_eq!(pkt.total_len, 99);
        assert_eq!(pkt.payload, vec![1, 2, 3]);
        assert_eq!(pkt.encode(), raw);
    }

    #[test]
    fn packet_decode_rejects_short() {
        let err = Packet::decode(&[0u8; 11]).unwrap_err();
        assert_eq!(err, DecodeError::Truncated { len: 11 });
    }

    #[test]
    fn packet_decode_rejects_unknown_type() {
        let mut raw = Packet::new(PacketType::Rtt, 0, Vec::new()).encode();
        raw[4..8].copy_from_slice(&8u32.to_be_bytes());
        assert_eq!(
            Packet::decode(&raw).unwrap_err(),
            DecodeError::UnknownPacketType(8)
        );
    }

    #[test]
    fn every_type_id_maps_back() {
        for id in (0..=7).chain(256..=267) {
            assert_eq!(PacketType::from_u32(id).unwrap().id(), id);
        }
        assert!(PacketType::from_u32(255).is_err());
        assert!(PacketType::from_u32(268).is_err());
    }

    #[test]
    fn audio_and_ack_are_not_acked() {
        assert!(!PacketType::Audio.requires_ack());
        assert!(!PacketType::Ack.requires_ack());
        assert!(PacketType::Connect.requires_ack());
        assert!(PacketType::Telemetry.requires_ack());
    }

    #[test]
    fn peer_state_values() {
        assert_eq!(PeerState::default(), PeerState::Home);
        assert_eq!(PeerState::from_i32(-1).unwrap(), PeerState::Home);
        assert_eq!(PeerState::from_i32(4).unwrap(), PeerState::Playlist);
        assert_eq!(
            PeerState::from_i32(2).unwrap_err(),
            DecodeError::UnknownPeerState(2)
        );
    }

    #[test]
    fn peer_state_serializes_by_name() {
        for state in [PeerState::Home, PeerState::Mic, PeerState::Vfx, PeerState::Playlist] {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{}\"", state.name()));
            assert_eq!(serde_json::from_str::<PeerState>(&json).unwrap(), state);
        }
    }

    #[test]
    fn peers_state_payload_layout() {
        let payload = encode_peers_state(1, &[PeerState::Mic, PeerState::Home]);
        assert_eq!(payload, vec![1, 2, 0, 0, 0, 1, 0xFF, 0xFF, 0xFF, 0xFF]);
        let (slot, states) = decode_peers_state(&payload).unwrap();
        assert_eq!(slot, 1);
        assert_eq!(states, vec![PeerState::Mic, PeerState::Home]);
    }

    #[test]
    fn peers_state_rejects_truncated_vector() {
        let payload = [0u8, 2, 0, 0, 0, 1];
        assert!(decode_peers_state(&payload).is_err());
    }

    #[test]
    fn peers_state_caps_entries_at_count_byte() {
        let states = vec![PeerState::Mic; MAX_PEER_STATES + 45];
        let payload = encode_peers_state(254, &states);
        assert_eq!(payload[1], 255);
        assert_eq!(payload.len(), 2 + 4 * MAX_PEER_STATES);
        let (slot, decoded) = decode_peers_state(&payload).unwrap();
        assert_eq!(slot, 254);
        assert_eq!(decoded.len(), MAX_PEER_STATES);
    }

    #[test]
    fn mic_state_ignores_trailing_bytes() {
        let mut payload = encode_mic_state(3, 4);
        payload.push(0x7F);
        assert_eq!(decode_mic_state(&payload).unwrap(), (3, 4));
        assert_eq!(
            decode_mic_state(&payload[..7]).unwrap_err(),
            DecodeError::Truncated { len: 7 }
        );
    }

    #[test]
    fn mic_state_reports_negative_availability() {
        let payload = encode_mic_state(-1, 2);
        assert_eq!(&payload[0..4], &[0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(decode_mic_state(&payload).unwrap(), (-1, 2));
    }

    #[test]
    fn small_payloads() {
        assert_eq!(encode_connection_result(true), vec![1]);
        assert_eq!(encode_mic_set(0), vec![0, 0, 0, 0]);
        assert_eq!(encode_performance(PerformanceSignal::Start), vec![0]);
        assert_eq!(encode_performance(PerformanceSignal::Stop), vec![1]);
    }

    #[test]
    fn state_selection_needs_four_bytes() {
        assert_eq!(
            decode_state_selection(&[0, 0, 0]).unwrap_err(),
            DecodeError::Truncated { len: 3 }
        );
        assert_eq!(
            decode_state_selection(&[0, 0, 0, 3, 9]).unwrap(),
            PeerState::Vfx
        );
    }

    #[test]
    fn audio_samples_skip_envelope() {
        let mut payload = vec![0u8; AUDIO_SAMPLES_OFFSET];
        payload.extend_from_slice(&[5, 6, 7]);
        assert_eq!(audio_samples(&payload), &[5, 6, 7]);
        assert!(audio_samples(&[1, 2, 3]).is_empty());
    }
}

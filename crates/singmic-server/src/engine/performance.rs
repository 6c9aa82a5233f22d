//! Performance lifecycle: disabled → enabled → started → stopped.
//!
//! Every requested state is accepted and its side effects always run, so
//! repeating a command re-sends its broadcasts.

use std::time::Instant;

use singmic_proto::{PacketType, PerformanceSignal};
use singmic_types::PerformanceState;

use super::Engine;
use crate::transport::Transport;

impl<T: Transport> Engine<T> {
    pub(crate) fn set_performance_state(&mut self, target: PerformanceState, now: Instant) {
        let previous = std::mem::replace(&mut self.performance, target);
        tracing::info!(from = %previous, to = %target, "performance state");

        match target {
            PerformanceState::Enabled => {
                let (available, capacity) = self.enabled_mic_offer();
                tracing::debug!(available, capacity, "offering microphones");
                self.broadcast(
                    PacketType::MicState,
                    &singmic_proto::encode_mic_state(available, capacity),
                    now,
                );
                self.broadcast(PacketType::MicSet, &singmic_proto::encode_mic_set(0), now);
            }
            PerformanceState::Started => {
                self.broadcast(
                    PacketType::Performance,
                    &singmic_proto::encode_performance(PerformanceSignal::Start),
                    now,
                );
                self.open_captures();
            }
            PerformanceState::Stopped => {
                self.broadcast(
                    PacketType::Performance,
                    &singmic_proto::encode_performance(PerformanceSignal::Stop),
                    now,
                );
                self.close_captures();
            }
            PerformanceState::Disabled => {
                self.broadcast(
                    PacketType::MicState,
                    &singmic_proto::encode_mic_state(0, 0),
                    now,
                );
                self.close_captures();
            }
        }
    }

    /// MicState sent on enable: the connected peer count as "available",
    /// plus the configured capacity.
    pub(super) fn enabled_mic_offer(&self) -> (i32, u32) {
        let peers = i32::try_from(self.sessions.len()).unwrap_or(i32::MAX);
        (peers, self.config.mic_capacity)
    }

    /// Open a fresh capture for every connected peer.
    fn open_captures(&mut self) {
        for session in self.sessions.iter_mut() {
            match self.captures.open(session.ip) {
                Ok(stream) => {
                    tracing::info!(peer = %session.ip, path = ?stream.path(), "capture opened");
                    session.start_capture(stream);
                }
                Err(e) => {
                    session.close_capture();
                    tracing::warn!(peer = %session.ip, "capture open failed: {e}");
                }
            }
        }
    }

    pub(super) fn close_captures(&mut self) {
        for session in self.sessions.iter_mut() {
            session.close_capture();
        }
    }
}

//! A single wand's audio state

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::SocketAddr;

use crate::audio::buffer::{JitterBuffer, JitterBufferStats, PushOutcome};
use crate::audio::mixer::Crossfader;
use crate::protocol::frame::AudioPacket;

/// Connection lifecycle. UDP wands stay `Open` for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Lifecycle {
    /// Accepting data
    Open,
    /// Peer disconnected; remaining ready packets may still be mixed
    Closing,
    /// Excluded from mixing; awaiting removal from the registry
    Closed,
}

/// Jitter buffer, crossfade tail and lifecycle of one wand
pub struct ClientSlot {
    address: SocketAddr,
    lifecycle: Lifecycle,
    buffer: JitterBuffer,
    crossfader: Crossfader,
    connected_at: DateTime<Utc>,
}

impl ClientSlot {
    pub fn new(address: SocketAddr, buffer_limit: usize, max_queue_depth: usize, fade_length: usize) -> Self {
        Self {
            address,
            lifecycle: Lifecycle::Open,
            buffer: JitterBuffer::new(buffer_limit, max_queue_depth),
            crossfader: Crossfader::new(fade_length),
            connected_at: Utc::now(),
        }
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Queue a packet. Closed wands accept nothing.
    pub fn enqueue(&mut self, packet: AudioPacket) -> Option<PushOutcome> {
        match self.lifecycle {
            Lifecycle::Closed => None,
            Lifecycle::Open | Lifecycle::Closing => Some(self.buffer.push(packet)),
        }
    }

    /// Raw packet, honouring the buffering state
    pub fn try_dequeue(&mut self) -> Option<AudioPacket> {
        match self.lifecycle {
            Lifecycle::Closed => None,
            Lifecycle::Open | Lifecycle::Closing => self.buffer.pop(),
        }
    }

    /// Next crossfaded chunk for the mixer
    pub fn next_chunk(&mut self) -> Option<Vec<i32>> {
        let packet = self.try_dequeue()?;
        Some(self.crossfader.process(&packet))
    }

    /// OPEN -> CLOSING. Returns false if the wand was not open.
    pub fn mark_closing(&mut self) -> bool {
        if self.lifecycle == Lifecycle::Open {
            self.lifecycle = Lifecycle::Closing;
            true
        } else {
            false
        }
    }

    /// CLOSING -> CLOSED. An open wand is never closed directly.
    pub fn close(&mut self) -> bool {
        if self.lifecycle == Lifecycle::Closing {
            self.lifecycle = Lifecycle::Closed;
            true
        } else {
            false
        }
    }

    pub fn is_buffering(&self) -> bool {
        self.buffer.is_buffering()
    }

    pub fn queue_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn prev_tail(&self) -> &[i16] {
        self.crossfader.prev_tail()
    }

    pub fn status(&self) -> ClientStatus {
        ClientStatus {
            address: self.address,
            lifecycle: self.lifecycle,
            connected_at: self.connected_at,
            buffer: self.buffer.stats(),
        }
    }
}

/// Serializable view of a wand's audio state
#[derive(Debug, Clone, Serialize)]
pub struct ClientStatus {
    pub address: SocketAddr,
    pub lifecycle: Lifecycle,
    pub connected_at: DateTime<Utc>,
    pub buffer: JitterBufferStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot() -> ClientSlot {
        ClientSlot::new("127.0.0.1:9000".parse().unwrap(), 2, 8, 2)
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut slot = slot();
        assert_eq!(slot.lifecycle(), Lifecycle::Open);
        assert!(!slot.close());

        assert!(slot.mark_closing());
        assert!(!slot.mark_closing());
        assert_eq!(slot.lifecycle(), Lifecycle::Closing);

        assert!(slot.close());
        assert_eq!(slot.lifecycle(), Lifecycle::Closed);
        assert!(!slot.mark_closing());
    }

    #[test]
    fn test_closed_slot_rejects_audio() {
        let mut slot = slot();
        slot.enqueue(vec![1; 8]);
        slot.mark_closing();
        slot.close();

        assert!(slot.enqueue(vec![1; 8]).is_none());
        assert!(slot.try_dequeue().is_none());
        assert!(slot.next_chunk().is_none());
    }

    #[test]
    fn test_new_slot_starts_silent() {
        let slot = slot();
        assert_eq!(slot.prev_tail(), &[0, 0]);
        assert!(!slot.is_buffering());
        assert_eq!(slot.queue_len(), 0);
    }
}

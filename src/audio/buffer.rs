//! Per-wand jitter buffer
//!
//! Packets are played strictly in arrival order. The buffer has two modes:
//!
//! - **playing**: one packet is handed out per output tick while any remain.
//! - **buffering**: entered the moment a pop empties the queue. Nothing is
//!   handed out until more than `limit` packets have queued up again.
//!
//! The hysteresis keeps a wand on a lossy link from toggling between the two
//! modes every tick, at the cost of `limit` packets of extra latency after
//! each underrun.

use serde::Serialize;
use std::collections::VecDeque;

use crate::protocol::frame::AudioPacket;

/// What happened to a pushed packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Queued, mode unchanged
    Queued,
    /// Queued and the buffer left buffering mode
    Resumed,
    /// Queued, but the queue hit its ceiling and the oldest packet was dropped
    Overflowed,
}

/// FIFO of audio packets with buffering hysteresis
pub struct JitterBuffer {
    queue: VecDeque<AudioPacket>,
    buffering: bool,
    /// Packets needed (strictly more than) to leave buffering mode
    limit: usize,
    /// Hard ceiling on queued packets
    max_depth: usize,
    received: u64,
    delivered: u64,
    underruns: u64,
    overflows: u64,
}

impl JitterBuffer {
    /// Create an empty buffer that plays its first packet immediately
    pub fn new(limit: usize, max_depth: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(max_depth + 1),
            buffering: false,
            limit,
            max_depth: max_depth.max(limit + 1),
            received: 0,
            delivered: 0,
            underruns: 0,
            overflows: 0,
        }
    }

    /// Queue a packet
    pub fn push(&mut self, packet: AudioPacket) -> PushOutcome {
        self.queue.push_back(packet);
        self.received += 1;

        if self.queue.len() > self.max_depth {
            self.queue.pop_front();
            self.overflows += 1;
            return PushOutcome::Overflowed;
        }

        if self.buffering && self.queue.len() > self.limit {
            self.buffering = false;
            return PushOutcome::Resumed;
        }
        PushOutcome::Queued
    }

    /// Next packet, unless buffering or empty
    pub fn pop(&mut self) -> Option<AudioPacket> {
        if self.buffering {
            return None;
        }
        let packet = self.queue.pop_front()?;
        self.delivered += 1;
        if self.queue.is_empty() {
            self.buffering = true;
            self.underruns += 1;
        }
        Some(packet)
    }

    /// A packet would be returned by `pop`
    pub fn is_ready(&self) -> bool {
        !self.buffering && !self.queue.is_empty()
    }

    pub fn is_buffering(&self) -> bool {
        self.buffering
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn stats(&self) -> JitterBufferStats {
        JitterBufferStats {
            depth: self.queue.len(),
            buffering: self.buffering,
            received: self.received,
            delivered: self.delivered,
            underruns: self.underruns,
            overflows: self.overflows,
        }
    }
}

/// Jitter buffer statistics
#[derive(Debug, Clone, Serialize)]
pub struct JitterBufferStats {
    pub depth: usize,
    pub buffering: bool,
    pub received: u64,
    pub delivered: u64,
    pub underruns: u64,
    pub overflows: u64,
}

impl JitterBufferStats {
    pub fn overflow_rate(&self) -> f32 {
        if self.received == 0 {
            0.0
        } else {
            self.overflows as f32 / self.received as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(value: i16) -> AudioPacket {
        vec![value; 16]
    }

    #[test]
    fn test_fifo_order() {
        let mut buffer = JitterBuffer::new(2, 8);
        buffer.push(packet(1));
        buffer.push(packet(2));
        buffer.push(packet(3));

        assert_eq!(buffer.pop().unwrap()[0], 1);
        assert_eq!(buffer.pop().unwrap()[0], 2);
        assert_eq!(buffer.pop().unwrap()[0], 3);
    }

    #[test]
    fn test_underrun_enters_buffering() {
        let mut buffer = JitterBuffer::new(2, 8);
        buffer.push(packet(1));
        assert!(buffer.is_ready());

        assert!(buffer.pop().is_some());
        assert!(buffer.is_buffering());
        assert_eq!(buffer.stats().underruns, 1);
        assert!(buffer.pop().is_none());
    }

    #[test]
    fn test_resumes_only_past_limit() {
        let mut buffer = JitterBuffer::new(3, 16);
        buffer.push(packet(0));
        buffer.pop();
        assert!(buffer.is_buffering());

        for i in 1..=3 {
            assert_eq!(buffer.push(packet(i)), PushOutcome::Queued);
            assert!(buffer.pop().is_none(), "still buffering at depth {}", i);
        }
        assert_eq!(buffer.push(packet(4)), PushOutcome::Resumed);
        assert!(!buffer.is_buffering());

        for i in 1..=4 {
            assert_eq!(buffer.pop().unwrap()[0], i);
        }
        assert!(buffer.is_buffering());
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let mut buffer = JitterBuffer::new(2, 3);
        for i in 0..3 {
            buffer.push(packet(i));
        }
        assert_eq!(buffer.push(packet(3)), PushOutcome::Overflowed);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.pop().unwrap()[0], 1);

        let stats = buffer.stats();
        assert_eq!(stats.overflows, 1);
        assert_eq!(stats.received, 4);
        assert!((stats.overflow_rate() - 0.25).abs() < 1e-6);
    }
}

//! TCP stream deframing
//!
//! A TCP connection delivers an unbroken byte stream; frames are recovered by
//! scanning for two consecutive [`SYNC`] samples. Reads may end in the middle
//! of a sample, so raw bytes are kept and only whole samples are scanned.

use bytes::{Buf, BytesMut};

use super::frame::{samples_from_bytes, SYNC};
use crate::error::ProtocolError;

const SAMPLE_BYTES: usize = 2;
const MARKER_BYTES: usize = 2 * SAMPLE_BYTES;

/// Splits a TCP byte stream into frames
pub struct StreamDeframer {
    pending: BytesMut,
    /// Byte offset (sample aligned) below which no marker can start
    scanned: usize,
    /// Bytes allowed to accumulate without a marker
    max_frame_bytes: usize,
    /// The next terminated frame starts at an unknown position
    resyncing: bool,
}

impl StreamDeframer {
    pub fn new(max_frame_samples: usize) -> Self {
        Self {
            pending: BytesMut::with_capacity(crate::constants::TCP_READ_SIZE * 2),
            scanned: 0,
            max_frame_bytes: max_frame_samples * SAMPLE_BYTES,
            resyncing: false,
        }
    }

    /// Append bytes read from the socket
    pub fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Bytes waiting for a terminator
    pub fn pending_bytes(&self) -> usize {
        self.pending.len()
    }

    /// Next complete frame, `None` when more data is needed.
    ///
    /// An `Err` reports that the buffer outgrew the cap without a marker; the
    /// buffered bytes have been discarded and scanning continues.
    pub fn next_frame(&mut self) -> Option<Result<Vec<i16>, ProtocolError>> {
        loop {
            match self.find_marker() {
                Some(pos) => {
                    let frame = self.pending.split_to(pos);
                    self.pending.advance(MARKER_BYTES);
                    self.scanned = 0;

                    if self.resyncing {
                        self.resyncing = false;
                        continue;
                    }
                    return Some(Ok(samples_from_bytes(&frame)));
                }
                None => {
                    if self.pending.len() <= self.max_frame_bytes {
                        return None;
                    }
                    // Keep the last whole sample (it may open a marker) and
                    // any partial sample after it.
                    let whole = self.pending.len() - self.pending.len() % SAMPLE_BYTES;
                    let discard = whole.saturating_sub(SAMPLE_BYTES);
                    if discard == 0 {
                        return None;
                    }
                    self.pending.advance(discard);
                    self.scanned = 0;
                    self.resyncing = true;
                    return Some(Err(ProtocolError::FrameTooLong { bytes: discard }));
                }
            }
        }
    }

    /// Byte offset of the first marker, scanning only whole samples
    fn find_marker(&mut self) -> Option<usize> {
        let buf = &self.pending[..];
        let mut pos = self.scanned;
        while pos + MARKER_BYTES <= buf.len() {
            if sample_at(buf, pos) == SYNC && sample_at(buf, pos + SAMPLE_BYTES) == SYNC {
                return Some(pos);
            }
            pos += SAMPLE_BYTES;
        }
        self.scanned = pos;
        None
    }
}

fn sample_at(buf: &[u8], pos: usize) -> i16 {
    i16::from_ne_bytes([buf[pos], buf[pos + 1]])
}

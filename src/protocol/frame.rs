//! Wand frame layout
//!
//! Every field travels as a 16-bit signed sample in native byte order, the
//! same format as the audio that follows it.
//!
//! ```text
//! TCP:  | plugged | charged | battery | button | w | x | y | z | audio ... | SYNC | SYNC |
//! UDP:  | seq | plugged | charged | battery | button | w | x | y | z | audio ... |
//! ```

use bytes::{Buf, BufMut, BytesMut};
use serde::Serialize;

use crate::error::ProtocolError;

/// Frame terminator sample, sent twice in a row
pub const SYNC: i16 = -21846;

/// Telemetry fields preceding the audio
pub const TELEMETRY_LEN: usize = 8;

/// Header length on the TCP transport
pub const TCP_HEADER_LEN: usize = TELEMETRY_LEN;

/// Header length on the UDP transport (sequence number + telemetry)
pub const UDP_HEADER_LEN: usize = TELEMETRY_LEN + 1;

const BATTERY_FULL_SCALE: f32 = 4095.0;
const BATTERY_MAX_VOLTS: f32 = 3.7;
const QUATERNION_ZERO: f32 = 16384.0;
const QUATERNION_MAX_RAW: f32 = 32768.0;

/// One packet of PCM audio
pub type AudioPacket = Vec<i16>;

/// Orientation as a unit quaternion
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Quaternion {
    pub fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, x, y, z }
    }

    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    pub fn norm(&self) -> f32 {
        (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    fn components(&self) -> [f32; 4] {
        [self.w, self.x, self.y, self.z]
    }
}

/// Decoded telemetry header
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Telemetry {
    pub plugged_in: bool,
    pub charged: bool,
    pub battery_volts: f32,
    pub button: bool,
    pub quaternion: Quaternion,
}

impl Telemetry {
    /// Decode the eight telemetry samples. `header` must hold at least
    /// [`TELEMETRY_LEN`] samples.
    fn decode(header: &[i16]) -> Self {
        Self {
            plugged_in: header[0] == 1,
            charged: header[1] == 1,
            battery_volts: header[2] as f32 / BATTERY_FULL_SCALE * BATTERY_MAX_VOLTS,
            button: header[3] == 1,
            quaternion: Quaternion::new(
                decode_component(header[4]),
                decode_component(header[5]),
                decode_component(header[6]),
                decode_component(header[7]),
            ),
        }
    }

    /// Raw wire samples for this telemetry
    pub fn encode(&self) -> [i16; TELEMETRY_LEN] {
        let battery = (self.battery_volts / BATTERY_MAX_VOLTS * BATTERY_FULL_SCALE)
            .round()
            .clamp(0.0, BATTERY_FULL_SCALE) as i16;
        let q = self.quaternion.components();
        [
            self.plugged_in as i16,
            self.charged as i16,
            battery,
            self.button as i16,
            encode_component(q[0]),
            encode_component(q[1]),
            encode_component(q[2]),
            encode_component(q[3]),
        ]
    }
}

/// Quaternion components occupy [0, 32768]. The top value does not fit an
/// i16, so the slot is read as unsigned.
fn decode_component(raw: i16) -> f32 {
    (raw as u16 as f32 - QUATERNION_ZERO) / QUATERNION_ZERO
}

fn encode_component(value: f32) -> i16 {
    (value * QUATERNION_ZERO + QUATERNION_ZERO)
        .round()
        .clamp(0.0, QUATERNION_MAX_RAW) as u16 as i16
}

/// A frame after header decoding
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    /// Present on the UDP transport only
    pub seq_num: Option<u8>,
    pub telemetry: Telemetry,
    pub audio: AudioPacket,
}

/// Reinterpret bytes as native-endian samples. A trailing odd byte is ignored.
pub fn samples_from_bytes(bytes: &[u8]) -> Vec<i16> {
    let mut buf = bytes;
    let mut samples = Vec::with_capacity(bytes.len() / 2);
    while buf.remaining() >= 2 {
        samples.push(buf.get_i16_ne());
    }
    samples
}

/// Decode one TCP frame (terminator already removed)
pub fn decode_tcp_frame(samples: &[i16]) -> Result<DecodedFrame, ProtocolError> {
    if samples.len() < TCP_HEADER_LEN {
        return Err(ProtocolError::TruncatedHeader { samples: samples.len() });
    }
    Ok(DecodedFrame {
        seq_num: None,
        telemetry: Telemetry::decode(&samples[..TCP_HEADER_LEN]),
        audio: samples[TCP_HEADER_LEN..].to_vec(),
    })
}

/// Decode one UDP datagram. Some senders append the TCP terminator to their
/// datagrams as well; a trailing terminator is stripped.
pub fn decode_datagram(bytes: &[u8]) -> Result<DecodedFrame, ProtocolError> {
    if bytes.is_empty() {
        return Err(ProtocolError::EmptyDatagram);
    }
    let mut samples = samples_from_bytes(bytes);
    if samples.len() < UDP_HEADER_LEN {
        return Err(ProtocolError::TruncatedHeader { samples: samples.len() });
    }
    if samples.len() >= UDP_HEADER_LEN + 2 && samples[samples.len() - 2..] == [SYNC, SYNC] {
        samples.truncate(samples.len() - 2);
    }
    Ok(DecodedFrame {
        seq_num: Some(samples[0] as u8),
        telemetry: Telemetry::decode(&samples[1..UDP_HEADER_LEN]),
        audio: samples[UDP_HEADER_LEN..].to_vec(),
    })
}

/// Encode a sync-terminated TCP frame
pub fn encode_tcp_frame(telemetry: &Telemetry, audio: &[i16]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity((TCP_HEADER_LEN + audio.len() + 2) * 2);
    for sample in telemetry.encode() {
        buf.put_i16_ne(sample);
    }
    for &sample in audio {
        buf.put_i16_ne(sample);
    }
    buf.put_i16_ne(SYNC);
    buf.put_i16_ne(SYNC);
    buf.to_vec()
}

/// Encode a UDP datagram
pub fn encode_datagram(seq_num: u8, telemetry: &Telemetry, audio: &[i16]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity((UDP_HEADER_LEN + audio.len()) * 2);
    buf.put_i16_ne(seq_num as i16);
    for sample in telemetry.encode() {
        buf.put_i16_ne(sample);
    }
    for &sample in audio {
        buf.put_i16_ne(sample);
    }
    buf.to_vec()
}

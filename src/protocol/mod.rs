//! Wand wire protocol

pub mod frame;
pub mod sequence;
pub mod stream;

pub use frame::{
    decode_datagram, decode_tcp_frame, encode_datagram, encode_tcp_frame, AudioPacket,
    DecodedFrame, Quaternion, Telemetry, SYNC,
};
pub use sequence::{is_stale, seq_diff};
pub use stream::StreamDeframer;

//! Shared helpers for relay integration tests

#![allow(dead_code)]

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use wand_relay::audio::AudioSink;
use wand_relay::config::{RelayConfig, Transport};
use wand_relay::error::AudioError;

/// Records everything the mixer writes
#[derive(Clone, Default)]
pub struct Capture {
    pub samples: Arc<Mutex<Vec<i16>>>,
    pub closed: Arc<AtomicBool>,
    pub wrote_after_close: Arc<AtomicBool>,
}

impl Capture {
    pub fn sink(&self) -> Box<dyn AudioSink> {
        Box::new(CaptureSink {
            capture: self.clone(),
            gate: None,
        })
    }

    /// A sink whose first write blocks until `gate` yields
    pub fn gated_sink(&self, gate: Receiver<()>) -> Box<dyn AudioSink> {
        Box::new(CaptureSink {
            capture: self.clone(),
            gate: Some(gate),
        })
    }

    pub fn samples(&self) -> Vec<i16> {
        self.samples.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct CaptureSink {
    capture: Capture,
    gate: Option<Receiver<()>>,
}

impl AudioSink for CaptureSink {
    fn write(&mut self, samples: &[i16]) -> Result<(), AudioError> {
        if let Some(gate) = self.gate.take() {
            let _ = gate.recv_timeout(Duration::from_secs(5));
        }
        if self.capture.closed.load(Ordering::SeqCst) {
            self.capture.wrote_after_close.store(true, Ordering::SeqCst);
            return Err(AudioError::Closed);
        }
        self.capture.samples.lock().extend_from_slice(samples);
        Ok(())
    }

    fn close(&mut self) {
        self.capture.closed.store(true, Ordering::SeqCst);
    }
}

/// Loopback relay on an ephemeral port with the status API off
pub fn test_config(transport: Transport) -> RelayConfig {
    let mut config = RelayConfig {
        transport,
        bind_address: "127.0.0.1".to_string(),
        port: 0,
        ..Default::default()
    };
    config.http.enabled = false;
    config
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// `10000 * sin(0.2 * i)` for samples `start..start + len`
pub fn sine(start: usize, len: usize) -> Vec<i16> {
    (start..start + len)
        .map(|i| (10_000.0 * (0.2 * i as f64).sin()) as i16)
        .collect()
}

pub fn max_adjacent_jump(samples: &[i16]) -> i32 {
    samples
        .windows(2)
        .map(|pair| (pair[1] as i32 - pair[0] as i32).abs())
        .max()
        .unwrap_or(0)
}

//! Crossfade mixer
//!
//! Every output tick takes at most one packet from each ready wand. Each
//! packet is blended against the previous packet's tail so that independent
//! packet boundaries do not click, then all wands are summed and clipped.
//!
//! For a packet `curr` of length `L` and fade window `F`:
//!
//! ```text
//! transition[i] = prev_tail[i] * fade_out[i] + curr[i] * fade_in[i]     i < F
//! chunk         = transition ++ curr[F .. L - F]
//! prev_tail     = curr[L - F ..]
//! ```
//!
//! so a packet contributes `L - F` output samples.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::output::AudioSink;
use crate::clients::{ClientRegistry, Lifecycle};
use crate::error::AudioError;

/// Linear crossfade state for one wand
#[derive(Debug, Clone)]
pub struct Crossfader {
    fade_out: Vec<f32>,
    fade_in: Vec<f32>,
    prev_tail: Vec<i16>,
}

impl Crossfader {
    /// Ramps run from exactly 1 to exactly 0 (and back) over `fade_length`
    /// samples. The initial tail is silence.
    pub fn new(fade_length: usize) -> Self {
        let fade_length = fade_length.max(1);
        let step = if fade_length > 1 {
            1.0 / (fade_length - 1) as f32
        } else {
            0.0
        };
        let fade_in: Vec<f32> = (0..fade_length).map(|i| i as f32 * step).collect();
        let fade_out = fade_in.iter().map(|v| 1.0 - v).collect();

        Self {
            fade_out,
            fade_in,
            prev_tail: vec![0; fade_length],
        }
    }

    pub fn fade_length(&self) -> usize {
        self.prev_tail.len()
    }

    pub fn prev_tail(&self) -> &[i16] {
        &self.prev_tail
    }

    /// Blend `curr` into the running stream and return the samples to emit
    pub fn process(&mut self, curr: &[i16]) -> Vec<i32> {
        let fade = self.fade_length();
        if curr.len() < 2 * fade {
            let mut padded = curr.to_vec();
            padded.resize(2 * fade, 0);
            return self.process(&padded);
        }

        let body_end = curr.len() - fade;
        let mut chunk = Vec::with_capacity(body_end);
        for i in 0..fade {
            let blended = self.prev_tail[i] as f32 * self.fade_out[i] + curr[i] as f32 * self.fade_in[i];
            chunk.push(blended.round() as i32);
        }
        chunk.extend(curr[fade..body_end].iter().map(|&s| s as i32));
        self.prev_tail.copy_from_slice(&curr[body_end..]);
        chunk
    }
}

/// Sum chunks sample by sample, zero-filling shorter ones, and clip to i16
pub fn mix_chunks(chunks: &[Vec<i32>]) -> Vec<i16> {
    let len = chunks.iter().map(Vec::len).max().unwrap_or(0);
    let mut sum = vec![0i64; len];
    for chunk in chunks {
        for (acc, &sample) in sum.iter_mut().zip(chunk.iter()) {
            *acc += sample as i64;
        }
    }
    sum.into_iter()
        .map(|s| s.clamp(i16::MIN as i64, i16::MAX as i64) as i16)
        .collect()
}

/// Pull one crossfaded chunk from every ready wand.
///
/// A closing wand keeps delivering while it has ready packets; once it has
/// none it is closed and removed from the registry.
pub fn collect_tick(registry: &ClientRegistry) -> Vec<Vec<i32>> {
    let mut chunks = Vec::new();
    let mut closed = Vec::new();

    for (addr, client) in registry.active() {
        let mut slot = client.lock();
        if slot.lifecycle() == Lifecycle::Closed {
            continue;
        }
        if let Some(chunk) = slot.next_chunk() {
            chunks.push(chunk);
        } else if slot.lifecycle() == Lifecycle::Closing {
            slot.close();
            closed.push(addr);
        }
    }

    for addr in closed {
        tracing::info!("Wand {} drained, closing", addr);
        registry.reap(&addr);
    }
    chunks
}

/// Mixer counters
#[derive(Debug, Default)]
pub struct MixerStats {
    ticks: AtomicU64,
    samples_written: AtomicU64,
    write_errors: AtomicU64,
    output_underruns: AtomicU64,
}

impl MixerStats {
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn samples_written(&self) -> u64 {
        self.samples_written.load(Ordering::Relaxed)
    }

    pub fn write_errors(&self) -> u64 {
        self.write_errors.load(Ordering::Relaxed)
    }

    /// Underruns reported by the output device
    pub fn output_underruns(&self) -> u64 {
        self.output_underruns.load(Ordering::Relaxed)
    }
}

/// Output thread: mixes on every tick and writes to the sink
pub struct Mixer {
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
    stats: Arc<MixerStats>,
}

impl Mixer {
    /// Spawn the output thread. Without a sink, mixing continues (wands are
    /// still drained) but nothing is written.
    pub fn start(
        registry: Arc<ClientRegistry>,
        sink: Option<Box<dyn AudioSink>>,
        idle_sleep: Duration,
    ) -> Result<Self, AudioError> {
        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(MixerStats::default());

        let running_for_loop = running.clone();
        let stats_for_loop = stats.clone();
        let handle = thread::Builder::new()
            .name("wand-mixer".to_string())
            .spawn(move || {
                Self::run(registry, sink, idle_sleep, running_for_loop, stats_for_loop);
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        Ok(Self {
            running,
            thread_handle: Some(handle),
            stats,
        })
    }

    fn run(
        registry: Arc<ClientRegistry>,
        mut sink: Option<Box<dyn AudioSink>>,
        idle_sleep: Duration,
        running: Arc<AtomicBool>,
        stats: Arc<MixerStats>,
    ) {
        tracing::info!("Mixer started (output {})", if sink.is_some() { "enabled" } else { "disabled" });

        while running.load(Ordering::Relaxed) {
            let chunks = collect_tick(&registry);
            if chunks.is_empty() {
                thread::sleep(idle_sleep);
                continue;
            }

            let mixed = mix_chunks(&chunks);
            stats.ticks.fetch_add(1, Ordering::Relaxed);

            if let Some(output) = sink.as_mut() {
                match output.write(&mixed) {
                    Ok(()) => {
                        stats.samples_written.fetch_add(mixed.len() as u64, Ordering::Relaxed);
                        stats.output_underruns.store(output.underruns(), Ordering::Relaxed);
                    }
                    Err(e) => {
                        stats.write_errors.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!("Audio output failed, continuing without output: {}", e);
                        if let Some(mut failed) = sink.take() {
                            failed.close();
                        }
                    }
                }
            }
        }

        // Only this thread ever writes, so closing here cannot race a write.
        if let Some(mut output) = sink {
            output.close();
        }
        tracing::info!("Mixer stopped");
    }

    /// Stop the thread and wait until the sink has been closed
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                tracing::error!("Mixer thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> Arc<MixerStats> {
        self.stats.clone()
    }
}

impl Drop for Mixer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::BufferSettings;
    use parking_lot::Mutex;
    use std::net::SocketAddr;

    #[test]
    fn test_ramps_hit_endpoints() {
        let fader = Crossfader::new(6);
        assert_eq!(fader.fade_out[0], 1.0);
        assert_eq!(fader.fade_out[5], 0.0);
        assert_eq!(fader.fade_in[0], 0.0);
        assert_eq!(fader.fade_in[5], 1.0);
    }

    #[test]
    fn test_chunk_length_and_tail() {
        let mut fader = Crossfader::new(6);
        let packet: Vec<i16> = (0..32).collect();
        let chunk = fader.process(&packet);

        assert_eq!(chunk.len(), 32 - 6);
        assert_eq!(&chunk[6..], &(6..26).collect::<Vec<i32>>()[..]);
        assert_eq!(fader.prev_tail(), &[26, 27, 28, 29, 30, 31]);
    }

    #[test]
    fn test_crossfade_between_constant_packets() {
        let fade = 6;
        let mut fader = Crossfader::new(fade);
        fader.process(&vec![1000; 64]);
        let chunk = fader.process(&vec![-1000; 64]);
        let transition = &chunk[..fade];

        assert_eq!(transition[0], 1000);
        assert_eq!(transition[fade - 1], -1000);

        let max_step = 2000 / (fade as i32 - 1);
        for pair in transition.windows(2) {
            let step = pair[0] - pair[1];
            assert!(step > 0, "transition must fall monotonically");
            assert!(step <= max_step, "step {} exceeds {}", step, max_step);
        }
        // No jump where the transition meets the body
        assert!((chunk[fade] - transition[fade - 1]).abs() <= max_step);
    }

    #[test]
    fn test_first_packet_fades_in_from_silence() {
        let mut fader = Crossfader::new(4);
        let chunk = fader.process(&vec![300; 16]);
        assert_eq!(&chunk[..4], &[0, 100, 200, 300]);
    }

    #[test]
    fn test_short_packet_is_padded() {
        let mut fader = Crossfader::new(4);
        let chunk = fader.process(&[10, 10, 10]);
        assert_eq!(chunk.len(), 4);
        assert_eq!(fader.prev_tail(), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_mix_clips_instead_of_wrapping() {
        let mixed = mix_chunks(&[vec![32767; 8], vec![32767; 8]]);
        assert!(mixed.iter().all(|&s| s == i16::MAX));

        let mixed = mix_chunks(&[vec![-32768; 4], vec![-5; 4]]);
        assert!(mixed.iter().all(|&s| s == i16::MIN));
    }

    #[test]
    fn test_mix_zero_fills_short_chunks() {
        let mixed = mix_chunks(&[vec![1, 2, 3, 4], vec![10, 20]]);
        assert_eq!(mixed, vec![11, 22, 3, 4]);
        assert!(mix_chunks(&[]).is_empty());
    }

    fn settings() -> BufferSettings {
        BufferSettings {
            buffer_limit: 2,
            max_queue_depth: 16,
            fade_length: 2,
        }
    }

    #[test]
    fn test_tick_takes_one_packet_per_wand() {
        let registry = ClientRegistry::new(settings());
        let a: SocketAddr = "10.0.0.1:1000".parse().unwrap();
        let b: SocketAddr = "10.0.0.2:1000".parse().unwrap();
        registry.register(a);
        registry.register(b);
        registry.enqueue(&a, vec![100; 8]);
        registry.enqueue(&a, vec![100; 8]);
        registry.enqueue(&b, vec![50; 8]);

        let chunks = collect_tick(&registry);
        assert_eq!(chunks.len(), 2);
        assert_eq!(mix_chunks(&chunks)[3], 150);

        // b is now buffering, a still has one packet
        let chunks = collect_tick(&registry);
        assert_eq!(chunks.len(), 1);
        assert!(collect_tick(&registry).is_empty());
    }

    #[test]
    fn test_closing_wand_drains_then_reaps() {
        let registry = ClientRegistry::new(settings());
        let a: SocketAddr = "10.0.0.1:1000".parse().unwrap();
        registry.register(a);
        registry.enqueue(&a, vec![1; 8]);
        registry.enqueue(&a, vec![1; 8]);
        registry.mark_closing(&a);

        assert_eq!(collect_tick(&registry).len(), 1);
        assert_eq!(collect_tick(&registry).len(), 1);
        assert!(collect_tick(&registry).is_empty());
        assert!(registry.get(&a).is_none());
    }

    struct CaptureSink {
        written: Arc<Mutex<Vec<i16>>>,
        closed: Arc<AtomicBool>,
    }

    impl AudioSink for CaptureSink {
        fn write(&mut self, samples: &[i16]) -> Result<(), AudioError> {
            if self.closed.load(Ordering::SeqCst) {
                return Err(AudioError::Closed);
            }
            self.written.lock().extend_from_slice(samples);
            Ok(())
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_mixer_thread_writes_and_closes_sink() {
        let registry = Arc::new(ClientRegistry::new(settings()));
        let a: SocketAddr = "10.0.0.1:1000".parse().unwrap();
        registry.register(a);
        registry.enqueue(&a, vec![7; 8]);

        let written = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let sink = CaptureSink {
            written: written.clone(),
            closed: closed.clone(),
        };
        let mut mixer = Mixer::start(registry, Some(Box::new(sink)), Duration::from_millis(1)).unwrap();
        assert!(mixer.is_running());

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while written.lock().is_empty() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        mixer.stop();

        assert!(!mixer.is_running());
        assert_eq!(written.lock().len(), 8 - 2);
        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(mixer.stats().write_errors(), 0);
    }

    /// Reports one device underrun per write
    struct StarvedSink {
        writes: u64,
    }

    impl AudioSink for StarvedSink {
        fn write(&mut self, _samples: &[i16]) -> Result<(), AudioError> {
            self.writes += 1;
            Ok(())
        }

        fn close(&mut self) {}

        fn underruns(&self) -> u64 {
            self.writes
        }
    }

    #[test]
    fn test_sink_underruns_reach_mixer_stats() {
        let registry = Arc::new(ClientRegistry::new(settings()));
        let a: SocketAddr = "10.0.0.1:1000".parse().unwrap();
        registry.register(a);
        registry.enqueue(&a, vec![7; 8]);
        registry.enqueue(&a, vec![7; 8]);

        let mut mixer =
            Mixer::start(registry, Some(Box::new(StarvedSink { writes: 0 })), Duration::from_millis(1)).unwrap();
        let stats = mixer.stats();
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while stats.ticks() < 2 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        mixer.stop();

        assert_eq!(stats.ticks(), 2);
        assert_eq!(stats.output_underruns(), 2);
    }

    struct PanickingSink;

    impl AudioSink for PanickingSink {
        fn write(&mut self, _samples: &[i16]) -> Result<(), AudioError> {
            panic!("device driver fault");
        }

        fn close(&mut self) {}
    }

    #[test]
    fn test_stop_survives_panicked_thread() {
        let registry = Arc::new(ClientRegistry::new(settings()));
        let a: SocketAddr = "10.0.0.1:1000".parse().unwrap();
        registry.register(a);
        registry.enqueue(&a, vec![7; 8]);

        let mut mixer = Mixer::start(registry, Some(Box::new(PanickingSink)), Duration::from_millis(1)).unwrap();
        let stats = mixer.stats();
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while stats.ticks() == 0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        mixer.stop();

        assert!(!mixer.is_running());
        assert_eq!(stats.samples_written(), 0);
    }
}

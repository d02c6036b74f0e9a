//! Audio output
//!
//! The mixer writes mono 16-bit PCM through [`AudioSink`]. `write` may block
//! until earlier audio has been consumed by the device, which paces the mixer
//! to the hardware clock.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::device::get_output_device;
use crate::error::AudioError;

/// Chunks that may be queued ahead of the device
const OUTPUT_QUEUE_CHUNKS: usize = 2;

/// Longest a write may wait for the device before giving up
const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Destination for mixed audio
pub trait AudioSink: Send {
    /// Queue mono samples for playback
    fn write(&mut self, samples: &[i16]) -> Result<(), AudioError>;

    /// Release the device. Further writes fail.
    fn close(&mut self);

    /// Times the device asked for audio and found none queued
    fn underruns(&self) -> u64 {
        0
    }
}

/// cpal-backed output stream
pub struct CpalOutput {
    sender: Option<Sender<Vec<i16>>>,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
    underruns: Arc<AtomicU64>,
    device_name: String,
}

impl CpalOutput {
    /// Open an output device by index (`None` for the host default) at
    /// `sample_rate`. Mono audio is copied to every device channel.
    pub fn open(device_index: Option<usize>, sample_rate: u32) -> Result<Self, AudioError> {
        let device = get_output_device(device_index)?;
        let device_name = device.name.clone();
        let supported = device.output_config_for_rate(sample_rate)?;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();

        let (sender, receiver) = bounded::<Vec<i16>>(OUTPUT_QUEUE_CHUNKS);
        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);
        let running = Arc::new(AtomicBool::new(true));
        let underruns = Arc::new(AtomicU64::new(0));

        let running_for_loop = running.clone();
        let underruns_for_stream = underruns.clone();
        let name_for_thread = device_name.clone();

        // cpal streams are not Send everywhere, so the stream lives and dies on
        // its own thread.
        let handle = thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                let cpal_device = device.into_inner();
                let stream = match sample_format {
                    cpal::SampleFormat::I16 => {
                        build_stream::<i16>(&cpal_device, &config, receiver, underruns_for_stream)
                    }
                    cpal::SampleFormat::F32 => {
                        build_stream::<f32>(&cpal_device, &config, receiver, underruns_for_stream)
                    }
                    cpal::SampleFormat::U16 => {
                        build_stream::<u16>(&cpal_device, &config, receiver, underruns_for_stream)
                    }
                    other => Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
                };

                let stream = match stream.and_then(|s| {
                    s.play().map_err(|e| AudioError::StreamError(e.to_string()))?;
                    Ok(s)
                }) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                tracing::info!("Audio output running on {}", name_for_thread);
                while running_for_loop.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(10));
                }
                drop(stream);
                tracing::info!("Audio output on {} closed", name_for_thread);
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                sender: Some(sender),
                running,
                thread_handle: Some(handle),
                underruns,
                device_name,
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(AudioError::StreamError("output thread exited during setup".into()))
            }
        }
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

impl AudioSink for CpalOutput {
    fn write(&mut self, samples: &[i16]) -> Result<(), AudioError> {
        let sender = self.sender.as_ref().ok_or(AudioError::Closed)?;
        match sender.send_timeout(samples.to_vec(), WRITE_TIMEOUT) {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(AudioError::StreamError("output device stalled".into())),
            Err(SendTimeoutError::Disconnected(_)) => Err(AudioError::Closed),
        }
    }

    fn close(&mut self) {
        self.sender = None;
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                tracing::error!("Audio output thread panicked");
            }
        }
    }

    fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.close();
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    receiver: Receiver<Vec<i16>>,
    underruns: Arc<AtomicU64>,
) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample + FromSample<i16>,
{
    let channels = config.channels as usize;
    let mut current: Vec<i16> = Vec::new();
    let mut position = 0usize;

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let mut starved = false;
                for frame in data.chunks_mut(channels) {
                    if position >= current.len() {
                        match receiver.try_recv() {
                            Ok(chunk) => {
                                current = chunk;
                                position = 0;
                            }
                            Err(_) => {
                                current.clear();
                                position = 0;
                            }
                        }
                    }
                    let sample = match current.get(position) {
                        Some(&s) => {
                            position += 1;
                            T::from_sample(s)
                        }
                        None => {
                            starved = true;
                            T::EQUILIBRIUM
                        }
                    };
                    for out in frame.iter_mut() {
                        *out = sample;
                    }
                }
                if starved {
                    underruns.fetch_add(1, Ordering::Relaxed);
                }
            },
            move |err| {
                tracing::error!("Audio output stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamError(e.to_string()))
}

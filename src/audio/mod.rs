//! Audio subsystem module

pub mod buffer;
pub mod device;
pub mod mixer;
pub mod output;

pub use buffer::JitterBuffer;
pub use device::{get_output_device, list_output_devices, AudioDevice, OutputDeviceInfo};
pub use mixer::{Crossfader, Mixer};
pub use output::{AudioSink, CpalOutput};

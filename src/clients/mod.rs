//! Wand lifecycle and audio buffering

pub mod client;
pub mod registry;

pub use client::{ClientSlot, ClientStatus, Lifecycle};
pub use registry::{BufferSettings, ClientRegistry, SharedClient};

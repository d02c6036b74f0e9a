//! Status API
//!
//! Read-only JSON view of the relay: wands, telemetry, queues and devices.

pub mod handlers;
pub mod server;

pub use server::{AppState, WebServer};

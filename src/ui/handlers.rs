//! HTTP API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::audio::device::{list_output_devices, OutputDeviceInfo};
use crate::clients::ClientStatus;
use crate::network::ReceiverStatsSnapshot;
use crate::telemetry::TelemetrySnapshot;
use crate::ui::server::AppState;

/// API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Relay status
#[derive(Serialize)]
pub struct SystemStatus {
    pub transport: String,
    pub port: u16,
    pub wand_count: usize,
    pub active_streams: usize,
    pub uptime_seconds: u64,
    pub receiver: ReceiverStatsSnapshot,
    pub mixer_ticks: u64,
    pub samples_written: u64,
    pub output_underruns: u64,
}

/// Telemetry joined with the wand's audio state, if it has one
#[derive(Serialize)]
pub struct WandStatus {
    #[serde(flatten)]
    pub telemetry: TelemetrySnapshot,
    pub stream: Option<ClientStatus>,
}

fn wand_status(state: &AppState, telemetry: TelemetrySnapshot) -> WandStatus {
    let stream = state
        .registry
        .get(&telemetry.address)
        .map(|client| client.lock().status());
    WandStatus { telemetry, stream }
}

/// Get relay status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<ApiResponse<SystemStatus>> {
    let uptime = chrono::Utc::now().signed_duration_since(state.started_at);
    let (mixer_ticks, samples_written, output_underruns) = state
        .mixer
        .as_ref()
        .map(|m| (m.ticks(), m.samples_written(), m.output_underruns()))
        .unwrap_or_default();

    let status = SystemStatus {
        transport: state.transport.to_string(),
        port: state.port,
        wand_count: state.telemetry.len(),
        active_streams: state.registry.len(),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
        receiver: state.router.stats().snapshot(),
        mixer_ticks,
        samples_written,
        output_underruns,
    };

    Json(ApiResponse::ok(status))
}

/// Get every wand ever seen
pub async fn get_wands(State(state): State<Arc<AppState>>) -> Json<ApiResponse<Vec<WandStatus>>> {
    let wands = state
        .telemetry
        .all()
        .into_iter()
        .map(|snapshot| wand_status(&state, snapshot))
        .collect();
    Json(ApiResponse::ok(wands))
}

/// Get one wand by `ip:port`
pub async fn get_wand(
    State(state): State<Arc<AppState>>,
    Path(addr): Path<String>,
) -> (StatusCode, Json<ApiResponse<WandStatus>>) {
    let addr: SocketAddr = match addr.parse() {
        Ok(addr) => addr,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::error(format!("Invalid wand address: {}", addr))),
            )
        }
    };

    match state.telemetry.get(&addr) {
        Some(snapshot) => (StatusCode::OK, Json(ApiResponse::ok(wand_status(&state, snapshot)))),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("Unknown wand: {}", addr))),
        ),
    }
}

/// Get available output devices
pub async fn get_devices() -> (StatusCode, Json<ApiResponse<Vec<OutputDeviceInfo>>>) {
    // Device enumeration can block on some hosts
    match tokio::task::spawn_blocking(list_output_devices).await {
        Ok(devices) => (StatusCode::OK, Json(ApiResponse::ok(devices))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(e.to_string())),
        ),
    }
}

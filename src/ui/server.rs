//! HTTP server for the status API

use axum::{routing::get, Router};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::audio::mixer::MixerStats;
use crate::clients::ClientRegistry;
use crate::config::{HttpConfig, Transport};
use crate::network::PacketRouter;
use crate::relay::WandRelay;
use crate::telemetry::TelemetryStore;
use crate::ui::handlers;

/// Shared state handed to every handler
pub struct AppState {
    pub transport: Transport,
    pub port: u16,
    pub telemetry: Arc<TelemetryStore>,
    pub registry: Arc<ClientRegistry>,
    pub router: Arc<PacketRouter>,
    pub mixer: Option<Arc<MixerStats>>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn from_relay(relay: &WandRelay) -> Self {
        Self {
            transport: relay.config().transport,
            port: relay.local_addr().map(|a| a.port()).unwrap_or(relay.config().port),
            telemetry: relay.telemetry(),
            registry: relay.registry(),
            router: relay.router(),
            mixer: relay.mixer_stats(),
            started_at: Utc::now(),
        }
    }
}

/// Status API server
pub struct WebServer {
    config: HttpConfig,
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(config: HttpConfig, state: AppState) -> Self {
        Self {
            config,
            state: Arc::new(state),
        }
    }

    /// Build the route table
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/api/status", get(handlers::get_status))
            .route("/api/wands", get(handlers::get_wands))
            .route("/api/wands/:addr", get(handlers::get_wand))
            .route("/api/devices", get(handlers::get_devices))
            .layer(cors)
            .with_state(self.state.clone())
    }

    /// Serve until the task is aborted
    pub async fn run(self) -> anyhow::Result<()> {
        let addr = format!("{}:{}", self.config.bind_address, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!("Status API listening on http://{}", listener.local_addr()?);

        axum::serve(listener, self.router()).await?;
        Ok(())
    }

    /// Spawn onto the current tokio runtime
    pub fn start_background(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.run().await {
                tracing::error!("Status API failed: {}", e);
            }
        })
    }
}

//! Tandem Relay Server
//!
//! A WebSocket server that pairs anonymous strangers and brokers their
//! peer-to-peer handshake:
//!
//! 1. **Matchmaking**: participants join with a chat mode, a safe-mode flag
//!    and optional interests. Small pools match arrivals immediately; larger
//!    pools are paired by a periodic batch sweep that holds back a buffer.
//!
//! 2. **Session lifecycle**: skip and disconnect tear a pairing down, notify
//!    the other side, and put the remaining participants back at the front
//!    of the queue.
//!
//! 3. **Signaling relay**: connection proposals, acceptances and network
//!    candidates are forwarded only between current partners.
//!
//! **Privacy**: nothing is persisted. A participant exists only for as long
//! as its socket (or its idle timeout).

mod config;
mod handler;
mod matching;
mod matchmaker;
mod moderation;
mod participant;
mod pool;
mod protocol;
mod registry;
mod session;
mod signaling;
mod state;

use std::time::Duration;

use axum::{
    extract::{State, WebSocketUpgrade},
    http::Method,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use clap::Parser;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::MatchConfig;
use state::{RelayConfig, RelayState};

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "tandem-relay", version, about = "Tandem matchmaking and signaling relay")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 8080, env = "PORT")]
    port: u16,

    /// Idle time before a session expires, in seconds
    #[arg(long, default_value_t = 1800, env = "SESSION_TIMEOUT_SECS")]
    session_timeout_secs: u64,

    /// Idle-expiry sweep interval in seconds
    #[arg(long, default_value_t = 300, env = "CLEANUP_INTERVAL_SECS")]
    cleanup_interval_secs: u64,

    /// Batch matching interval in milliseconds
    #[arg(long, default_value_t = 5000, env = "BATCH_INTERVAL_MS")]
    batch_interval_ms: u64,

    /// Queue position push interval in seconds
    #[arg(long, default_value_t = 10, env = "POSITION_UPDATE_INTERVAL_SECS")]
    position_update_interval_secs: u64,

    /// Buffer held back while the pool is small
    #[arg(long, default_value_t = 3, env = "MIN_BUFFER_SIZE")]
    min_buffer_size: usize,

    /// Share of a large pool held back from each sweep, in percent
    #[arg(long, default_value_t = 20, env = "BUFFER_PERCENTAGE")]
    buffer_percentage: u32,

    /// Upper bound on the held-back buffer
    #[arg(long, default_value_t = 15, env = "MAX_BUFFER_SIZE")]
    max_buffer_size: usize,

    /// Pools smaller than this match arrivals immediately
    #[arg(long, default_value_t = 8, env = "IMMEDIATE_MATCH_THRESHOLD")]
    immediate_match_threshold: usize,

    /// Delay before a partner of a disconnected participant is re-queued, in milliseconds
    #[arg(long, default_value_t = 1000, env = "REQUEUE_DELAY_MS")]
    requeue_delay_ms: u64,

    /// Delay between notifying the skipped and the skipping side, in milliseconds
    #[arg(long, default_value_t = 100, env = "SKIP_NOTIFY_DELAY_MS")]
    skip_notify_delay_ms: u64,

    /// Estimated wait per queue position, in seconds
    #[arg(long, default_value_t = 15, env = "ESTIMATED_WAIT_PER_POSITION_SECS")]
    estimated_wait_per_position_secs: u64,

    /// Lower bound on the advertised wait, in seconds
    #[arg(long, default_value_t = 10, env = "MIN_ESTIMATED_WAIT_SECS")]
    min_estimated_wait_secs: u64,

    /// Chat messages longer than this are truncated
    #[arg(long, default_value_t = 500, env = "MAX_MESSAGE_LENGTH")]
    max_message_length: usize,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn into_config(self) -> RelayConfig {
        RelayConfig {
            port: self.port,
            matching: MatchConfig {
                session_timeout: Duration::from_secs(self.session_timeout_secs),
                cleanup_interval: Duration::from_secs(self.cleanup_interval_secs),
                batch_interval: Duration::from_millis(self.batch_interval_ms),
                position_update_interval: Duration::from_secs(self.position_update_interval_secs),
                min_buffer_size: self.min_buffer_size,
                buffer_percentage: self.buffer_percentage,
                max_buffer_size: self.max_buffer_size,
                immediate_match_threshold: self.immediate_match_threshold,
                requeue_delay: Duration::from_millis(self.requeue_delay_ms),
                skip_notify_delay: Duration::from_millis(self.skip_notify_delay_ms),
                estimated_wait_per_position_secs: self.estimated_wait_per_position_secs,
                min_estimated_wait_secs: self.min_estimated_wait_secs,
                max_message_length: self.max_message_length,
                ..MatchConfig::default()
            },
        }
    }
}

// ── Entry Point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tandem_relay=info,tower_http=info".into());
    if args.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let state = RelayState::new(args.into_config());
    let port = state.config.port;
    let timers = state.config.matching.clone();

    // ── Background Timers ─────────────────────────────────────────────────

    let sweep_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(timers.batch_interval);
        loop {
            interval.tick().await;
            sweep_state.run_batch_sweep().await;
        }
    });

    let cleanup_state = state.clone();
    let cleanup_interval = timers.cleanup_interval;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_interval);
        loop {
            interval.tick().await;
            cleanup_state.expire_idle().await;
        }
    });

    let position_state = state.clone();
    let position_interval = timers.position_update_interval;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(position_interval);
        loop {
            interval.tick().await;
            position_state.broadcast_positions().await;
        }
    });

    // Build router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", port);
    tracing::info!("Tandem relay server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app)
        .await
        .expect("Server error");
}

// ── Route Handlers ────────────────────────────────────────────────────────────

/// WebSocket upgrade handler for client connections.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<RelayState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handler::handle_websocket(socket, state))
}

/// Health check endpoint.
async fn health_handler(State(state): State<RelayState>) -> impl IntoResponse {
    let occupancy = state.occupancy().await;
    Json(json!({
        "status": "ok",
        "service": "tandem-relay",
        "version": env!("CARGO_PKG_VERSION"),
        "connected": occupancy.connected,
        "queued": occupancy.queued,
        "active_chats": occupancy.active_chats,
    }))
}

/// Pool statistics endpoint.
async fn stats_handler(State(state): State<RelayState>) -> impl IntoResponse {
    Json(json!({
        "pool": state.pool_stats().await,
        "online_clients": state.online_count(),
        "timestamp": chrono::Utc::now().timestamp_millis(),
    }))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

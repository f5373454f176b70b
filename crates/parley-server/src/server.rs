use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::StreamExt;
use parley_core::Liveness;
use parley_settings::ServerSettings;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::health::health_check;
use crate::hub::{ChatHub, Hub};
use crate::session::Session;
use crate::transport::{self, Frame};

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub liveness: Liveness,
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_settings(&ServerSettings::default())
    }
}

impl ServerConfig {
    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            liveness: settings.liveness(),
            max_message_size: settings.max_message_size,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<ChatHub>,
    pub liveness: Liveness,
    pub max_message_size: usize,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(hub: Arc<ChatHub>, config: &ServerConfig) -> Self {
        Self {
            hub,
            liveness: config.liveness,
            max_message_size: config.max_message_size,
            start_time: Instant::now(),
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind the listener and serve until `shutdown` is cancelled.
///
/// On cancellation the hub stops accepting sessions and disconnects every
/// connected client before the listener is dropped.
pub async fn start(
    config: ServerConfig,
    hub: Arc<ChatHub>,
    shutdown: CancellationToken,
) -> Result<ServerHandle, std::io::Error> {
    let router = build_router(AppState::new(Arc::clone(&hub), &config));
    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    let addr = listener.local_addr()?;

    info!(
        %addr,
        pong_wait_ms = config.liveness.pong_wait.as_millis() as u64,
        "parley server listening"
    );

    let signal = async move {
        shutdown.cancelled().await;
        let disconnected = hub.shutdown();
        info!(disconnected, "shutdown requested, no longer accepting connections");
    };

    let task = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, router)
            .with_graceful_shutdown(signal)
            .await
        {
            error!(error = %err, "server terminated with error");
        }
    });

    Ok(ServerHandle { addr, task })
}

/// Handle returned by `start()`.
pub struct ServerHandle {
    pub addr: SocketAddr,
    task: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// The serving task, for awaiting completion after shutdown.
    pub fn into_task(self) -> tokio::task::JoinHandle<()> {
        self.task
    }
}

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    user: Option<String>,
}

/// WebSocket upgrade handler. The `user` query parameter names the client.
async fn ws_handler(
    Query(query): Query<ConnectQuery>,
    State(state): State<AppState>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Some(user) = query.user.filter(|u| !u.trim().is_empty()) else {
        warn!("connection refused, no user given");
        return (StatusCode::BAD_REQUEST, "missing user query parameter").into_response();
    };
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, user, state))
}

async fn handle_socket(mut socket: WebSocket, user: String, state: AppState) {
    let hub: Arc<dyn Hub> = state.hub.clone();
    let (session, member) = Session::new(user, hub, state.liveness);

    if let Err(err) = state.hub.register(member) {
        warn!(error = %err, kind = err.error_kind(), "connection refused");
        let _ = socket
            .send(Frame::close(1001, "server shutting down").into())
            .await;
        return;
    }
    info!(
        session_id = %session.id(),
        user = %session.username(),
        connections = state.hub.connection_count(),
        "client connected"
    );

    let (sink, stream) = socket.split();
    let _ = session
        .run(transport::inbound(stream), transport::outbound(sink))
        .await;
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(health_check(
        state.start_time,
        state.hub.connection_count(),
        state.hub.messages_broadcast(),
    ))
}

//! WebSocket server: accept loop and per-connection sessions.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Upgrading each accepted connection to a WebSocket session, reading the
//!    `token` query parameter from the upgrade request to pick the
//!    connection's privilege.
//! 3. Registering the connection with [`MissionControl`], which immediately
//!    queues the current mode and layout for it.
//! 4. Running two tasks per session:
//!    - **Reader**: every text frame is handed to `MissionControl::dispatch`
//!      under the timeline lock.
//!    - **Writer**: drains the connection's bounded outbound queue into the
//!      socket, bounding every write with the configured send timeout.
//! 5. Unregistering the connection when either task ends.
//!
//! # Back-pressure (for beginners)
//!
//! Broadcasts happen while the timeline lock is held, so they must never wait
//! on a slow socket.  Each connection therefore gets a bounded `mpsc` queue
//! and broadcasts use `try_send`: if a client stops reading, its queue fills
//! up and further messages to *that* client fail, while everyone else keeps
//! receiving.  A write that takes longer than the send timeout closes the
//! session.
//!
//! [`MissionControl`]: crate::application::mission_control::MissionControl

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        http::Uri,
        Error as WsError, Message as WsMessage,
    },
};
use tracing::{debug, error, info, warn};

use mission_core::Privilege;

use crate::application::connections::{Connection, ConnectionSink, SendError};
use crate::application::mission_control::SharedMissionControl;
use crate::infrastructure::storage::config::{ConfigError, ServerConfig};

/// Settings for the WebSocket listener, resolved from [`ServerConfig`].
#[derive(Debug, Clone)]
pub struct WsServerConfig {
    pub bind_addr: SocketAddr,
    pub admin_token: Option<String>,
    pub default_privilege: Privilege,
    pub outbound_buffer: usize,
    pub send_timeout: Duration,
}

impl WsServerConfig {
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] if the bind address does not parse.
    pub fn from_config(cfg: &ServerConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            bind_addr: cfg.ws_bind_addr()?,
            admin_token: cfg.admin_token.clone(),
            default_privilege: cfg.default_privilege,
            outbound_buffer: cfg.outbound_buffer.max(1),
            send_timeout: cfg.send_timeout(),
        })
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds `config.bind_addr` and serves until `running` is cleared.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot be bound.
pub async fn run_server(
    config: WsServerConfig,
    mission: SharedMissionControl,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind WebSocket listener on {}", config.bind_addr))?;

    info!("WebSocket server listening on {}", config.bind_addr);
    serve(listener, config, mission, running).await
}

/// Accept loop over an already bound listener.
///
/// Each accepted connection is handed to its own Tokio task, so one slow
/// handshake never delays the next client.
pub async fn serve(
    listener: TcpListener,
    config: WsServerConfig,
    mission: SharedMissionControl,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let config = Arc::new(config);

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // Short timeout so the running flag is rechecked while idle.
        match timeout(Duration::from_millis(200), listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                debug!("new connection from {peer_addr}");
                let cfg = Arc::clone(&config);
                let mission = Arc::clone(&mission);
                tokio::spawn(async move {
                    handle_session(stream, peer_addr, cfg, mission).await;
                });
            }
            Ok(Err(e)) => {
                error!("accept error: {e}");
            }
            Err(_) => {}
        }
    }

    Ok(())
}

// ── Per-session handler ───────────────────────────────────────────────────────

async fn handle_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    config: Arc<WsServerConfig>,
    mission: SharedMissionControl,
) {
    match run_session(stream, peer_addr, config, mission).await {
        Ok(()) => info!("session {peer_addr} closed normally"),
        Err(e) => warn!("session {peer_addr} closed with error: {e:#}"),
    }
}

async fn run_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    config: Arc<WsServerConfig>,
    mission: SharedMissionControl,
) -> anyhow::Result<()> {
    // ── Step 1: handshake, remembering the request URI ───────────────────────
    let mut request_uri: Option<Uri> = None;
    let ws_stream = accept_hdr_async(
        stream,
        |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            request_uri = Some(req.uri().clone());
            Ok(resp)
        },
    )
    .await
    .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    let privilege = privilege_for(
        request_uri.as_ref().and_then(Uri::query),
        config.admin_token.as_deref(),
        config.default_privilege,
    );

    // ── Step 2: register the connection ──────────────────────────────────────
    let (out_tx, mut out_rx) = mpsc::channel::<Arc<str>>(config.outbound_buffer);
    let connection = Connection::new(privilege, Arc::new(QueueSink { tx: out_tx }));
    let id = mission.lock().await.connect(connection);
    info!("session {peer_addr} established as {id} ({privilege:?})");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    // ── Task A: writer ───────────────────────────────────────────────────────
    let send_timeout = config.send_timeout;
    let mut writer = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            match timeout(send_timeout, ws_tx.send(WsMessage::Text(text.to_string()))).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!("session {peer_addr}: send failed: {e}");
                    break;
                }
                Err(_) => {
                    warn!("session {peer_addr}: send timed out after {send_timeout:?}");
                    break;
                }
            }
        }
        ws_tx.close().await.ok();
    });

    // ── Task B: reader ───────────────────────────────────────────────────────
    let reader_mission = Arc::clone(&mission);
    let mut reader = tokio::spawn(async move {
        loop {
            let ws_msg = match ws_rx.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) => {
                    debug!("session {peer_addr}: WebSocket closed");
                    break;
                }
                Some(Err(e)) => {
                    warn!("session {peer_addr}: WebSocket error: {e}");
                    break;
                }
                None => {
                    debug!("session {peer_addr}: stream ended");
                    break;
                }
            };

            match ws_msg {
                WsMessage::Text(raw) => {
                    let outcome = reader_mission.lock().await.dispatch(&raw, &id);
                    debug!("session {peer_addr}: {outcome:?}");
                }
                WsMessage::Binary(_) => {
                    warn!("session {peer_addr}: unexpected binary WebSocket frame (ignored)");
                }
                WsMessage::Ping(data) => {
                    debug!("session {peer_addr}: WebSocket ping ({} bytes)", data.len());
                }
                WsMessage::Pong(_) => {
                    debug!("session {peer_addr}: WebSocket pong received");
                }
                WsMessage::Close(_) => {
                    debug!("session {peer_addr}: Close frame received");
                    break;
                }
                WsMessage::Frame(_) => {
                    debug!("session {peer_addr}: raw frame (ignored)");
                }
            }
        }
    });

    // ── Step 3: whichever side ends first ends the session ───────────────────
    tokio::select! {
        _ = &mut writer => debug!("session {peer_addr}: writer ended"),
        _ = &mut reader => debug!("session {peer_addr}: reader ended"),
    }
    writer.abort();
    reader.abort();

    mission.lock().await.disconnect(&id);
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Outbound side of one connection: a bounded queue drained by the writer.
struct QueueSink {
    tx: mpsc::Sender<Arc<str>>,
}

impl ConnectionSink for QueueSink {
    fn send(&self, text: Arc<str>) -> Result<(), SendError> {
        self.tx.try_send(text).map_err(|e| match e {
            TrySendError::Full(_) => SendError::Full,
            TrySendError::Closed(_) => SendError::Closed,
        })
    }
}

/// `Admin` if the query carries `token=<admin_token>`, else `default`.
///
/// An empty configured token counts as unset.
fn privilege_for(query: Option<&str>, admin_token: Option<&str>, default: Privilege) -> Privilege {
    let admin_token = admin_token.filter(|t| !t.is_empty());
    let (Some(query), Some(admin_token)) = (query, admin_token) else {
        return default;
    };
    let presented = query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .any(|(k, v)| k == "token" && v == admin_token);
    if presented {
        Privilege::Admin
    } else {
        default
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

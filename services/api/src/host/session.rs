//! Manages the WebSocket connection lifecycle for one pair of glasses.

use super::protocol::{AppMessage, HostMessage};
use crate::{config::Config, state::AppState};
use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use g1_voice_core::{GlassesHost, VoiceSession, display::DisplayRequest};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

type HostSink = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Drives the glasses behind one host connection.
struct SocketHost {
    tx: HostSink,
}

#[async_trait]
impl GlassesHost for SocketHost {
    async fn show_text(&self, request: DisplayRequest) -> Result<()> {
        send_msg(&mut *self.tx.lock().await, request.into()).await
    }

    async fn start_microphone(&self) -> Result<()> {
        send_msg(
            &mut *self.tx.lock().await,
            AppMessage::Microphone { enabled: true },
        )
        .await
    }

    async fn stop_microphone(&self) -> Result<()> {
        send_msg(
            &mut *self.tx.lock().await,
            AppMessage::Microphone { enabled: false },
        )
        .await
    }
}

/// Main handler for an individual host connection.
///
/// The first frame must be an `init` message naming the session; everything
/// after it is routed into that session until the host stops it or the
/// socket goes away.
#[instrument(name = "host_socket", skip_all, fields(session_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let temp_id: u32 = rand::random();
    tracing::Span::current().record("session_id", &temp_id.to_string());
    info!("New host connection. Awaiting initialization...");

    let (socket_tx, mut socket_rx) = socket.split();
    let socket_tx: HostSink = Arc::new(Mutex::new(socket_tx));

    let init = match socket_rx.next().await {
        Some(Ok(Message::Text(text))) => parse_init(&text, &state.config),
        Some(Ok(_)) => Err(anyhow!("First message was not a text `init` message.")),
        _ => {
            info!("Host disconnected before sending init message.");
            return;
        }
    };
    let (session_id, package_name) = match init {
        Ok(init) => init,
        Err(e) => {
            error!("Session initialization failed: {:?}", e);
            let _ = send_msg(
                &mut *socket_tx.lock().await,
                AppMessage::Error {
                    message: e.to_string(),
                },
            )
            .await;
            return;
        }
    };
    tracing::Span::current().record("session_id", session_id.as_str());

    if send_msg(
        &mut *socket_tx.lock().await,
        AppMessage::Initialized {
            session_id: session_id.clone(),
            package_name,
        },
    )
    .await
    .is_err()
    {
        error!("Failed to send Initialized message to host.");
        return;
    }

    let host = Arc::new(SocketHost {
        tx: socket_tx.clone(),
    });
    let session = state.registry.on_session_start(&session_id, host).await;
    run_host_session(&state, &session, socket_rx).await;
}

/// Validates the `init` message against the configured app identity.
fn parse_init(init_text: &str, config: &Config) -> Result<(String, String)> {
    let HostMessage::Init {
        session_id,
        package_name,
        api_key,
    } = serde_json::from_str(init_text)?
    else {
        bail!("First message must be `init`");
    };

    if session_id.trim().is_empty() {
        bail!("`session_id` is required for `init`");
    }
    if package_name != config.package_name {
        bail!("Unknown package name: {}", package_name);
    }
    if let Some(expected) = &config.host_api_key {
        if api_key.as_deref() != Some(expected.as_str()) {
            bail!("Invalid API key");
        }
    }
    Ok((session_id, package_name))
}

/// The event loop for a registered session.
///
/// Ends when the host stops the session, the socket goes away, or the
/// session is closed from elsewhere (replaced under the same id, or
/// shutdown). On exit this socket's own session is always released.
async fn run_host_session(
    state: &AppState,
    session: &VoiceSession,
    mut socket_rx: SplitStream<WebSocket>,
) {
    loop {
        let msg_result = tokio::select! {
            biased;
            _ = session.closed() => {
                info!("Session closed elsewhere. Ending host connection.");
                break;
            }
            msg = socket_rx.next() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };

        match msg_result {
            Ok(Message::Text(text)) => match serde_json::from_str::<HostMessage>(&text) {
                Ok(HostMessage::Stop) => {
                    info!("Host stopped the session.");
                    break;
                }
                Ok(HostMessage::Init { .. }) => warn!("Ignoring repeated `init` message."),
                Ok(msg) => {
                    if let Some(event) = msg.into_event() {
                        session.handle_event(event).await;
                    }
                }
                Err(e) => warn!(error = %e, "Ignoring unexpected text message post-init."),
            },
            Ok(Message::Binary(data)) => session.handle_audio(&data).await,
            Ok(Message::Close(_)) => {
                info!("Host sent close frame. Shutting down session.");
                break;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Err(e) => {
                error!("Error receiving from host WebSocket: {:?}", e);
                break;
            }
        }
    }

    state.registry.release(session).await;
    info!("Host connection closed and session released.");
}

/// A helper function to serialize and send an `AppMessage` to the host.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: AppMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}

//! Relay WebSocket handler
//!
//! Owns the socket for one client: a writer task drains the session's
//! outbound queue while the connection loop parses inbound frames and hands
//! them to the [`Session`].

use axum::{
    Extension,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tokio::select;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::errors::RelayError;
use crate::middleware::ClientIp;
use crate::state::AppState;

use super::channel::SessionChannel;
use super::messages::{
    MAX_TEXT_SIZE, RelayIncomingMessage, RelayMessageRoute, RelayOutgoingMessage,
};
use super::session::Session;

/// Outbound queue capacity per connection
const CHANNEL_BUFFER_SIZE: usize = 256;

/// Maximum WebSocket message size
///
/// Six bytes per transcript byte covers text sent entirely as `\uXXXX`
/// escapes, plus room for the envelope, so oversize text is answered with an
/// `error` event instead of a dropped connection.
pub const MAX_WS_MESSAGE_SIZE: usize = 6 * MAX_TEXT_SIZE + 64 * 1024;

/// Maximum WebSocket frame size
const MAX_WS_FRAME_SIZE: usize = MAX_WS_MESSAGE_SIZE;

/// How long teardown waits for queued events to reach the socket
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

pub const INVALID_FORMAT_MESSAGE: &str = "Invalid message format";
pub const IDLE_TIMEOUT_MESSAGE: &str = "Connection closed due to inactivity";

/// Returns a connection-limit slot when the connection ends.
struct ConnectionSlot {
    state: Arc<AppState>,
    ip: Option<IpAddr>,
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        if let Some(ip) = self.ip {
            self.state.release_connection(ip);
        }
    }
}

/// Relay WebSocket handler
///
/// Upgrades the HTTP connection to WebSocket and runs one relay session on it.
///
/// # Arguments
/// * `ws` - The WebSocket upgrade request from Axum
/// * `state` - Application state holding the completion gateway
/// * `client_ip` - Slot owner injected by the connection limit middleware
pub async fn relay_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    client_ip: Option<Extension<ClientIp>>,
) -> Response {
    let ip = client_ip.map(|Extension(ClientIp(ip))| ip);
    info!(client_ip = ?ip, "Relay WebSocket connection upgrade requested");

    let slot = ConnectionSlot {
        state: state.clone(),
        ip,
    };

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_relay_socket(socket, state, slot))
}

/// Handle the relay WebSocket connection
async fn handle_relay_socket(socket: WebSocket, app_state: Arc<AppState>, slot: ConnectionSlot) {
    let session_id = Uuid::new_v4().to_string();
    info!(session_id = %session_id, "Relay WebSocket connection established");

    let (mut sender, mut receiver) = socket.split();
    let (message_tx, mut message_rx) = mpsc::channel::<RelayMessageRoute>(CHANNEL_BUFFER_SIZE);

    // Sender task for outgoing messages
    let writer_session_id = session_id.clone();
    let mut sender_task = tokio::spawn(async move {
        while let Some(route) = message_rx.recv().await {
            let result = match route {
                RelayMessageRoute::Outgoing(message) => match serde_json::to_string(&message) {
                    Ok(json_str) => sender.send(Message::Text(json_str.into())).await,
                    Err(e) => {
                        error!("Failed to serialize outgoing message: {}", e);
                        continue;
                    }
                },
                RelayMessageRoute::Close => {
                    debug!(session_id = %writer_session_id, "Closing relay WebSocket connection");
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            };

            if let Err(e) = result {
                warn!(session_id = %writer_session_id, "Failed to send WebSocket message: {}", e);
                break;
            }
        }
    });

    let channel = SessionChannel::new(session_id.clone(), message_tx);
    let mut session = Session::start(app_state.gateway.clone(), channel.clone());

    let idle_timeout = app_state.config.idle_timeout();
    let mut idle_deadline = Instant::now() + idle_timeout;

    loop {
        select! {
            msg_result = receiver.next() => {
                idle_deadline = Instant::now() + idle_timeout;

                match msg_result {
                    Some(Ok(msg)) => {
                        if !process_relay_message(msg, &mut session, &channel).await {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(session_id = %session_id, "Relay WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        info!(session_id = %session_id, "Relay WebSocket connection closed by client");
                        break;
                    }
                }
            }
            _ = tokio::time::sleep_until(idle_deadline) => {
                warn!(
                    session_id = %session_id,
                    idle_secs = idle_timeout.as_secs(),
                    "Relay WebSocket connection idle, closing"
                );
                let _ = channel
                    .send(RelayOutgoingMessage::error(IDLE_TIMEOUT_MESSAGE))
                    .await;
                break;
            }
        }
    }

    // Teardown: flush what is queued, then detach the session. An outstanding
    // completion keeps running but its reply has nowhere to go.
    let _ = tokio::time::timeout(WRITER_DRAIN_TIMEOUT, channel.close()).await;
    drop(channel);
    tokio::spawn(session.finish());

    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut sender_task)
        .await
        .is_err()
    {
        sender_task.abort();
    }
    drop(slot);

    info!(session_id = %session_id, "Relay WebSocket connection terminated");
}

/// Process incoming WebSocket message. Returns false when the loop should stop.
async fn process_relay_message(
    msg: Message,
    session: &mut Session,
    channel: &SessionChannel,
) -> bool {
    match msg {
        Message::Text(text) => {
            debug!(session_id = %session.id(), "Received text message: {} bytes", text.len());

            let incoming: RelayIncomingMessage = match serde_json::from_str(&text) {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(session_id = %session.id(), "Failed to parse relay message: {}", e);
                    let _ = channel
                        .send(RelayOutgoingMessage::error(INVALID_FORMAT_MESSAGE))
                        .await;
                    return true;
                }
            };

            if let Err(e) = incoming.validate_size() {
                warn!(session_id = %session.id(), "Message validation failed: {}", e);
                let _ = channel
                    .send(RelayOutgoingMessage::error(e.to_string()))
                    .await;
                return true;
            }

            handle_relay_incoming(incoming, session, channel).await;
            true
        }
        Message::Binary(data) => {
            debug!(session_id = %session.id(), "Ignoring binary frame: {} bytes", data.len());
            true
        }
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            info!(session_id = %session.id(), "Relay WebSocket close received");
            false
        }
    }
}

/// Dispatch one typed event and map failures to their client-facing outcome
async fn handle_relay_incoming(
    incoming: RelayIncomingMessage,
    session: &mut Session,
    channel: &SessionChannel,
) {
    let Err(err) = session.handle(incoming).await else {
        return;
    };

    match &err {
        RelayError::InvalidInput(reason) => {
            debug!(session_id = %session.id(), reason = %reason, "Dropping invalid input");
        }
        RelayError::Transport(reason) => {
            warn!(session_id = %session.id(), error = %reason, "Transport failure");
        }
        RelayError::Busy(reason) => {
            warn!(session_id = %session.id(), reason = %reason, "Rejecting event, session busy");
        }
        RelayError::Completion(_) | RelayError::Unexpected(_) => {
            error!(session_id = %session.id(), error = %err, "Failed to handle client event");
        }
    }

    if let Some(message) = err.client_message() {
        let _ = channel.send(RelayOutgoingMessage::error(message)).await;
    }
}

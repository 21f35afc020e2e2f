//! WebSocket connection handler.
//!
//! Manages individual WebSocket connections: parsing client messages,
//! routing them through the relay state, and sending responses.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::matchmaker::JoinRequest;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::signaling::SignalKind;
use crate::state::RelayState;

/// Handle a single WebSocket connection.
///
/// This function runs for the lifetime of the connection:
/// 1. Assigns a connection handle and registers it
/// 2. Spawns a sender task to forward outbound messages
/// 3. Processes incoming messages until either side closes
pub async fn handle_websocket(socket: WebSocket, state: RelayState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Create the outbound channel for this client
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    // ── Step 1: Register ──────────────────────────────────────────────────

    let handle = Uuid::new_v4().to_string();
    state.register_client(&handle, tx).await;
    tracing::info!(connection_id = handle.as_str(), "WebSocket connected");

    // ── Step 2: Spawn Sender Task ─────────────────────────────────────────

    // Ends when the relay drops this client's channel (expiry, eviction)
    // or the socket stops accepting writes.
    let mut sender_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json)).await.is_err() {
                        return; // Connection closed
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize server message: {}", e);
                }
            }
        }
        let _ = ws_sender.send(Message::Close(None)).await;
    });

    // ── Step 3: Process Messages ──────────────────────────────────────────

    loop {
        let msg_result = tokio::select! {
            _ = &mut sender_task => {
                tracing::debug!(connection_id = handle.as_str(), "Outbound channel closed");
                break;
            }
            next = ws_receiver.next() => match next {
                Some(result) => result,
                None => break,
            },
        };

        match msg_result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => {
                    handle_client_message(&state, &handle, client_msg).await;
                }
                Err(e) => {
                    tracing::warn!(
                        connection_id = handle.as_str(),
                        error = %e,
                        "Failed to parse client message"
                    );
                    state.send_to_client(
                        &handle,
                        ServerMessage::Error {
                            message: format!("Invalid message format: {}", e),
                        },
                    );
                }
            },
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                // Protocol-level keepalive; axum answers pings itself.
                state.touch(&handle).await;
            }
            Ok(Message::Close(_)) => {
                tracing::info!(connection_id = handle.as_str(), "Client sent close frame");
                break;
            }
            Err(e) => {
                tracing::warn!(
                    connection_id = handle.as_str(),
                    error = %e,
                    "WebSocket error"
                );
                break;
            }
            _ => {} // Binary — ignore
        }
    }

    // ── Step 4: Cleanup ───────────────────────────────────────────────────

    state.unregister_client(&handle).await;
    sender_task.abort();
    tracing::info!(connection_id = handle.as_str(), "WebSocket disconnected");
}

/// Handle a parsed client message. Any frame counts as activity.
pub async fn handle_client_message(state: &RelayState, handle: &str, msg: ClientMessage) {
    state.touch(handle).await;

    match msg {
        ClientMessage::Join {
            session_id,
            interests,
            chat_mode,
            safe_mode,
        } => {
            if session_id.trim().is_empty() {
                state.send_to_client(
                    handle,
                    ServerMessage::Error {
                        message: "session_id is required".to_string(),
                    },
                );
                return;
            }
            tracing::debug!(
                connection_id = handle,
                chat_mode = ?chat_mode,
                interests = interests.len(),
                "Join"
            );
            state
                .join(
                    handle,
                    JoinRequest {
                        session_id,
                        interests,
                        chat_mode,
                        safe_mode,
                    },
                )
                .await;
        }

        ClientMessage::SendMessage { text } => {
            state.send_message(handle, &text).await;
        }

        ClientMessage::Typing { typing } => {
            state.typing(handle, typing).await;
        }

        ClientMessage::Reaction { emoji } => {
            state.reaction(handle, emoji).await;
        }

        ClientMessage::Skip => {
            state.skip(handle).await;
        }

        ClientMessage::Proposal { to, payload } => {
            state.signal(handle, SignalKind::Proposal, &to, payload).await;
        }

        ClientMessage::Acceptance { to, payload } => {
            state.signal(handle, SignalKind::Acceptance, &to, payload).await;
        }

        ClientMessage::Candidate { to, payload } => {
            state.signal(handle, SignalKind::Candidate, &to, payload).await;
        }

        ClientMessage::Heartbeat => {}
    }
}

use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};

use mazerun_core::net::messages::{ClientMessage, ErrorMsg, ServerMessage};
use mazerun_core::net::protocol::{
    PROTOCOL_VERSION, decode_client_message, encode_server_message,
};
use mazerun_core::player::PlayerId;
use mazerun_core::room::{RoomError, is_valid_room_code, normalize_room_code};

use crate::room_task::{RoomCommand, RoomHandle};
use crate::state::{AppState, ConnectionGuard};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Room code to attach to as a receive-only observer instead of
    /// participating.
    pub observe: Option<String>,
}

pub async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    let max_ws = state.config.limits.max_ws_connections;
    let current = state.ws_connection_count.load(Ordering::Relaxed);
    if current >= max_ws {
        tracing::warn!(current, max = max_ws, "WS connection limit reached");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, query.observe)))
}

async fn handle_socket(socket: WebSocket, state: AppState, observe: Option<String>) {
    let _guard = ConnectionGuard::new(Arc::clone(&state.ws_connection_count));
    let (mut ws_sender, mut ws_receiver) = socket.split();

    if let Some(code) = observe {
        observe_room(ws_sender, ws_receiver, &state, &code).await;
        return;
    }

    // The first frame must be create_room or join; everything else is a
    // protocol error and closes the connection.
    let Some(first) = next_text_frame(&mut ws_receiver).await else {
        return;
    };
    let first = match decode_client_message(first.as_str()) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::warn!(error = %e, "malformed first frame, closing");
            return;
        },
    };

    let (handle, player_id, rx) = match first {
        ClientMessage::CreateRoom(create) => {
            if !version_ok(create.protocol_version) {
                tracing::warn!(version = create.protocol_version, "protocol version mismatch");
                return;
            }
            let Some(name) = valid_player_name(&create.player_name) else {
                tracing::warn!("invalid player name on create_room, closing");
                return;
            };
            let (tx, rx) = mpsc::channel::<Utf8Bytes>(state.config.limits.player_message_buffer);
            let (handle, grant) = Arc::clone(&state.directory).create_room(name, tx).await;
            (handle, grant.player_id, rx)
        },
        ClientMessage::Join(join) => {
            if !version_ok(join.protocol_version) {
                tracing::warn!(version = join.protocol_version, "protocol version mismatch");
                return;
            }
            let Some(name) = valid_player_name(&join.player_name) else {
                tracing::warn!("invalid player name on join, closing");
                return;
            };
            let code = normalize_room_code(&join.room_code);
            let handle = if is_valid_room_code(&code) {
                state.directory.get(&code).await
            } else {
                None
            };
            let Some(handle) = handle else {
                send_error(&mut ws_sender, RoomError::RoomNotFound).await;
                return;
            };

            let (tx, rx) = mpsc::channel::<Utf8Bytes>(state.config.limits.player_message_buffer);
            let (reply_tx, reply_rx) = oneshot::channel();
            if handle
                .tx
                .send(RoomCommand::Join {
                    name,
                    session_token: join.session_token,
                    sender: tx,
                    reply: reply_tx,
                })
                .await
                .is_err()
            {
                send_error(&mut ws_sender, RoomError::RoomNotFound).await;
                return;
            }
            match reply_rx.await {
                Ok(Ok(grant)) => (handle, grant.player_id, rx),
                Ok(Err(err)) => {
                    send_error(&mut ws_sender, err).await;
                    return;
                },
                Err(_) => return,
            }
        },
        other => {
            tracing::warn!(msg = ?other, "first frame must be create_room or join, closing");
            return;
        },
    };

    spawn_writer(ws_sender, rx);
    read_loop(&mut ws_receiver, &state, &handle, player_id).await;

    // Closing the connection is just another room mutation; mid-game the
    // room keeps the slot for reconnection.
    let _ = handle
        .tx
        .send(RoomCommand::Disconnect { player_id })
        .await;
    tracing::info!(room = %handle.code, player_id, "connection closed");
}

/// Receive-only attach: gets every room-scoped broadcast, is never part of
/// the roster, and anything it sends is dropped.
async fn observe_room(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut ws_receiver: SplitStream<WebSocket>,
    state: &AppState,
    code: &str,
) {
    let code = normalize_room_code(code);
    let handle = if is_valid_room_code(&code) {
        state.directory.get(&code).await
    } else {
        None
    };
    let Some(handle) = handle else {
        send_error(&mut ws_sender, RoomError::RoomNotFound).await;
        return;
    };

    let (tx, rx) = mpsc::channel::<Utf8Bytes>(state.config.limits.player_message_buffer);
    let (reply_tx, reply_rx) = oneshot::channel();
    if handle
        .tx
        .send(RoomCommand::Watch {
            sender: tx,
            reply: reply_tx,
        })
        .await
        .is_err()
    {
        return;
    }
    let Ok(grant) = reply_rx.await else { return };
    tracing::info!(room = %code, watcher = grant.watcher, "observer attached");

    spawn_writer(ws_sender, rx);
    while let Some(Ok(msg)) = ws_receiver.next().await {
        match msg {
            Message::Close(_) => break,
            Message::Text(_) | Message::Binary(_) => {
                tracing::debug!(room = %code, watcher = grant.watcher, "dropping frame from observer");
            },
            _ => {},
        }
    }
    let _ = handle
        .tx
        .send(RoomCommand::Unwatch {
            watcher: grant.watcher,
        })
        .await;
    tracing::info!(room = %code, watcher = grant.watcher, "observer detached");
}

async fn next_text_frame(ws_receiver: &mut SplitStream<WebSocket>) -> Option<Utf8Bytes> {
    loop {
        match ws_receiver.next().await {
            Some(Ok(Message::Text(text))) => return Some(text),
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return None,
            Some(Ok(_)) => continue,
        }
    }
}

async fn read_loop(
    ws_receiver: &mut SplitStream<WebSocket>,
    state: &AppState,
    handle: &RoomHandle,
    player_id: PlayerId,
) {
    let rate = state.config.limits.ws_rate_limit_per_sec;
    let mut limiter = RateLimiter::new(rate, rate);

    while let Some(Ok(msg)) = ws_receiver.next().await {
        let text = match msg {
            Message::Text(t) => t,
            Message::Close(_) => break,
            _ => continue,
        };

        if !limiter.allow() {
            tracing::warn!(player_id, room = %handle.code, "rate limited");
            continue;
        }

        let decoded = match decode_client_message(text.as_str()) {
            Ok(msg) => msg,
            Err(e) => {
                // one versioned schema per event type: non-conforming input
                // is rejected and logged, not guessed at
                tracing::warn!(player_id, room = %handle.code, error = %e, "rejecting malformed message");
                continue;
            },
        };

        let cmd = match decoded {
            ClientMessage::Ready(r) => RoomCommand::Ready {
                player_id,
                ready: r.ready,
            },
            ClientMessage::Move(mv) => RoomCommand::Move { player_id, mv },
            ClientMessage::CollectTreasure(c) => RoomCommand::Collect {
                player_id,
                treasure_id: c.treasure_id,
            },
            ClientMessage::LeaveRoom => {
                let _ = handle.tx.send(RoomCommand::Leave { player_id }).await;
                break;
            },
            ClientMessage::CreateRoom(_) | ClientMessage::Join(_) => {
                tracing::warn!(player_id, room = %handle.code, "already attached, dropping create/join");
                continue;
            },
        };

        // Awaiting the send is the room's backpressure: this connection
        // waits for the room's processing slot, never for other rooms.
        if handle.tx.send(cmd).await.is_err() {
            break;
        }
    }
}

fn spawn_writer(mut ws_sender: SplitSink<WebSocket, Message>, mut rx: mpsc::Receiver<Utf8Bytes>) {
    tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if ws_sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });
}

async fn send_error(ws_sender: &mut SplitSink<WebSocket, Message>, err: RoomError) {
    if let Ok(text) = encode_server_message(&ServerMessage::Error(ErrorMsg::from_error(err)))
        && ws_sender.send(Message::Text(text.into())).await.is_err()
    {
        tracing::debug!(error = %err, "failed to deliver error before close");
    }
}

fn version_ok(version: u8) -> bool {
    version == 0 || version == PROTOCOL_VERSION
}

fn valid_player_name(name: &str) -> Option<String> {
    let name = name.trim();
    if name.is_empty() || name.len() > 32 || name.chars().any(|c| c.is_control()) {
        return None;
    }
    Some(name.to_string())
}

/// Per-connection rate limiter (token bucket).
struct RateLimiter {
    tokens: f64,
    last_refill: tokio::time::Instant,
    max_tokens: f64,
    refill_rate: f64, // tokens per second
}

impl RateLimiter {
    fn new(max_tokens: f64, refill_rate: f64) -> Self {
        Self {
            tokens: max_tokens,
            last_refill: tokio::time::Instant::now(),
            max_tokens,
            refill_rate,
        }
    }

    /// Returns true if the message is allowed; false if rate-limited.
    fn allow(&mut self) -> bool {
        let now = tokio::time::Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

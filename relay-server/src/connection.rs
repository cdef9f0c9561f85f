//! Per-connection handling: admission off the upgrade URL, then a paired
//! reader/writer task for the lifetime of the socket. See `spec.md` §4.4.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{mpsc, Mutex};

use crate::manager::RoomManager;
use crate::room::{self, Room};

/// `?room=<id>&name=<display name>` off the WebSocket upgrade URL. Both
/// are optional: an absent `room` triggers capacity-balanced admission,
/// an absent `name` defaults to `"Player"`.
#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    pub room: Option<String>,
    pub name: Option<String>,
}

/// Upgrades the HTTP request to a WebSocket, deferring all admission
/// logic to [`handle_socket`].
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(manager): State<Arc<RoomManager>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, manager, params))
}

/// Admits the player into a room, spawns its writer task, then runs the
/// reader loop on the current task until the socket closes. Cleans up
/// both the player and (if it emptied) the room on the way out.
async fn handle_socket(socket: WebSocket, manager: Arc<RoomManager>, params: ConnectParams) {
    let display_name = params.name.unwrap_or_else(|| "Player".to_string());
    let (room_id, room) = manager.join_or_create(params.room).await;

    let (outbound_tx, outbound_rx) = mpsc::channel(room::OUTBOUND_BUFFER_SIZE);
    let player_id = room.lock().await.add_player(&display_name, outbound_tx);
    tracing::info!(room_id = %room_id, player_id, "player connected");

    let (sink, stream) = socket.split();
    let writer = tokio::spawn(writer_task(sink, outbound_rx));

    reader_task(stream, &room, player_id).await;

    writer.abort();
    room.lock().await.remove_player(player_id);
    RoomManager::note_possibly_empty(&manager, &room_id).await;
    tracing::info!(room_id = %room_id, player_id, "player disconnected");
}

/// Decodes every text frame and dispatches it into the room; everything
/// else (ping/pong/binary/close) is acknowledged by axum automatically
/// or simply ignored, matching the teacher's `Ok(_) => {}` catch-alls.
async fn reader_task(mut stream: SplitStream<WebSocket>, room: &Arc<Mutex<Room>>, player_id: u64) {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                let incoming = protocol::decode(&text);
                room.lock().await.handle_message(player_id, incoming);
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(err)) => {
                tracing::debug!(player_id, error = %err, "websocket read error");
                break;
            }
        }
    }
}

/// Drains the player's outbound queue onto the socket until either side
/// closes. Aborted from outside once the reader loop returns.
async fn writer_task(mut sink: SplitSink<WebSocket, Message>, mut rx: mpsc::Receiver<String>) {
    while let Some(frame) = rx.recv().await {
        if sink.send(Message::Text(frame.into())).await.is_err() {
            break;
        }
    }
}

//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{RoomCommand, RoomHandle};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::connection::{ConnectionOutbox, PlayerConnection};
use crate::ws::protocol::{ClientMsg, PlayerId, ServerMsg};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let player_id = Uuid::new_v4();
    info!(player_id = %player_id, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    let welcome = ServerMsg::Welcome {
        player_id,
        server_time: unix_millis(),
    };
    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(player_id = %player_id, error = %e, "Failed to send welcome");
        return;
    }

    let (connection, outbox) = PlayerConnection::new();
    let writer_handle = tokio::spawn(run_writer(player_id, ws_sink, outbox));

    let room = run_reader(player_id, ws_stream, &connection, &state).await;

    // Disconnect is a leave; the room despawns the player on its next tick
    if let Some(room) = room {
        room.send(RoomCommand::Leave { player_id });
    }
    writer_handle.abort();

    info!(player_id = %player_id, "WebSocket connection closed");
}

/// Reader loop: WebSocket -> room. Returns the room the player was in.
async fn run_reader(
    player_id: PlayerId,
    mut ws_stream: SplitStream<WebSocket>,
    connection: &PlayerConnection,
    state: &AppState,
) -> Option<RoomHandle> {
    let rate_limiter = ConnectionRateLimiter::new(state.config.input_rate_limit);
    let mut room: Option<RoomHandle> = None;

    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => {
                        if !admit(&msg, &rate_limiter) {
                            warn!(player_id = %player_id, tag = ?msg.tag(), "Rate limited client message");
                            continue;
                        }
                        if !dispatch(player_id, msg, connection, state, &mut room).await {
                            debug!(player_id = %player_id, "Room channel closed");
                            room = None;
                        }
                    }
                    Err(e) => {
                        warn!(player_id = %player_id, error = %e, "Failed to parse client message");
                        connection.send(ServerMsg::Error {
                            code: "bad_message".to_string(),
                            message: e.to_string(),
                        });
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(player_id = %player_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(player_id = %player_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(player_id = %player_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    room
}

/// Inputs are delivered reliably and the server counts every one it
/// processes, so they bypass the limiter. A dropped input would shift the
/// processed tick the client reconciles against.
fn admit(msg: &ClientMsg, limiter: &ConnectionRateLimiter) -> bool {
    matches!(msg, ClientMsg::PlayerInput { .. }) || limiter.check_frame()
}

/// Route one client message. Returns false if the current room has gone away.
async fn dispatch(
    player_id: PlayerId,
    msg: ClientMsg,
    connection: &PlayerConnection,
    state: &AppState,
    room: &mut Option<RoomHandle>,
) -> bool {
    debug!(player_id = %player_id, tag = ?msg.tag(), "Client message");

    match msg {
        ClientMsg::JoinRoom { room: name, name: player_name } => {
            if let Some(current) = room.as_ref() {
                connection.send(ServerMsg::JoinRoomDenied {
                    reason: format!("already in room {}", current.name),
                });
                return true;
            }

            let joined = match state.rooms.open_or_get(&name) {
                Ok(handle) => handle
                    .join(player_id, player_name, connection.clone())
                    .await
                    .map(|_| handle),
                Err(e) => Err(e),
            };
            match joined {
                Ok(handle) => *room = Some(handle),
                Err(e) => {
                    info!(player_id = %player_id, room = %name, error = %e, "Room join denied");
                    connection.send(ServerMsg::JoinRoomDenied {
                        reason: e.to_string(),
                    });
                }
            }
            true
        }
        ClientMsg::GameJoinRequest => forward(player_id, room, connection, RoomCommand::JoinGame { player_id }),
        ClientMsg::PlayerInput { input } => {
            forward(player_id, room, connection, RoomCommand::Input { player_id, input })
        }
        ClientMsg::LeaveRoom => {
            if let Some(current) = room.take() {
                current.send(RoomCommand::Leave { player_id });
            }
            true
        }
        ClientMsg::Ping { t } => {
            connection.send(ServerMsg::Pong { t });
            true
        }
    }
}

fn forward(
    player_id: PlayerId,
    room: &Option<RoomHandle>,
    connection: &PlayerConnection,
    command: RoomCommand,
) -> bool {
    match room {
        Some(current) => current.send(command),
        None => {
            debug!(player_id = %player_id, "Game message outside a room");
            connection.send(ServerMsg::Error {
                code: "not_in_room".to_string(),
                message: "Join a room first".to_string(),
            });
            true
        }
    }
}

/// Writer task: connection outbox -> WebSocket
async fn run_writer(
    player_id: PlayerId,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut outbox: ConnectionOutbox,
) {
    loop {
        let msg = tokio::select! {
            biased;
            reliable = outbox.reliable_rx.recv() => match reliable {
                Some(msg) => msg,
                None => break,
            },
            changed = outbox.unreliable_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let latest = outbox.unreliable_rx.borrow_and_update().clone();
                match latest {
                    Some(msg) => msg,
                    None => continue,
                }
            }
        };

        if let Err(e) = send_msg(&mut ws_sink, &msg).await {
            debug!(player_id = %player_id, error = %e, "WebSocket send failed");
            break;
        }
    }
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json)).await.map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Tick;
    use crate::ws::protocol::PlayerInputData;

    #[test]
    fn inputs_pass_an_exhausted_limiter() {
        let limiter = ConnectionRateLimiter::new(1);
        assert!(admit(&ClientMsg::Ping { t: 1 }, &limiter));
        assert!(!admit(&ClientMsg::Ping { t: 2 }, &limiter));
        assert!(!admit(&ClientMsg::GameJoinRequest, &limiter));

        for t in 0..50 {
            let input = ClientMsg::PlayerInput {
                input: PlayerInputData::idle(Tick(t)),
            };
            assert!(admit(&input, &limiter));
        }
        assert!(!admit(&ClientMsg::LeaveRoom, &limiter));
    }
}

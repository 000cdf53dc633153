use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};

use common::{id_generator, log, ConnectionId, RoomCode};

use crate::protocol::{ClientEvent, ServerEvent};
use crate::room::{Room, RoomCommand, RoomHandle, SinglePlayerInit};

use super::GatewayState;

/// Owns one WebSocket for its lifetime (spec §4.8): decodes inbound
/// frames into `ClientEvent`s, forwards them to whichever room the
/// connection is currently bound to, and relays whatever the broadcaster
/// queues for this connection back out over the socket.
pub async fn handle_socket(socket: WebSocket, state: GatewayState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let conn_id = ConnectionId::new(id_generator::generate_connection_token());
    state.broadcaster.register(conn_id.clone(), tx.clone());
    log!("connection {conn_id} opened");

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    state.broadcaster.send(
        &conn_id,
        &ServerEvent::FeatureFlags {
            chat: state.flags.chat,
            powerups: state.flags.powerups,
            accessibility: state.flags.accessibility,
        },
    );

    let mut bound_room: Option<RoomHandle> = None;

    while let Some(frame) = ws_receiver.next().await {
        let msg = match frame {
            Ok(msg) => msg,
            Err(err) => {
                log!("connection {conn_id}: websocket error: {err}");
                break;
            }
        };
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let event: ClientEvent = match serde_json::from_str(&text) {
            Ok(event) => event,
            Err(err) => {
                state.broadcaster.send(
                    &conn_id,
                    &ServerEvent::Error {
                        message: format!("malformed message: {err}"),
                        reason: Some("validation".into()),
                    },
                );
                continue;
            }
        };

        dispatch(&state, &conn_id, event, &mut bound_room).await;
    }

    if let Some(room) = bound_room.take() {
        room.send(RoomCommand::Disconnect { conn_id: conn_id.clone() });
    }
    state.broadcaster.unregister(&conn_id);
    send_task.abort();
    log!("connection {conn_id} closed");
}

async fn dispatch(state: &GatewayState, conn_id: &ConnectionId, event: ClientEvent, bound_room: &mut Option<RoomHandle>) {
    match event {
        ClientEvent::JoinRoom {
            player_name,
            room_code,
            control_scheme,
            player_token,
        } => {
            let code = RoomCode::new(room_code);
            let handle = state.rooms.get(&code).unwrap_or_else(|| {
                Room::spawn_multi(code.clone(), state.broadcaster.clone(), state.flags, state.sessions.clone(), state.rooms.clone())
            });
            let (reply, reply_rx) = oneshot::channel();
            handle.send(RoomCommand::Join {
                conn_id: conn_id.clone(),
                display_name: player_name,
                control_scheme,
                player_token,
                reply,
            });
            match reply_rx.await {
                Ok(Ok(ack)) => {
                    *bound_room = Some(handle);
                    state.broadcaster.send(
                        conn_id,
                        &ServerEvent::JoinedRoom {
                            player_id: ack.player_id,
                            is_host: ack.is_host,
                            room_code: ack.room_code,
                            game_mode: ack.game_mode,
                            game_options: ack.game_options.to_view(),
                            player_token: ack.player_token,
                            is_public: ack.is_public,
                        },
                    );
                }
                Ok(Err(err)) => {
                    state.broadcaster.send(conn_id, &ServerEvent::JoinError { message: err.message() });
                }
                Err(_) => {
                    state.broadcaster.send(
                        conn_id,
                        &ServerEvent::JoinError { message: "room is no longer available".into() },
                    );
                }
            }
        }

        ClientEvent::StartSinglePlayer {
            player_name,
            npc_count,
            game_mode: _,
            player_token: _,
            control_scheme,
            game_options,
            npc_configs,
        } => {
            if npc_count > 3 {
                state.broadcaster.send(
                    conn_id,
                    &ServerEvent::JoinError { message: "npcCount must be between 0 and 3".into() },
                );
                return;
            }
            let code = state.rooms.fresh_solo_code();
            let init = SinglePlayerInit {
                human_display_name: player_name,
                control_scheme,
                npc_count,
                npc_configs: npc_configs.unwrap_or_default(),
                wall_mode: game_options.wall_mode,
                conn_id: conn_id.clone(),
            };
            let (handle, ack) = Room::spawn_single(code, state.broadcaster.clone(), state.flags, state.sessions.clone(), state.rooms.clone(), init);
            *bound_room = Some(handle);
            state.broadcaster.send(
                conn_id,
                &ServerEvent::JoinedRoom {
                    player_id: ack.player_id,
                    is_host: ack.is_host,
                    room_code: ack.room_code,
                    game_mode: ack.game_mode,
                    game_options: ack.game_options.to_view(),
                    player_token: ack.player_token,
                    is_public: ack.is_public,
                },
            );
        }

        ClientEvent::StartGame { room_code } => {
            if let Some(handle) = resolve(state, conn_id, &room_code) {
                handle.send(RoomCommand::StartGame { conn_id: conn_id.clone() });
            }
        }
        ClientEvent::PlayerReady { room_code, current_player_id: _ } => {
            if let Some(handle) = resolve(state, conn_id, &room_code) {
                handle.send(RoomCommand::PlayerReady { conn_id: conn_id.clone() });
            }
        }
        ClientEvent::RequestGameState { room_code, player_token } => {
            if let Some(handle) = resolve(state, conn_id, &room_code) {
                handle.send(RoomCommand::RequestGameState { conn_id: conn_id.clone(), player_token });
            }
        }
        ClientEvent::PlayerInput { room_code, direction } => {
            if let Some(handle) = resolve(state, conn_id, &room_code) {
                handle.send(RoomCommand::PlayerInput { conn_id: conn_id.clone(), direction });
            }
        }
        ClientEvent::PauseGame { room_code } => {
            if let Some(handle) = resolve(state, conn_id, &room_code) {
                handle.send(RoomCommand::PauseGame { conn_id: conn_id.clone() });
            }
        }
        ClientEvent::ResumeGame { room_code } => {
            if let Some(handle) = resolve(state, conn_id, &room_code) {
                handle.send(RoomCommand::ResumeGame { conn_id: conn_id.clone() });
            }
        }
        ClientEvent::QuitGame { room_code, leave_type } => {
            if let Some(handle) = resolve(state, conn_id, &room_code) {
                handle.send(RoomCommand::QuitGame { conn_id: conn_id.clone(), leave_type });
            }
            *bound_room = None;
        }
        ClientEvent::ChatMessage { room_code, message } => {
            if let Some(handle) = resolve(state, conn_id, &room_code) {
                handle.send(RoomCommand::ChatMessage { conn_id: conn_id.clone(), message });
            }
        }
        ClientEvent::TogglePublicRoom { room_code, is_public } => {
            if let Some(handle) = resolve(state, conn_id, &room_code) {
                handle.send(RoomCommand::TogglePublicRoom { conn_id: conn_id.clone(), is_public });
            }
        }
        ClientEvent::RequestPublicRooms {} => {
            state.broadcaster.send(conn_id, &ServerEvent::PublicRoomsUpdated { rooms: state.rooms.public_rooms() });
        }
        ClientEvent::RequestSessionHistory {} => {
            state.broadcaster.send(
                conn_id,
                &ServerEvent::SessionHistory { sessions: state.sessions.recent_history(&state.rooms) },
            );
        }
        ClientEvent::UpdateGameOptions { room_code, game_options } => {
            if let Some(handle) = resolve(state, conn_id, &room_code) {
                handle.send(RoomCommand::UpdateGameOptions { conn_id: conn_id.clone(), options: game_options });
            }
        }
        ClientEvent::RequestGameOptions { room_code } => {
            if let Some(handle) = resolve(state, conn_id, &room_code) {
                handle.send(RoomCommand::RequestGameOptions { conn_id: conn_id.clone() });
            }
        }
    }
}

fn resolve(state: &GatewayState, conn_id: &ConnectionId, room_code: &str) -> Option<RoomHandle> {
    let code = RoomCode::new(room_code.to_string());
    let handle = state.rooms.get(&code);
    if handle.is_none() {
        state.broadcaster.send(
            conn_id,
            &ServerEvent::Error {
                message: "room not found".into(),
                reason: Some("state".into()),
            },
        );
    }
    handle
}

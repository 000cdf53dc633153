use std::collections::HashSet;

use common::npc::tuning::{Difficulty, Profile};
use common::npc::NpcState;
use common::simulation::player::{spawn_anchor, ControlScheme, Player, PlayerKind, COLOR_PALETTE};
use common::simulation::state::{GameState, Mode};
use common::simulation::tick::ensure_initial_food;
use common::simulation::win::check_win_condition;
use common::watchdog::shift_for_pause;
use common::{id_generator, log, ConnectionId, PlayerId, PlayerToken};

use crate::error::ApiError;
use crate::protocol::{GameOptionsMsg, LeaveType, NpcConfigMsg, ServerEvent};
use crate::room::types::{JoinAck, Participant, ALLOWED_TIME_LIMITS_MIN};
use crate::room::{Room, ALL_READY_DELAY_MS, COUNTDOWN_START, LOBBY_DISCONNECT_GRACE_MS, MAX_MULTI_PLAYERS, MULTI_CLEANUP_GRACE_MS, RUNNING_RECONNECT_GRACE_MS};
use crate::time::now_ms;

const DEFAULT_NPC_NAMES: [&str; 3] = ["Bot-Alpha", "Bot-Beta", "Bot-Gamma"];
const DEFAULT_NPC_DIFFICULTIES: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

pub fn join(
    room: &mut Room,
    conn_id: ConnectionId,
    display_name: String,
    control_scheme: ControlScheme,
    player_token: Option<String>,
) -> Result<JoinAck, ApiError> {
    if room.mode != Mode::Multi {
        return Err(ApiError::state("this room does not accept joinRoom".into()));
    }
    let name = display_name.trim();
    if name.is_empty() || name.chars().count() > 20 {
        return Err(ApiError::validation("display name must be 1-20 characters".into()));
    }

    // Reconnection: a known token before the countdown has started re-attaches
    // the existing membership instead of creating a new one (spec §4.6).
    if let Some(token) = player_token.as_deref() {
        if let Some(player_id) = room.tokens.get(&PlayerToken::new(token.to_string())).cloned() {
            let started = room.game_state.as_ref().is_some_and(|s| s.start_epoch_ms > 0);
            if !started {
                return reattach(room, conn_id, player_id);
            }
        }
    }

    if room.countdown.is_some() || room.game_state.is_some() {
        return Err(ApiError::state("room has already started".into()));
    }
    if room.participants.len() >= MAX_MULTI_PLAYERS {
        return Err(ApiError::validation("room is full".into()));
    }
    if room
        .participants
        .values()
        .any(|p| p.display_name.eq_ignore_ascii_case(name))
    {
        return Err(ApiError::validation("display name already taken in this room".into()));
    }

    let is_host = room.participants.is_empty();
    let token = id_generator::generate_connection_token();
    let player_id = PlayerId::new(id_generator::generate_player_id());
    let participant = Participant {
        id: player_id.clone(),
        display_name: name.to_string(),
        conn_id: Some(conn_id.clone()),
        token: PlayerToken::new(token.clone()),
        kind: PlayerKind::Human,
        is_host,
        control_scheme,
        disconnected: false,
        disconnected_at_epoch_ms: None,
        last_chat_epoch_ms: None,
    };
    room.tokens.insert(participant.token.clone(), player_id.clone());
    room.conn_to_player.insert(conn_id, player_id.clone());
    room.join_order.push(player_id.clone());
    room.participants.insert(player_id.clone(), participant);
    room.refresh_snapshot();

    room.broadcast(&ServerEvent::PlayerJoined {
        player_id: player_id.clone(),
        player_name: name.to_string(),
        is_host,
        players: room.roster(),
    });

    log!("room {}: {} joined (host={})", room.code, name, is_host);

    Ok(JoinAck {
        player_id,
        is_host,
        room_code: room.code.as_str().to_string(),
        game_mode: room.mode,
        game_options: room.options,
        player_token: token,
        is_public: room.is_public,
    })
}

fn reattach(room: &mut Room, conn_id: ConnectionId, player_id: PlayerId) -> Result<JoinAck, ApiError> {
    let Some(participant) = room.participants.get_mut(&player_id) else {
        return Err(ApiError::state("stale reconnection token".into()));
    };
    participant.disconnected = false;
    participant.disconnected_at_epoch_ms = None;
    participant.conn_id = Some(conn_id.clone());
    let is_host = participant.is_host;
    let token = participant.token.as_str().to_string();
    room.conn_to_player.insert(conn_id.clone(), player_id.clone());
    room.disconnect_deadlines.remove(&player_id);

    let ack = JoinAck {
        player_id: player_id.clone(),
        is_host,
        room_code: room.code.as_str().to_string(),
        game_mode: room.mode,
        game_options: room.options,
        player_token: token,
        is_public: room.is_public,
    };

    if let Some(state) = &room.game_state {
        room.send_to(
            &conn_id,
            &ServerEvent::GameStarted {
                game_state: crate::protocol::view::GameStateView::from_state(state, now_ms()),
                room_code: room.code.as_str().to_string(),
                player_id: player_id.clone(),
                game_mode: room.mode,
                is_host: Some(is_host),
            },
        );
    }
    room.refresh_snapshot();
    log!("room {}: {} reconnected during ready phase", room.code, player_id);
    Ok(ack)
}

pub fn start_game(room: &mut Room, conn_id: ConnectionId) {
    let Some(player_id) = room.player_id_for_conn(&conn_id) else {
        return;
    };
    let Some(participant) = room.participants.get(&player_id) else {
        return;
    };
    if !participant.is_host {
        room.send_to(&conn_id, &ServerEvent::Error {
            message: "only the host may start the game".into(),
            reason: Some("authorization".into()),
        });
        return;
    }
    if !(2..=MAX_MULTI_PLAYERS).contains(&room.participants.len()) {
        room.send_to(&conn_id, &ServerEvent::Error {
            message: "need 2-4 players to start".into(),
            reason: Some("state".into()),
        });
        return;
    }
    if room.game_state.is_some() {
        return;
    }

    build_game_state(room);
    room.ready_players.clear();
    if room.is_public {
        room.is_public = false;
    }
    room.refresh_snapshot();

    let state = room.game_state.as_ref().expect("just built");
    let view = crate::protocol::view::GameStateView::from_state(state, now_ms());
    for id in room.join_order.clone() {
        let Some(p) = room.participants.get(&id) else { continue };
        let Some(conn) = p.conn_id.clone() else { continue };
        let is_host = p.is_host;
        room.send_to(
            &conn,
            &ServerEvent::GameStarted {
                game_state: view.clone(),
                room_code: room.code.as_str().to_string(),
                player_id: id.clone(),
                game_mode: room.mode,
                is_host: Some(is_host),
            },
        );
    }
    log!("room {}: game started, entering ready phase", room.code);
}

/// Builds the initial `npcs` roster for a solo/single-player room,
/// falling back to the fixed `Bot-Alpha/Beta/Gamma` defaults (spec §4.6).
pub fn build_npc_roster(room: &mut Room, npc_count: u8, npc_configs: Vec<NpcConfigMsg>) {
    let count = npc_count.min(3) as usize;
    for i in 0..count {
        let cfg = npc_configs.get(i);
        let name = cfg
            .and_then(|c| c.name.clone())
            .unwrap_or_else(|| DEFAULT_NPC_NAMES[i].to_string());
        let difficulty = cfg
            .and_then(|c| c.difficulty)
            .unwrap_or(DEFAULT_NPC_DIFFICULTIES[i]);
        let profile = cfg.and_then(|c| c.profile).unwrap_or(Profile::Balanced);

        let npc_id = PlayerId::new(id_generator::generate_player_id());
        let participant = Participant {
            id: npc_id.clone(),
            display_name: name.clone(),
            conn_id: None,
            token: PlayerToken::new(format!("npc-{}", npc_id.as_str())),
            kind: PlayerKind::Npc,
            is_host: false,
            control_scheme: ControlScheme::Arrows,
            disconnected: false,
            disconnected_at_epoch_ms: None,
            last_chat_epoch_ms: None,
        };
        room.join_order.push(npc_id.clone());
        room.participants.insert(npc_id.clone(), participant);

        let tuning = difficulty.default_tuning();
        room.npcs.insert(
            npc_id.clone(),
            NpcState::new(npc_id, name, difficulty, profile, tuning),
        );
    }
}

/// Builds a fresh `GameState` from the current roster, assigning corner
/// anchors and palette colors strictly by join order (spec §3).
pub fn build_game_state(room: &mut Room) {
    let now = now_ms();
    let mut state = GameState::new(room.mode, room.options.wall_mode, room.options.strict_mode, room.options.time_limit_ms);

    for (index, id) in room.join_order.clone().iter().enumerate() {
        let Some(participant) = room.participants.get(id) else {
            continue;
        };
        let (pos, direction) = spawn_anchor(index);
        let mut player = Player::new(
            id.clone(),
            participant.display_name.clone(),
            participant.kind,
            COLOR_PALETTE[index % COLOR_PALETTE.len()],
            pos,
            direction,
            participant.control_scheme,
            now,
        );
        player.is_host = participant.is_host;
        state.join_order.push(id.clone());
        state.last_input_epoch_ms.insert(id.clone(), now);
        state.players.insert(id.clone(), player);
    }

    ensure_initial_food(&mut state, &mut room.rng);
    room.game_state = Some(state);
}

pub fn player_ready(room: &mut Room, conn_id: ConnectionId) {
    let Some(player_id) = room.player_id_for_conn(&conn_id) else {
        return;
    };
    if room.game_state.is_none() || room.countdown.is_some() {
        return;
    }
    room.ready_players.insert(player_id);

    room.broadcast(&ServerEvent::PlayerReadyStatus {
        ready_players: room.ready_players.iter().cloned().collect(),
    });

    let humans: HashSet<PlayerId> = room
        .participants
        .values()
        .filter(|p| p.kind == PlayerKind::Human)
        .map(|p| p.id.clone())
        .collect();
    if humans.is_subset(&room.ready_players) && room.all_ready_since_ms.is_none() {
        room.all_ready_since_ms = Some(now_ms());
        room.broadcast(&ServerEvent::AllPlayersReady {});
    }
}

/// Called every tick by `room::tick`; advances the 300ms post-ready
/// delay and the start-countdown itself.
pub fn maybe_advance_pregame(room: &mut Room) {
    if room.countdown.is_none() {
        if let Some(since) = room.all_ready_since_ms {
            if now_ms() - since >= ALL_READY_DELAY_MS {
                room.all_ready_since_ms = None;
                room.countdown = Some(COUNTDOWN_START);
                room.broadcast(&ServerEvent::GameCountdown { countdown: COUNTDOWN_START });
            }
        }
        return;
    }

    let Some(value) = room.countdown else { return };
    if value == 0 {
        room.countdown = None;
        begin_running(room);
        return;
    }
    let next = value - 1;
    room.countdown = Some(next);
    room.broadcast(&ServerEvent::GameCountdown { countdown: next });
}

fn begin_running(room: &mut Room) {
    let now = now_ms();
    let session_id = room.sessions.start_session(room.code.clone(), room.mode, now);
    room.session_id = Some(session_id);
    if let Some(state) = room.game_state.as_mut() {
        state.start_epoch_ms = now;
        state.timer_seconds = 0;
        for ts in state.last_input_epoch_ms.values_mut() {
            *ts = now;
        }
    }
    room.refresh_snapshot();
    room.broadcast_game_state();
    log!("room {}: simulation running", room.code);
}

pub fn request_game_state(room: &mut Room, conn_id: ConnectionId, player_token: Option<String>) {
    if room.mode != Mode::Multi && room.conn_to_player.get(&conn_id).is_none() {
        if let Some(token) = player_token.as_deref() {
            if let Some(player_id) = room.tokens.get(&PlayerToken::new(token.to_string())).cloned() {
                reconnect_solo(room, conn_id.clone(), player_id);
            }
        }
    }

    if room.game_state.is_some() {
        room.send_to(&conn_id, &ServerEvent::GameStateUpdate { game_state: room.game_state_view() });
    } else {
        room.send_to(&conn_id, &ServerEvent::GameStateError {
            message: "game has not started".into(),
            room_code: room.code.as_str().to_string(),
        });
    }
}

/// Rebinds a new connection to an existing solo/single membership and
/// clears the disconnect-induced pause (spec §4.6 "reconnect via token
/// within 30s and resume"). No-op if the membership is already connected.
fn reconnect_solo(room: &mut Room, conn_id: ConnectionId, player_id: PlayerId) {
    let Some(participant) = room.participants.get_mut(&player_id) else {
        return;
    };
    if participant.conn_id.is_some() {
        return;
    }
    participant.conn_id = Some(conn_id.clone());
    participant.disconnected = false;
    participant.disconnected_at_epoch_ms = None;
    room.conn_to_player.insert(conn_id, player_id.clone());
    room.disconnect_deadlines.remove(&player_id);

    let now = now_ms();
    if let Some(state) = room.game_state.as_mut() {
        if let Some(pause_start) = state.pause_start_epoch_ms.take() {
            let pause_duration = now - pause_start;
            state.total_pause_ms += pause_duration;
            shift_for_pause(state, pause_duration);
            state.paused = false;
        }
    }
    room.broadcast(&ServerEvent::GameResumed {});
    log!("room {}: {} reconnected and resumed", room.code, player_id);
}

pub fn pause_game(room: &mut Room, conn_id: ConnectionId) {
    let Some(player_id) = room.player_id_for_conn(&conn_id) else {
        return;
    };
    let Some(participant) = room.participants.get(&player_id) else {
        return;
    };
    if participant.kind != PlayerKind::Human {
        return;
    }
    let Some(state) = room.game_state.as_mut() else {
        room.send_to(&conn_id, &ServerEvent::PauseError { message: "no active game".into() });
        return;
    };
    if state.start_epoch_ms == 0 && room.countdown.is_none() {
        room.send_to(&conn_id, &ServerEvent::PauseError { message: "game has not started".into() });
        return;
    }
    if state.paused {
        room.send_to(&conn_id, &ServerEvent::PauseError { message: "already paused".into() });
        return;
    }
    if room.mode == Mode::Multi && state.total_pause_ms >= common::simulation::state::MULTI_PAUSE_BUDGET_MS {
        room.send_to(&conn_id, &ServerEvent::PauseError { message: "pause budget exhausted".into() });
        return;
    }

    state.paused = true;
    state.pause_start_epoch_ms = Some(now_ms());
    let name = participant.display_name.clone();
    room.broadcast(&ServerEvent::GamePaused { paused_by: name });
    log!("room {}: paused", room.code);
}

pub fn resume_game(room: &mut Room, conn_id: ConnectionId) {
    let Some(player_id) = room.player_id_for_conn(&conn_id) else {
        return;
    };
    let Some(participant) = room.participants.get(&player_id) else {
        return;
    };
    if participant.kind != PlayerKind::Human {
        return;
    }
    let Some(state) = room.game_state.as_ref() else {
        room.send_to(&conn_id, &ServerEvent::ResumeError { message: "no active game".into() });
        return;
    };
    if !state.paused || room.resume_countdown.is_some() {
        room.send_to(&conn_id, &ServerEvent::ResumeError { message: "game is not paused".into() });
        return;
    }

    let name = participant.display_name.clone();
    room.resume_countdown = Some((COUNTDOWN_START, name.clone()));
    room.broadcast(&ServerEvent::ResumeCountdown { countdown: COUNTDOWN_START, resumed_by: name });
}

/// Called every tick; advances the resume-countdown and finalizes the
/// pause-budget/shift-inputs bookkeeping on completion (spec §4.6).
pub fn maybe_advance_resume(room: &mut Room) {
    let Some((value, resumed_by)) = room.resume_countdown.clone() else {
        return;
    };
    if value == 0 {
        room.resume_countdown = None;
        finish_resume(room, resumed_by);
        return;
    }
    let next = value - 1;
    room.resume_countdown = Some((next, resumed_by.clone()));
    room.broadcast(&ServerEvent::ResumeCountdown { countdown: next, resumed_by });
}

fn finish_resume(room: &mut Room, _resumed_by: String) {
    let now = now_ms();
    let Some(state) = room.game_state.as_mut() else {
        return;
    };
    let Some(pause_start) = state.pause_start_epoch_ms.take() else {
        state.paused = false;
        return;
    };
    let pause_duration = now - pause_start;
    state.total_pause_ms += pause_duration;
    shift_for_pause(state, pause_duration);

    if room.mode == Mode::Multi && state.total_pause_ms >= common::simulation::state::MULTI_PAUSE_BUDGET_MS {
        state.paused = false;
        check_win_condition(state, false, now);
        finalize_end(room, "winner_declared");
        return;
    }

    state.paused = false;
    room.broadcast(&ServerEvent::GameResumed {});
    log!("room {}: resumed", room.code);
}

pub fn quit_game(room: &mut Room, conn_id: ConnectionId, leave_type: LeaveType) {
    let Some(player_id) = room.player_id_for_conn(&conn_id) else {
        return;
    };
    let Some(participant) = room.participants.get(&player_id).cloned() else {
        return;
    };
    if participant.kind != PlayerKind::Human {
        return;
    }

    if room.mode != Mode::Multi {
        if let Some(state) = room.game_state.as_mut() {
            if let Some(p) = state.players.get_mut(&player_id) {
                p.alive = false;
            }
            check_win_condition(state, false, now_ms());
        }
        finalize_end(room, "host_quit_no_players");
        return;
    }

    if let Some(state) = room.game_state.as_mut() {
        if let Some(p) = state.players.get_mut(&player_id) {
            p.alive = false;
        }
    }

    if participant.is_host && leave_type == LeaveType::WithParty {
        if let Some(state) = room.game_state.as_mut() {
            check_win_condition(state, false, now_ms());
        }
        room.broadcast(&ServerEvent::GameQuit { quit_by: participant.display_name.clone(), reason: "host_left".into() });
        finalize_end(room, "all_players_quit");
        return;
    }

    remove_membership(room, &player_id, "quit");
    room.broadcast(&ServerEvent::PlayerQuit {
        player_name: participant.display_name.clone(),
        reason: "quit".into(),
        was_host: participant.is_host,
        players: room.roster(),
    });

    let connected_humans = room.participants.values().filter(|p| p.kind == PlayerKind::Human && !p.disconnected).count();
    if connected_humans <= 1 && room.game_state.is_some() {
        if let Some(state) = room.game_state.as_mut() {
            check_win_condition(state, false, now_ms());
        }
        finalize_end(room, "all_players_quit");
        return;
    }

    if participant.is_host {
        elect_new_host(room);
    }
    room.refresh_snapshot();
}

/// Finishes what the watchdog started for a multi-mode kick (spec §4.5):
/// the simulation side already marked the player dead and cleared their
/// power-ups; this removes them from membership/token maps, drops their
/// connection from the room channel, broadcasts `playerLeft`, and elects
/// a new host if the kicked player held it.
pub fn handle_inactivity_kick(room: &mut Room, player_id: PlayerId) {
    let Some(participant) = room.participants.get(&player_id).cloned() else {
        return;
    };
    remove_membership(room, &player_id, "inactive");

    room.broadcast(&ServerEvent::PlayerLeft {
        player_name: participant.display_name,
        reason: "inactive".into(),
        was_host: participant.is_host,
        players: room.roster(),
    });

    if participant.is_host {
        elect_new_host(room);
    }
    room.refresh_snapshot();
}

fn remove_membership(room: &mut Room, player_id: &PlayerId, _reason: &str) {
    if let Some(participant) = room.participants.remove(player_id) {
        if let Some(conn) = participant.conn_id {
            room.conn_to_player.remove(&conn);
        }
        room.tokens.remove(&participant.token);
    }
    room.join_order.retain(|id| id != player_id);
    room.ready_players.remove(player_id);
    room.disconnect_deadlines.remove(player_id);
}

/// Uniform-random once the game has started, first-joined while still in
/// the lobby (spec §4.6 "host election").
fn elect_new_host(room: &mut Room) {
    let candidates: Vec<PlayerId> = room
        .join_order
        .iter()
        .filter(|id| room.participants.contains_key(*id))
        .cloned()
        .collect();
    if candidates.is_empty() {
        return;
    }
    let started = room.game_state.as_ref().is_some_and(|s| s.start_epoch_ms > 0) || room.countdown.is_some();
    let new_host = if started {
        candidates[room.rng.random_range(0..candidates.len())].clone()
    } else {
        candidates[0].clone()
    };

    for (id, participant) in room.participants.iter_mut() {
        participant.is_host = *id == new_host;
    }
    if let Some(state) = room.game_state.as_mut() {
        for (id, player) in state.players.iter_mut() {
            player.is_host = *id == new_host;
        }
    }
    let name = room.participants.get(&new_host).map(|p| p.display_name.clone()).unwrap_or_default();
    room.broadcast(&ServerEvent::HostChanged { new_host_id: new_host, new_host_name: name });
}

pub fn disconnect(room: &mut Room, conn_id: ConnectionId) {
    let Some(player_id) = room.conn_to_player.remove(&conn_id) else {
        return;
    };
    let Some(participant) = room.participants.get_mut(&player_id) else {
        return;
    };
    participant.conn_id = None;

    let started = room.game_state.as_ref().is_some_and(|s| s.start_epoch_ms > 0);

    if room.mode == Mode::Multi {
        if !started {
            participant.disconnected = true;
            participant.disconnected_at_epoch_ms = Some(now_ms());
            room.disconnect_deadlines.insert(player_id, now_ms() + LOBBY_DISCONNECT_GRACE_MS);
            return;
        }
        participant.disconnected = true;
        participant.disconnected_at_epoch_ms = Some(now_ms());
        room.tokens.remove(&participant.token);
        if let Some(state) = room.game_state.as_mut() {
            if let Some(p) = state.players.get_mut(&player_id) {
                p.alive = false;
            }
        }
        let connected_humans = room
            .participants
            .values()
            .filter(|p| p.kind == PlayerKind::Human && !p.disconnected)
            .count();
        if connected_humans <= 1 {
            if let Some(state) = room.game_state.as_mut() {
                check_win_condition(state, false, now_ms());
            }
            finalize_end(room, "all_players_disconnected");
        }
        return;
    }

    // Solo/single: pause and open a reconnection window.
    participant.disconnected = true;
    participant.disconnected_at_epoch_ms = Some(now_ms());
    if let Some(state) = room.game_state.as_mut() {
        if !state.paused {
            state.paused = true;
            state.pause_start_epoch_ms = Some(now_ms());
        }
    }
    room.disconnect_deadlines.insert(player_id, now_ms() + RUNNING_RECONNECT_GRACE_MS);
}

/// Invoked each tick to expire grace windows and the post-game cleanup
/// timer (spec §4.6 "cleanup timers").
pub fn sweep_timers(room: &mut Room) {
    let now = now_ms();

    let expired: Vec<PlayerId> = room
        .disconnect_deadlines
        .iter()
        .filter(|&(_, &deadline)| now >= deadline)
        .map(|(id, _)| id.clone())
        .collect();
    for player_id in expired {
        room.disconnect_deadlines.remove(&player_id);
        if room.mode == Mode::Multi {
            remove_membership(room, &player_id, "timeout");
            room.refresh_snapshot();
        } else if let Some(state) = room.game_state.as_mut() {
            if let Some(p) = state.players.get_mut(&player_id) {
                p.alive = false;
            }
            check_win_condition(state, false, now);
            finalize_end(room, "player_inactive_disconnected");
        }
    }

    if let Some(deadline) = room.cleanup_deadline {
        if now >= deadline {
            room.disposed = true;
        }
    }
}

/// Emits the terminal `gameEnded` event exactly once per session and
/// schedules room disposal (spec §5 "gameEnded sent exactly once").
pub fn finalize_end(room: &mut Room, reason: &'static str) {
    if room.game_ended_emitted {
        return;
    }
    room.game_ended_emitted = true;

    let now = now_ms();
    if let Some(session_id) = room.session_id.clone() {
        let (winner_name, winner_score) = room
            .game_state
            .as_ref()
            .and_then(|s| s.winner.as_ref())
            .map(|w| (Some(w.name.clone()), Some(w.score)))
            .unwrap_or((None, None));
        room.sessions.end_session(&session_id, reason, winner_name, winner_score, now);
    }

    if let Some(state) = &room.game_state {
        let view = crate::protocol::view::GameStateView::from_state(state, now);
        let alive_players: Vec<PlayerId> = state.alive_players().map(|p| p.id.clone()).collect();
        let dead_players: Vec<PlayerId> = state
            .players
            .values()
            .filter(|p| !p.alive)
            .map(|p| p.id.clone())
            .collect();
        room.broadcast(&ServerEvent::GameEnded {
            winner: state.winner.as_ref().map(crate::protocol::view::WinnerView::from),
            game_state: view,
            game_mode: room.mode,
            alive_players,
            dead_players,
            room_code: room.code.as_str().to_string(),
        });
    }

    room.refresh_snapshot();
    log!("room {}: game ended ({reason})", room.code);

    room.cleanup_deadline = Some(match room.mode {
        Mode::Multi => now + MULTI_CLEANUP_GRACE_MS,
        Mode::Solo | Mode::Single => now,
    });
}

pub fn chat_message(room: &mut Room, conn_id: ConnectionId, message: String) {
    if !room.flags.chat {
        return;
    }
    let Some(player_id) = room.player_id_for_conn(&conn_id) else {
        return;
    };
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return;
    }
    let capped: String = trimmed.chars().take(200).collect();

    let now = now_ms();
    let Some(participant) = room.participants.get_mut(&player_id) else {
        return;
    };
    if let Some(last) = participant.last_chat_epoch_ms {
        if now - last < 800 {
            return;
        }
    }
    participant.last_chat_epoch_ms = Some(now);
    let name = participant.display_name.clone();

    room.broadcast(&ServerEvent::ChatMessage { player_name: name, message: capped, epoch_ms: now });
}

pub fn toggle_public_room(room: &mut Room, conn_id: ConnectionId, is_public: Option<bool>) {
    let Some(player_id) = room.player_id_for_conn(&conn_id) else {
        return;
    };
    let Some(participant) = room.participants.get(&player_id) else {
        return;
    };
    if !participant.is_host {
        room.send_to(&conn_id, &ServerEvent::PublicRoomStatus {
            room_code: room.code.as_str().to_string(),
            is_public: room.is_public,
            error: Some("only the host may change room visibility".into()),
        });
        return;
    }
    if room.mode != Mode::Multi {
        return;
    }
    room.is_public = is_public.unwrap_or(!room.is_public);
    room.refresh_snapshot();
    room.send_to(&conn_id, &ServerEvent::PublicRoomStatus {
        room_code: room.code.as_str().to_string(),
        is_public: room.is_public,
        error: None,
    });
}

pub fn update_game_options(room: &mut Room, conn_id: ConnectionId, options: GameOptionsMsg) {
    let Some(player_id) = room.player_id_for_conn(&conn_id) else {
        return;
    };
    let Some(participant) = room.participants.get(&player_id) else {
        return;
    };
    if !participant.is_host {
        room.send_to(&conn_id, &ServerEvent::Error { message: "only the host may change options".into(), reason: Some("authorization".into()) });
        return;
    }
    if let Some(Some(minutes)) = options.time_limit {
        if !ALLOWED_TIME_LIMITS_MIN.contains(&minutes) {
            room.send_to(&conn_id, &ServerEvent::Error { message: "invalid time limit".into(), reason: Some("validation".into()) });
            return;
        }
    }
    room.options.apply(options.wall_mode, options.strict_mode, options.time_limit);
    room.broadcast(&ServerEvent::GameOptionsUpdated { game_options: room.options.to_view() });
}

pub fn request_game_options(room: &mut Room, conn_id: ConnectionId) {
    room.send_to(&conn_id, &ServerEvent::GameOptionsUpdated { game_options: room.options.to_view() });
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, RwLock};

    use tokio::sync::mpsc;

    use common::ConnectionId;

    use crate::config::FeatureFlags;
    use crate::gateway::broadcaster::Broadcaster;
    use crate::registry::sessions::SessionRegistry;
    use crate::registry::{RoomRegistry, RoomSnapshot};

    use super::*;

    fn test_room(mode: Mode) -> Room {
        let (_tx, rx) = mpsc::unbounded_channel();
        let snapshot = Arc::new(RwLock::new(RoomSnapshot::default()));
        let flags = FeatureFlags { chat: true, powerups: true, accessibility: true };
        Room::new(
            common::RoomCode::new("TEST01".to_string()),
            mode,
            Broadcaster::new(),
            flags,
            SessionRegistry::new(),
            RoomRegistry::new(),
            snapshot,
            rx,
        )
    }

    fn conn(tag: &str) -> ConnectionId {
        ConnectionId::new(format!("conn-{tag}"))
    }

    #[test]
    fn first_join_becomes_host() {
        let mut room = test_room(Mode::Multi);
        let ack = join(&mut room, conn("a"), "Alice".into(), ControlScheme::Arrows, None).unwrap();
        assert!(ack.is_host);
        assert_eq!(room.participants.len(), 1);
    }

    #[test]
    fn second_join_is_not_host() {
        let mut room = test_room(Mode::Multi);
        join(&mut room, conn("a"), "Alice".into(), ControlScheme::Arrows, None).unwrap();
        let ack = join(&mut room, conn("b"), "Bob".into(), ControlScheme::Arrows, None).unwrap();
        assert!(!ack.is_host);
    }

    #[test]
    fn join_rejects_duplicate_display_name_case_insensitively() {
        let mut room = test_room(Mode::Multi);
        join(&mut room, conn("a"), "Alice".into(), ControlScheme::Arrows, None).unwrap();
        let err = join(&mut room, conn("b"), "alice".into(), ControlScheme::Arrows, None).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn join_rejects_a_full_room() {
        let mut room = test_room(Mode::Multi);
        for i in 0..MAX_MULTI_PLAYERS {
            join(&mut room, conn(&i.to_string()), format!("P{i}"), ControlScheme::Arrows, None).unwrap();
        }
        let err = join(&mut room, conn("overflow"), "PX".into(), ControlScheme::Arrows, None).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn join_rejects_non_multi_rooms() {
        let mut room = test_room(Mode::Solo);
        let err = join(&mut room, conn("a"), "Alice".into(), ControlScheme::Arrows, None).unwrap_err();
        assert!(matches!(err, ApiError::State(_)));
    }

    #[test]
    fn host_leaving_alone_elects_a_new_host() {
        let mut room = test_room(Mode::Multi);
        let host = join(&mut room, conn("a"), "Alice".into(), ControlScheme::Arrows, None).unwrap();
        join(&mut room, conn("b"), "Bob".into(), ControlScheme::Arrows, None).unwrap();

        quit_game(&mut room, conn("a"), LeaveType::Alone);

        assert!(!room.participants.contains_key(&host.player_id));
        assert_eq!(room.participants.len(), 1);
        assert!(room.participants.values().next().unwrap().is_host);
    }

    #[test]
    fn chat_message_is_rate_limited_to_one_per_800ms() {
        let mut room = test_room(Mode::Multi);
        join(&mut room, conn("a"), "Alice".into(), ControlScheme::Arrows, None).unwrap();
        let player_id = room.join_order[0].clone();

        chat_message(&mut room, conn("a"), "hello".into());
        let first_stamp = room.participants[&player_id].last_chat_epoch_ms;
        chat_message(&mut room, conn("a"), "world".into());
        let second_stamp = room.participants[&player_id].last_chat_epoch_ms;

        assert_eq!(first_stamp, second_stamp, "second message inside the window must be dropped");
    }

    #[test]
    fn handle_inactivity_kick_removes_membership_and_elects_new_host() {
        let mut room = test_room(Mode::Multi);
        let host = join(&mut room, conn("a"), "Alice".into(), ControlScheme::Arrows, None).unwrap();
        join(&mut room, conn("b"), "Bob".into(), ControlScheme::Arrows, None).unwrap();

        handle_inactivity_kick(&mut room, host.player_id.clone());

        assert!(!room.participants.contains_key(&host.player_id));
        assert!(!room.tokens.contains_key(&PlayerToken::new(host.player_token)));
        assert_eq!(room.participants.len(), 1);
        assert!(room.participants.values().next().unwrap().is_host);
    }

    #[test]
    fn reconnect_solo_clears_pause_and_rebinds_connection() {
        let mut room = test_room(Mode::Solo);
        room.options.wall_mode = false;
        let player_id = PlayerId::new("p1".to_string());
        let token = PlayerToken::new("tok-1".to_string());
        let participant = Participant {
            id: player_id.clone(),
            display_name: "Alice".into(),
            conn_id: None,
            token: token.clone(),
            kind: common::simulation::player::PlayerKind::Human,
            is_host: true,
            control_scheme: ControlScheme::Arrows,
            disconnected: true,
            disconnected_at_epoch_ms: Some(now_ms()),
            last_chat_epoch_ms: None,
        };
        room.tokens.insert(token.clone(), player_id.clone());
        room.join_order.push(player_id.clone());
        room.participants.insert(player_id.clone(), participant);
        build_game_state(&mut room);
        if let Some(state) = room.game_state.as_mut() {
            state.start_epoch_ms = now_ms();
            state.paused = true;
            state.pause_start_epoch_ms = Some(now_ms() - 1000);
        }
        room.disconnect_deadlines.insert(player_id.clone(), now_ms() + RUNNING_RECONNECT_GRACE_MS);

        request_game_state(&mut room, conn("new"), Some(token.as_str().to_string()));

        let participant = &room.participants[&player_id];
        assert!(!participant.disconnected);
        assert_eq!(participant.conn_id, Some(conn("new")));
        assert!(!room.disconnect_deadlines.contains_key(&player_id));
        assert!(!room.game_state.as_ref().unwrap().paused);
    }
}

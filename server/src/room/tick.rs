use common::grid::Direction;
use common::powerup::PowerupType;
use common::simulation::tick::{run_tick, DeathCause, SimEvent};
use common::watchdog::WatchdogAction;
use common::{log, ConnectionId};

use crate::protocol::ServerEvent;
use crate::room::{lifecycle, Room};
use crate::time::now_ms;

/// Handles an inbound `playerInput` (spec §4.4): only queues a direction
/// change while the simulation is actually advancing.
pub fn handle_input(room: &mut Room, conn_id: ConnectionId, direction: Direction) {
    let Some(player_id) = room.player_id_for_conn(&conn_id) else {
        return;
    };
    let now = now_ms();

    let accepted = {
        let Some(state) = room.game_state.as_mut() else {
            return;
        };
        if state.start_epoch_ms == 0 || state.paused || state.winner.is_some() {
            false
        } else if let Some(player) = state.players.get_mut(&player_id) {
            if !player.alive {
                false
            } else {
                let ok = player.try_queue_direction(direction);
                if ok {
                    state.last_input_epoch_ms.insert(player_id.clone(), now);
                }
                ok
            }
        } else {
            false
        }
    };

    if !accepted {
        room.send_to(
            &conn_id,
            &ServerEvent::InputRejected {
                reason: "direction reverses current heading".into(),
            },
        );
    }
}

/// One pass of the room's heartbeat/simulation interval (spec §5, §9):
/// advances whichever countdown is active, otherwise runs exactly one
/// simulation tick, then always sweeps grace-window timers.
pub fn on_tick(room: &mut Room) {
    if room.game_ended_emitted {
        lifecycle::sweep_timers(room);
        return;
    }

    if room.resume_countdown.is_some() {
        lifecycle::maybe_advance_resume(room);
        room.broadcast_game_state();
        lifecycle::sweep_timers(room);
        return;
    }

    if room.game_state.is_none() {
        lifecycle::sweep_timers(room);
        return;
    }

    if room.game_state.as_ref().is_some_and(|s| s.start_epoch_ms == 0) {
        lifecycle::maybe_advance_pregame(room);
        room.broadcast_game_state();
        lifecycle::sweep_timers(room);
        return;
    }

    if room.game_state.as_ref().is_some_and(|s| s.paused) {
        room.broadcast_game_state();
        lifecycle::sweep_timers(room);
        return;
    }

    run_simulation_tick(room);
    lifecycle::sweep_timers(room);
}

fn run_simulation_tick(room: &mut Room) {
    let now = now_ms();
    let powerups_enabled = room.flags.powerups;

    let outcome = {
        let Some(state) = room.game_state.as_mut() else {
            return;
        };
        run_tick(
            state,
            &mut room.npcs,
            now,
            powerups_enabled,
            &mut room.powerup_module,
            &mut room.rng,
        )
    };

    for event in outcome.events.clone() {
        translate_event(room, &event);
    }

    room.broadcast_game_state();

    if outcome.ended {
        let reason = end_reason(room, &outcome.events);
        lifecycle::finalize_end(room, reason);
    }
}

fn end_reason(room: &Room, events: &[SimEvent]) -> &'static str {
    if events.iter().any(|e| matches!(e, SimEvent::TimedOut)) {
        return "timeout";
    }
    if let Some(WatchdogAction::GameEnded { player_id }) = events.iter().find_map(|e| match e {
        SimEvent::Watchdog(action @ WatchdogAction::GameEnded { .. }) => Some(action),
        _ => None,
    }) {
        let still_connected = room
            .participants
            .get(player_id)
            .is_some_and(|p| p.conn_id.is_some());
        return if still_connected {
            "player_inactive"
        } else {
            "player_inactive_disconnected"
        };
    }
    "winner_declared"
}

fn translate_event(room: &mut Room, event: &SimEvent) {
    match event {
        SimEvent::FoodEaten { .. } => {}
        SimEvent::PowerupCollected { player_id, kind } => {
            let name = room
                .participants
                .get(player_id)
                .map(|p| p.display_name.clone())
                .unwrap_or_default();
            room.broadcast(&ServerEvent::PowerUpCollected {
                player_id: player_id.clone(),
                player_name: name,
                kind: *kind,
                sound: powerup_sound(*kind).to_string(),
            });
        }
        SimEvent::PlayerDied { player_id, cause } => {
            let name = room
                .participants
                .get(player_id)
                .map(|p| p.display_name.clone())
                .unwrap_or_default();
            room.broadcast(&ServerEvent::PlayerCollided {
                player_name: name,
                collision_type: collision_label(*cause).to_string(),
            });
        }
        SimEvent::Watchdog(action) => translate_watchdog(room, action),
        SimEvent::TimedOut => {
            log!("room {}: time limit reached", room.code);
        }
    }
}

fn translate_watchdog(room: &mut Room, action: &WatchdogAction) {
    match action {
        WatchdogAction::Warned { player_id, remaining_seconds } => {
            let Some(conn) = room
                .participants
                .get(player_id)
                .and_then(|p| p.conn_id.clone())
            else {
                return;
            };
            room.send_to(
                &conn,
                &ServerEvent::InactivityWarning {
                    message: "you will be removed for inactivity".into(),
                    remaining_seconds: *remaining_seconds,
                },
            );
        }
        WatchdogAction::Kicked { player_id } => {
            if let Some(conn) = room.participants.get(player_id).and_then(|p| p.conn_id.clone()) {
                room.send_to(
                    &conn,
                    &ServerEvent::PlayerKicked {
                        reason: "inactivity".into(),
                        message: "removed for inactivity".into(),
                    },
                );
            }
            lifecycle::handle_inactivity_kick(room, player_id.clone());
        }
        WatchdogAction::GameEnded { player_id } => {
            log!("room {}: solo player {} kicked for inactivity", room.code, player_id);
        }
    }
}

fn powerup_sound(kind: PowerupType) -> &'static str {
    match kind {
        PowerupType::SpeedBoost => "powerup_speed",
        PowerupType::Shield => "powerup_shield",
        PowerupType::Shrink => "powerup_shrink",
        PowerupType::SlowOthers => "powerup_slow",
    }
}

fn collision_label(cause: DeathCause) -> &'static str {
    match cause {
        DeathCause::Wall => "wall",
        DeathCause::SelfCollision => "self",
        DeathCause::HeadToHead => "head_to_head",
        DeathCause::HeadToBody => "head_to_body",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, RwLock};

    use tokio::sync::mpsc;

    use common::simulation::player::ControlScheme;
    use common::simulation::state::Mode;
    use common::ConnectionId;

    use crate::config::FeatureFlags;
    use crate::gateway::broadcaster::Broadcaster;
    use crate::registry::sessions::SessionRegistry;
    use crate::registry::{RoomRegistry, RoomSnapshot};
    use crate::room::{lifecycle, Room};

    use super::*;

    fn test_room() -> Room {
        let (_tx, rx) = mpsc::unbounded_channel();
        let snapshot = Arc::new(RwLock::new(RoomSnapshot::default()));
        let flags = FeatureFlags { chat: true, powerups: true, accessibility: true };
        Room::new(
            common::RoomCode::new("TEST02".to_string()),
            Mode::Multi,
            Broadcaster::new(),
            flags,
            SessionRegistry::new(),
            RoomRegistry::new(),
            snapshot,
            rx,
        )
    }

    #[test]
    fn watchdog_kick_actually_removes_the_player_from_membership() {
        let mut room = test_room();
        let host = lifecycle::join(&mut room, ConnectionId::new("a"), "Alice".into(), ControlScheme::Arrows, None).unwrap();
        lifecycle::join(&mut room, ConnectionId::new("b"), "Bob".into(), ControlScheme::Arrows, None).unwrap();

        translate_watchdog(&mut room, &WatchdogAction::Kicked { player_id: host.player_id.clone() });

        assert!(!room.participants.contains_key(&host.player_id));
        assert_eq!(room.participants.len(), 1);
        assert!(room.participants.values().next().unwrap().is_host);
    }

    #[test]
    fn timed_out_event_maps_to_the_timeout_reason() {
        let room = test_room();
        let events = vec![SimEvent::TimedOut];
        assert_eq!(end_reason(&room, &events), "timeout");
    }

    #[test]
    fn solo_inactivity_kick_is_player_inactive_while_still_connected() {
        let mut room = test_room();
        let host = lifecycle::join(&mut room, ConnectionId::new("a"), "Alice".into(), ControlScheme::Arrows, None).unwrap();
        let events = vec![SimEvent::Watchdog(WatchdogAction::GameEnded { player_id: host.player_id.clone() })];

        assert_eq!(end_reason(&room, &events), "player_inactive");
    }

    #[test]
    fn solo_inactivity_kick_is_player_inactive_disconnected_once_the_connection_is_gone() {
        let mut room = test_room();
        let host = lifecycle::join(&mut room, ConnectionId::new("a"), "Alice".into(), ControlScheme::Arrows, None).unwrap();
        room.participants.get_mut(&host.player_id).unwrap().conn_id = None;
        let events = vec![SimEvent::Watchdog(WatchdogAction::GameEnded { player_id: host.player_id.clone() })];

        assert_eq!(end_reason(&room, &events), "player_inactive_disconnected");
    }
}

use crate::simulation::state::{GameState, Mode};
use crate::PlayerId;

pub const WARN_MS: i64 = 45_000;
pub const KICK_MS: i64 = 60_000;

/// Outcome of one watchdog pass; the room actor turns these into
/// membership changes, host elections and broadcasts (spec §4.5).
#[derive(Debug, Clone)]
pub enum WatchdogAction {
    Warned { player_id: PlayerId, remaining_seconds: i64 },
    Kicked { player_id: PlayerId },
    GameEnded { player_id: PlayerId },
}

fn mark_dead(state: &mut GameState, id: &PlayerId, now_epoch_ms: i64) {
    if let Some(player) = state.players.get_mut(id) {
        if player.alive {
            player.alive = false;
            player.survival_duration_ms = Some(now_epoch_ms - player.survival_start_epoch_ms);
        }
        player.clear_powerups();
    }
}

/// Runs once per tick, after `startEpochMs > 0` and while not paused
/// (the caller is responsible for that gating).
pub fn run(state: &mut GameState, now_epoch_ms: i64) -> Vec<WatchdogAction> {
    if state.winner.is_some() {
        return Vec::new();
    }

    let candidates: Vec<PlayerId> = state
        .players
        .values()
        .filter(|p| p.is_human() && p.alive)
        .map(|p| p.id.clone())
        .collect();

    let mut actions = Vec::new();
    for id in candidates {
        let last = *state
            .last_input_epoch_ms
            .get(&id)
            .unwrap_or(&now_epoch_ms);
        let idle = now_epoch_ms - last;

        match state.mode {
            Mode::Multi => {
                if idle >= KICK_MS {
                    mark_dead(state, &id, now_epoch_ms);
                    state.warned.remove(&id);
                    actions.push(WatchdogAction::Kicked { player_id: id });
                } else if idle >= WARN_MS && !state.warned.contains(&id) {
                    state.warned.insert(id.clone());
                    let remaining = ((KICK_MS - idle) / 1000).max(0);
                    actions.push(WatchdogAction::Warned {
                        player_id: id,
                        remaining_seconds: remaining,
                    });
                }
            }
            Mode::Solo | Mode::Single => {
                if idle >= KICK_MS {
                    mark_dead(state, &id, now_epoch_ms);
                    actions.push(WatchdogAction::GameEnded { player_id: id });
                }
            }
        }
    }
    actions
}

/// Pause-shift rule (spec §4.5): paused time must not count toward
/// inactivity, so every recorded input timestamp is pushed forward by
/// the pause duration on resume.
pub fn shift_for_pause(state: &mut GameState, pause_duration_ms: i64) {
    for ts in state.last_input_epoch_ms.values_mut() {
        *ts += pause_duration_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Direction;
    use crate::simulation::player::{ControlScheme, Player, PlayerKind};
    use crate::simulation::state::GameState;
    use crate::PlayerId;

    fn add_human(state: &mut GameState, id: &str, now: i64) {
        let pid = PlayerId::new(id);
        let player = Player::new(
            pid.clone(),
            id.to_string(),
            PlayerKind::Human,
            "#fff",
            crate::grid::Position::new(1, 1),
            Direction::Right,
            ControlScheme::Arrows,
            now,
        );
        state.players.insert(pid.clone(), player);
        state.last_input_epoch_ms.insert(pid, now);
    }

    #[test]
    fn multi_mode_warns_then_kicks() {
        let mut state = GameState::new(Mode::Multi, true, false, None);
        add_human(&mut state, "p1", 0);

        let actions = run(&mut state, WARN_MS);
        assert!(matches!(actions[0], WatchdogAction::Warned { .. }));

        let actions = run(&mut state, KICK_MS);
        assert!(matches!(actions[0], WatchdogAction::Kicked { .. }));
        assert!(!state.players[&PlayerId::new("p1")].alive);
    }

    #[test]
    fn solo_mode_ends_game_without_warning() {
        let mut state = GameState::new(Mode::Solo, true, false, None);
        add_human(&mut state, "p1", 0);

        let actions = run(&mut state, WARN_MS);
        assert!(actions.is_empty());

        let actions = run(&mut state, KICK_MS);
        assert!(matches!(actions[0], WatchdogAction::GameEnded { .. }));
    }
}

use crate::simulation::player::Player;
use crate::simulation::state::{GameState, Mode, Winner};

const LAST_SURVIVOR_GRACE_MS: i64 = 5_000;
const TIMEOUT_SURVIVOR_BONUS: u32 = 50;

fn survival_duration_ms(player: &Player, now_epoch_ms: i64) -> i64 {
    match player.survival_duration_ms {
        Some(d) => d,
        None => (now_epoch_ms - player.survival_start_epoch_ms).max(0),
    }
}

/// Implements `checkWinCondition(timeoutReached, room)` from spec §4.4.
/// Mutates scores (survival bonuses) and `state.winner` in place.
pub fn check_win_condition(state: &mut GameState, timeout_reached: bool, now_epoch_ms: i64) {
    if timeout_reached && state.winner.is_none() && !state.timeout_bonus_applied {
        let alive_ids: Vec<_> = state
            .players
            .iter()
            .filter(|(_, p)| p.alive)
            .map(|(id, _)| id.clone())
            .collect();
        for id in alive_ids {
            if let Some(p) = state.players.get_mut(&id) {
                p.score += TIMEOUT_SURVIVOR_BONUS;
            }
        }
        state.timeout_bonus_applied = true;
    }

    match state.mode {
        Mode::Single => check_single_or_solo(state),
        Mode::Solo => check_single_or_solo(state),
        Mode::Multi => check_multi(state, timeout_reached, now_epoch_ms),
    }
}

/// Single (one human among NPCs) and solo (lone human) share the same
/// rule: the game only ends when the human dies.
fn check_single_or_solo(state: &mut GameState) {
    if state.winner.is_some() {
        return;
    }
    let human_id = match state.humans().next().map(|p| p.id.clone()) {
        Some(id) => id,
        None => return,
    };
    let Some(human) = state.players.get(&human_id) else {
        return;
    };
    if human.alive {
        return;
    }
    state.winner = Some(Winner {
        player_id: human.id.clone(),
        name: human.display_name.clone(),
        score: human.score,
        is_loser: true,
    });
}

fn check_multi(state: &mut GameState, timeout_reached: bool, now_epoch_ms: i64) {
    if state.players.is_empty() {
        return;
    }

    let mut ordered: Vec<_> = state.players.keys().cloned().collect();
    sort_by_standing(state, &mut ordered, now_epoch_ms);

    let alive_count = state.players.values().filter(|p| p.alive).count();
    let total_players = state.players.len();

    if alive_count == 0 {
        let top_id = ordered[0].clone();
        let top = &state.players[&top_id];
        state.winner = Some(Winner {
            player_id: top.id.clone(),
            name: top.display_name.clone(),
            score: top.score,
            is_loser: false,
        });
        return;
    }

    if alive_count == 1 && total_players > 1 {
        let total_score: u32 = state.players.values().map(|p| p.score).sum();
        if total_score == 0 {
            let since = *state
                .last_survivor_since_epoch_ms
                .get_or_insert(now_epoch_ms);
            if now_epoch_ms - since < LAST_SURVIVOR_GRACE_MS {
                return;
            }
        }
        let survivor_id = state
            .players
            .iter()
            .find(|(_, p)| p.alive)
            .map(|(id, _)| id.clone())
            .expect("alive_count == 1");
        if let Some(survivor) = state.players.get_mut(&survivor_id) {
            survivor.score += TIMEOUT_SURVIVOR_BONUS;
        }
        sort_by_standing(state, &mut ordered, now_epoch_ms);
        let top_id = ordered[0].clone();
        let top = &state.players[&top_id];
        state.winner = Some(Winner {
            player_id: top.id.clone(),
            name: top.display_name.clone(),
            score: top.score,
            is_loser: false,
        });
        return;
    }

    // Two or more players still alive: no winner yet, timeout or not.
    state.last_survivor_since_epoch_ms = None;
}

/// Sort key `(−score, aliveFirst, −survivalDuration)` from spec §4.4.
fn sort_by_standing(state: &GameState, ids: &mut [crate::PlayerId], now_epoch_ms: i64) {
    ids.sort_by(|a, b| {
        let pa = &state.players[a];
        let pb = &state.players[b];
        pb.score
            .cmp(&pa.score)
            .then_with(|| pb.alive.cmp(&pa.alive))
            .then_with(|| {
                survival_duration_ms(pb, now_epoch_ms).cmp(&survival_duration_ms(pa, now_epoch_ms))
            })
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Direction, Position};
    use crate::simulation::player::{ControlScheme, Player, PlayerKind};
    use crate::PlayerId;

    fn two_alive_players() -> GameState {
        let mut state = GameState::new(Mode::Multi, true, false, Some(60_000));
        for i in 0..2 {
            let id = PlayerId::new(format!("p{i}"));
            let player = Player::new(
                id.clone(),
                format!("Player {i}"),
                PlayerKind::Human,
                "#e63946",
                Position::new(i as i32, 0),
                Direction::Right,
                ControlScheme::Arrows,
                0,
            );
            state.join_order.push(id.clone());
            state.players.insert(id, player);
        }
        state
    }

    #[test]
    fn timeout_with_two_survivors_leaves_the_round_winner_less() {
        let mut state = two_alive_players();
        state.players.get_mut(&PlayerId::new("p0")).unwrap().score = 10;
        state.players.get_mut(&PlayerId::new("p1")).unwrap().score = 4;
        state.last_survivor_since_epoch_ms = Some(55_000);

        check_win_condition(&mut state, true, 60_000);

        assert!(state.winner.is_none(), "2+ survivors at timeout must not force a winner");
        assert!(state.last_survivor_since_epoch_ms.is_none());
        // the timeout survival bonus still applies once, equally, to both.
        assert_eq!(state.players[&PlayerId::new("p0")].score, 10 + TIMEOUT_SURVIVOR_BONUS);
        assert_eq!(state.players[&PlayerId::new("p1")].score, 4 + TIMEOUT_SURVIVOR_BONUS);
    }

    #[test]
    fn timeout_bonus_does_not_reapply_on_every_subsequent_tick() {
        let mut state = two_alive_players();
        check_win_condition(&mut state, true, 60_000);
        assert!(state.winner.is_none());
        let score_after_first_timeout = state.players[&PlayerId::new("p0")].score;

        // A second call with the same `timeout_reached = true` (as would
        // happen if the room ticker kept calling in after the deadline,
        // since nothing declares a winner for 2+ survivors) must not keep
        // stacking the survival bonus on top of itself.
        check_win_condition(&mut state, true, 60_200);
        assert_eq!(state.players[&PlayerId::new("p0")].score, score_after_first_timeout);
    }
}

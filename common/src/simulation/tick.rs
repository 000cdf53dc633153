use std::collections::HashMap;

use crate::grid::{self, Position};
use crate::npc::{self, NpcState};
use crate::powerup::{self, CollectEvent, PowerupEffect, PowerupModule, PowerupType};
use crate::rng::SessionRng;
use crate::simulation::player::PlayerKind;
use crate::simulation::state::{GameState, Mode};
use crate::simulation::win;
use crate::watchdog::{self, WatchdogAction};
use crate::PlayerId;

const FOOD_SCORE: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeathCause {
    Wall,
    SelfCollision,
    HeadToHead,
    HeadToBody,
}

#[derive(Debug, Clone)]
pub enum SimEvent {
    FoodEaten { player_id: PlayerId },
    PowerupCollected { player_id: PlayerId, kind: PowerupType },
    PlayerDied { player_id: PlayerId, cause: DeathCause },
    Watchdog(WatchdogAction),
    TimedOut,
}

#[derive(Debug, Default)]
pub struct TickOutcome {
    pub events: Vec<SimEvent>,
    /// Set once `state.winner` becomes `Some` during this tick.
    pub ended: bool,
}

/// Advances the room's simulation by exactly one tick (spec §4.4). The
/// caller is responsible for gating (paused / countdown / not started)
/// and for broadcasting the resulting state.
pub fn run_tick(
    state: &mut GameState,
    npcs: &mut HashMap<PlayerId, NpcState>,
    now_epoch_ms: i64,
    powerups_enabled: bool,
    powerup_module: &mut PowerupModule,
    rng: &mut SessionRng,
) -> TickOutcome {
    let mut outcome = TickOutcome::default();
    if state.winner.is_some() {
        return outcome;
    }

    state.tick += 1;
    let elapsed_ms = now_epoch_ms - state.start_epoch_ms - state.total_pause_ms;
    state.timer_seconds = (elapsed_ms / 1000).max(0);

    if let Some(limit) = state.time_limit_ms {
        if elapsed_ms >= limit {
            win::check_win_condition(state, true, now_epoch_ms);
            outcome.events.push(SimEvent::TimedOut);
            outcome.ended = state.winner.is_some();
            return outcome;
        }
    }

    if powerups_enabled {
        powerup_module.maybe_spawn(state, now_epoch_ms, rng);
        for CollectEvent { player_id, kind } in powerup_module.check_collect(state, now_epoch_ms) {
            outcome.events.push(SimEvent::PowerupCollected { player_id, kind });
        }
        powerup_module.tick(state, now_epoch_ms);
    }

    for action in watchdog::run(state, now_epoch_ms) {
        if let WatchdogAction::GameEnded { .. } = &action {
            win::check_win_condition(state, false, now_epoch_ms);
            outcome.ended = state.winner.is_some();
        }
        outcome.events.push(SimEvent::Watchdog(action));
    }
    if outcome.ended {
        return outcome;
    }

    for npc_state in npcs.values_mut() {
        npc::decide(npc_state, state, rng);
    }

    run_movement(state, now_epoch_ms, rng, &mut outcome);
    if outcome.ended {
        return outcome;
    }

    if !state.paused {
        win::check_win_condition(state, false, now_epoch_ms);
        outcome.ended = state.winner.is_some();
    }

    if state.mode == Mode::Single {
        maybe_respawn_npc(state, npcs, now_epoch_ms, rng);
    }

    outcome
}

fn run_movement(state: &mut GameState, now_epoch_ms: i64, rng: &mut SessionRng, outcome: &mut TickOutcome) {
    let mut accumulators: HashMap<PlayerId, f64> = HashMap::new();
    let mut max_steps: u32 = 0;
    for player in state.alive_players() {
        let factor = powerup::speed_factor(&player.active_powerups, now_epoch_ms);
        let acc = player.speed_accumulator + factor;
        accumulators.insert(player.id.clone(), acc);
        max_steps = max_steps.max(acc.floor() as u32);
    }
    for (id, acc) in &accumulators {
        if let Some(player) = state.players.get_mut(id) {
            player.speed_accumulator = *acc;
        }
    }

    for _ in 0..max_steps {
        let movers: Vec<PlayerId> = state
            .alive_players()
            .filter(|p| p.speed_accumulator >= 1.0)
            .map(|p| p.id.clone())
            .collect();
        if movers.is_empty() {
            break;
        }
        for id in &movers {
            if let Some(player) = state.players.get_mut(id) {
                player.speed_accumulator -= 1.0;
            }
        }
        run_substep(state, &movers, now_epoch_ms, rng, outcome);

        win::check_win_condition(state, false, now_epoch_ms);
        if state.winner.is_some() {
            outcome.ended = true;
            return;
        }
    }
}

fn run_substep(
    state: &mut GameState,
    movers: &[PlayerId],
    now_epoch_ms: i64,
    rng: &mut SessionRng,
    outcome: &mut TickOutcome,
) {
    let wall_mode = state.wall_mode;
    let strict_mode = state.strict_mode;
    let mode = state.mode;

    let mut new_heads: HashMap<PlayerId, Position> = HashMap::new();
    for id in movers {
        if let Some(player) = state.players.get_mut(id) {
            player.direction = player.queued_direction;
            let head = grid::step(player.snake.head(), player.direction, wall_mode);
            new_heads.insert(id.clone(), head);
        }
    }

    let mut died: HashMap<PlayerId, DeathCause> = HashMap::new();

    let mut groups: HashMap<Position, Vec<PlayerId>> = HashMap::new();
    for (id, head) in &new_heads {
        groups.entry(*head).or_default().push(id.clone());
    }
    for (_, group) in groups.iter() {
        if group.len() < 2 {
            continue;
        }
        if mode == Mode::Single {
            let has_human = group.iter().any(|id| is_human(state, id));
            let has_npc = group.iter().any(|id| !is_human(state, id));
            if has_human && has_npc {
                continue;
            }
        }
        if mode == Mode::Multi && !wall_mode && !strict_mode {
            continue;
        }
        let all_shielded = group
            .iter()
            .all(|id| has_shield(state, id, now_epoch_ms));
        if all_shielded {
            continue;
        }
        for id in group {
            died.entry(id.clone()).or_insert(DeathCause::HeadToHead);
        }
    }

    for id in movers {
        if died.contains_key(id) {
            continue;
        }
        let head = new_heads[id];
        if wall_mode && grid::would_hit_wall(state.players[id].snake.head(), state.players[id].direction) {
            if !has_shield(state, id, now_epoch_ms) {
                died.insert(id.clone(), DeathCause::Wall);
            }
            continue;
        }

        if state.players[id].snake.body_contains(head) {
            if !has_shield(state, id, now_epoch_ms) {
                died.insert(id.clone(), DeathCause::SelfCollision);
            }
            continue;
        }

        if let Some(cause) = other_snake_hit(state, id, head, mode, wall_mode, strict_mode) {
            if !has_shield(state, id, now_epoch_ms) {
                died.insert(id.clone(), cause);
            }
        }
    }

    for (id, cause) in died {
        outcome.events.push(SimEvent::PlayerDied {
            player_id: id.clone(),
            cause,
        });
        if let Some(player) = state.players.get_mut(&id) {
            player.alive = false;
            player.survival_duration_ms = Some(now_epoch_ms - player.survival_start_epoch_ms);
            player.clear_powerups();
        }
    }

    for id in movers {
        let Some(player) = state.players.get(id) else {
            continue;
        };
        if !player.alive {
            continue;
        }
        let head = new_heads[id];
        let ate_food = state.food.remove(&head);
        if let Some(player) = state.players.get_mut(id) {
            player.snake.push_head(head);
            if !ate_food {
                player.snake.pop_tail();
            }
        }
        if ate_food {
            state.total_food_eaten += 1;
            state.recompute_level();
            if let Some(player) = state.players.get_mut(id) {
                player.score += FOOD_SCORE;
            }
            outcome.events.push(SimEvent::FoodEaten { player_id: id.clone() });
            spawn_food(state, rng);
        }
    }
}

fn is_human(state: &GameState, id: &PlayerId) -> bool {
    state
        .players
        .get(id)
        .is_some_and(|p| p.kind == PlayerKind::Human)
}

fn has_shield(state: &GameState, id: &PlayerId, now_epoch_ms: i64) -> bool {
    state
        .players
        .get(id)
        .is_some_and(|p| p.has_effect(PowerupEffect::Shield, now_epoch_ms))
}

fn other_snake_hit(
    state: &GameState,
    id: &PlayerId,
    head: Position,
    mode: Mode,
    wall_mode: bool,
    strict_mode: bool,
) -> Option<DeathCause> {
    for (other_id, other) in &state.players {
        if other_id == id || !other.alive {
            continue;
        }
        if mode == Mode::Single {
            let self_human = is_human(state, id);
            let other_human = is_human(state, other_id);
            if self_human != other_human {
                continue;
            }
        }
        if mode == Mode::Multi && !wall_mode && !strict_mode {
            continue;
        }
        let hit = if strict_mode {
            other.snake.contains(head)
        } else {
            other.snake.head() == head
        };
        if hit {
            return Some(DeathCause::HeadToBody);
        }
    }
    None
}

fn spawn_food(state: &mut GameState, rng: &mut SessionRng) {
    if let Some(pos) = free_cell(state, rng) {
        state.food.insert(pos);
    }
}

fn free_cell(state: &GameState, rng: &mut SessionRng) -> Option<Position> {
    for _ in 0..400 {
        let x = rng.random_range(0..grid::WIDTH);
        let y = rng.random_range(0..grid::HEIGHT);
        let candidate = Position::new(x, y);
        let occupied = state
            .players
            .values()
            .filter(|p| p.alive)
            .any(|p| p.snake.contains(candidate))
            || state.food.contains(&candidate)
            || state.powerups.iter().any(|p| p.position == candidate);
        if !occupied {
            return Some(candidate);
        }
    }
    None
}

/// Ensures the given room has at least one food item, used at game start.
pub fn ensure_initial_food(state: &mut GameState, rng: &mut SessionRng) {
    if state.food.is_empty() {
        spawn_food(state, rng);
    }
}

/// Single-mode only: revives exactly one NPC when all NPCs have died but
/// the human is still alive (spec §4.4).
fn maybe_respawn_npc(
    state: &mut GameState,
    npcs: &HashMap<PlayerId, NpcState>,
    now_epoch_ms: i64,
    rng: &mut SessionRng,
) {
    let human_alive = state.humans().any(|p| p.alive);
    if !human_alive {
        return;
    }
    let all_npcs_dead = npcs
        .keys()
        .all(|id| state.players.get(id).is_some_and(|p| !p.alive));
    if npcs.is_empty() || !all_npcs_dead {
        return;
    }

    let Some(revive_id) = npcs.keys().next().cloned() else {
        return;
    };

    let corners = [
        Position::new(5, 5),
        Position::new(grid::WIDTH - 6, grid::HEIGHT - 6),
        Position::new(5, grid::HEIGHT - 6),
        Position::new(grid::WIDTH - 6, 5),
    ];
    let start = corners
        .into_iter()
        .find(|pos| !occupied(state, *pos))
        .or_else(|| free_cell(state, rng))
        .unwrap_or(Position::new(grid::WIDTH / 2, grid::HEIGHT / 2));

    if let Some(player) = state.players.get_mut(&revive_id) {
        player.snake = crate::simulation::player::Snake::new(start);
        player.score = 0;
        player.alive = true;
        player.survival_start_epoch_ms = now_epoch_ms;
        player.survival_duration_ms = None;
        player.clear_powerups();
    }
}

fn occupied(state: &GameState, pos: Position) -> bool {
    state
        .players
        .values()
        .filter(|p| p.alive)
        .any(|p| p.snake.contains(pos))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Direction;
    use crate::simulation::player::{ControlScheme, Player};

    fn human(state: &mut GameState, id: &str, pos: Position, dir: Direction) {
        let pid = PlayerId::new(id);
        let player = Player::new(
            pid.clone(),
            id.to_string(),
            PlayerKind::Human,
            "#fff",
            pos,
            dir,
            ControlScheme::Arrows,
            0,
        );
        state.last_input_epoch_ms.insert(pid.clone(), 0);
        state.join_order.push(pid.clone());
        state.players.insert(pid, player);
    }

    #[test]
    fn solo_eats_one_food_and_gains_score() {
        let mut state = GameState::new(Mode::Solo, false, false, None);
        human(&mut state, "p1", Position::new(5, 5), Direction::Right);
        state.food.insert(Position::new(6, 5));
        state.start_epoch_ms = 0;

        let mut npcs = HashMap::new();
        let mut powerup_module = PowerupModule::new();
        let mut rng = SessionRng::new(1);

        let outcome = run_tick(&mut state, &mut npcs, 1000, false, &mut powerup_module, &mut rng);

        let p1 = &state.players[&PlayerId::new("p1")];
        assert_eq!(p1.snake.head(), Position::new(6, 5));
        assert_eq!(p1.score, 10);
        assert_eq!(state.total_food_eaten, 1);
        assert_eq!(state.level, 1);
        assert!(outcome.events.iter().any(|e| matches!(e, SimEvent::FoodEaten { .. })));
    }

    #[test]
    fn wall_mode_collision_kills_mover() {
        let mut state = GameState::new(Mode::Solo, true, false, None);
        human(&mut state, "p1", Position::new(0, 5), Direction::Left);
        state.start_epoch_ms = 0;

        let mut npcs = HashMap::new();
        let mut powerup_module = PowerupModule::new();
        let mut rng = SessionRng::new(1);

        run_tick(&mut state, &mut npcs, 1000, false, &mut powerup_module, &mut rng);

        assert!(!state.players[&PlayerId::new("p1")].alive);
    }

    #[test]
    fn strict_mode_head_into_opponent_body_dies() {
        // A moves right into what is B's neck segment, not B's head.
        let mut state = GameState::new(Mode::Multi, false, true, None);
        human(&mut state, "a", Position::new(5, 5), Direction::Right);
        human(&mut state, "b", Position::new(6, 5), Direction::Up);
        if let Some(b) = state.players.get_mut(&PlayerId::new("b")) {
            b.snake.push_head(Position::new(7, 5));
            b.queued_direction = Direction::Up;
            b.direction = Direction::Up;
        }
        state.start_epoch_ms = 0;

        let mut npcs = HashMap::new();
        let mut powerup_module = PowerupModule::new();
        let mut rng = SessionRng::new(1);

        run_tick(&mut state, &mut npcs, 1000, false, &mut powerup_module, &mut rng);

        assert!(!state.players[&PlayerId::new("a")].alive);
    }

    #[test]
    fn normal_mode_head_into_opponent_body_survives() {
        // Same geometry as above but wall_mode=true keeps the multi
        // pass-through rule from masking the head-only distinction.
        let mut state = GameState::new(Mode::Multi, true, false, None);
        human(&mut state, "a", Position::new(5, 5), Direction::Right);
        human(&mut state, "b", Position::new(6, 5), Direction::Up);
        if let Some(b) = state.players.get_mut(&PlayerId::new("b")) {
            b.snake.push_head(Position::new(7, 5));
            b.queued_direction = Direction::Up;
            b.direction = Direction::Up;
        }
        state.start_epoch_ms = 0;

        let mut npcs = HashMap::new();
        let mut powerup_module = PowerupModule::new();
        let mut rng = SessionRng::new(1);

        run_tick(&mut state, &mut npcs, 1000, false, &mut powerup_module, &mut rng);

        assert!(state.players[&PlayerId::new("a")].alive);
    }

    #[test]
    fn shrink_never_drops_below_length_one() {
        let mut snake = crate::simulation::player::Snake::new(Position::new(0, 0));
        snake.push_head(Position::new(1, 0));
        snake.shrink(5);
        assert_eq!(snake.len(), 1);
    }
}

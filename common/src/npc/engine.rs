use crate::grid::{self, Direction, Position};
use crate::npc::tuning::{Bias, DerivedSettings, Difficulty, Profile, Tuning};
use crate::rng::SessionRng;
use crate::simulation::state::GameState;
use crate::PlayerId;

#[derive(Debug, Clone)]
pub struct NpcState {
    pub id: PlayerId,
    pub name: String,
    pub difficulty: Difficulty,
    pub profile: Profile,
    pub tuning: Tuning,
    pub derived: DerivedSettings,
    pub target_food: Option<Position>,
    pub last_direction: Option<Direction>,
    pub decision_delay_ticks: u32,
}

impl NpcState {
    pub fn new(id: PlayerId, name: String, difficulty: Difficulty, profile: Profile, tuning: Tuning) -> Self {
        Self {
            id,
            name,
            difficulty,
            profile,
            tuning,
            derived: DerivedSettings::derive(tuning),
            target_food: None,
            last_direction: None,
            decision_delay_ticks: 0,
        }
    }
}

enum Category {
    Food,
    Hunt,
    Survive,
}

/// Runs one NPC's decision for the current tick and, if it produces a
/// direction, queues it on the corresponding player via the normal
/// reversal-guarded path (spec §4.3).
pub fn decide(npc: &mut NpcState, state: &mut GameState, rng: &mut SessionRng) {
    if npc.decision_delay_ticks > 0 {
        npc.decision_delay_ticks -= 1;
        return;
    }
    npc.decision_delay_ticks = npc.derived.reaction_ms / 50;

    let Some(player) = state.players.get(&npc.id) else {
        return;
    };
    if !player.alive {
        return;
    }
    let current_direction = player.direction;
    let head = player.snake.head();

    if rng.random_bool(1.0 - npc.derived.success_rate) {
        if let Some(dir) = safe_move(npc, state, current_direction, current_direction, rng) {
            apply(state, npc, dir);
        }
        return;
    }

    let target = select_target(npc, state, head, rng);
    let preferred = target.map(|t| preferred_direction(head, t, current_direction, state.wall_mode));
    let chosen = safe_move(
        npc,
        state,
        current_direction,
        preferred.unwrap_or(current_direction),
        rng,
    );
    if let Some(dir) = chosen {
        apply(state, npc, dir);
    }
}

fn apply(state: &mut GameState, npc: &mut NpcState, dir: Direction) {
    if let Some(player) = state.players.get_mut(&npc.id) {
        if player.try_queue_direction(dir) {
            npc.last_direction = Some(dir);
        }
    }
}

/// Weighted target selection (spec §4.3 step 2): food, nearest opponent
/// head, or the board center when `survive` wins or nothing is available.
fn select_target(
    npc: &NpcState,
    state: &GameState,
    head: Position,
    rng: &mut SessionRng,
) -> Option<Position> {
    let Bias { food, hunt, survival } = npc.profile.bias();
    let aggression = npc.derived.aggression;
    let caution = npc.derived.caution;

    let best_food = state
        .food
        .iter()
        .min_by(|a, b| {
            a.wrap_aware_distance(head, state.wall_mode)
                .cmp(&b.wrap_aware_distance(head, state.wall_mode))
        })
        .copied();

    let best_opponent_head = state
        .players
        .values()
        .filter(|p| p.id != npc.id && p.alive)
        .map(|p| p.snake.head())
        .min_by(|a, b| {
            a.wrap_aware_distance(head, state.wall_mode)
                .cmp(&b.wrap_aware_distance(head, state.wall_mode))
        });

    let w_food = if best_food.is_some() {
        food * (1.0 + 0.3 * (1.0 - aggression))
    } else {
        0.0
    };
    let w_hunt = if best_opponent_head.is_some() {
        hunt * (0.6 + 0.8 * aggression)
    } else {
        0.0
    };
    let w_survive = survival * (0.6 + 0.8 * caution);

    let total = w_food + w_hunt + w_survive;
    if total <= 0.0 {
        return Some(board_center());
    }
    let roll = rng.random_range(0.0..total);
    let category = if roll < w_food {
        Category::Food
    } else if roll < w_food + w_hunt {
        Category::Hunt
    } else {
        Category::Survive
    };

    match category {
        Category::Food => best_food.or(Some(board_center())),
        Category::Hunt => best_opponent_head.or(Some(board_center())),
        Category::Survive => Some(board_center()),
    }
}

fn board_center() -> Position {
    Position::new(grid::WIDTH / 2, grid::HEIGHT / 2)
}

/// Axis with the larger absolute delta wins; ties favor the axis that
/// does not reverse the current committed direction (spec §4.3 step 3).
fn preferred_direction(
    from: Position,
    to: Position,
    current: Direction,
    wall_mode: bool,
) -> Direction {
    let (dx, dy) = if wall_mode {
        (to.x - from.x, to.y - from.y)
    } else {
        (wrap_delta(from.x, to.x, grid::WIDTH), wrap_delta(from.y, to.y, grid::HEIGHT))
    };

    let x_dir = if dx >= 0 { Direction::Right } else { Direction::Left };
    let y_dir = if dy >= 0 { Direction::Down } else { Direction::Up };

    if dx.abs() > dy.abs() {
        x_dir
    } else if dy.abs() > dx.abs() {
        y_dir
    } else if x_dir.is_opposite_of(current) {
        y_dir
    } else {
        x_dir
    }
}

/// Minimal signed delta accounting for wrap-around edges.
fn wrap_delta(from: i32, to: i32, max: i32) -> i32 {
    let raw = to - from;
    let wrapped = if raw > 0 { raw - max } else { raw + max };
    if raw.abs() <= wrapped.abs() {
        raw
    } else {
        wrapped
    }
}

fn predicted_opponent_heads(state: &GameState, self_id: &PlayerId) -> Vec<Position> {
    state
        .players
        .values()
        .filter(|p| &p.id != self_id && p.alive)
        .map(|p| grid::step(p.snake.head(), p.queued_direction, state.wall_mode))
        .collect()
}

fn occupied_by_any_snake(state: &GameState, pos: Position) -> bool {
    state
        .players
        .values()
        .filter(|p| p.alive)
        .any(|p| p.snake.contains(pos))
}

/// Candidate scoring plus selection (spec §4.3 steps 4-5).
fn safe_move(
    npc: &mut NpcState,
    state: &GameState,
    current_direction: Direction,
    preferred: Direction,
    rng: &mut SessionRng,
) -> Option<Direction> {
    let Some(player) = state.players.get(&npc.id) else {
        return None;
    };
    let head = player.snake.head();
    let predicted_heads = predicted_opponent_heads(state, &npc.id);
    let caution = npc.derived.caution;

    let mut scored: Vec<(Direction, f64)> = Vec::new();
    for dir in Direction::ALL {
        if dir.is_opposite_of(current_direction) {
            continue;
        }
        if state.wall_mode && grid::would_hit_wall(head, dir) {
            continue;
        }
        let candidate = grid::step(head, dir, state.wall_mode);
        if occupied_by_any_snake(state, candidate) {
            continue;
        }
        if predicted_heads.contains(&candidate) {
            continue;
        }

        let mut score = 100.0;
        if dir == preferred {
            score += 50.0;
        }
        if state.wall_mode {
            let wall_distance = distance_to_wall(candidate);
            score += wall_distance as f64 * (2.0 + 3.0 * caution);
            if wall_distance < 2 {
                score -= 30.0 * caution;
            }
            if would_lead_to_dead_end(candidate, dir, state, npc.derived.look_ahead) {
                score -= 120.0 * caution;
            }
        }
        score += future_branch_count(candidate, dir, state) as f64 * (8.0 + 8.0 * caution);

        scored.push((dir, score));
    }

    if scored.is_empty() {
        return None;
    }
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());

    let top_score = scored[0].1;
    if top_score <= 0.0 {
        if scored.iter().any(|&(d, _)| d == preferred) {
            return Some(preferred);
        }
        return Some(scored[0].0);
    }

    if rng.random_bool(npc.derived.randomness) {
        let near_top: Vec<Direction> = scored
            .iter()
            .filter(|&&(_, s)| top_score - s <= 25.0)
            .map(|&(d, _)| d)
            .collect();
        if near_top.len() > 1 {
            return rng.choose(&near_top).copied();
        }
    }
    Some(scored[0].0)
}

fn distance_to_wall(pos: Position) -> i32 {
    pos.x
        .min(grid::WIDTH - 1 - pos.x)
        .min(pos.y)
        .min(grid::HEIGHT - 1 - pos.y)
}

/// Number of legal forward moves from `pos` having just come from
/// `entered_via` — used both as a branch-count bonus and inside the
/// dead-end lookahead.
fn future_branch_count(pos: Position, entered_via: Direction, state: &GameState) -> usize {
    Direction::ALL
        .into_iter()
        .filter(|&d| !d.is_opposite_of(entered_via))
        .filter(|&d| {
            if state.wall_mode && grid::would_hit_wall(pos, d) {
                return false;
            }
            let next = grid::step(pos, d, state.wall_mode);
            !occupied_by_any_snake(state, next)
        })
        .count()
}

/// Wall-mode-only forward simulation (spec §4.3): declares a dead end if
/// a future step hits a wall/snake, or the corridor narrows to a single
/// option before the last lookahead step.
fn would_lead_to_dead_end(start: Position, entered_via: Direction, state: &GameState, look_ahead: u32) -> bool {
    if !state.wall_mode {
        return false;
    }
    let mut pos = start;
    let mut via = entered_via;
    for step_idx in 0..look_ahead {
        if grid::would_hit_wall(pos, via) {
            return true;
        }
        let next = grid::step(pos, via, true);
        if occupied_by_any_snake(state, next) {
            return true;
        }
        let branches: Vec<Direction> = Direction::ALL
            .into_iter()
            .filter(|&d| !d.is_opposite_of(via))
            .filter(|&d| !grid::would_hit_wall(next, d) && !occupied_by_any_snake(state, grid::step(next, d, true)))
            .collect();
        if branches.is_empty() {
            return true;
        }
        if branches.len() == 1 && step_idx + 1 < look_ahead {
            pos = next;
            via = branches[0];
            continue;
        }
        pos = next;
        via = branches[0];
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Position;
    use crate::simulation::player::{ControlScheme, Player, PlayerKind};
    use crate::simulation::state::{GameState, Mode};

    fn state_with_npc(wall_mode: bool, head: Position, direction: Direction) -> (GameState, NpcState) {
        let mut state = GameState::new(Mode::Single, wall_mode, false, None);
        let id = PlayerId::new("npc-1".to_string());
        let player = Player::new(
            id.clone(),
            "npc-1".into(),
            PlayerKind::Npc,
            "#ffffff",
            head,
            direction,
            ControlScheme::Arrows,
            0,
        );
        state.players.insert(id.clone(), player);
        let tuning = Difficulty::Medium.default_tuning();
        let npc = NpcState::new(id, "npc-1".into(), Difficulty::Medium, Profile::Balanced, tuning);
        (state, npc)
    }

    #[test]
    fn decide_never_reverses_current_direction() {
        let (mut state, mut npc) = state_with_npc(true, Position::new(10, 10), Direction::Right);
        let mut rng = SessionRng::new(7);
        for _ in 0..20 {
            decide(&mut npc, &mut state, &mut rng);
            let player = state.players.values().next().unwrap();
            assert!(!player.queued_direction.is_opposite_of(player.direction));
            // advance the committed direction the way the simulation tick would
            let next_dir = player.queued_direction;
            state.players.values_mut().next().unwrap().direction = next_dir;
        }
    }

    #[test]
    fn safe_move_never_picks_a_wall_collision_in_wall_mode() {
        let head = Position::new(0, 5);
        let (state, mut npc) = state_with_npc(true, head, Direction::Up);
        let mut rng = SessionRng::new(3);
        let dir = safe_move(&mut npc, &state, Direction::Right, Direction::Left, &mut rng);
        if let Some(dir) = dir {
            assert!(!crate::grid::would_hit_wall(head, dir));
        }
    }

    #[test]
    fn preferred_direction_picks_larger_axis_delta() {
        let from = Position::new(0, 0);
        let to = Position::new(5, 1);
        assert_eq!(preferred_direction(from, to, Direction::Up, true), Direction::Right);
    }

    #[test]
    fn wrap_delta_prefers_the_shorter_path_around_the_edge() {
        // width 30: going from x=1 to x=28 is shorter by wrapping left.
        let d = wrap_delta(1, 28, crate::grid::WIDTH);
        assert!(d < 0);
    }
}

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::grid::Position;
use crate::simulation::state::GameState;
use crate::PlayerId;

/// At most this many power-ups may sit on the board at once (spec §4.2).
pub const MAX_ACTIVE: usize = 2;
/// Uncollected items vanish this long after spawning.
pub const ITEM_LIFETIME_MS: i64 = 30_000;
/// Every collected effect (except the no-op on `slowOthers`'s collector)
/// lasts this long.
pub const EFFECT_DURATION_MS: i64 = 7_000;
const SPAWN_INTERVAL_MIN_MS: i64 = 12_000;
const SPAWN_INTERVAL_MAX_MS: i64 = 20_000;
const ALL_TYPES: [PowerupType; 4] = [
    PowerupType::SpeedBoost,
    PowerupType::Shield,
    PowerupType::Shrink,
    PowerupType::SlowOthers,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PowerupType {
    SpeedBoost,
    Shield,
    Shrink,
    SlowOthers,
}

/// Per-player effect flags. `Slowed` is the only one allowed to stack
/// across multiple grants (spec §4.2, §REDESIGN).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PowerupEffect {
    Shield,
    SpeedBoost,
    Slowed,
}

#[derive(Debug, Clone)]
pub struct PowerupItem {
    pub id: String,
    pub position: Position,
    pub kind: PowerupType,
    pub spawn_epoch_ms: i64,
}

pub struct CollectEvent {
    pub player_id: PlayerId,
    pub kind: PowerupType,
}

/// Tracks cadence state across ticks; owned by the room's `GameState`.
#[derive(Debug, Clone, Default)]
pub struct PowerupModule {
    pub last_spawn_epoch_ms: Option<i64>,
    pub next_interval_ms: i64,
}

impl PowerupModule {
    pub fn new() -> Self {
        Self {
            last_spawn_epoch_ms: None,
            next_interval_ms: SPAWN_INTERVAL_MIN_MS,
        }
    }

    fn resample_interval(rng: &mut crate::rng::SessionRng) -> i64 {
        rng.random_range(SPAWN_INTERVAL_MIN_MS..=SPAWN_INTERVAL_MAX_MS)
    }

    /// Call once per tick, before collision resolution.
    pub fn maybe_spawn(
        &mut self,
        state: &mut GameState,
        now_epoch_ms: i64,
        rng: &mut crate::rng::SessionRng,
    ) {
        let Some(last) = self.last_spawn_epoch_ms else {
            self.last_spawn_epoch_ms = Some(now_epoch_ms);
            return;
        };
        if state.powerups.len() >= MAX_ACTIVE {
            return;
        }
        if now_epoch_ms - last < self.next_interval_ms {
            return;
        }
        let Some(pos) = free_cell(state, rng) else {
            return;
        };
        let kind = *rng.choose(&ALL_TYPES).expect("ALL_TYPES is non-empty");
        state.powerups.push(PowerupItem {
            id: format!("pu-{}-{}", now_epoch_ms, state.powerups.len()),
            position: pos,
            kind,
            spawn_epoch_ms: now_epoch_ms,
        });
        self.last_spawn_epoch_ms = Some(now_epoch_ms);
        self.next_interval_ms = Self::resample_interval(rng);
    }

    /// Applies effects for every alive player whose head sits on a
    /// power-up cell, removing the items collected. Returns the
    /// notifications upstream needs to broadcast.
    pub fn check_collect(&mut self, state: &mut GameState, now_epoch_ms: i64) -> Vec<CollectEvent> {
        let mut events = Vec::new();
        let mut collected_indices = Vec::new();
        let collector_ids: Vec<PlayerId> = state.players.keys().cloned().collect();

        for id in &collector_ids {
            let Some(player) = state.players.get(id) else {
                continue;
            };
            if !player.alive {
                continue;
            }
            let head = player.snake.head();
            if let Some(idx) = state.powerups.iter().position(|p| p.position == head) {
                let kind = state.powerups[idx].kind;
                apply(state, id, kind, now_epoch_ms);
                collected_indices.push(idx);
                events.push(CollectEvent {
                    player_id: id.clone(),
                    kind,
                });
            }
        }

        collected_indices.sort_unstable();
        collected_indices.dedup();
        for idx in collected_indices.into_iter().rev() {
            state.powerups.remove(idx);
        }
        events
    }

    /// Removes stale items and purges expired per-player effects.
    pub fn tick(&mut self, state: &mut GameState, now_epoch_ms: i64) {
        state
            .powerups
            .retain(|p| now_epoch_ms - p.spawn_epoch_ms < ITEM_LIFETIME_MS);
        for player in state.players.values_mut() {
            player.active_powerups.retain(|_, &mut expiry| now_epoch_ms < expiry);
        }
    }
}

/// Applies a collected power-up's effect to the collector (and, for
/// `slowOthers`, every other alive player) per the non-stacking merge
/// rule in spec §4.2.
fn apply(state: &mut GameState, collector: &PlayerId, kind: PowerupType, now_epoch_ms: i64) {
    let expiry = now_epoch_ms + EFFECT_DURATION_MS;
    match kind {
        PowerupType::Shield => set_exclusive(state, collector, PowerupEffect::Shield, expiry),
        PowerupType::SpeedBoost => {
            set_exclusive(state, collector, PowerupEffect::SpeedBoost, expiry)
        }
        PowerupType::Shrink => {
            clear_non_slowed(state, collector);
            if let Some(player) = state.players.get_mut(collector) {
                player.snake.shrink(3);
            }
        }
        PowerupType::SlowOthers => {
            let ids: Vec<PlayerId> = state
                .players
                .iter()
                .filter(|(id, p)| *id != collector && p.alive)
                .map(|(id, _)| id.clone())
                .collect();
            for id in ids {
                if let Some(player) = state.players.get_mut(&id) {
                    player
                        .active_powerups
                        .insert(PowerupEffect::Slowed, expiry);
                }
            }
        }
    }
}

fn clear_non_slowed(state: &mut GameState, player_id: &PlayerId) {
    if let Some(player) = state.players.get_mut(player_id) {
        player
            .active_powerups
            .retain(|effect, _| *effect == PowerupEffect::Slowed);
    }
}

fn set_exclusive(state: &mut GameState, player_id: &PlayerId, effect: PowerupEffect, expiry: i64) {
    if let Some(player) = state.players.get_mut(player_id) {
        player
            .active_powerups
            .retain(|e, _| *e == PowerupEffect::Slowed);
        player.active_powerups.insert(effect, expiry);
    }
}

/// Speed-factor contract from spec §4.2: slowed halves, speedBoost
/// doubles, the two together cancel out.
pub fn speed_factor(active: &HashMap<PowerupEffect, i64>, now_epoch_ms: i64) -> f64 {
    let slowed = active
        .get(&PowerupEffect::Slowed)
        .is_some_and(|&e| now_epoch_ms < e);
    let boosted = active
        .get(&PowerupEffect::SpeedBoost)
        .is_some_and(|&e| now_epoch_ms < e);
    match (slowed, boosted) {
        (true, true) => 1.0,
        (true, false) => 0.5,
        (false, true) => 2.0,
        (false, false) => 1.0,
    }
}

fn free_cell(state: &GameState, rng: &mut crate::rng::SessionRng) -> Option<Position> {
    use crate::grid::{HEIGHT, WIDTH};

    for _ in 0..200 {
        let x = rng.random_range(0..WIDTH);
        let y = rng.random_range(0..HEIGHT);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Position;
    use crate::rng::SessionRng;
    use crate::simulation::player::{ControlScheme, Player, PlayerKind};
    use crate::simulation::state::{GameState, Mode};
    use crate::PlayerId;

    fn player(id: &str, pos: Position) -> Player {
        Player::new(
            PlayerId::new(id.to_string()),
            id.to_string(),
            PlayerKind::Human,
            "#ffffff",
            pos,
            crate::grid::Direction::Right,
            ControlScheme::Arrows,
            0,
        )
    }

    #[test]
    fn speed_factor_combinations() {
        let mut active = HashMap::new();
        assert_eq!(speed_factor(&active, 0), 1.0);

        active.insert(PowerupEffect::SpeedBoost, 1000);
        assert_eq!(speed_factor(&active, 0), 2.0);

        active.insert(PowerupEffect::Slowed, 1000);
        assert_eq!(speed_factor(&active, 0), 1.0);

        active.remove(&PowerupEffect::SpeedBoost);
        assert_eq!(speed_factor(&active, 0), 0.5);

        assert_eq!(speed_factor(&active, 5000), 1.0);
    }

    #[test]
    fn shield_and_speed_boost_do_not_stack() {
        let mut state = GameState::new(Mode::Multi, false, false, None);
        let id = PlayerId::new("p1".to_string());
        state.players.insert(id.clone(), player("p1", Position::new(0, 0)));

        apply(&mut state, &id, PowerupType::Shield, 0);
        apply(&mut state, &id, PowerupType::SpeedBoost, 0);

        let p = state.players.get(&id).unwrap();
        assert_eq!(p.active_powerups.len(), 1);
        assert!(p.active_powerups.contains_key(&PowerupEffect::SpeedBoost));
        assert!(!p.active_powerups.contains_key(&PowerupEffect::Shield));
    }

    #[test]
    fn slow_others_affects_every_other_alive_player_not_the_collector() {
        let mut state = GameState::new(Mode::Multi, false, false, None);
        let collector = PlayerId::new("p1".to_string());
        let other = PlayerId::new("p2".to_string());
        let dead = PlayerId::new("p3".to_string());
        state.players.insert(collector.clone(), player("p1", Position::new(0, 0)));
        state.players.insert(other.clone(), player("p2", Position::new(1, 1)));
        let mut dead_player = player("p3", Position::new(2, 2));
        dead_player.alive = false;
        state.players.insert(dead.clone(), dead_player);

        apply(&mut state, &collector, PowerupType::SlowOthers, 0);

        assert!(!state.players[&collector].active_powerups.contains_key(&PowerupEffect::Slowed));
        assert!(state.players[&other].active_powerups.contains_key(&PowerupEffect::Slowed));
        assert!(!state.players[&dead].active_powerups.contains_key(&PowerupEffect::Slowed));
    }

    #[test]
    fn shrink_never_drops_below_length_one() {
        let mut state = GameState::new(Mode::Multi, false, false, None);
        let id = PlayerId::new("p1".to_string());
        state.players.insert(id.clone(), player("p1", Position::new(0, 0)));

        apply(&mut state, &id, PowerupType::Shrink, 0);
        assert_eq!(state.players[&id].snake.len(), 1);
    }

    #[test]
    fn check_collect_removes_item_and_emits_one_event_per_collector() {
        let mut state = GameState::new(Mode::Multi, false, false, None);
        let id = PlayerId::new("p1".to_string());
        let head = Position::new(3, 3);
        state.players.insert(id.clone(), player("p1", head));
        state.powerups.push(PowerupItem {
            id: "pu-0".into(),
            position: head,
            kind: PowerupType::Shield,
            spawn_epoch_ms: 0,
        });

        let mut module = PowerupModule::new();
        let events = module.check_collect(&mut state, 100);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].player_id, id);
        assert!(state.powerups.is_empty());
    }

    #[test]
    fn maybe_spawn_respects_max_active_cap() {
        let mut state = GameState::new(Mode::Multi, false, false, None);
        state.powerups.push(PowerupItem {
            id: "pu-0".into(),
            position: Position::new(0, 0),
            kind: PowerupType::Shield,
            spawn_epoch_ms: 0,
        });
        state.powerups.push(PowerupItem {
            id: "pu-1".into(),
            position: Position::new(1, 1),
            kind: PowerupType::Shield,
            spawn_epoch_ms: 0,
        });

        let mut module = PowerupModule::new();
        module.last_spawn_epoch_ms = Some(0);
        let mut rng = SessionRng::new(1);
        module.maybe_spawn(&mut state, 999_999, &mut rng);

        assert_eq!(state.powerups.len(), MAX_ACTIVE);
    }

    #[test]
    fn tick_expires_stale_items_and_effects() {
        let mut state = GameState::new(Mode::Multi, false, false, None);
        let id = PlayerId::new("p1".to_string());
        let mut p = player("p1", Position::new(0, 0));
        p.active_powerups.insert(PowerupEffect::Shield, 500);
        state.players.insert(id.clone(), p);
        state.powerups.push(PowerupItem {
            id: "pu-0".into(),
            position: Position::new(5, 5),
            kind: PowerupType::Shield,
            spawn_epoch_ms: 0,
        });

        let mut module = PowerupModule::new();
        module.tick(&mut state, ITEM_LIFETIME_MS + 1);

        assert!(state.powerups.is_empty());
        assert!(state.players[&id].active_powerups.is_empty());
    }
}

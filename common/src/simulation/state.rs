use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::grid::Position;
use crate::powerup::PowerupItem;
use crate::simulation::player::Player;
use crate::PlayerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Multi,
    Single,
    Solo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Winner {
    pub player_id: PlayerId,
    pub name: String,
    pub score: u32,
    pub is_loser: bool,
}

/// Mutable per-room game state, owned by the room actor and advanced one
/// tick at a time by the simulation engine (spec §3, §4.4).
#[derive(Debug, Clone)]
pub struct GameState {
    pub mode: Mode,
    pub players: HashMap<PlayerId, Player>,
    /// Join order, used for color/spawn anchor assignment and tie-breaks.
    pub join_order: Vec<PlayerId>,
    pub food: HashSet<Position>,
    pub powerups: Vec<PowerupItem>,
    pub tick: u64,
    /// Zero until the start-countdown completes.
    pub start_epoch_ms: i64,
    pub timer_seconds: i64,
    pub paused: bool,
    pub pause_start_epoch_ms: Option<i64>,
    pub total_pause_ms: i64,
    pub pause_budget_ms: i64,
    pub last_input_epoch_ms: HashMap<PlayerId, i64>,
    pub last_input_tick: HashMap<PlayerId, u64>,
    pub level: u32,
    pub total_food_eaten: u32,
    pub wall_mode: bool,
    pub strict_mode: bool,
    pub time_limit_ms: Option<i64>,
    pub winner: Option<Winner>,
    pub last_survivor_since_epoch_ms: Option<i64>,
    /// Per-player inactivity-warning flag (spec §4.5), not part of the
    /// wire-level GameState but tracked alongside it.
    pub warned: HashSet<PlayerId>,
    /// Guards the timeout survival bonus (spec §4.4) against being
    /// applied again on every subsequent tick once the deadline has
    /// passed without a winner being decided yet.
    pub timeout_bonus_applied: bool,
}

pub const MULTI_PAUSE_BUDGET_MS: i64 = 15 * 60 * 1000;

impl GameState {
    pub fn new(mode: Mode, wall_mode: bool, strict_mode: bool, time_limit_ms: Option<i64>) -> Self {
        Self {
            mode,
            players: HashMap::new(),
            join_order: Vec::new(),
            food: HashSet::new(),
            powerups: Vec::new(),
            tick: 0,
            start_epoch_ms: 0,
            timer_seconds: 0,
            paused: false,
            pause_start_epoch_ms: None,
            total_pause_ms: 0,
            pause_budget_ms: MULTI_PAUSE_BUDGET_MS,
            last_input_epoch_ms: HashMap::new(),
            last_input_tick: HashMap::new(),
            level: 1,
            total_food_eaten: 0,
            wall_mode,
            strict_mode,
            time_limit_ms,
            winner: None,
            last_survivor_since_epoch_ms: None,
            warned: HashSet::new(),
            timeout_bonus_applied: false,
        }
    }

    pub fn alive_players(&self) -> impl Iterator<Item = &Player> {
        self.players.values().filter(|p| p.alive)
    }

    pub fn humans(&self) -> impl Iterator<Item = &Player> {
        self.players.values().filter(|p| p.is_human())
    }

    /// `tickRate` in Hz, derived from `level` (spec §4.4).
    pub fn tick_rate_hz(&self) -> f64 {
        let base = (5.0 + 2.0 * (self.level as f64 - 1.0)).min(16.0);
        match self.mode {
            Mode::Solo => (base * 1.015).min(16.0),
            Mode::Multi | Mode::Single => base,
        }
    }

    pub fn tick_period_ms(&self) -> f64 {
        1000.0 / self.tick_rate_hz()
    }

    pub fn recompute_level(&mut self) {
        self.level = self.total_food_eaten / 5 + 1;
    }
}

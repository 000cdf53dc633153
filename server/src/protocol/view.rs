use serde::Serialize;

use common::grid::Position;
use common::powerup::{PowerupEffect, PowerupItem, PowerupType};
use common::simulation::player::{ControlScheme, Player, PlayerKind};
use common::simulation::state::{GameState, Winner};
use common::PlayerId;

/// Wire-level snapshot of a `Player`, built fresh for every
/// `gameStateUpdate`/`gameStarted`/`gameEnded` — the gateway is the only
/// place domain state is translated into JSON (spec §7).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: PlayerId,
    pub display_name: String,
    pub kind: PlayerKind,
    pub color: &'static str,
    pub snake: Vec<Position>,
    pub direction: common::grid::Direction,
    pub score: u32,
    pub alive: bool,
    pub is_host: bool,
    pub control_scheme: ControlScheme,
    pub active_powerups: Vec<PowerupEffect>,
}

impl PlayerView {
    pub fn from_player(player: &Player, now_epoch_ms: i64) -> Self {
        Self {
            id: player.id.clone(),
            display_name: player.display_name.clone(),
            kind: player.kind,
            color: player.color,
            snake: player.snake.segments.iter().copied().collect(),
            direction: player.direction,
            score: player.score,
            alive: player.alive,
            is_host: player.is_host,
            control_scheme: player.control_scheme,
            active_powerups: player
                .active_powerups
                .iter()
                .filter(|&(_, &expiry)| now_epoch_ms < expiry)
                .map(|(&effect, _)| effect)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerupView {
    pub id: String,
    pub position: Position,
    #[serde(rename = "type")]
    pub kind: PowerupType,
    pub spawn_epoch_ms: i64,
}

impl From<&PowerupItem> for PowerupView {
    fn from(item: &PowerupItem) -> Self {
        Self {
            id: item.id.clone(),
            position: item.position,
            kind: item.kind,
            spawn_epoch_ms: item.spawn_epoch_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WinnerView {
    pub player_id: PlayerId,
    pub name: String,
    pub score: u32,
    pub is_loser: bool,
}

impl From<&Winner> for WinnerView {
    fn from(w: &Winner) -> Self {
        Self {
            player_id: w.player_id.clone(),
            name: w.name.clone(),
            score: w.score,
            is_loser: w.is_loser,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateView {
    pub players: Vec<PlayerView>,
    pub food: Vec<Position>,
    pub powerups: Vec<PowerupView>,
    pub tick: u64,
    pub start_epoch_ms: i64,
    pub timer_seconds: i64,
    pub paused: bool,
    pub level: u32,
    pub total_food_eaten: u32,
    pub wall_mode: bool,
    pub strict_mode: bool,
    pub time_limit_ms: Option<i64>,
    pub winner: Option<WinnerView>,
}

impl GameStateView {
    pub fn from_state(state: &GameState, now_epoch_ms: i64) -> Self {
        Self {
            players: state
                .players
                .values()
                .map(|p| PlayerView::from_player(p, now_epoch_ms))
                .collect(),
            food: state.food.iter().copied().collect(),
            powerups: state.powerups.iter().map(PowerupView::from).collect(),
            tick: state.tick,
            start_epoch_ms: state.start_epoch_ms,
            timer_seconds: state.timer_seconds,
            paused: state.paused,
            level: state.level,
            total_food_eaten: state.total_food_eaten,
            wall_mode: state.wall_mode,
            strict_mode: state.strict_mode,
            time_limit_ms: state.time_limit_ms,
            winner: state.winner.as_ref().map(WinnerView::from),
        }
    }
}

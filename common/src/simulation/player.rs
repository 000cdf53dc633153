use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::grid::{self, Direction, Position};
use crate::powerup::PowerupEffect;
use crate::PlayerId;

/// Fixed four-entry palette; colors are assigned by join order (spec §3).
pub const COLOR_PALETTE: [&str; 4] = ["#e63946", "#2a9d8f", "#457b9d", "#f4a261"];

/// The four corner anchors snakes spawn at, assigned by join order mod 4
/// (spec §3). Each tuple is `(position, initial direction)`.
pub fn spawn_anchor(join_index: usize) -> (Position, Direction) {
    const ANCHORS: [(i32, i32, Direction); 4] = [
        (5, 5, Direction::Right),
        (grid::WIDTH - 6, grid::HEIGHT - 6, Direction::Left),
        (5, grid::HEIGHT - 6, Direction::Right),
        (grid::WIDTH - 6, 5, Direction::Left),
    ];
    let (x, y, dir) = ANCHORS[join_index % 4];
    (Position::new(x, y), dir)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerKind {
    Human,
    Npc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ControlScheme {
    Arrows,
    Wasd,
    SwipeTouch,
}

#[derive(Debug, Clone)]
pub struct Snake {
    /// Index 0 is the head, last element is the tail. Never empty.
    pub segments: VecDeque<Position>,
}

impl Snake {
    pub fn new(start: Position) -> Self {
        let mut segments = VecDeque::new();
        segments.push_back(start);
        Self { segments }
    }

    pub fn head(&self) -> Position {
        *self.segments.front().expect("snake body is never empty")
    }

    pub fn tail(&self) -> Position {
        *self.segments.back().expect("snake body is never empty")
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, pos: Position) -> bool {
        self.segments.contains(&pos)
    }

    /// Self-collision is tested against everything but the head (spec §3).
    pub fn body_contains(&self, pos: Position) -> bool {
        self.segments.iter().skip(1).any(|&p| p == pos)
    }

    pub fn push_head(&mut self, pos: Position) {
        self.segments.push_front(pos);
    }

    pub fn pop_tail(&mut self) -> Position {
        self.segments
            .pop_back()
            .expect("snake body is never empty")
    }

    /// Shrink power-up pops up to `count` tail segments, keeping length >= 1.
    pub fn shrink(&mut self, count: usize) {
        for _ in 0..count {
            if self.segments.len() <= 1 {
                break;
            }
            self.segments.pop_back();
        }
    }
}

#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub display_name: String,
    pub kind: PlayerKind,
    pub color: &'static str,
    pub snake: Snake,
    pub direction: Direction,
    pub queued_direction: Direction,
    pub score: u32,
    pub alive: bool,
    pub is_host: bool,
    pub control_scheme: ControlScheme,
    pub survival_start_epoch_ms: i64,
    pub survival_duration_ms: Option<i64>,
    pub speed_accumulator: f64,
    pub active_powerups: HashMap<PowerupEffect, i64>,
}

impl Player {
    pub fn new(
        id: PlayerId,
        display_name: String,
        kind: PlayerKind,
        color: &'static str,
        start: Position,
        direction: Direction,
        control_scheme: ControlScheme,
        now_epoch_ms: i64,
    ) -> Self {
        Self {
            id,
            display_name,
            kind,
            color,
            snake: Snake::new(start),
            direction,
            queued_direction: direction,
            score: 0,
            alive: true,
            is_host: false,
            control_scheme,
            survival_start_epoch_ms: now_epoch_ms,
            survival_duration_ms: None,
            speed_accumulator: 0.0,
            active_powerups: HashMap::new(),
        }
    }

    pub fn is_human(&self) -> bool {
        self.kind == PlayerKind::Human
    }

    pub fn has_effect(&self, effect: PowerupEffect, now_epoch_ms: i64) -> bool {
        self.active_powerups
            .get(&effect)
            .is_some_and(|&expiry| now_epoch_ms < expiry)
    }

    pub fn clear_powerups(&mut self) {
        self.active_powerups.clear();
    }

    /// Admissible direction change per spec §4.1: `d' != opposite(current
    /// committed direction)`. Reversal through the already-queued
    /// direction is rejected the same way at input time (spec §4.4).
    pub fn try_queue_direction(&mut self, dir: Direction) -> bool {
        if dir.is_opposite_of(self.direction) {
            return false;
        }
        self.queued_direction = dir;
        true
    }
}

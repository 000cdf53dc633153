use serde::{Deserialize, Serialize};

/// Board is fixed at 30x30; cell size is purely presentational (spec §3).
pub const WIDTH: i32 = 30;
pub const HEIGHT: i32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn manhattan_distance(self, other: Position) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    /// Manhattan distance that accounts for wrap-around edges when wall
    /// mode is off (spec §4.3, "wrap-aware minimal delta").
    pub fn wrap_aware_distance(self, other: Position, wall_mode: bool) -> i32 {
        if wall_mode {
            return self.manhattan_distance(other);
        }
        let dx = (self.x - other.x).abs();
        let dy = (self.y - other.y).abs();
        dx.min(WIDTH - dx) + dy.min(HEIGHT - dy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    pub fn opposite(self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    pub fn is_opposite_of(self, other: Direction) -> bool {
        self.opposite() == other
    }

    fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }
}

fn wrap(v: i32, max: i32) -> i32 {
    ((v % max) + max) % max
}

/// Whether moving `from` one step in `direction` hits a wall under wall
/// semantics — used both by the simulation engine and by NPC lookahead.
pub fn would_hit_wall(from: Position, direction: Direction) -> bool {
    let (dx, dy) = direction.delta();
    let (nx, ny) = (from.x + dx, from.y + dy);
    !(0..WIDTH).contains(&nx) || !(0..HEIGHT).contains(&ny)
}

/// Computes the next head position per spec §4.1: modulo arithmetic in
/// wrap mode, unclamped (possibly out-of-bounds) arithmetic in wall mode
/// so the caller can detect the wall collision itself.
pub fn step(from: Position, direction: Direction, wall_mode: bool) -> Position {
    let (dx, dy) = direction.delta();
    let (nx, ny) = (from.x + dx, from.y + dy);
    if wall_mode {
        Position::new(nx, ny)
    } else {
        Position::new(wrap(nx, WIDTH), wrap(ny, HEIGHT))
    }
}

pub fn in_bounds(pos: Position) -> bool {
    (0..WIDTH).contains(&pos.x) && (0..HEIGHT).contains(&pos.y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_mode_left_from_origin_wraps_to_far_edge() {
        let pos = step(Position::new(0, 5), Direction::Left, false);
        assert_eq!(pos, Position::new(WIDTH - 1, 5));
    }

    #[test]
    fn wrap_mode_down_from_bottom_wraps_to_top() {
        let pos = step(Position::new(3, HEIGHT - 1), Direction::Down, false);
        assert_eq!(pos, Position::new(3, 0));
    }

    #[test]
    fn wall_mode_left_from_origin_leaves_bounds() {
        let pos = step(Position::new(0, 5), Direction::Left, true);
        assert!(!in_bounds(pos));
    }

    #[test]
    fn opposite_is_symmetric() {
        for d in Direction::ALL {
            assert_eq!(d.opposite().opposite(), d);
        }
    }
}

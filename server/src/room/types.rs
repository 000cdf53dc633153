use serde::Serialize;

use common::simulation::player::{ControlScheme, PlayerKind};
use common::simulation::state::Mode;
use common::{ConnectionId, PlayerId, PlayerToken};

use crate::protocol::GameOptionsView;

/// Room-level view of a participant (spec §3 `Participant`). A
/// `Participant` exists independently of whether the player's snake is
/// currently alive — it tracks membership, not simulation state.
#[derive(Debug, Clone)]
pub struct Participant {
    pub id: PlayerId,
    pub display_name: String,
    pub conn_id: Option<ConnectionId>,
    pub token: PlayerToken,
    pub kind: PlayerKind,
    pub is_host: bool,
    pub control_scheme: ControlScheme,
    pub disconnected: bool,
    pub disconnected_at_epoch_ms: Option<i64>,
    pub last_chat_epoch_ms: Option<i64>,
}

/// Room-wide rule toggles (spec §3 `gameOptions`), defaults chosen to
/// match the "friendly" multi-mode default called out in spec §9.
#[derive(Debug, Clone, Copy)]
pub struct GameOptions {
    pub wall_mode: bool,
    pub strict_mode: bool,
    pub time_limit_ms: Option<i64>,
}

impl Default for GameOptions {
    fn default() -> Self {
        Self {
            wall_mode: false,
            strict_mode: false,
            time_limit_ms: None,
        }
    }
}

impl GameOptions {
    pub fn to_view(self) -> GameOptionsView {
        GameOptionsView {
            wall_mode: self.wall_mode,
            strict_mode: self.strict_mode,
            time_limit: self.time_limit_ms.map(|ms| (ms / 60_000) as u32),
        }
    }

    /// Merges an inbound partial update; `timeLimit` values are validated
    /// against the closed set `{null,3,5,10,15}` minutes by the caller.
    pub fn apply(&mut self, wall_mode: Option<bool>, strict_mode: Option<bool>, time_limit_minutes: Option<Option<u32>>) {
        if let Some(v) = wall_mode {
            self.wall_mode = v;
        }
        if let Some(v) = strict_mode {
            self.strict_mode = v;
        }
        if let Some(minutes) = time_limit_minutes {
            self.time_limit_ms = minutes.map(|m| m as i64 * 60_000);
        }
    }
}

pub const ALLOWED_TIME_LIMITS_MIN: [u32; 4] = [3, 5, 10, 15];

/// One completed/active game's record, returned by `requestSessionHistory`
/// (spec §4.7).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub room_code: String,
    pub game_mode: Mode,
    pub winner_name: Option<String>,
    pub winner_score: Option<u32>,
    pub duration_seconds: i64,
    pub is_active: bool,
}

/// Result of a successful `joinRoom`/`startSinglePlayer`, handed back to
/// the gateway so it can send the per-connection `joinedRoom` ack (room
/// broadcasts of `playerJoined` happen separately, inside the room).
#[derive(Debug, Clone)]
pub struct JoinAck {
    pub player_id: PlayerId,
    pub is_host: bool,
    pub room_code: String,
    pub game_mode: Mode,
    pub game_options: GameOptions,
    pub player_token: String,
    pub is_public: bool,
}

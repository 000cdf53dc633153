pub mod view;

use serde::{Deserialize, Serialize};

use common::grid::Direction;
use common::npc::tuning::{Difficulty, Profile};
use common::powerup::PowerupType;
use common::simulation::player::ControlScheme;
use common::simulation::state::Mode;
use common::PlayerId;

use crate::room::types::SessionSummary;
use view::GameStateView;

/// One entry of the client-supplied NPC roster for `startSinglePlayer`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NpcConfigMsg {
    pub name: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub profile: Option<Profile>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameOptionsMsg {
    pub wall_mode: Option<bool>,
    pub strict_mode: Option<bool>,
    /// Minutes; `Some(None)` means "clear the limit" (an explicit JSON
    /// `null`), `None` means the field was simply omitted.
    #[serde(default)]
    pub time_limit: Option<Option<u32>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameOptionsView {
    pub wall_mode: bool,
    pub strict_mode: bool,
    pub time_limit: Option<u32>,
}

/// The closed client → server event set (spec §6).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum ClientEvent {
    JoinRoom {
        player_name: String,
        room_code: String,
        control_scheme: ControlScheme,
        player_token: Option<String>,
    },
    StartGame {
        room_code: String,
    },
    StartSinglePlayer {
        player_name: String,
        npc_count: u8,
        game_mode: Option<String>,
        player_token: Option<String>,
        control_scheme: ControlScheme,
        game_options: GameOptionsMsg,
        npc_configs: Option<Vec<NpcConfigMsg>>,
    },
    PlayerReady {
        room_code: String,
        current_player_id: Option<String>,
    },
    RequestGameState {
        room_code: String,
        player_token: Option<String>,
    },
    PlayerInput {
        room_code: String,
        direction: Direction,
    },
    PauseGame {
        room_code: String,
    },
    ResumeGame {
        room_code: String,
    },
    QuitGame {
        room_code: String,
        leave_type: LeaveType,
    },
    ChatMessage {
        room_code: String,
        message: String,
    },
    TogglePublicRoom {
        room_code: String,
        is_public: Option<bool>,
    },
    RequestPublicRooms {},
    RequestSessionHistory {},
    UpdateGameOptions {
        room_code: String,
        game_options: GameOptionsMsg,
    },
    RequestGameOptions {
        room_code: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LeaveType {
    Alone,
    WithParty,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub player_id: PlayerId,
    pub player_name: String,
    pub is_host: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicRoomEntry {
    pub room_code: String,
    pub player_count: usize,
    pub max_players: usize,
    pub host_name: String,
}

/// The closed server → client event set (spec §6). `content = "payload"`
/// gives every variant the same `{event, payload}` envelope shape the
/// transport contract asks for.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum ServerEvent {
    FeatureFlags {
        chat: bool,
        powerups: bool,
        accessibility: bool,
    },
    JoinedRoom {
        player_id: PlayerId,
        is_host: bool,
        room_code: String,
        game_mode: Mode,
        game_options: GameOptionsView,
        player_token: String,
        is_public: bool,
    },
    JoinError {
        message: String,
    },
    Error {
        message: String,
        reason: Option<String>,
    },
    InputRejected {
        reason: String,
    },
    PlayerJoined {
        player_id: PlayerId,
        player_name: String,
        is_host: bool,
        players: Vec<RosterEntry>,
    },
    GameStarted {
        game_state: GameStateView,
        room_code: String,
        player_id: PlayerId,
        game_mode: Mode,
        is_host: Option<bool>,
    },
    PlayerReadyStatus {
        ready_players: Vec<PlayerId>,
    },
    AllPlayersReady {},
    GameCountdown {
        countdown: u8,
    },
    ResumeCountdown {
        countdown: u8,
        resumed_by: String,
    },
    GameStateUpdate {
        game_state: GameStateView,
    },
    GamePaused {
        paused_by: String,
    },
    GameResumed {},
    PauseError {
        message: String,
    },
    ResumeError {
        message: String,
    },
    PowerUpCollected {
        player_id: PlayerId,
        player_name: String,
        #[serde(rename = "type")]
        kind: PowerupType,
        sound: String,
    },
    PlayerCollided {
        player_name: String,
        collision_type: String,
    },
    PlayerLeft {
        player_name: String,
        reason: String,
        was_host: bool,
        players: Vec<RosterEntry>,
    },
    PlayerQuit {
        player_name: String,
        reason: String,
        was_host: bool,
        players: Vec<RosterEntry>,
    },
    GameQuit {
        quit_by: String,
        reason: String,
    },
    HostChanged {
        new_host_id: PlayerId,
        new_host_name: String,
    },
    InactivityWarning {
        message: String,
        remaining_seconds: i64,
    },
    PlayerKicked {
        reason: String,
        message: String,
    },
    GameEnded {
        winner: Option<view::WinnerView>,
        game_state: GameStateView,
        game_mode: Mode,
        alive_players: Vec<PlayerId>,
        dead_players: Vec<PlayerId>,
        room_code: String,
    },
    SessionHistory {
        sessions: Vec<SessionSummary>,
    },
    PublicRoomsUpdated {
        rooms: Vec<PublicRoomEntry>,
    },
    PublicRoomStatus {
        room_code: String,
        is_public: bool,
        error: Option<String>,
    },
    GameOptionsUpdated {
        game_options: GameOptionsView,
    },
    GameStateError {
        message: String,
        room_code: String,
    },
    ChatMessage {
        player_name: String,
        message: String,
        epoch_ms: i64,
    },
}

pub mod types;

mod lifecycle;
mod tick;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Duration};

use common::grid::Direction;
use common::npc::NpcState;
use common::powerup::PowerupModule;
use common::rng::SessionRng;
use common::simulation::player::ControlScheme;
use common::simulation::state::{GameState, Mode};
use common::{log, ConnectionId, PlayerId, PlayerToken, RoomCode, SessionId};

use crate::config::FeatureFlags;
use crate::error::ApiError;
use crate::gateway::broadcaster::Broadcaster;
use crate::protocol::{GameOptionsMsg, LeaveType, NpcConfigMsg};
use crate::registry::sessions::SessionRegistry;
use crate::registry::{RoomRegistry, RoomSnapshot};
use crate::time::now_ms;

use types::{GameOptions, JoinAck, Participant};

/// Multiplayer rooms seat at most this many humans (spec §4.6).
pub const MAX_MULTI_PLAYERS: usize = 4;
pub const LOBBY_DISCONNECT_GRACE_MS: i64 = 30_000;
pub const RUNNING_RECONNECT_GRACE_MS: i64 = 30_000;
pub const MULTI_CLEANUP_GRACE_MS: i64 = 10_000;
pub const ALL_READY_DELAY_MS: i64 = 300;
pub const COUNTDOWN_START: u8 = 5;
const BASELINE_TICK_MS: u64 = 1000;

/// Every message the gateway can forward into a room actor. Each carries
/// the originating connection id; the room resolves it to a player
/// through its own `conn_to_player` map, the same way spec §3 models it.
pub enum RoomCommand {
    Join {
        conn_id: ConnectionId,
        display_name: String,
        control_scheme: ControlScheme,
        player_token: Option<String>,
        reply: oneshot::Sender<Result<JoinAck, ApiError>>,
    },
    StartGame {
        conn_id: ConnectionId,
    },
    PlayerReady {
        conn_id: ConnectionId,
    },
    RequestGameState {
        conn_id: ConnectionId,
        player_token: Option<String>,
    },
    PlayerInput {
        conn_id: ConnectionId,
        direction: Direction,
    },
    PauseGame {
        conn_id: ConnectionId,
    },
    ResumeGame {
        conn_id: ConnectionId,
    },
    QuitGame {
        conn_id: ConnectionId,
        leave_type: LeaveType,
    },
    ChatMessage {
        conn_id: ConnectionId,
        message: String,
    },
    TogglePublicRoom {
        conn_id: ConnectionId,
        is_public: Option<bool>,
    },
    UpdateGameOptions {
        conn_id: ConnectionId,
        options: GameOptionsMsg,
    },
    RequestGameOptions {
        conn_id: ConnectionId,
    },
    Disconnect {
        conn_id: ConnectionId,
    },
}

#[derive(Clone)]
pub struct RoomHandle {
    tx: mpsc::UnboundedSender<RoomCommand>,
}

impl RoomHandle {
    pub fn send(&self, cmd: RoomCommand) {
        let _ = self.tx.send(cmd);
    }
}

/// Initial roster for a solo/single-player room (spec §4.6 `startGame`
/// solo/single path).
pub struct SinglePlayerInit {
    pub human_display_name: String,
    pub control_scheme: ControlScheme,
    pub npc_count: u8,
    pub npc_configs: Vec<NpcConfigMsg>,
    pub wall_mode: Option<bool>,
    pub conn_id: ConnectionId,
}

/// The room actor: the sole owner of everything the Data Model calls
/// `Room` (spec §3). All mutation happens inside `run`; nothing else
/// touches `participants`/`game_state` concurrently (spec §5).
pub struct Room {
    code: RoomCode,
    mode: Mode,
    rx: mpsc::UnboundedReceiver<RoomCommand>,
    broadcaster: Broadcaster,
    flags: FeatureFlags,
    sessions: SessionRegistry,
    rooms: RoomRegistry,
    snapshot: Arc<RwLock<RoomSnapshot>>,

    participants: HashMap<PlayerId, Participant>,
    join_order: Vec<PlayerId>,
    tokens: HashMap<PlayerToken, PlayerId>,
    conn_to_player: HashMap<ConnectionId, PlayerId>,
    ready_players: HashSet<PlayerId>,

    game_state: Option<GameState>,
    npcs: HashMap<PlayerId, NpcState>,
    powerup_module: PowerupModule,
    rng: SessionRng,
    options: GameOptions,
    is_public: bool,

    countdown: Option<u8>,
    resume_countdown: Option<(u8, String)>,
    all_ready_since_ms: Option<i64>,

    session_id: Option<SessionId>,
    disconnect_deadlines: HashMap<PlayerId, i64>,
    cleanup_deadline: Option<i64>,
    game_ended_emitted: bool,
    disposed: bool,
    ticker_period_ms: u64,
}

impl Room {
    fn new(
        code: RoomCode,
        mode: Mode,
        broadcaster: Broadcaster,
        flags: FeatureFlags,
        sessions: SessionRegistry,
        rooms: RoomRegistry,
        snapshot: Arc<RwLock<RoomSnapshot>>,
        rx: mpsc::UnboundedReceiver<RoomCommand>,
    ) -> Self {
        Self {
            code,
            mode,
            rx,
            broadcaster,
            flags,
            sessions,
            rooms,
            snapshot,
            participants: HashMap::new(),
            join_order: Vec::new(),
            tokens: HashMap::new(),
            conn_to_player: HashMap::new(),
            ready_players: HashSet::new(),
            game_state: None,
            npcs: HashMap::new(),
            powerup_module: PowerupModule::new(),
            rng: SessionRng::from_entropy(),
            options: GameOptions::default(),
            is_public: false,
            countdown: None,
            resume_countdown: None,
            all_ready_since_ms: None,
            session_id: None,
            disconnect_deadlines: HashMap::new(),
            cleanup_deadline: None,
            game_ended_emitted: false,
            disposed: false,
            ticker_period_ms: BASELINE_TICK_MS,
        }
    }

    /// Spawns an empty multiplayer room actor (spec §4.6, "room is
    /// created on first join").
    pub fn spawn_multi(
        code: RoomCode,
        broadcaster: Broadcaster,
        flags: FeatureFlags,
        sessions: SessionRegistry,
        rooms: RoomRegistry,
    ) -> RoomHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let snapshot = Arc::new(RwLock::new(RoomSnapshot {
            mode: Mode::Multi,
            max_players: MAX_MULTI_PLAYERS,
            ..Default::default()
        }));
        rooms.insert(code.clone(), RoomHandle { tx: tx.clone() }, snapshot.clone());
        let room = Room::new(code, Mode::Multi, broadcaster, flags, sessions, rooms, snapshot, rx);
        tokio::spawn(room.run());
        RoomHandle { tx }
    }

    /// Builds and spawns a solo/single-player room in one step: there is
    /// exactly one human and it is always the host, so there is no
    /// separate join handshake (spec §4.6, "start (solo/single)").
    pub fn spawn_single(
        code: RoomCode,
        broadcaster: Broadcaster,
        flags: FeatureFlags,
        sessions: SessionRegistry,
        rooms: RoomRegistry,
        init: SinglePlayerInit,
    ) -> (RoomHandle, JoinAck) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mode = if init.npc_count == 0 {
            Mode::Solo
        } else {
            Mode::Single
        };
        let snapshot = Arc::new(RwLock::new(RoomSnapshot {
            mode,
            max_players: 1,
            ..Default::default()
        }));
        rooms.insert(code.clone(), RoomHandle { tx: tx.clone() }, snapshot.clone());
        let mut room = Room::new(code.clone(), mode, broadcaster, flags, sessions, rooms, snapshot, rx);
        room.options.wall_mode = init.wall_mode.unwrap_or(false);

        let token = common::id_generator::generate_connection_token();
        let player_id = PlayerId::new(common::id_generator::generate_player_id());
        let participant = Participant {
            id: player_id.clone(),
            display_name: init.human_display_name,
            conn_id: Some(init.conn_id.clone()),
            token: PlayerToken::new(token.clone()),
            kind: common::simulation::player::PlayerKind::Human,
            is_host: true,
            control_scheme: init.control_scheme,
            disconnected: false,
            disconnected_at_epoch_ms: None,
            last_chat_epoch_ms: None,
        };
        room.tokens.insert(participant.token.clone(), player_id.clone());
        room.conn_to_player.insert(init.conn_id, player_id.clone());
        room.join_order.push(player_id.clone());
        room.participants.insert(player_id.clone(), participant);

        lifecycle::build_npc_roster(&mut room, init.npc_count, init.npc_configs);
        lifecycle::build_game_state(&mut room);
        room.refresh_snapshot();

        let ack = JoinAck {
            player_id: player_id.clone(),
            is_host: true,
            room_code: code.as_str().to_string(),
            game_mode: mode,
            game_options: room.options,
            player_token: token,
            is_public: false,
        };

        tokio::spawn(room.run());
        (RoomHandle { tx }, ack)
    }

    async fn run(mut self) {
        log!("room {} created (mode={:?})", self.code, self.mode);
        let mut ticker = time::interval(Duration::from_millis(self.ticker_period_ms));
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            let crashed = tokio::select! {
                cmd = self.rx.recv() => {
                    match cmd {
                        Some(cmd) => {
                            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| self.handle_command(cmd))).is_err()
                        }
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| tick::on_tick(&mut self))).is_err()
                }
            };

            if crashed {
                log!("room {}: panic recovered mid-tick, forcing crashed shutdown", self.code);
                self.force_crash_shutdown();
            }

            if self.disposed {
                break;
            }

            let desired = self.desired_tick_period_ms();
            if desired != self.ticker_period_ms {
                self.ticker_period_ms = desired;
                ticker = time::interval(Duration::from_millis(desired));
                ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            }
        }

        log!("room {} disposed", self.code);
        self.rooms.remove(&self.code);
    }

    /// Spec §7 "internal errors": an unrecoverable panic inside a room's
    /// command/tick handling must still surface a terminal `gameEnded`
    /// and dispose the room rather than silently dropping the task.
    fn force_crash_shutdown(&mut self) {
        lifecycle::finalize_end(self, "crashed");
        self.disposed = true;
    }

    fn desired_tick_period_ms(&self) -> u64 {
        match &self.game_state {
            Some(state) if state.start_epoch_ms > 0 && !state.paused && self.countdown.is_none() => {
                state.tick_period_ms().round().max(1.0) as u64
            }
            _ => BASELINE_TICK_MS,
        }
    }

    fn handle_command(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Join {
                conn_id,
                display_name,
                control_scheme,
                player_token,
                reply,
            } => {
                let result = lifecycle::join(self, conn_id, display_name, control_scheme, player_token);
                let _ = reply.send(result);
            }
            RoomCommand::StartGame { conn_id } => lifecycle::start_game(self, conn_id),
            RoomCommand::PlayerReady { conn_id } => lifecycle::player_ready(self, conn_id),
            RoomCommand::RequestGameState { conn_id, player_token } => lifecycle::request_game_state(self, conn_id, player_token),
            RoomCommand::PlayerInput { conn_id, direction } => tick::handle_input(self, conn_id, direction),
            RoomCommand::PauseGame { conn_id } => lifecycle::pause_game(self, conn_id),
            RoomCommand::ResumeGame { conn_id } => lifecycle::resume_game(self, conn_id),
            RoomCommand::QuitGame { conn_id, leave_type } => lifecycle::quit_game(self, conn_id, leave_type),
            RoomCommand::ChatMessage { conn_id, message } => lifecycle::chat_message(self, conn_id, message),
            RoomCommand::TogglePublicRoom { conn_id, is_public } => {
                lifecycle::toggle_public_room(self, conn_id, is_public)
            }
            RoomCommand::UpdateGameOptions { conn_id, options } => {
                lifecycle::update_game_options(self, conn_id, options)
            }
            RoomCommand::RequestGameOptions { conn_id } => lifecycle::request_game_options(self, conn_id),
            RoomCommand::Disconnect { conn_id } => lifecycle::disconnect(self, conn_id),
        }
    }

    fn player_id_for_conn(&self, conn_id: &ConnectionId) -> Option<PlayerId> {
        self.conn_to_player.get(conn_id).cloned()
    }

    fn roster(&self) -> Vec<crate::protocol::RosterEntry> {
        self.join_order
            .iter()
            .filter_map(|id| self.participants.get(id))
            .map(|p| crate::protocol::RosterEntry {
                player_id: p.id.clone(),
                player_name: p.display_name.clone(),
                is_host: p.is_host,
            })
            .collect()
    }

    fn connected_conn_ids(&self) -> Vec<ConnectionId> {
        self.participants
            .values()
            .filter_map(|p| p.conn_id.clone())
            .collect()
    }

    fn broadcast(&self, event: &crate::protocol::ServerEvent) {
        self.broadcaster.send_to_many(self.connected_conn_ids().iter(), event);
    }

    fn send_to(&self, conn_id: &ConnectionId, event: &crate::protocol::ServerEvent) {
        self.broadcaster.send(conn_id, event);
    }

    fn game_state_view(&self) -> crate::protocol::view::GameStateView {
        crate::protocol::view::GameStateView::from_state(
            self.game_state.as_ref().expect("game state must exist to view it"),
            now_ms(),
        )
    }

    fn broadcast_game_state(&self) {
        self.broadcast(&crate::protocol::ServerEvent::GameStateUpdate {
            game_state: self.game_state_view(),
        });
    }

    /// Recomputes public-listing eligibility (spec §4.6 "public index")
    /// and republishes the snapshot other rooms/the registry read.
    fn refresh_snapshot(&self) {
        let started = self.game_state.as_ref().is_some_and(|s| s.start_epoch_ms > 0);
        let public_eligible = self.mode == Mode::Multi
            && self.is_public
            && self.game_state.is_none()
            && self.countdown.is_none()
            && (1..=3).contains(&self.participants.len());

        let host_name = self
            .join_order
            .first()
            .and_then(|id| self.participants.get(id))
            .map(|p| p.display_name.clone())
            .unwrap_or_default();

        let mut snap = self.snapshot.write().unwrap();
        snap.mode = self.mode;
        snap.public_eligible = public_eligible;
        snap.player_count = self.participants.len();
        snap.max_players = if self.mode == Mode::Multi { MAX_MULTI_PLAYERS } else { 1 };
        snap.host_name = host_name;
        snap.start_epoch_ms = self.game_state.as_ref().map(|s| s.start_epoch_ms).unwrap_or(0);
        snap.ticker_running = started && !self.game_ended_emitted;
        snap.disposed = self.disposed;
        drop(snap);

        self.broadcaster.broadcast_all(&crate::protocol::ServerEvent::PublicRoomsUpdated {
            rooms: self.rooms.public_rooms(),
        });
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use crate::config::FeatureFlags;
    use crate::gateway::broadcaster::Broadcaster;
    use crate::registry::sessions::SessionRegistry;
    use crate::registry::{RoomRegistry, RoomSnapshot};

    use super::*;
    use std::sync::{Arc, RwLock};

    fn test_room() -> Room {
        let (_tx, rx) = mpsc::unbounded_channel();
        let snapshot = Arc::new(RwLock::new(RoomSnapshot::default()));
        let flags = FeatureFlags { chat: true, powerups: true, accessibility: true };
        Room::new(
            RoomCode::new("CRASH1".to_string()),
            Mode::Multi,
            Broadcaster::new(),
            flags,
            SessionRegistry::new(),
            RoomRegistry::new(),
            snapshot,
            rx,
        )
    }

    #[test]
    fn force_crash_shutdown_emits_game_ended_once_and_disposes_the_room() {
        let mut room = test_room();

        room.force_crash_shutdown();
        assert!(room.game_ended_emitted);
        assert!(room.disposed);

        // Idempotent: a second crash signal (or a late one arriving after
        // the first already tore the room down) must not re-broadcast.
        room.game_ended_emitted = true;
        room.force_crash_shutdown();
        assert!(room.disposed);
    }
}

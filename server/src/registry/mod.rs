pub mod sessions;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use common::simulation::state::Mode;
use common::{id_generator, RoomCode};

use crate::protocol::PublicRoomEntry;
use crate::room::RoomHandle;

/// Cheap, lock-guarded read view of a room, refreshed by the room actor
/// itself whenever membership/mode/flags change (spec §4.6 "single
/// recompute eligibility and publish helper"). Lets the registry answer
/// `requestPublicRooms` and session-history liveness checks without a
/// round trip through the room's command channel.
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub mode: Mode,
    pub public_eligible: bool,
    pub player_count: usize,
    pub max_players: usize,
    pub host_name: String,
    pub start_epoch_ms: i64,
    pub ticker_running: bool,
    pub disposed: bool,
}

impl Default for RoomSnapshot {
    fn default() -> Self {
        Self {
            mode: Mode::Multi,
            public_eligible: false,
            player_count: 0,
            max_players: 4,
            host_name: String::new(),
            start_epoch_ms: 0,
            ticker_running: false,
            disposed: false,
        }
    }
}

struct RoomEntry {
    handle: RoomHandle,
    snapshot: Arc<RwLock<RoomSnapshot>>,
}

/// The process-wide room table: write-rare, read-often, guarded by a
/// single rw-lock (spec §5).
#[derive(Clone)]
pub struct RoomRegistry {
    rooms: Arc<RwLock<HashMap<RoomCode, RoomEntry>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn insert(&self, code: RoomCode, handle: RoomHandle, snapshot: Arc<RwLock<RoomSnapshot>>) {
        self.rooms.write().unwrap().insert(code, RoomEntry { handle, snapshot });
    }

    pub fn get(&self, code: &RoomCode) -> Option<RoomHandle> {
        self.rooms.read().unwrap().get(code).map(|e| e.handle.clone())
    }

    pub fn remove(&self, code: &RoomCode) {
        self.rooms.write().unwrap().remove(code);
    }

    pub fn exists(&self, code: &RoomCode) -> bool {
        self.rooms.read().unwrap().contains_key(code)
    }

    pub fn snapshot(&self, code: &RoomCode) -> Option<RoomSnapshot> {
        self.rooms
            .read()
            .unwrap()
            .get(code)
            .map(|e| e.snapshot.read().unwrap().clone())
    }

    /// A fresh `SP`-prefixed code for solo/single-player rooms.
    pub fn fresh_solo_code(&self) -> RoomCode {
        loop {
            let candidate = RoomCode::new(id_generator::generate_solo_room_code());
            if !self.exists(&candidate) {
                return candidate;
            }
        }
    }

    pub fn public_rooms(&self) -> Vec<PublicRoomEntry> {
        self.rooms
            .read()
            .unwrap()
            .iter()
            .filter_map(|(code, entry)| {
                let snap = entry.snapshot.read().unwrap();
                if !snap.public_eligible {
                    return None;
                }
                Some(PublicRoomEntry {
                    room_code: code.as_str().to_string(),
                    player_count: snap.player_count,
                    max_players: snap.max_players,
                    host_name: snap.host_name.clone(),
                })
            })
            .collect()
    }

    /// Every room code currently tracked, used by the session-registry
    /// sweep to close sessions whose room vanished.
    pub fn room_exists_and_active(&self, code: &RoomCode) -> bool {
        self.snapshot(code)
            .is_some_and(|s| !s.disposed && s.ticker_running && s.start_epoch_ms > 0)
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

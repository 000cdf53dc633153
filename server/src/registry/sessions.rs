use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Local;

use common::simulation::state::Mode;
use common::{log, RoomCode, SessionId};

use crate::registry::RoomRegistry;
use crate::room::types::SessionSummary;
use crate::time::now_ms;

const MAX_SESSION_AGE_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone)]
struct SessionRecord {
    room_code: RoomCode,
    mode: Mode,
    start_epoch_ms: i64,
    end_epoch_ms: Option<i64>,
    end_reason: Option<&'static str>,
    winner_name: Option<String>,
    winner_score: Option<u32>,
}

/// Global registry of game sessions, independent of room membership
/// (spec §4.7). Every session acquires a terminal reason eventually,
/// either from the room that ended it or from the periodic sweep.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<SessionId, SessionRecord>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Mints a `DDMMYY/HH:MM`-shaped id and records the session as
    /// started. Collisions within the same minute are disambiguated with
    /// a numeric suffix.
    pub fn start_session(&self, room_code: RoomCode, mode: Mode, now_epoch_ms: i64) -> SessionId {
        let base = Local::now().format("%d%m%y/%H:%M").to_string();
        let mut sessions = self.sessions.write().unwrap();
        let mut candidate = base.clone();
        let mut suffix = 1;
        while sessions.contains_key(&SessionId::new(candidate.clone())) {
            suffix += 1;
            candidate = format!("{base}#{suffix}");
        }
        let id = SessionId::new(candidate);
        sessions.insert(
            id.clone(),
            SessionRecord {
                room_code,
                mode,
                start_epoch_ms: now_epoch_ms,
                end_epoch_ms: None,
                end_reason: None,
                winner_name: None,
                winner_score: None,
            },
        );
        id
    }

    pub fn end_session(
        &self,
        id: &SessionId,
        reason: &'static str,
        winner_name: Option<String>,
        winner_score: Option<u32>,
        now_epoch_ms: i64,
    ) {
        let mut sessions = self.sessions.write().unwrap();
        if let Some(record) = sessions.get_mut(id) {
            if record.end_epoch_ms.is_some() {
                return;
            }
            record.end_epoch_ms = Some(now_epoch_ms);
            record.end_reason = Some(reason);
            record.winner_name = winner_name;
            record.winner_score = winner_score;
        }
    }

    /// Periodic sweep (spec §4.7): closes sessions whose room no longer
    /// exists, and anything older than 24h with no terminal timestamp.
    pub fn sweep(&self, rooms: &RoomRegistry, now_epoch_ms: i64) {
        let mut sessions = self.sessions.write().unwrap();
        for (id, record) in sessions.iter_mut() {
            if record.end_epoch_ms.is_some() {
                continue;
            }
            if !rooms.exists(&record.room_code) {
                record.end_epoch_ms = Some(now_epoch_ms);
                record.end_reason = Some("room_deleted");
                log!("session {} closed: room_deleted", id);
            } else if now_epoch_ms - record.start_epoch_ms > MAX_SESSION_AGE_MS {
                record.end_epoch_ms = Some(now_epoch_ms);
                record.end_reason = Some("timeout");
                log!("session {} closed: timeout", id);
            }
        }
    }

    /// Five most recently started sessions (spec §4.7).
    pub fn recent_history(&self, rooms: &RoomRegistry) -> Vec<SessionSummary> {
        let sessions = self.sessions.read().unwrap();
        let mut ordered: Vec<(&SessionId, &SessionRecord)> = sessions.iter().collect();
        ordered.sort_by(|a, b| b.1.start_epoch_ms.cmp(&a.1.start_epoch_ms));
        ordered
            .into_iter()
            .take(5)
            .map(|(id, record)| {
                let now = now_ms();
                let duration_seconds = (record.end_epoch_ms.unwrap_or(now) - record.start_epoch_ms) / 1000;
                let is_active = record.end_epoch_ms.is_none() && rooms.room_exists_and_active(&record.room_code);
                SessionSummary {
                    session_id: id.as_str().to_string(),
                    room_code: record.room_code.as_str().to_string(),
                    game_mode: record.mode,
                    winner_name: record.winner_name.clone(),
                    winner_score: record.winner_score,
                    duration_seconds,
                    is_active,
                }
            })
            .collect()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

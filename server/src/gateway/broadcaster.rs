use std::collections::HashMap;
use std::sync::RwLock;

use axum::extract::ws::{Message, Utf8Bytes};
use tokio::sync::mpsc;

use common::log;
use common::ConnectionId;

use crate::protocol::ServerEvent;

/// Process-wide connection → outbound-sender index (spec §5, "per-
/// connection outbound queues are owned by the transport"). Rooms hold a
/// clone of this and address connections by id; they never see a raw
/// websocket.
#[derive(Clone)]
pub struct Broadcaster {
    connections: std::sync::Arc<RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<Message>>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self {
            connections: std::sync::Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn register(&self, conn_id: ConnectionId, tx: mpsc::UnboundedSender<Message>) {
        self.connections.write().unwrap().insert(conn_id, tx);
    }

    pub fn unregister(&self, conn_id: &ConnectionId) {
        self.connections.write().unwrap().remove(conn_id);
    }

    pub fn send(&self, conn_id: &ConnectionId, event: &ServerEvent) {
        let Some(tx) = self.connections.read().unwrap().get(conn_id).cloned() else {
            return;
        };
        match serde_json::to_string(event) {
            Ok(text) => {
                let _ = tx.send(Message::Text(Utf8Bytes::from(text)));
            }
            Err(err) => log!("failed to serialize outbound event: {err}"),
        }
    }

    pub fn send_to_many<'a>(&self, conn_ids: impl IntoIterator<Item = &'a ConnectionId>, event: &ServerEvent) {
        for conn_id in conn_ids {
            self.send(conn_id, event);
        }
    }

    /// Fan-out to every currently connected client, used for
    /// `publicRoomsUpdated` which is not scoped to one room (spec §4.6).
    pub fn broadcast_all(&self, event: &ServerEvent) {
        let text = match serde_json::to_string(event) {
            Ok(text) => text,
            Err(err) => {
                log!("failed to serialize broadcast event: {err}");
                return;
            }
        };
        let connections = self.connections.read().unwrap();
        for tx in connections.values() {
            let _ = tx.send(Message::Text(Utf8Bytes::from(text.clone())));
        }
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

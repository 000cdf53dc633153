mod config;
mod error;
mod gateway;
mod protocol;
mod registry;
mod room;
mod time;

use clap::Parser;
use tokio::time::{interval, Duration};

use common::{log, logger};
use config::{Args, FeatureFlags};
use gateway::{broadcaster::Broadcaster, GatewayState};
use registry::sessions::SessionRegistry;
use registry::RoomRegistry;

const SESSION_SWEEP_INTERVAL_MS: u64 = 30_000;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    logger::init_logger(None);

    let flags = FeatureFlags::from_args(&args);
    let port = config::listen_port();

    log!(
        "snake arena server starting (chat={}, powerups={}, accessibility={})",
        flags.chat,
        flags.powerups,
        flags.accessibility
    );

    let rooms = RoomRegistry::new();
    let sessions = SessionRegistry::new();
    let broadcaster = Broadcaster::new();

    tokio::spawn(session_sweep_task(rooms.clone(), sessions.clone()));

    let state = GatewayState {
        broadcaster,
        rooms,
        sessions,
        flags,
        port,
    };

    gateway::run(state).await;
}

/// Periodic registry sweep (spec §4.7): every 30s, close any session
/// whose room has vanished or that has run past the 24h staleness bound.
async fn session_sweep_task(rooms: RoomRegistry, sessions: SessionRegistry) {
    let mut ticker = interval(Duration::from_millis(SESSION_SWEEP_INTERVAL_MS));
    loop {
        ticker.tick().await;
        sessions.sweep(&rooms, time::now_ms());
    }
}

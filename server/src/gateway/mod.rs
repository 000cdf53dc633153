pub mod broadcaster;
pub mod http;
pub mod ws;

use std::path::PathBuf;

use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};

use common::log;

use crate::config::FeatureFlags;
use crate::registry::sessions::SessionRegistry;
use crate::registry::RoomRegistry;
use broadcaster::Broadcaster;

/// Everything a connection handler needs to reach the rest of the
/// process (spec §4.8 "the gateway never performs game logic").
#[derive(Clone)]
pub struct GatewayState {
    pub broadcaster: Broadcaster,
    pub rooms: RoomRegistry,
    pub sessions: SessionRegistry,
    pub flags: FeatureFlags,
    pub port: u16,
}

/// Builds and serves the router (spec §6): the `/ws` upgrade, the
/// `/api/server-info` support endpoint, and a static-asset fallback for
/// the client, mirroring the teacher's `web_server.rs` layout.
pub async fn run(state: GatewayState) {
    let port = state.port;
    let client_dir = PathBuf::from("client");
    let index = client_dir.join("index.html");

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/ws", get(ws_upgrade_handler))
        .route("/api/server-info", get(http::server_info_handler))
        .fallback_service(ServeDir::new(&client_dir).fallback(ServeFile::new(index)))
        .layer(cors)
        .with_state(state);

    let addr = format!("0.0.0.0:{port}");
    log!("snake arena server listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind listen address");

    axum::serve(listener, app).await.expect("gateway server error");
}

async fn ws_upgrade_handler(ws: WebSocketUpgrade, State(state): State<GatewayState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws::handle_socket(socket, state))
}

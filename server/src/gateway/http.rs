use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::net::UdpSocket;

use super::GatewayState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    port: u16,
    addresses: Vec<String>,
    connection_urls: Vec<String>,
}

/// `GET /api/server-info` (spec §6): lists the non-internal IPv4
/// addresses a client on the same network could use to reach this
/// process. There is no portable std API to enumerate interfaces, so we
/// use the standard "connect a UDP socket, read back the chosen local
/// address" trick rather than pull in a platform-specific crate.
pub async fn server_info_handler(State(state): State<GatewayState>) -> Json<ServerInfo> {
    let mut addresses = vec!["127.0.0.1".to_string()];
    if let Some(lan_ip) = outbound_ipv4() {
        if lan_ip != "127.0.0.1" {
            addresses.push(lan_ip);
        }
    }

    let connection_urls = addresses
        .iter()
        .map(|addr| format!("ws://{addr}:{}/ws", state.port))
        .collect();

    Json(ServerInfo {
        port: state.port,
        addresses,
        connection_urls,
    })
}

fn outbound_ipv4() -> Option<String> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    Some(socket.local_addr().ok()?.ip().to_string())
}

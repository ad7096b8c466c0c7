//! The UDP responder for LAN game discovery.

use crate::lobby::AppState;
use knights_protocol::discovery::{self, ServerInfo};
use std::sync::Arc;
use tokio::net::UdpSocket;

/// Answers version-matching broadcast pings with this server's pong. Runs
/// until the process ends; transient socket errors are logged and the loop
/// carries on.
pub async fn run_discovery(state: Arc<AppState>) {
    let (port, host_name, quest_key) = {
        let settings = state.settings.read().await;
        let quest_key = settings
            .games
            .first()
            .map(|g| g.name.clone())
            .unwrap_or_default();
        (settings.discovery_port, settings.host_name.clone(), quest_key)
    };
    if port == 0 {
        tracing::info!("LAN discovery disabled");
        return;
    }

    let socket = match UdpSocket::bind(("0.0.0.0", port)).await {
        Ok(socket) => socket,
        Err(err) => {
            tracing::error!(?err, port, "could not bind discovery socket");
            return;
        }
    };
    tracing::info!(port, "LAN discovery listening");

    let mut buf = [0u8; 512];
    loop {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(err) => {
                tracing::warn!(?err, "discovery receive failed");
                continue;
            }
        };
        if !discovery::is_ping(&buf[..len]) {
            continue; // wrong version or stray traffic; stay silent
        }
        let pong = discovery::encode_pong(&ServerInfo {
            num_players: state.player_count().await,
            host_name: host_name.clone(),
            quest_key: quest_key.clone(),
        });
        if let Err(err) = socket.send_to(&pong, peer).await {
            // Packet loss on broadcast answers is normal; the client retries
            // on its next cadence.
            tracing::warn!(?err, ?peer, "discovery reply failed");
        }
    }
}

//! Swarm construction for the peer node, using the modern
//! `libp2p::SwarmBuilder` chain rather than manual transport composition —
//! the cleaner of the two idioms this workspace's P2P code already
//! demonstrates elsewhere.

use std::time::Duration;

use concord_proto::ConcordError;
use libp2p::{identity::Keypair, noise, yamux, Swarm};

use crate::behaviour::PeerBehaviour;

pub async fn build_swarm(key: Keypair) -> Result<Swarm<PeerBehaviour>, ConcordError> {
    let swarm = libp2p::SwarmBuilder::with_existing_identity(key)
        .with_tokio()
        .with_websocket(noise::Config::new, yamux::Config::default)
        .await
        .map_err(|e| ConcordError::Transport(e.to_string()))?
        .with_dns()
        .map_err(|e| ConcordError::Transport(e.to_string()))?
        .with_relay_client(noise::Config::new, yamux::Config::default)
        .map_err(|e| ConcordError::Transport(e.to_string()))?
        .with_behaviour(|key, relay_client| PeerBehaviour::new(key, relay_client))
        .map_err(|e| ConcordError::Transport(e.to_string()))?
        .with_swarm_config(|cfg| cfg.with_idle_connection_timeout(Duration::from_secs(30)))
        .build();

    Ok(swarm)
}

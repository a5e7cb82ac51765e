//! Builds and drives the relay's overlay swarm: accepts circuit reservations
//! and forwards bytes between peers that both hold one.

use std::time::Duration;

use concord_proto::ConcordError;
use futures::StreamExt;
use libp2p::{identity::Keypair, multiaddr::Protocol, noise, swarm::SwarmEvent, yamux, Multiaddr, PeerId, Swarm};
use tokio::sync::mpsc;

use crate::behaviour::{RelayBehaviour, RelayBehaviourEvent};

pub enum RelayEvent {
    Listening { address: Multiaddr },
    PeerConnected { peer_id: PeerId },
    PeerDisconnected { peer_id: PeerId },
}

pub struct RelaySwarm {
    swarm: Swarm<RelayBehaviour>,
    events_tx: mpsc::UnboundedSender<RelayEvent>,
}

pub async fn build_swarm(
    key: Keypair,
    listen_port: u16,
) -> Result<(Swarm<RelayBehaviour>, PeerId), ConcordError> {
    let local_peer_id = PeerId::from(key.public());

    let mut swarm = libp2p::SwarmBuilder::with_existing_identity(key)
        .with_tokio()
        .with_websocket(noise::Config::new, yamux::Config::default)
        .await
        .map_err(|e| ConcordError::Transport(e.to_string()))?
        .with_behaviour(|k| RelayBehaviour::new(k))
        .map_err(|e| ConcordError::Transport(e.to_string()))?
        .with_swarm_config(|cfg| cfg.with_idle_connection_timeout(Duration::from_secs(30)))
        .build();

    let listen_addr: Multiaddr = format!("/ip4/0.0.0.0/tcp/{listen_port}/ws")
        .parse()
        .map_err(|e: libp2p::multiaddr::Error| ConcordError::Transport(e.to_string()))?;
    swarm
        .listen_on(listen_addr)
        .map_err(|e| ConcordError::Transport(e.to_string()))?;

    Ok((swarm, local_peer_id))
}

impl RelaySwarm {
    pub fn new(swarm: Swarm<RelayBehaviour>, events_tx: mpsc::UnboundedSender<RelayEvent>) -> Self {
        Self { swarm, events_tx }
    }

    /// Drive the swarm's event loop until cancelled. Collects the first
    /// externally-reachable listen address and reports it on `events_tx`.
    pub async fn run(mut self) {
        let mut reported_addr = false;
        loop {
            tokio::select! {
                event = self.swarm.select_next_some() => self.on_swarm_event(event, &mut reported_addr),
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("relay shutting down");
                    break;
                }
            }
        }
    }

    fn on_swarm_event(
        &mut self,
        event: SwarmEvent<RelayBehaviourEvent>,
        reported_addr: &mut bool,
    ) {
        match event {
            SwarmEvent::NewListenAddr { address, .. } => {
                let local_peer_id = *self.swarm.local_peer_id();
                let full = address.clone().with(Protocol::P2p(local_peer_id));
                self.swarm.add_external_address(full.clone());
                if !*reported_addr {
                    *reported_addr = true;
                    let _ = self.events_tx.send(RelayEvent::Listening { address: full });
                }
                tracing::info!(%address, "relay listening");
            }
            SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                let _ = self.events_tx.send(RelayEvent::PeerConnected { peer_id });
                tracing::debug!(%peer_id, "peer connected to relay");
            }
            SwarmEvent::ConnectionClosed { peer_id, .. } => {
                let _ = self.events_tx.send(RelayEvent::PeerDisconnected { peer_id });
                tracing::debug!(%peer_id, "peer disconnected from relay");
            }
            SwarmEvent::Behaviour(RelayBehaviourEvent::Relay(event)) => {
                tracing::debug!(?event, "relay behaviour event");
            }
            _ => {}
        }
    }
}

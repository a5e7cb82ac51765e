//! Overlay behaviour for the peer: relay client (for circuit reservations),
//! identify, ping, mDNS (LAN discovery), and `libp2p::stream` (raw
//! bidirectional streams, used by the chat protocol handler in `chat.rs`).
//!
//! `autonat`/`dcutr` from the upstream crate this workspace otherwise reaches
//! for are deliberately absent here — this node's bootstrap sequence never
//! attempts hole-punching or NAT-type probing, only circuit relay and mDNS,
//! so carrying those two behaviours would be unused surface area.

use libp2p::{identify, identity::Keypair, mdns, ping, relay, swarm::NetworkBehaviour};

#[derive(NetworkBehaviour)]
pub struct PeerBehaviour {
    pub relay_client: relay::client::Behaviour,
    pub identify: identify::Behaviour,
    pub ping: ping::Behaviour,
    pub mdns: mdns::tokio::Behaviour,
    pub stream: libp2p::stream::Behaviour,
}

impl PeerBehaviour {
    pub fn new(key: &Keypair, relay_client: relay::client::Behaviour) -> std::io::Result<Self> {
        let local_peer_id = libp2p::PeerId::from(key.public());
        Ok(Self {
            relay_client,
            identify: identify::Behaviour::new(identify::Config::new(
                "/concord/1.0.0".to_string(),
                key.public(),
            )),
            ping: ping::Behaviour::default(),
            mdns: mdns::tokio::Behaviour::new(mdns::Config::default(), local_peer_id)?,
            stream: libp2p::stream::Behaviour::new(),
        })
    }
}

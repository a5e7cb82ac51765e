//! Overlay behaviour for the rendezvous relay: circuit relay service plus
//! identify (so dialing peers learn the relay's observed address) and ping
//! (connection liveness).

use libp2p::{identify, identity::Keypair, ping, relay, swarm::NetworkBehaviour, PeerId};

#[derive(NetworkBehaviour)]
pub struct RelayBehaviour {
    pub relay: relay::Behaviour,
    pub identify: identify::Behaviour,
    pub ping: ping::Behaviour,
}

impl RelayBehaviour {
    pub fn new(key: &Keypair) -> Self {
        let local_peer_id = PeerId::from(key.public());
        Self {
            relay: relay::Behaviour::new(local_peer_id, relay::Config::default()),
            identify: identify::Behaviour::new(identify::Config::new(
                "/concord/1.0.0".to_string(),
                key.public(),
            )),
            ping: ping::Behaviour::default(),
        }
    }
}

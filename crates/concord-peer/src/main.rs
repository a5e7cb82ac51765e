//! Peer bootstrap: port resolution, identity load, best-effort relay-info
//! fetch, overlay startup, and handoff into the event/command loop.
//!
//! State machine (see DESIGN.md): `Starting -> FetchingRelayInfo ->
//! CreatingOverlay -> Reserving -> Registering -> Ready`. "Reserving" and
//! "Registering" are not blocking steps here: the circuit transport
//! negotiates its reservation automatically once the relay-circuit address is
//! in the listen set, and invite-code registration runs on its own delayed
//! retry loop inside `RelayClient` — `run()` does not wait on either before
//! declaring `Ready`.

mod behaviour;
mod bootstrap;
mod chat;
mod config;
mod ipc;
mod known_peers;
mod node;
mod relay_client;
mod router;
mod stats;
mod swarm;

use std::sync::Arc;

use clap::Parser;
use concord_proto::{identity, log_layer};
use libp2p::{multiaddr::Protocol, Multiaddr, PeerId};
use tokio::sync::mpsc;
use tracing_subscriber::prelude::*;

use crate::{
    config::Args,
    known_peers::KnownPeerStore,
    node::{Node, NodeContext},
    relay_client::RelayClient,
    router::Router,
    stats::Stats,
};

#[derive(serde::Deserialize)]
struct RelayInfo {
    #[serde(rename = "relayPeerId")]
    relay_peer_id: String,
    #[serde(rename = "externalRelayAddr")]
    external_relay_addr: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout is the IPC event channel (see ipc.rs) — log output must never
    // land there. `log_layer` re-exposes tracing events as `log` IPC events;
    // a plain fmt layer to stderr keeps them visible when run interactively.
    let (log_tx, log_rx) = log_layer::build_log_channel(256);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".parse().unwrap()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(log_layer::LogCaptureLayer::new(log_tx))
        .init();

    let args = Args::parse();
    let data_dir = args.resolved_data_dir();
    let identity_path = data_dir.join("node-identity.json");
    let port_path = data_dir.join("relay-config.json");
    let known_peers_path = data_dir.join("known-peers.json");

    let resolved_port = bootstrap::resolve_port(&port_path);
    let (key, is_ephemeral) = identity::load_or_create_identity(&identity_path, resolved_port.conflict)
        .map_err(|e| anyhow::anyhow!("failed to load peer identity: {e}"))?;
    let my_peer_id = PeerId::from(key.public());

    let relay_info = match &args.relay_url {
        Some(base) => fetch_relay_info(base).await,
        None => None,
    };

    let mut swarm = swarm::build_swarm(key)
        .await
        .map_err(|e| anyhow::anyhow!("failed to build peer swarm: {e}"))?;

    let mut port = resolved_port.port;
    if let Err(e) = listen(&mut swarm, port) {
        tracing::warn!(error = %e, port, "bind failed, retrying once with a fresh port");
        port = bootstrap::reassign_port(&port_path);
        listen(&mut swarm, port).map_err(|e| anyhow::anyhow!("failed to bind overlay listener: {e}"))?;
    }

    let relay_peer_id = match &relay_info {
        Some(info) => match info.relay_peer_id.parse::<PeerId>() {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(error = %e, "relay reported an unparseable peer id, ignoring");
                None
            }
        },
        None => None,
    };

    let mut relay_dial_addr: Option<Multiaddr> = None;
    if let Some(info) = &relay_info {
        relay_dial_addr = info.external_relay_addr.parse().ok();
        let circuit_listen: Multiaddr = format!("{}/p2p-circuit", info.external_relay_addr)
            .parse()
            .unwrap_or_else(|_| Multiaddr::empty().with(Protocol::P2p(my_peer_id)));
        if let Err(e) = swarm.listen_on(circuit_listen) {
            tracing::warn!(error = %e, "failed to request circuit-relay listen address");
        }
    }

    let relay_http_base = args.relay_url.clone();
    let control = swarm.behaviour().stream.new_control();
    let placeholder_router = Router::new(control, relay_http_base.clone().unwrap_or_default(), my_peer_id.to_string());

    let ctx = NodeContext {
        my_peer_id,
        port,
        is_ephemeral,
        relay_http_base: relay_http_base.clone(),
        relay_peer_id,
        relay_dial_addr,
        known_peer_store: KnownPeerStore::load(&known_peers_path),
    };

    let relay = relay_http_base.map(|base| {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = Arc::new(RelayClient::new(base, my_peer_id.to_string(), tx));
        (client, rx)
    });

    let node = Node::new(swarm, placeholder_router, ctx, Arc::new(Stats::default()), log_rx);
    node.run(relay).await;

    Ok(())
}

fn listen(swarm: &mut libp2p::Swarm<behaviour::PeerBehaviour>, port: u16) -> anyhow::Result<()> {
    let addr: Multiaddr = format!("/ip4/0.0.0.0/tcp/{port}/ws")
        .parse()
        .expect("well-formed listen multiaddr");
    swarm.listen_on(addr).map_err(|e| anyhow::anyhow!(e.to_string()))?;
    Ok(())
}

/// Best-effort `/info` fetch. Absence (relay down, no `--relay-url`) just
/// means no invite code and no circuit listen address this run — never
/// fatal to startup.
async fn fetch_relay_info(base_url: &str) -> Option<RelayInfo> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .ok()?;
    let resp = client.get(format!("{base_url}/info")).send().await.ok()?;
    resp.json::<RelayInfo>().await.ok()
}

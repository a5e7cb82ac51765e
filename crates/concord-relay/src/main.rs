use std::{
    sync::{atomic::{AtomicUsize, Ordering}, Arc},
    time::Duration,
};

use clap::Parser;
use concord_proto::identity;
use concord_relay::{
    config::Args,
    http::{router, RelayState},
    queue::MessageQueue,
    registry::InviteRegistry,
    swarm::{build_swarm, RelayEvent, RelaySwarm},
};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    let data_dir = args.resolved_data_dir();
    let identity_path = data_dir.join("node-identity.json");

    let (key, _ephemeral) = identity::load_or_create_identity(&identity_path, false)
        .map_err(|e| anyhow::anyhow!("failed to load relay identity: {e}"))?;

    let (swarm, relay_peer_id) = build_swarm(key, args.ws_port)
        .await
        .map_err(|e| anyhow::anyhow!("failed to build relay swarm: {e}"))?;

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let relay_addr = format!("/ip4/0.0.0.0/tcp/{}/ws/p2p/{relay_peer_id}", args.ws_port);
    let external_relay_addr = format!(
        "/dns4/{}/tcp/{}/ws/p2p/{relay_peer_id}",
        args.relay_hostname, args.ws_port
    );

    let state = Arc::new(RelayState {
        relay_peer_id: relay_peer_id.to_string(),
        relay_addr,
        external_relay_addr,
        registry: InviteRegistry::new(),
        queue: MessageQueue::new(),
        started_at: std::time::Instant::now(),
        connected_peers: AtomicUsize::new(0),
    });

    tokio::spawn(RelaySwarm::new(swarm, events_tx).run());
    let health_state = state.clone();
    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                RelayEvent::Listening { address } => tracing::info!(%address, "relay externally reachable at"),
                RelayEvent::PeerConnected { peer_id } => {
                    health_state.connected_peers.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(%peer_id, "peer connected");
                }
                RelayEvent::PeerDisconnected { peer_id } => {
                    health_state.connected_peers.fetch_sub(1, Ordering::Relaxed);
                    tracing::debug!(%peer_id, "peer disconnected");
                }
            }
        }
    });

    spawn_sweep_timers(state.clone());

    tracing::info!(peer_id = %relay_peer_id, http_port = args.http_port, "starting relay HTTP API");
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", args.http_port)).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}

fn spawn_sweep_timers(state: Arc<RelayState>) {
    let registry_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60 * 60));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            registry_state.registry.sweep();
        }
    });

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            state.queue.sweep();
        }
    });
}

//! The peer's event/command loop: owns the swarm, the stdin command source,
//! the chat protocol's inbound-message channel, and the relay client's
//! registration/poll channel, and dispatches between them.

use std::{
    collections::{HashMap, HashSet},
    io::Write,
    sync::{atomic::{AtomicBool, Ordering}, Arc},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use concord_proto::{chat_protocol::ChatEnvelope, invite_code, log_layer::LogEntry};
use futures::StreamExt;
use libp2p::{swarm::SwarmEvent, Multiaddr, PeerId};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::{broadcast, mpsc},
};

use crate::{
    behaviour::{PeerBehaviour, PeerBehaviourEvent},
    chat::{self, ChatMessage},
    ipc::{Command, ConnectionInfo, Event},
    known_peers::KnownPeerStore,
    relay_client::{RelayClient, RelayClientEvent},
    router::Router,
    stats::Stats,
};

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as u64
}

fn emit(event: &Event) {
    let mut stdout = std::io::stdout().lock();
    let _ = stdout.write_all(event.to_line().as_bytes());
    let _ = stdout.flush();
}

pub struct NodeContext {
    pub my_peer_id: PeerId,
    pub port: u16,
    pub is_ephemeral: bool,
    pub relay_http_base: Option<String>,
    pub relay_peer_id: Option<PeerId>,
    pub relay_dial_addr: Option<Multiaddr>,
    pub known_peer_store: KnownPeerStore,
}

pub struct Node {
    swarm: libp2p::Swarm<PeerBehaviour>,
    router: Router,
    ctx: NodeContext,
    stats: Arc<Stats>,
    connected: HashMap<PeerId, ConnectionInfo>,
    known_chat_peers: HashSet<PeerId>,
    invite_code: Option<String>,
    log_rx: broadcast::Receiver<LogEntry>,
    relay_client: Option<Arc<RelayClient>>,
    relay_reachable: Arc<AtomicBool>,
    redial_tx: Option<mpsc::UnboundedSender<()>>,
}

impl Node {
    /// `router` is a placeholder until `run()` replaces it with one built
    /// from the swarm's own `Control` handle (the stream behaviour's control
    /// does not exist until the swarm itself does).
    pub fn new(
        swarm: libp2p::Swarm<PeerBehaviour>,
        router: Router,
        ctx: NodeContext,
        stats: Arc<Stats>,
        log_rx: broadcast::Receiver<LogEntry>,
    ) -> Self {
        Self {
            swarm,
            router,
            ctx,
            stats,
            connected: HashMap::new(),
            known_chat_peers: HashSet::new(),
            invite_code: None,
            log_rx,
            relay_client: None,
            relay_reachable: Arc::new(AtomicBool::new(true)),
            redial_tx: None,
        }
    }

    pub async fn run(
        mut self,
        relay: Option<(Arc<RelayClient>, mpsc::UnboundedReceiver<RelayClientEvent>)>,
    ) {
        let (chat_tx, mut chat_rx) = mpsc::unbounded_channel::<ChatMessage>();
        let control = self.swarm.behaviour().stream.new_control();
        let control = chat::spawn_inbound_handler(control, chat_tx, self.stats.clone());
        self.router = Router::new(control, self.router_base(), self.ctx.my_peer_id.to_string());

        let mut relay_events_rx = match relay {
            Some((client, rx)) => {
                let registration_client = client.clone();
                tokio::spawn(async move { registration_client.run_registration_loop().await });
                let poll_client = client.clone();
                tokio::spawn(async move { poll_client.run_poll_loop().await });
                self.relay_client = Some(client);
                rx
            }
            None => {
                let (_tx, rx) = mpsc::unbounded_channel();
                rx
            }
        };

        let (redial_tx, mut redial_rx) = mpsc::unbounded_channel::<()>();
        self.redial_tx = Some(redial_tx);

        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<Command>();
        spawn_stdin_reader(cmd_tx);

        self.auto_dial_known_peers().await;
        self.emit_ready();

        let mut net_stats_interval = tokio::time::interval(std::time::Duration::from_secs(5));

        loop {
            tokio::select! {
                event = self.swarm.select_next_some() => self.on_swarm_event(event).await,
                Some(cmd) = cmd_rx.recv() => self.on_command(cmd).await,
                Some(msg) = chat_rx.recv() => self.on_chat_message(msg),
                Some(ev) = relay_events_rx.recv() => self.on_relay_client_event(ev),
                Some(()) = redial_rx.recv() => self.redial_relay(),
                Ok(entry) = self.log_rx.recv() => {
                    emit(&Event::Log { level: entry.level, target: entry.target, message: entry.message });
                }
                _ = net_stats_interval.tick() => self.emit_net_stats(),
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("peer shutting down");
                    break;
                }
            }
        }
    }

    fn router_base(&self) -> String {
        self.ctx.relay_http_base.clone().unwrap_or_default()
    }

    fn emit_ready(&self) {
        emit(&Event::Ready {
            peer_id: self.ctx.my_peer_id.to_string(),
            address: format!("/ip4/127.0.0.1/tcp/{}/ws", self.ctx.port),
            lan_address: lan_address(self.ctx.port),
            port: self.ctx.port,
            is_ephemeral: self.ctx.is_ephemeral,
        });
    }

    async fn auto_dial_known_peers(&mut self) {
        let addrs: Vec<String> = self.ctx.known_peer_store.all().iter().map(|p| p.address.clone()).collect();
        for addr in addrs {
            if let Ok(multiaddr) = addr.parse::<Multiaddr>() {
                let _ = self.swarm.dial(multiaddr);
            }
        }
    }

    async fn on_swarm_event(&mut self, event: SwarmEvent<PeerBehaviourEvent>) {
        match event {
            SwarmEvent::ConnectionEstablished { peer_id, endpoint, num_established, .. } => {
                let direction = if endpoint.is_dialer() { "outbound" } else { "inbound" };
                self.connected.insert(peer_id, ConnectionInfo {
                    remote_peer_id: peer_id.to_string(),
                    remote_addr: endpoint.get_remote_address().to_string(),
                    direction: direction.to_string(),
                    streams: num_established.get(),
                });
                if Some(peer_id) != self.ctx.relay_peer_id {
                    self.known_chat_peers.insert(peer_id);
                    self.ctx.known_peer_store.add(&endpoint.get_remote_address().to_string(), now_ms());
                } else if !self.relay_reachable.swap(true, Ordering::SeqCst) {
                    // Transitioned back from unreachable: the redial loop (if
                    // one is running) will see this flag and stop; re-publish
                    // the invite code since the relay has no memory of us
                    // across our disconnection.
                    if let Some(client) = self.relay_client.clone() {
                        tokio::spawn(async move { client.reregister().await });
                    }
                }
                emit(&Event::PeerConnect { peer_id: peer_id.to_string() });
            }
            SwarmEvent::ConnectionClosed { peer_id, .. } => {
                self.connected.remove(&peer_id);
                // Known chat peers are NOT removed on disconnect: they remain
                // addressable via the relay queue while offline or NAT'd.
                emit(&Event::PeerDisconnect { peer_id: peer_id.to_string() });

                if Some(peer_id) == self.ctx.relay_peer_id {
                    self.schedule_relay_reconnect();
                }
            }
            SwarmEvent::Behaviour(PeerBehaviourEvent::Mdns(libp2p::mdns::Event::Discovered(peers))) => {
                for (peer_id, addr) in peers {
                    self.known_chat_peers.insert(peer_id);
                    let _ = self.swarm.dial(addr);
                }
            }
            _ => {}
        }
    }

    /// Wait 5 s, then nudge the main loop to redial the relay every 15 s
    /// until `relay_reachable` flips back to `true` (checked in
    /// `redial_relay`). The poll/registration HTTP loops keep running
    /// unaffected — only the overlay circuit connection needs rebuilding.
    fn schedule_relay_reconnect(&self) {
        self.relay_reachable.store(false, Ordering::SeqCst);
        let Some(tx) = self.redial_tx.clone() else { return };
        let reachable = self.relay_reachable.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            loop {
                if reachable.load(Ordering::SeqCst) || tx.send(()).is_err() {
                    break;
                }
                tokio::time::sleep(Duration::from_secs(15)).await;
            }
        });
        tracing::warn!("disconnected from relay, scheduling reconnect");
    }

    fn redial_relay(&mut self) {
        if self.relay_reachable.load(Ordering::SeqCst) {
            return;
        }
        let Some(addr) = self.ctx.relay_dial_addr.clone() else { return };
        tracing::info!(%addr, "attempting relay reconnect");
        let _ = self.swarm.dial(addr);
    }

    async fn on_command(&mut self, cmd: Command) {
        match cmd {
            Command::Send { channel_id, data, target_peer_id } => {
                let envelope = ChatEnvelope::new(channel_id, data);
                match target_peer_id.and_then(|s| s.parse::<PeerId>().ok()) {
                    Some(target) => {
                        let connected = self.connected.contains_key(&target);
                        let _ = self.router.send_to(target, connected, &envelope, &self.stats).await;
                    }
                    None => {
                        let connected_keys: HashSet<PeerId> = self.connected.keys().cloned().collect();
                        let targets: Vec<PeerId> = self
                            .known_chat_peers
                            .union(&connected_keys)
                            .filter(|p| Some(**p) != self.ctx.relay_peer_id && **p != self.ctx.my_peer_id)
                            .cloned()
                            .collect();
                        let connected = &self.connected;
                        self.router
                            .broadcast(&targets, |p| connected.contains_key(p), &envelope, &self.stats)
                            .await;
                    }
                }
            }
            Command::Dial { address } => self.on_dial(address).await,
            Command::Status => {
                emit(&Event::Status {
                    peer_id: self.ctx.my_peer_id.to_string(),
                    addresses: vec![format!("/ip4/127.0.0.1/tcp/{}/ws", self.ctx.port)],
                    connected_peers: self.connected.keys().map(|p| p.to_string()).collect(),
                });
            }
            Command::Unknown => tracing::debug!("ignoring unrecognized stdin command"),
        }
    }

    async fn on_dial(&mut self, address: String) {
        let normalized = invite_code::normalize(&address);
        if invite_code::is_well_formed(&normalized) {
            self.dial_via_invite_code(&normalized).await;
        } else if address.starts_with('/') {
            match address.parse::<Multiaddr>() {
                Ok(addr) => match self.swarm.dial(addr) {
                    Ok(()) => emit(&Event::DialResult { ok: true, peer_id: None, error: None }),
                    Err(e) => emit(&Event::DialResult { ok: false, peer_id: None, error: Some(e.to_string()) }),
                },
                Err(e) => emit(&Event::DialResult { ok: false, peer_id: None, error: Some(e.to_string()) }),
            }
        } else {
            emit(&Event::DialResult { ok: false, peer_id: None, error: Some("Invalid address".into()) });
        }
    }

    async fn dial_via_invite_code(&mut self, code: &str) {
        let Some(base) = self.ctx.relay_http_base.clone() else {
            emit(&Event::DialResult { ok: false, peer_id: None, error: Some("no relay configured".into()) });
            return;
        };

        let client = reqwest::Client::new();
        let url = format!("{base}/lookup?code={code}");
        match client.get(&url).send().await.and_then(|r| r.error_for_status()) {
            Ok(resp) => match resp.json::<serde_json::Value>().await {
                Ok(body) => {
                    let Some(peer_id_str) = body.get("peerId").and_then(|v| v.as_str()) else {
                        emit(&Event::DialResult { ok: false, peer_id: None, error: Some("malformed lookup response".into()) });
                        return;
                    };
                    if let Ok(peer_id) = peer_id_str.parse::<PeerId>() {
                        self.known_chat_peers.insert(peer_id);
                        if let Some(circuit) = body.get("circuitAddr").and_then(|v| v.as_str()) {
                            if let Ok(addr) = circuit.parse::<Multiaddr>() {
                                // A circuit dial failure is non-fatal: relay
                                // forwarding still works without it.
                                let _ = self.swarm.dial(addr);
                            }
                        }
                        emit(&Event::DialResult { ok: true, peer_id: Some(peer_id.to_string()), error: None });
                    } else {
                        emit(&Event::DialResult { ok: false, peer_id: None, error: Some("invalid peerId in response".into()) });
                    }
                }
                Err(e) => emit(&Event::DialResult { ok: false, peer_id: None, error: Some(e.to_string()) }),
            },
            Err(e) => emit(&Event::DialResult { ok: false, peer_id: None, error: Some(e.to_string()) }),
        }
    }

    fn on_chat_message(&mut self, msg: ChatMessage) {
        self.known_chat_peers.insert(msg.from);
        self.stats.inc_recv();
        emit(&Event::Message {
            channel_id: msg.envelope.channel_id,
            data: msg.envelope.data,
            from: msg.from.to_string(),
        });
    }

    fn on_relay_client_event(&mut self, ev: RelayClientEvent) {
        match ev {
            RelayClientEvent::InviteCode(code) => {
                self.invite_code = Some(code.clone());
                emit(&Event::InviteCode { code });
            }
            RelayClientEvent::Message { from, channel_id, data, .. } => {
                if let Ok(peer_id) = from.parse::<PeerId>() {
                    self.known_chat_peers.insert(peer_id);
                }
                self.stats.inc_recv();
                emit(&Event::Message { channel_id, data, from });
            }
            RelayClientEvent::PollError => self.stats.inc_recv_fail(),
        }
    }

    fn emit_net_stats(&self) {
        let connections: Vec<ConnectionInfo> = self.connected.values().cloned().collect();

        emit(&Event::NetStats {
            port: self.ctx.port,
            listen_addrs: vec![format!("/ip4/127.0.0.1/tcp/{}/ws", self.ctx.port)],
            connections,
            known_peers: self.known_chat_peers.iter().map(|p| p.to_string()).collect(),
            stats: self.stats.snapshot(),
            invite_code: self.invite_code.clone(),
        });
    }
}

fn lan_address(port: u16) -> Option<String> {
    // Best-effort: the first non-loopback IPv4 interface address, if any.
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    let ip = socket.local_addr().ok()?.ip();
    if ip.is_loopback() {
        None
    } else {
        Some(format!("/ip4/{ip}/tcp/{port}/ws"))
    }
}

fn spawn_stdin_reader(tx: mpsc::UnboundedSender<Command>) {
    tokio::spawn(async move {
        let stdin = tokio::io::stdin();
        let mut lines = BufReader::new(stdin).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Command>(&line) {
                Ok(cmd) => {
                    if tx.send(cmd).is_err() {
                        break;
                    }
                }
                Err(e) => tracing::debug!(error = %e, "malformed stdin command, discarding"),
            }
        }
    });
}

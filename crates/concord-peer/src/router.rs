//! Tiered outbound send: a direct overlay stream when the peer is currently
//! connected, falling back to the relay's HTTP message queue otherwise (or on
//! direct-send failure).

use concord_proto::{chat_protocol::ChatEnvelope, ConcordError};
use libp2p::{stream::Control, PeerId};
use std::time::Duration;

use crate::stats::Stats;

#[derive(Clone)]
pub struct Router {
    control: Control,
    http: reqwest::Client,
    relay_http_base: String,
    my_peer_id: String,
}

impl Router {
    pub fn new(control: Control, relay_http_base: String, my_peer_id: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client construction cannot fail with these settings");
        Self { control, http, relay_http_base, my_peer_id }
    }

    /// Attempt direct delivery over the chat protocol stream.
    pub async fn try_direct(&mut self, peer: PeerId, envelope: &ChatEnvelope) -> Result<(), ConcordError> {
        crate::chat::send_direct(&mut self.control, peer, envelope).await
    }

    /// Enqueue via the relay's `/send` endpoint.
    pub async fn try_relay(&self, peer: PeerId, envelope: &ChatEnvelope) -> Result<(), ConcordError> {
        let url = format!("{}/send", self.relay_http_base);
        let body = serde_json::json!({
            "to": peer.to_string(),
            "from": self.my_peer_id,
            "channelId": envelope.channel_id,
            "data": envelope.data,
        });

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ConcordError::Http(e.to_string()))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ConcordError::Http(format!("relay /send returned {}", resp.status())))
        }
    }

    /// Direct stream first; on any failure, fall through to the relay queue.
    pub async fn send_to(
        &mut self,
        peer: PeerId,
        is_connected: bool,
        envelope: &ChatEnvelope,
        stats: &Stats,
    ) -> Result<(), ConcordError> {
        if is_connected {
            if self.try_direct(peer, envelope).await.is_ok() {
                stats.inc_sent();
                return Ok(());
            }
        }

        match self.try_relay(peer, envelope).await {
            Ok(()) => {
                stats.inc_sent();
                Ok(())
            }
            Err(e) => {
                stats.inc_send_fail();
                Err(e)
            }
        }
    }

    /// Send to every target in `targets`, in parallel. `is_connected` reports
    /// whether each target is a currently-connected overlay peer.
    pub async fn broadcast(
        &mut self,
        targets: &[PeerId],
        is_connected: impl Fn(&PeerId) -> bool,
        envelope: &ChatEnvelope,
        stats: &Stats,
    ) {
        // `Control` and reqwest's client are both cheap to clone, so each
        // target gets its own `Router` clone and they all run concurrently.
        let sends = targets.iter().map(|&peer| {
            let connected = is_connected(&peer);
            let mut router = self.clone();
            async move { (peer, router.send_to(peer, connected, envelope, stats).await) }
        });

        for (peer, result) in futures::future::join_all(sends).await {
            if let Err(e) = result {
                tracing::debug!(%peer, error = %e, "broadcast send failed for peer");
            }
        }
    }
}

//! Direct chat protocol handler, built on `libp2p::stream::Behaviour` rather
//! than `request_response`: the wire algorithm here is push-only and allows
//! multiple messages per stream, which `request_response`'s one-reply-per-
//! request pairing cannot express. There is no in-pack precedent for
//! `libp2p::stream` usage — see DESIGN.md for that decision record.

use std::sync::Arc;

use concord_proto::chat_protocol::{self, ChatEnvelope, CHAT_PROTOCOL};
use futures::{AsyncReadExt, AsyncWriteExt, StreamExt};
use libp2p::{stream::Control, PeerId};
use tokio::sync::mpsc;

use crate::stats::Stats;

pub struct ChatMessage {
    pub from: PeerId,
    pub envelope: ChatEnvelope,
}

/// Register the chat protocol and spawn a task that accepts inbound streams,
/// forwarding decoded messages on `tx`. Returns the `Control` handle used to
/// open outbound streams.
pub fn spawn_inbound_handler(
    mut control: Control,
    tx: mpsc::UnboundedSender<ChatMessage>,
    stats: Arc<Stats>,
) -> Control {
    let outbound_control = control.clone();
    let mut incoming = control
        .accept(CHAT_PROTOCOL)
        .expect("chat protocol registered exactly once");

    tokio::spawn(async move {
        while let Some((peer, stream)) = incoming.next().await {
            let tx = tx.clone();
            let stats = stats.clone();
            tokio::spawn(handle_inbound_stream(peer, stream, tx, stats));
        }
    });

    outbound_control
}

async fn handle_inbound_stream(
    peer: PeerId,
    mut stream: impl futures::AsyncRead + Unpin,
    tx: mpsc::UnboundedSender<ChatMessage>,
    stats: Arc<Stats>,
) {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                let (envelopes, fails) = chat_protocol::split_lines(&mut buffer);
                for _ in 0..fails {
                    stats.inc_recv_fail();
                }
                for envelope in envelopes {
                    let _ = tx.send(ChatMessage { from: peer, envelope });
                }
            }
            Err(e) => {
                // "abort"/"reset" are normal stream termination, not errors.
                let msg = e.to_string();
                if !msg.contains("abort") && !msg.contains("reset") {
                    tracing::debug!(error = %msg, %peer, "chat stream read error");
                }
                break;
            }
        }
    }

    if !buffer.is_empty() {
        match chat_protocol::parse_trailing(&buffer) {
            Some(envelope) => {
                let _ = tx.send(ChatMessage { from: peer, envelope });
            }
            None => stats.inc_recv_fail(),
        }
    }
}

/// Open a stream to `peer`, write one envelope, and close. Failure (no
/// connection, protocol not supported, write error) is the caller's signal to
/// fall back to relay-forwarded delivery.
pub async fn send_direct(
    control: &mut Control,
    peer: PeerId,
    envelope: &ChatEnvelope,
) -> Result<(), concord_proto::ConcordError> {
    let line = envelope
        .to_line()
        .map_err(|e| concord_proto::ConcordError::Codec(e.to_string()))?;

    let mut stream = control
        .open_stream(peer, CHAT_PROTOCOL)
        .await
        .map_err(|e| concord_proto::ConcordError::Transport(e.to_string()))?;

    stream
        .write_all(line.as_bytes())
        .await
        .map_err(|e| concord_proto::ConcordError::Io(e.to_string()))?;
    stream.close().await.map_err(|e| concord_proto::ConcordError::Io(e.to_string()))?;
    Ok(())
}

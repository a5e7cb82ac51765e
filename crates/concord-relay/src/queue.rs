//! Per-recipient store-and-forward message queue.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::{SystemTime, UNIX_EPOCH},
};

const MSG_MAX_PER_PEER: usize = 200;
const MSG_TTL_MS: u64 = 5 * 60 * 1000;

#[derive(Debug, Clone, serde::Serialize)]
pub struct QueuedMessage {
    pub from: String,
    #[serde(rename = "channelId")]
    pub channel_id: String,
    pub data: String,
    pub ts: u64,
}

#[derive(Default)]
struct Inner {
    queues: HashMap<String, Vec<QueuedMessage>>,
}

pub struct MessageQueue {
    inner: Mutex<Inner>,
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as u64
}

impl MessageQueue {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner::default()) }
    }

    pub fn enqueue(&self, to: &str, from: &str, channel_id: &str, data: &str) {
        let mut g = self.inner.lock().unwrap();
        let q = g.queues.entry(to.to_string()).or_default();
        q.push(QueuedMessage {
            from: from.to_string(),
            channel_id: channel_id.to_string(),
            data: data.to_string(),
            ts: now_ms(),
        });
        while q.len() > MSG_MAX_PER_PEER {
            q.remove(0);
        }
    }

    /// Drain and return every live message (`ts > since` and not yet expired)
    /// queued for `peer_id`. Destructive: the recipient's queue is cleared
    /// regardless of the `since` filter.
    pub fn drain(&self, peer_id: &str, since: u64) -> Vec<QueuedMessage> {
        let mut g = self.inner.lock().unwrap();
        let Some(messages) = g.queues.remove(peer_id) else { return Vec::new() };
        let now = now_ms();
        messages
            .into_iter()
            .filter(|m| m.ts > since && now.saturating_sub(m.ts) < MSG_TTL_MS)
            .collect()
    }

    /// Drop expired messages from every recipient's queue; remove recipients
    /// whose queue becomes empty.
    pub fn sweep(&self) {
        let mut g = self.inner.lock().unwrap();
        let now = now_ms();
        g.queues.retain(|_, messages| {
            messages.retain(|m| now.saturating_sub(m.ts) < MSG_TTL_MS);
            !messages.is_empty()
        });
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

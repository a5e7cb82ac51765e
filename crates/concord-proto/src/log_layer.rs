//! Bridges `tracing` events into a `broadcast` channel of `LogEntry` values,
//! so a process whose stdout is a structured IPC channel can still surface
//! its log output as ordinary `log` events on that same channel instead of
//! writing raw text to it.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::field::{Field, Visit};
use tracing_subscriber::Layer;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub level: String,
    pub target: String,
    pub message: String,
}

/// Build a channel pair for log capture. The sender is installed into a
/// `LogCaptureLayer`; the receiver is subscribed by whatever consumer wants to
/// forward captured entries onward (e.g. as stdout `log` events).
pub fn build_log_channel(capacity: usize) -> (broadcast::Sender<LogEntry>, broadcast::Receiver<LogEntry>) {
    broadcast::channel(capacity)
}

pub struct LogCaptureLayer {
    sender: broadcast::Sender<LogEntry>,
}

impl LogCaptureLayer {
    pub fn new(sender: broadcast::Sender<LogEntry>) -> Self {
        Self { sender }
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }
}

impl<S> Layer<S> for LogCaptureLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let entry = LogEntry {
            level: event.metadata().level().to_string(),
            target: event.metadata().target().to_string(),
            message: visitor.message,
        };

        // No receivers yet (or all lagging) is not an error — the log stream
        // is best-effort, never load-bearing for correctness.
        let _ = self.sender.send(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::prelude::*;

    #[test]
    fn captures_event_message_and_metadata() {
        let (tx, mut rx) = build_log_channel(16);
        let layer = LogCaptureLayer::new(tx);
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: "concord_test", "something happened");
        });

        let entry = rx.try_recv().expect("expected one captured entry");
        assert_eq!(entry.level, "WARN");
        assert_eq!(entry.target, "concord_test");
        assert_eq!(entry.message, "something happened");
    }
}

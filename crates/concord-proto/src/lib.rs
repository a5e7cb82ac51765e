pub mod chat_protocol;
pub mod error;
pub mod identity;
pub mod invite_code;
pub mod log_layer;

pub use chat_protocol::{ChatEnvelope, CHAT_PROTOCOL};
pub use error::ConcordError;
pub use log_layer::{LogCaptureLayer, LogEntry};

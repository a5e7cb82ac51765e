use thiserror::Error;

/// Errors that can cross the boundary between the overlay transport and the
/// application layer, shared by both the peer and the relay.
///
/// `Clone` because instances are forwarded over a `tokio::sync::broadcast`
/// channel as part of `log`/`error` event emission.
#[derive(Debug, Error, Clone)]
pub enum ConcordError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("dial failed: {0}")]
    Dial(String),

    #[error("no relay address available")]
    NoRelayAddr,

    #[error("peer not found: {0}")]
    PeerNotFound(String),

    #[error("identity error: {0}")]
    Identity(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("invalid invite code: {0}")]
    InvalidInviteCode(String),

    #[error("shutting down")]
    Shutdown,
}

impl From<std::io::Error> for ConcordError {
    fn from(e: std::io::Error) -> Self {
        ConcordError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for ConcordError {
    fn from(e: serde_json::Error) -> Self {
        ConcordError::Codec(e.to_string())
    }
}

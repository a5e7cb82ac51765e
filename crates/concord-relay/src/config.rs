use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "concord-relay", about = "Rendezvous relay for Concord peer nodes")]
pub struct Args {
    /// Directory holding the relay's persisted identity.
    #[arg(long, env = "CONCORD_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Overlay (WebSocket) listen port.
    #[arg(long, env = "WS_PORT", default_value_t = 9090)]
    pub ws_port: u16,

    /// HTTP API listen port.
    #[arg(long, env = "HTTP_PORT", default_value_t = 8080)]
    pub http_port: u16,

    /// Public hostname advertised to clients in `/info` and `/register`
    /// responses, used to synthesize the externally reachable relay address.
    #[arg(long, env = "RELAY_HOSTNAME", default_value = "relay.example.com")]
    pub relay_hostname: String,
}

impl Args {
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("concord-relay")
        })
    }
}

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "concord-peer", about = "Concord decentralized chat peer node")]
pub struct Args {
    /// Directory holding the peer's persisted identity and known-peers list.
    #[arg(long, env = "CONCORD_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Base URL of the rendezvous relay's HTTP API, e.g. `https://relay.example.com:8080`.
    #[arg(long, env = "CONCORD_RELAY_URL")]
    pub relay_url: Option<String>,
}

impl Args {
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("concord-peer")
        })
    }
}

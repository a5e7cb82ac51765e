//! Persisted record of previously-dialable addresses, used to auto-redial on
//! the first `ready` event of a new session.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const MAX_ENTRIES: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnownPeer {
    pub address: String,
    #[serde(rename = "lastSeenMs")]
    pub last_seen_ms: u64,
}

pub struct KnownPeerStore {
    path: PathBuf,
    entries: Vec<KnownPeer>,
}

impl KnownPeerStore {
    pub fn load(path: &Path) -> Self {
        let entries = std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str::<Vec<KnownPeer>>(&s).ok())
            .unwrap_or_default()
            .into_iter()
            .filter(|p| p.address.starts_with('/'))
            .collect();
        Self { path: path.to_path_buf(), entries }
    }

    pub fn all(&self) -> &[KnownPeer] {
        &self.entries
    }

    pub fn add(&mut self, address: &str, now_ms: u64) {
        let normalized = address.trim().trim_end_matches('/').to_string();
        if normalized.is_empty() {
            return;
        }

        if let Some(existing) = self.entries.iter_mut().find(|p| p.address == normalized) {
            existing.last_seen_ms = now_ms;
        } else {
            self.entries.push(KnownPeer { address: normalized, last_seen_ms: now_ms });
        }

        self.entries.sort_by(|a, b| b.last_seen_ms.cmp(&a.last_seen_ms));
        self.entries.truncate(MAX_ENTRIES);
        self.persist();
    }

    fn persist(&self) {
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Ok(json) = serde_json::to_string_pretty(&self.entries) {
            let _ = std::fs::write(&self.path, json);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("known-peers.json");

        let mut store = KnownPeerStore::load(&path);
        store.add("/ip4/10.0.0.1/tcp/9090/", 100);

        let reloaded = KnownPeerStore::load(&path);
        assert_eq!(reloaded.all().len(), 1);
        assert_eq!(reloaded.all()[0].address, "/ip4/10.0.0.1/tcp/9090");
    }

    #[test]
    fn re_adding_same_address_refreshes_last_seen_without_duplicating() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("known-peers.json");
        let mut store = KnownPeerStore::load(&path);

        store.add("/ip4/10.0.0.1/tcp/9090", 1);
        store.add("/ip4/10.0.0.1/tcp/9090", 2);

        assert_eq!(store.all().len(), 1);
        assert_eq!(store.all()[0].last_seen_ms, 2);
    }

    #[test]
    fn caps_at_fifty_entries_keeping_most_recent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("known-peers.json");
        let mut store = KnownPeerStore::load(&path);

        for i in 0..60u64 {
            store.add(&format!("/ip4/10.0.0.{}/tcp/9090", i % 255), i);
        }

        assert_eq!(store.all().len(), MAX_ENTRIES);
        assert_eq!(store.all()[0].last_seen_ms, 59);
    }

    #[test]
    fn load_discards_entries_not_shaped_like_addresses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("known-peers.json");
        std::fs::write(
            &path,
            serde_json::to_string(&vec![
                KnownPeer { address: "/ip4/10.0.0.1/tcp/9090".into(), last_seen_ms: 1 },
                KnownPeer { address: "garbage".into(), last_seen_ms: 2 },
            ])
            .unwrap(),
        )
        .unwrap();

        let store = KnownPeerStore::load(&path);
        assert_eq!(store.all().len(), 1);
    }
}

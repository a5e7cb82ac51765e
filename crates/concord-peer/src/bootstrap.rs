//! Port selection with persistence: reuse the previously bound port across
//! restarts when it is still free, otherwise pick a fresh one and note that a
//! conflicting process already holds the old one (which forces an ephemeral
//! identity for this run — see `concord_proto::identity`).

use std::{net::TcpListener, path::Path};

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct PortFile {
    port: u16,
}

pub struct ResolvedPort {
    pub port: u16,
    pub conflict: bool,
}

/// Resolve the overlay listen port, consulting and updating `path`
/// (`relay-config.json`'s sibling on the peer side).
pub fn resolve_port(path: &Path) -> ResolvedPort {
    let persisted = std::fs::read_to_string(path)
        .ok()
        .and_then(|s| serde_json::from_str::<PortFile>(&s).ok())
        .map(|f| f.port);

    match persisted {
        Some(port) if is_free(port) => ResolvedPort { port, conflict: false },
        Some(_) => {
            // Persisted port is taken by someone else: pick a new one and
            // record the conflict so identity load goes ephemeral.
            let port = pick_free_port();
            persist_port(path, port);
            ResolvedPort { port, conflict: true }
        }
        None => {
            let port = pick_free_port();
            persist_port(path, port);
            ResolvedPort { port, conflict: false }
        }
    }
}

fn is_free(port: u16) -> bool {
    TcpListener::bind(("0.0.0.0", port)).is_ok()
}

fn pick_free_port() -> u16 {
    TcpListener::bind(("0.0.0.0", 0))
        .expect("OS must be able to hand out an ephemeral port")
        .local_addr()
        .expect("bound listener always has a local address")
        .port()
}

fn persist_port(path: &Path, port: u16) {
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Ok(json) = serde_json::to_string_pretty(&PortFile { port }) {
        let _ = std::fs::write(path, json);
    }
}

/// Called when the swarm itself reports address-in-use at bind time (a race
/// against the earlier `is_free` probe in `resolve_port`): drop the stale
/// persisted port and hand back a fresh one.
pub fn reassign_port(path: &Path) -> u16 {
    let _ = std::fs::remove_file(path);
    let port = pick_free_port();
    persist_port(path, port);
    port
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_run_picks_and_persists_a_port() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay-config.json");

        let resolved = resolve_port(&path);
        assert!(!resolved.conflict);
        assert!(path.exists());
    }

    #[test]
    fn second_run_reuses_persisted_free_port() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay-config.json");

        let first = resolve_port(&path);
        let second = resolve_port(&path);
        assert_eq!(first.port, second.port);
        assert!(!second.conflict);
    }

    #[test]
    fn occupied_persisted_port_is_reported_as_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay-config.json");

        let held_port = pick_free_port();
        std::fs::write(&path, serde_json::to_string(&PortFile { port: held_port }).unwrap()).unwrap();
        let _listener = TcpListener::bind(("0.0.0.0", held_port)).unwrap();

        let resolved = resolve_port(&path);
        assert!(resolved.conflict);
        assert_ne!(resolved.port, held_port);
    }
}

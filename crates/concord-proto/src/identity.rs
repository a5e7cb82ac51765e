//! Persisted node identity.
//!
//! Stored as a small JSON envelope rather than the raw protobuf bytes used
//! elsewhere in this workspace, so the file stays legible to the host process
//! that writes it (`<dataDir>/node-identity.json`):
//!
//! ```json
//! { "privateKey": "<base64(protobuf)>", "createdAt": "<ISO-8601>" }
//! ```

use std::path::Path;

use chrono::Utc;
use libp2p::identity::Keypair;
use serde::{Deserialize, Serialize};

use crate::error::ConcordError;

#[derive(Debug, Serialize, Deserialize)]
struct IdentityFile {
    #[serde(rename = "privateKey")]
    private_key: String,
    #[serde(rename = "createdAt")]
    created_at: String,
}

/// Load the identity at `path`, creating and persisting a new one if absent.
///
/// An existing file in an unrecognized format is treated as corrupt: a fresh
/// keypair is generated in its place (the identity rotates). This is a
/// deliberate departure from "refuse to touch a file I don't understand" —
/// here losing a stale identity is cheaper than a process that can never
/// start back up because of one bad byte in a JSON file.
///
/// If `port_conflict` is set, an ephemeral keypair is generated and returned
/// without ever touching `path` — a second instance sharing a data directory
/// must not collide with, or silently take over, the first instance's
/// identity.
pub fn load_or_create_identity(
    path: &Path,
    port_conflict: bool,
) -> Result<(Keypair, bool), ConcordError> {
    if port_conflict {
        return Ok((Keypair::generate_ed25519(), true));
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match decode_identity_file(&contents) {
            Ok(key) => Ok((key, false)),
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "identity file unreadable, generating a new identity");
                let key = Keypair::generate_ed25519();
                persist_identity(path, &key)?;
                Ok((key, false))
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let key = Keypair::generate_ed25519();
            persist_identity(path, &key)?;
            Ok((key, false))
        }
        Err(e) => Err(ConcordError::Io(e.to_string())),
    }
}

fn decode_identity_file(contents: &str) -> Result<Keypair, ConcordError> {
    let file: IdentityFile =
        serde_json::from_str(contents).map_err(|e| ConcordError::Identity(e.to_string()))?;
    let bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &file.private_key)
        .map_err(|e| ConcordError::Identity(e.to_string()))?;
    Keypair::from_protobuf_encoding(&bytes).map_err(|e| ConcordError::Identity(e.to_string()))
}

fn persist_identity(path: &Path, key: &Keypair) -> Result<(), ConcordError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let bytes = key
        .to_protobuf_encoding()
        .map_err(|e| ConcordError::Identity(e.to_string()))?;
    let file = IdentityFile {
        private_key: base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes),
        created_at: Utc::now().to_rfc3339(),
    };
    let json = serde_json::to_string_pretty(&file)?;

    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use libp2p::PeerId;

    #[test]
    fn creates_and_reloads_same_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node-identity.json");

        let (key1, ephemeral1) = load_or_create_identity(&path, false).unwrap();
        assert!(!ephemeral1);
        let (key2, ephemeral2) = load_or_create_identity(&path, false).unwrap();
        assert!(!ephemeral2);

        assert_eq!(PeerId::from(key1.public()), PeerId::from(key2.public()));
    }

    #[test]
    fn port_conflict_yields_ephemeral_identity_and_does_not_touch_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node-identity.json");

        let (_key, ephemeral) = load_or_create_identity(&path, true).unwrap();
        assert!(ephemeral);
        assert!(!path.exists());
    }

    #[test]
    fn corrupt_file_rotates_identity_instead_of_failing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node-identity.json");
        std::fs::write(&path, "not json at all").unwrap();

        let result = load_or_create_identity(&path, false);
        assert!(result.is_ok(), "corrupt identity file must not be a fatal error");
    }

    #[test]
    fn persisted_file_matches_documented_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node-identity.json");
        load_or_create_identity(&path, false).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(value.get("privateKey").is_some());
        assert!(value.get("createdAt").is_some());
    }
}

//! Invite-code registry: a bijection between short human-shareable codes and
//! peer ids, with a time-to-live sweep. Single mutex guarding a plain
//! `HashMap` pair — traffic at this scale never justifies anything fancier.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::{SystemTime, UNIX_EPOCH},
};

use concord_proto::invite_code;

const CODE_TTL_MS: u64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub peer_id: String,
    pub last_seen_ms: u64,
}

#[derive(Default)]
struct Inner {
    code_to_entry: HashMap<String, RegistryEntry>,
    peer_to_code: HashMap<String, String>,
}

pub struct InviteRegistry {
    inner: Mutex<Inner>,
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as u64
}

impl InviteRegistry {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner::default()) }
    }

    /// Register `peer_id`, returning its code. Re-registering within the TTL
    /// of an existing live code returns that same code and refreshes it.
    pub fn register(&self, peer_id: &str) -> String {
        let mut g = self.inner.lock().unwrap();

        if let Some(existing_code) = g.peer_to_code.get(peer_id).cloned() {
            if let Some(entry) = g.code_to_entry.get_mut(&existing_code) {
                entry.last_seen_ms = now_ms();
                return existing_code;
            }
        }

        let code = loop {
            let candidate = invite_code::generate();
            if !g.code_to_entry.contains_key(&candidate) {
                break candidate;
            }
        };

        g.code_to_entry.insert(
            code.clone(),
            RegistryEntry { peer_id: peer_id.to_string(), last_seen_ms: now_ms() },
        );
        g.peer_to_code.insert(peer_id.to_string(), code.clone());
        code
    }

    /// Look up a code (case-insensitive), refreshing its last-seen time on
    /// hit. Any peer who knows a live code can extend its lifetime this way —
    /// see DESIGN.md for why that is accepted rather than "fixed".
    pub fn lookup(&self, code: &str) -> Option<RegistryEntry> {
        let normalized = invite_code::normalize(code);
        let mut g = self.inner.lock().unwrap();
        let entry = g.code_to_entry.get_mut(&normalized)?;
        entry.last_seen_ms = now_ms();
        Some(entry.clone())
    }

    /// Remove every entry whose `last_seen_ms` has aged past the TTL.
    pub fn sweep(&self) {
        let mut g = self.inner.lock().unwrap();
        let now = now_ms();
        let expired: Vec<String> = g
            .code_to_entry
            .iter()
            .filter(|(_, e)| now.saturating_sub(e.last_seen_ms) > CODE_TTL_MS)
            .map(|(code, _)| code.clone())
            .collect();

        for code in expired {
            if let Some(entry) = g.code_to_entry.remove(&code) {
                g.peer_to_code.remove(&entry.peer_id);
            }
        }
    }

    /// Number of currently live codes, exposed on `/health`.
    pub fn code_count(&self) -> usize {
        self.inner.lock().unwrap().code_to_entry.len()
    }
}

impl Default for InviteRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_lookup_resolves_same_peer() {
        let reg = InviteRegistry::new();
        let code = reg.register("peer-a");
        let entry = reg.lookup(&code).expect("code should resolve");
        assert_eq!(entry.peer_id, "peer-a");
    }

    #[test]
    fn repeated_registration_returns_same_code() {
        let reg = InviteRegistry::new();
        let code1 = reg.register("peer-a");
        let code2 = reg.register("peer-a");
        assert_eq!(code1, code2);
        assert_eq!(reg.code_count(), 1);
    }

    #[test]
    fn distinct_peers_get_distinct_codes() {
        let reg = InviteRegistry::new();
        let code_a = reg.register("peer-a");
        let code_b = reg.register("peer-b");
        assert_ne!(code_a, code_b);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let reg = InviteRegistry::new();
        let code = reg.register("peer-a");
        let lower = code.to_ascii_lowercase();
        assert!(reg.lookup(&lower).is_some());
    }

    #[test]
    fn lookup_unknown_code_returns_none() {
        let reg = InviteRegistry::new();
        assert!(reg.lookup("ZZZZ-ZZZZ").is_none());
    }

    #[test]
    fn sweep_removes_only_expired_entries() {
        let reg = InviteRegistry::new();
        let code = reg.register("peer-a");
        {
            let mut g = reg.inner.lock().unwrap();
            let entry = g.code_to_entry.get_mut(&code).unwrap();
            entry.last_seen_ms = 0; // force-expire
        }
        reg.register("peer-b"); // fresh entry, must survive the sweep
        reg.sweep();
        assert!(reg.lookup(&code).is_none());
        assert_eq!(reg.code_count(), 1);
    }
}

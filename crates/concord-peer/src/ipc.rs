//! stdin/stdout IPC envelopes. Modeled as tagged enums rather than loose
//! `serde_json::Value` trees so the rest of the node works with typed data;
//! an unrecognized `cmd` deserializes to `Unknown` instead of failing parse,
//! matching the "never fatal on malformed input" policy.

use serde::{Deserialize, Serialize};

use crate::stats::StatsSnapshot;

#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "lowercase")]
pub enum Command {
    Send {
        #[serde(rename = "channelId")]
        channel_id: String,
        data: String,
        #[serde(rename = "targetPeerId")]
        target_peer_id: Option<String>,
    },
    Dial {
        address: String,
    },
    Status,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    #[serde(rename = "remotePeerId")]
    pub remote_peer_id: String,
    #[serde(rename = "remoteAddr")]
    pub remote_addr: String,
    pub direction: String,
    pub streams: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    Ready {
        #[serde(rename = "peerId")]
        peer_id: String,
        address: String,
        #[serde(rename = "lanAddress")]
        lan_address: Option<String>,
        port: u16,
        #[serde(rename = "isEphemeral")]
        is_ephemeral: bool,
    },
    Message {
        #[serde(rename = "channelId")]
        channel_id: String,
        data: String,
        from: String,
    },
    #[serde(rename = "peer:connect")]
    PeerConnect { #[serde(rename = "peerId")] peer_id: String },
    #[serde(rename = "peer:disconnect")]
    PeerDisconnect { #[serde(rename = "peerId")] peer_id: String },
    InviteCode { code: String },
    DialResult {
        ok: bool,
        #[serde(rename = "peerId", skip_serializing_if = "Option::is_none")]
        peer_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    NetStats {
        port: u16,
        #[serde(rename = "listenAddrs")]
        listen_addrs: Vec<String>,
        connections: Vec<ConnectionInfo>,
        #[serde(rename = "knownPeers")]
        known_peers: Vec<String>,
        stats: StatsSnapshot,
        #[serde(rename = "inviteCode")]
        invite_code: Option<String>,
    },
    Log {
        level: String,
        target: String,
        message: String,
    },
    Error {
        message: String,
    },
    Status {
        #[serde(rename = "peerId")]
        peer_id: String,
        addresses: Vec<String>,
        #[serde(rename = "connectedPeers")]
        connected_peers: Vec<String>,
    },
}

impl Event {
    /// Render as one line of JSON terminated with `\n`, ready to write to
    /// stdout directly.
    pub fn to_line(&self) -> String {
        match serde_json::to_string(self) {
            Ok(mut s) => {
                s.push('\n');
                s
            }
            // Serialization of these fixed-shape enums cannot fail in practice;
            // emit a minimal fallback rather than panic in an IPC loop.
            Err(_) => "{\"event\":\"error\",\"message\":\"internal serialization failure\"}\n".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_command_tag_does_not_fail_to_parse() {
        let cmd: Command = serde_json::from_str(r#"{"cmd":"frobnicate"}"#).unwrap();
        assert!(matches!(cmd, Command::Unknown));
    }

    #[test]
    fn send_command_parses_optional_target() {
        let cmd: Command =
            serde_json::from_str(r#"{"cmd":"send","channelId":"general","data":"hi"}"#).unwrap();
        match cmd {
            Command::Send { channel_id, data, target_peer_id } => {
                assert_eq!(channel_id, "general");
                assert_eq!(data, "hi");
                assert!(target_peer_id.is_none());
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn event_lines_end_with_newline() {
        let event = Event::InviteCode { code: "ABCD-WXYZ".into() };
        assert!(event.to_line().ends_with('\n'));
    }

    #[test]
    fn dial_result_omits_absent_fields() {
        let event = Event::DialResult { ok: false, peer_id: None, error: Some("bad address".into()) };
        let line = event.to_line();
        assert!(!line.contains("peerId"));
        assert!(line.contains("bad address"));
    }
}

//! Wire format for the direct peer-to-peer chat stream.
//!
//! A stream speaking `/concord/chat/1.0.0` carries one or more newline-
//! terminated JSON `ChatEnvelope` values. The protocol is push-only: there is
//! no reply, which is why it is built on raw bidirectional streams
//! (`libp2p::stream`) rather than `request_response` — see
//! `concord-peer`'s `chat` module for the stream-handling side of this.

use libp2p::StreamProtocol;
use serde::{Deserialize, Serialize};

pub const CHAT_PROTOCOL: StreamProtocol = StreamProtocol::new("/concord/chat/1.0.0");

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatEnvelope {
    #[serde(rename = "channelId")]
    pub channel_id: String,
    pub data: String,
}

impl ChatEnvelope {
    pub fn new(channel_id: impl Into<String>, data: impl Into<String>) -> Self {
        Self { channel_id: channel_id.into(), data: data.into() }
    }

    /// Serialize as a single newline-terminated line, ready to write directly
    /// to an outbound stream.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut s = serde_json::to_string(self)?;
        s.push('\n');
        Ok(s)
    }
}

/// Split a buffer of received bytes on `\n`, returning the decoded envelopes
/// for every complete line and a count of lines that failed to parse.
///
/// Lines that fail to parse as a `ChatEnvelope` are skipped, not propagated as
/// an error — one malformed line must not stall the rest of the stream. The
/// caller is expected to feed the failure count into its `recvFail` counter.
pub fn split_lines(buffer: &mut Vec<u8>) -> (Vec<ChatEnvelope>, usize) {
    let mut out = Vec::new();
    let mut fail_count = 0;
    loop {
        let Some(pos) = buffer.iter().position(|&b| b == b'\n') else { break };
        let line: Vec<u8> = buffer.drain(..=pos).collect();
        let line = &line[..line.len() - 1]; // drop trailing \n
        if line.is_empty() {
            continue;
        }
        match serde_json::from_slice::<ChatEnvelope>(line) {
            Ok(env) => out.push(env),
            Err(e) => {
                fail_count += 1;
                tracing::debug!(error = %e, "discarding malformed chat line");
            }
        }
    }
    (out, fail_count)
}

/// Parse whatever remains in `buffer` after the stream has closed (the
/// protocol allows the final message to omit its trailing newline).
pub fn parse_trailing(buffer: &[u8]) -> Option<ChatEnvelope> {
    if buffer.is_empty() {
        return None;
    }
    serde_json::from_slice(buffer).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_to_line() {
        let env = ChatEnvelope::new("general", "hello");
        let line = env.to_line().unwrap();
        assert!(line.ends_with('\n'));
        let mut buf = line.into_bytes();
        let (parsed, fails) = split_lines(&mut buf);
        assert_eq!(parsed, vec![env]);
        assert_eq!(fails, 0);
        assert!(buf.is_empty());
    }

    #[test]
    fn handles_multiple_messages_in_one_buffer() {
        let mut buf = Vec::new();
        buf.extend(ChatEnvelope::new("a", "1").to_line().unwrap().into_bytes());
        buf.extend(ChatEnvelope::new("b", "2").to_line().unwrap().into_bytes());
        let (parsed, fails) = split_lines(&mut buf);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].channel_id, "a");
        assert_eq!(parsed[1].channel_id, "b");
        assert_eq!(fails, 0);
    }

    #[test]
    fn leaves_partial_trailing_line_in_buffer() {
        let mut buf = ChatEnvelope::new("a", "1").to_line().unwrap().into_bytes();
        buf.extend_from_slice(b"{\"channelId\":\"b\",\"data\":");
        let (parsed, fails) = split_lines(&mut buf);
        assert_eq!(parsed.len(), 1);
        assert_eq!(fails, 0);
        assert!(!buf.is_empty());
    }

    #[test]
    fn parses_trailing_buffer_without_newline() {
        let env = ChatEnvelope::new("general", "bye");
        let json = serde_json::to_vec(&env).unwrap();
        assert_eq!(parse_trailing(&json), Some(env));
    }

    #[test]
    fn malformed_line_is_skipped_not_fatal() {
        let mut buf = b"not json\n".to_vec();
        buf.extend(ChatEnvelope::new("a", "1").to_line().unwrap().into_bytes());
        let (parsed, fails) = split_lines(&mut buf);
        assert_eq!(parsed, vec![ChatEnvelope::new("a", "1")]);
        assert_eq!(fails, 1);
    }
}

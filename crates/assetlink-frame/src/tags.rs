//! Built-in message type tags.
//!
//! Tags are FourCC codes. The control tags (`PING`, `PONG`, `LOG1`) are
//! always handled by the built-in listener; everything else is claimed by
//! registered listeners or discarded.

use assetlink_wire::FourCc;

/// Keepalive request; the peer replies with [`PONG`].
pub const PING: FourCc = FourCc::new(*b"PING");

/// Keepalive reply. Never answered, which prevents ping-pong loops.
pub const PONG: FourCc = FourCc::new(*b"PONG");

/// One log line as a length-prefixed string.
pub const LOG1: FourCc = FourCc::new(*b"LOG1");

/// One command string for the remote side to execute.
pub const CMD1: FourCc = FourCc::new(*b"CMD1");

/// File transfer header: pending count, path, total content length.
pub const FILE: FourCc = FourCc::new(*b"FILE");

/// File transfer content chunk at an explicit byte offset.
pub const FCHK: FourCc = FourCc::new(*b"FCHK");

/// A batch of telemetry tables for one tick.
pub const TELE: FourCc = FourCc::new(*b"TELE");

/// Returns a human-readable name for a tag.
pub fn tag_name(tag: FourCc) -> &'static str {
    match tag {
        t if t == PING => "PING",
        t if t == PONG => "PONG",
        t if t == LOG1 => "LOG1",
        t if t == CMD1 => "CMD1",
        t if t == FILE => "FILE",
        t if t == FCHK => "FCHK",
        t if t == TELE => "TELE",
        _ => "UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_match_their_ascii_codes() {
        assert_eq!(PING.to_string(), "PING");
        assert_eq!(TELE.to_string(), "TELE");
        assert_eq!(tag_name(FCHK), "FCHK");
        assert_eq!(tag_name(FourCc::new(*b"NOPE")), "UNKNOWN");
    }
}

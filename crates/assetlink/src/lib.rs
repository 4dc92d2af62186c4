//! Asset streaming and telemetry for live game development.
//!
//! assetlink links a running game to its development tooling: hot asset
//! delivery, remote commands, log forwarding and per-tick telemetry over a
//! single length-prefixed socket protocol.
//!
//! # Crate Structure
//!
//! - [`wire`] — Little-endian byte cursor and FourCC tags
//! - [`frame`] — Length-prefixed, checkpointed message framing
//! - [`protocol`] — Connection handling, listener dispatch, file streaming
//! - [`telemetry`] — Tick metric recording and the viewer facade

/// Re-export wire types.
pub mod wire {
    pub use assetlink_wire::*;
}

/// Re-export frame types.
pub mod frame {
    pub use assetlink_frame::*;
}

/// Re-export protocol types.
pub mod protocol {
    pub use assetlink_protocol::*;
}

/// Re-export telemetry types.
pub mod telemetry {
    pub use assetlink_telemetry::*;
}

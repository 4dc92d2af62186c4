//! Length-prefixed message framing for the asset protocol.
//!
//! Every message on the wire is framed as:
//! - A 4-byte little-endian total length (header + payload)
//! - A 4-byte checkpoint word (`0xDEADBEEF`) guarding against stream
//!   desynchronization
//! - A 4-byte FourCC message type tag
//!
//! A checkpoint mismatch is fatal to the connection: the framing has no
//! self-synchronizing marker, so no resync is attempted.

pub mod codec;
pub mod error;
pub mod reader;
pub mod tags;
pub mod writer;

pub use codec::{decode_frame, encode_frame, Frame, FrameConfig, CHECKPOINT, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;

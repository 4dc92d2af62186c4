//! Byte-level primitives for the asset protocol.
//!
//! Everything on the wire is little-endian regardless of host order. The
//! [`WireBuffer`] is a positioned cursor that either borrows externally owned
//! bytes (zero-copy reads of a received frame) or owns a growable buffer
//! (building a frame before a single socket write). [`FourCc`] packs the
//! 4-ASCII-character message type tags into a `u32`.

pub mod buffer;
pub mod error;
pub mod fourcc;

pub use buffer::WireBuffer;
pub use error::{Result, WireError};
pub use fourcc::FourCc;

//! Asset protocol connection handling.
//!
//! A [`ProtocolHandler`] owns one socket connection between a running
//! application and the asset agent. It deframes complete messages off the
//! wire, dispatches them through an ordered listener chain (most recently
//! registered first), and offers framed send operations: ping/pong, log
//! lines, commands, chunked file transfer, and arbitrary custom payloads.
//!
//! The whole link is best-effort development tooling: a desynchronized or
//! dropped connection surfaces as a disconnect and the host application
//! keeps running without it.

pub mod error;
pub mod file_transfer;
pub mod handler;
pub mod listener;
pub mod registry;

pub use error::{ProtocolError, Result};
pub use file_transfer::{FileTransferListener, CHUNK_END_CHECKPOINT, FILE_END_CHECKPOINT, MAX_CHUNK_SIZE};
pub use handler::ProtocolHandler;
pub use listener::{CommandListener, ControlListener, MessageListener, ProtocolContext};
pub use registry::ConnectionRegistry;

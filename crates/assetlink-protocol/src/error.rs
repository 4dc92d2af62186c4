/// Errors that can occur in protocol handling.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Wire-buffer error while decoding a frame payload.
    #[error("wire error: {0}")]
    Wire(#[from] assetlink_wire::WireError),

    /// Frame-level error (desync, oversized payload, closed connection).
    #[error("frame error: {0}")]
    Frame(#[from] assetlink_frame::FrameError),

    /// An I/O error occurred on the connection.
    #[error("protocol I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A file transfer message violated the transfer state machine.
    #[error("file transfer violation: {0}")]
    TransferViolation(String),
}

impl ProtocolError {
    /// True when the connection must be dropped: the stream has no reliable
    /// resync point, so framing errors are unrecoverable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ProtocolError::TransferViolation(_))
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

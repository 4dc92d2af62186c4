/// Errors that can occur while reading or writing a wire buffer.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// A read ran past the end of the backing store.
    ///
    /// This indicates the caller validated a frame length incorrectly, not a
    /// malformed peer. It is a precondition violation and there is no
    /// handler-level recovery path.
    #[error("read past end of buffer (wanted {wanted} bytes, {available} available)")]
    ReadPastEnd { wanted: usize, available: usize },

    /// A checkpoint word did not match the expected magic value.
    ///
    /// The stream is desynchronized and the connection must be dropped.
    #[error("checkpoint mismatch (saw {saw:#010x}, expected {expected:#010x})")]
    CheckpointMismatch { saw: u32, expected: u32 },

    /// A write was attempted on a buffer attached to borrowed memory.
    #[error("write attempted on read-only attached buffer")]
    ReadOnly,

    /// A length-prefixed value exceeds what its prefix can represent.
    #[error("value too long for {prefix}-byte length prefix ({len} bytes)")]
    ValueTooLong { prefix: usize, len: usize },
}

pub type Result<T> = std::result::Result<T, WireError>;

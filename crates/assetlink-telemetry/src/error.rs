use assetlink_wire::WireError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TelemetryError>;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error(transparent)]
    Wire(#[from] WireError),

    /// The size accumulator disagrees with the bytes actually written. This
    /// is an internal consistency bug, never a data error.
    #[error("table size mismatch: tracked {tracked} bytes, wrote {written}")]
    SizeMismatch { tracked: usize, written: usize },

    #[error("unknown table type {0:#04x} in telemetry payload")]
    UnknownTableType(u8),

    #[error("tick ended with {open} timer range(s) still open")]
    UnbalancedTick { open: usize },

    #[error("mismatched begin/end timer calls for {0:?}")]
    MismatchedTimer(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("telemetry server: {0}")]
    Server(String),
}

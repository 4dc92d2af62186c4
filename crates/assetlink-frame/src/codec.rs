use assetlink_wire::FourCc;
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: length (4) + checkpoint (4) + type tag (4) = 12 bytes.
pub const HEADER_SIZE: usize = 12;

/// Checkpoint magic embedded at the start of every frame.
pub const CHECKPOINT: u32 = 0xDEADBEEF;

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// A framed protocol message.
#[derive(Debug, Clone)]
pub struct Frame {
    /// The FourCC message type tag.
    pub tag: FourCc,
    /// The message payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(tag: FourCc, payload: impl Into<Bytes>) -> Self {
        Self {
            tag,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌────────────┬─────────────────┬────────────┬──────────────────┐
/// │ Length     │ Checkpoint      │ Tag        │ Payload          │
/// │ (4B LE)    │ (4B LE)         │ (4B LE)    │ (Length-12 bytes)│
/// │ 12+payload │ 0xDEADBEEF      │ FourCC     │                  │
/// └────────────┴─────────────────┴────────────┴──────────────────┘
/// ```
pub fn encode_frame(tag: FourCc, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > u32::MAX as usize - HEADER_SIZE {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize - HEADER_SIZE,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u32_le((HEADER_SIZE + payload.len()) as u32);
    dst.put_u32_le(CHECKPOINT);
    dst.put_u32_le(tag.as_u32());
    dst.put_slice(payload);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet —
/// the caller polls again once more bytes arrive. On success, consumes the
/// frame bytes from the buffer.
///
/// A checkpoint mismatch or an impossible declared length returns
/// [`FrameError::Desync`]: the connection is unrecoverable because there is
/// no reliable resync point in the stream.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None); // Need more data
    }

    let length = read_word(src, 0) as usize;
    let checkpoint = read_word(src, 4);
    let tag = FourCc::from_u32(read_word(src, 8));

    if checkpoint != CHECKPOINT {
        return Err(FrameError::Desync(format!(
            "checkpoint {checkpoint:#010x}, expected {CHECKPOINT:#010x}"
        )));
    }
    if length < HEADER_SIZE {
        return Err(FrameError::Desync(format!(
            "declared frame length {length} is shorter than the header"
        )));
    }

    let payload_len = length - HEADER_SIZE;
    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    if src.len() < length {
        return Ok(None); // Need more data
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(Frame { tag, payload }))
}

fn read_word(src: &BytesMut, offset: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&src[offset..offset + 4]);
    u32::from_le_bytes(word)
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

use bytes::{Bytes, BytesMut};

use crate::error::{Result, WireError};

const INITIAL_WRITE_CAPACITY: usize = 1024;

enum Store<'a> {
    /// Externally owned memory, read-only.
    Borrowed(&'a [u8]),
    /// Exclusively owned growable buffer for frame construction.
    Owned(BytesMut),
}

/// A positioned cursor over a byte store.
///
/// All multi-byte values are little-endian on the wire and converted to host
/// order on access; callers never see wire order. Reads past the end of the
/// backing store are a precondition violation ([`WireError::ReadPastEnd`]),
/// never a silent zero.
pub struct WireBuffer<'a> {
    store: Store<'a>,
    pos: usize,
}

impl WireBuffer<'static> {
    /// Create an empty owned buffer for writing.
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_WRITE_CAPACITY)
    }

    /// Create an owned buffer with explicit initial capacity.
    ///
    /// Appends grow the store by doubling, so building a frame is amortized
    /// O(1) per byte.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            store: Store::Owned(BytesMut::with_capacity(capacity)),
            pos: 0,
        }
    }

    /// Take ownership of existing bytes for reading and appending.
    pub fn from_bytes(bytes: impl Into<BytesMut>) -> Self {
        Self {
            store: Store::Owned(bytes.into()),
            pos: 0,
        }
    }
}

impl Default for WireBuffer<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> WireBuffer<'a> {
    /// Borrow externally owned memory for zero-copy reads, cursor at 0.
    ///
    /// Writes on an attached buffer fail with [`WireError::ReadOnly`].
    pub fn attach(bytes: &'a [u8]) -> Self {
        Self {
            store: Store::Borrowed(bytes),
            pos: 0,
        }
    }

    /// Current cursor position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Move the cursor to an absolute position.
    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// Move the cursor backwards by `n` bytes.
    pub fn rewind(&mut self, n: usize) -> Result<()> {
        if n > self.pos {
            return Err(WireError::ReadPastEnd {
                wanted: n,
                available: self.pos,
            });
        }
        self.pos -= n;
        Ok(())
    }

    /// Total length of the backing store.
    pub fn len(&self) -> usize {
        self.slice().len()
    }

    /// True when the backing store is empty.
    pub fn is_empty(&self) -> bool {
        self.slice().is_empty()
    }

    /// Bytes available for reading at the current cursor.
    pub fn remaining(&self) -> usize {
        self.slice().len().saturating_sub(self.pos)
    }

    /// True when the cursor has consumed the whole store.
    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// The full backing store, regardless of cursor position.
    pub fn as_slice(&self) -> &[u8] {
        self.slice()
    }

    /// Consume the buffer and return its contents.
    pub fn into_bytes(self) -> Bytes {
        match self.store {
            Store::Borrowed(bytes) => Bytes::copy_from_slice(bytes),
            Store::Owned(buf) => buf.freeze(),
        }
    }

    fn slice(&self) -> &[u8] {
        match &self.store {
            Store::Borrowed(bytes) => bytes,
            Store::Owned(buf) => buf.as_ref(),
        }
    }

    fn take(&mut self, n: usize) -> Result<&[u8]> {
        let available = self.remaining();
        if n > available {
            return Err(WireError::ReadPastEnd {
                wanted: n,
                available,
            });
        }
        let start = self.pos;
        self.pos += n;
        Ok(&self.slice()[start..start + n])
    }

    fn put(&mut self, bytes: &[u8]) -> Result<()> {
        let pos = self.pos;
        match &mut self.store {
            Store::Borrowed(_) => Err(WireError::ReadOnly),
            Store::Owned(buf) => {
                let end = pos + bytes.len();
                if pos == buf.len() {
                    buf.extend_from_slice(bytes);
                } else {
                    if end > buf.len() {
                        buf.resize(end, 0);
                    }
                    buf[pos..end].copy_from_slice(bytes);
                }
                self.pos = end;
                Ok(())
            }
        }
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let mut b = [0u8; 2];
        b.copy_from_slice(self.take(2)?);
        Ok(u16::from_le_bytes(b))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let mut b = [0u8; 4];
        b.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(b))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let mut b = [0u8; 8];
        b.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(b))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(self.read_u64()? as i64)
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.put(&[value])
    }

    pub fn write_i8(&mut self, value: i8) -> Result<()> {
        self.write_u8(value as u8)
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.put(&value.to_le_bytes())
    }

    pub fn write_i16(&mut self, value: i16) -> Result<()> {
        self.write_u16(value as u16)
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.put(&value.to_le_bytes())
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        self.write_u32(value as u32)
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.put(&value.to_le_bytes())
    }

    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        self.write_u64(value as u64)
    }

    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        self.write_u32(value.to_bits())
    }

    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        self.write_u64(value.to_bits())
    }

    /// Read `n` raw bytes at the cursor.
    pub fn read_exact(&mut self, n: usize) -> Result<&[u8]> {
        self.take(n)
    }

    /// Write raw bytes at the cursor.
    pub fn write_exact(&mut self, bytes: &[u8]) -> Result<()> {
        self.put(bytes)
    }

    /// Read a u32-length-prefixed byte blob.
    pub fn read_blob(&mut self) -> Result<Bytes> {
        let len = self.read_u32()? as usize;
        Ok(Bytes::copy_from_slice(self.take(len)?))
    }

    /// Write a u32-length-prefixed byte blob.
    pub fn write_blob(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > u32::MAX as usize {
            return Err(WireError::ValueTooLong {
                prefix: 4,
                len: bytes.len(),
            });
        }
        self.write_u32(bytes.len() as u32)?;
        self.put(bytes)
    }

    /// Read a u32-length-prefixed string.
    ///
    /// Strings are binary-safe on the wire (explicit length, not
    /// NUL-terminated); one trailing NUL is stripped on decode for callers
    /// that framed a C string.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        let mut bytes = self.take(len)?;
        if bytes.last() == Some(&0) {
            bytes = &bytes[..bytes.len() - 1];
        }
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Write a u32-length-prefixed string without a NUL.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_blob(value.as_bytes())
    }

    /// Read a u16-length-prefixed string (the compact telemetry key form).
    pub fn read_utf(&mut self) -> Result<String> {
        let len = self.read_u16()? as usize;
        let bytes = self.take(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Write a u16-length-prefixed string.
    pub fn write_utf(&mut self, value: &str) -> Result<()> {
        let len = value.len();
        if len >= u16::MAX as usize {
            return Err(WireError::ValueTooLong { prefix: 2, len });
        }
        self.write_u16(len as u16)?;
        self.put(value.as_bytes())
    }

    /// Write a checkpoint word. Always succeeds on an owned buffer.
    pub fn write_checkpoint(&mut self, value: u32) -> Result<()> {
        self.write_u32(value)
    }

    /// Read a checkpoint word and compare it against `expected`.
    ///
    /// A mismatch means the stream is desynchronized and is fatal to the
    /// current frame.
    pub fn read_checkpoint(&mut self, expected: u32) -> Result<()> {
        let saw = self.read_u32()?;
        if saw != expected {
            return Err(WireError::CheckpointMismatch { saw, expected });
        }
        Ok(())
    }
}

use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use tracing::trace;

use crate::codec::{decode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads internally — callers always get complete frames.
/// On a non-blocking stream, [`FrameReader::poll_frame`] implements the
/// peek-then-commit discipline of the poll loop: a short read is deferred to
/// the next tick instead of being treated as an error.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Try to read the next complete frame without blocking.
    ///
    /// Returns `Ok(None)` when not enough bytes are buffered yet — a
    /// backpressure condition, not an error; poll again next tick. Keeps
    /// draining the transport while it has data, so one poll can surface a
    /// frame that arrived in several segments.
    pub fn poll_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = decode_frame(&mut self.buf, self.config.max_payload_size)? {
                trace!(tag = %frame.tag, payload_len = frame.payload.len(), "decoded frame");
                return Ok(Some(frame));
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(None),
                Err(err) if err.kind() == ErrorKind::TimedOut => return Ok(None),
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = decode_frame(&mut self.buf, self.config.max_payload_size)? {
                return Ok(frame);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Bytes buffered but not yet consumed as a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum payload size for subsequent frame decoding.
    pub fn set_max_payload_size(&mut self, max_payload_size: usize) {
        self.config.max_payload_size = max_payload_size;
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::{BufMut, BytesMut};

    use super::*;
    use crate::codec::{encode_frame, CHECKPOINT, HEADER_SIZE};
    use crate::tags;

    #[test]
    fn read_single_frame() {
        let mut wire = BytesMut::new();
        encode_frame(tags::LOG1, b"hello", &mut wire).unwrap();

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));
        let frame = reader.read_frame().unwrap();

        assert_eq!(frame.tag, tags::LOG1);
        assert_eq!(frame.payload.as_ref(), b"hello");
    }

    #[test]
    fn read_multiple_frames() {
        let mut wire = BytesMut::new();
        encode_frame(tags::PING, b"", &mut wire).unwrap();
        encode_frame(tags::LOG1, b"two", &mut wire).unwrap();
        encode_frame(tags::CMD1, b"three", &mut wire).unwrap();

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));

        assert_eq!(reader.read_frame().unwrap().tag, tags::PING);
        assert_eq!(reader.read_frame().unwrap().payload.as_ref(), b"two");
        assert_eq!(reader.read_frame().unwrap().payload.as_ref(), b"three");
    }

    #[test]
    fn read_frame_with_large_payload() {
        let payload = vec![0xAB; 64 * 1024];
        let mut wire = BytesMut::new();
        encode_frame(tags::FCHK, &payload, &mut wire).unwrap();

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));
        let frame = reader.read_frame().unwrap();

        assert_eq!(frame.tag, tags::FCHK);
        assert_eq!(frame.payload.as_ref(), payload.as_slice());
    }

    #[test]
    fn partial_read_handling() {
        let mut wire = BytesMut::new();
        encode_frame(tags::CMD1, b"slow", &mut wire).unwrap();

        let byte_reader = ByteByByteReader {
            bytes: wire.to_vec(),
            pos: 0,
        };
        let mut reader = FrameReader::new(byte_reader);

        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.tag, tags::CMD1);
        assert_eq!(frame.payload.as_ref(), b"slow");
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn connection_closed_mid_frame() {
        let mut partial = BytesMut::new();
        partial.put_u32_le((HEADER_SIZE + 16) as u32);
        partial.put_u32_le(CHECKPOINT);
        partial.put_u32_le(tags::LOG1.as_u32());
        partial.put_slice(b"only-part");

        let mut reader = FrameReader::new(Cursor::new(partial.to_vec()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn corrupted_checkpoint_in_stream() {
        let mut bytes = BytesMut::new();
        bytes.put_u32_le(HEADER_SIZE as u32);
        bytes.put_u32_le(0xCAFEBABE);
        bytes.put_u32_le(tags::PING.as_u32());

        let mut reader = FrameReader::new(Cursor::new(bytes.to_vec()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::Desync(_)));
    }

    #[test]
    fn oversized_frame_in_stream() {
        let mut wire = BytesMut::new();
        wire.put_u32_le((HEADER_SIZE + 1024) as u32);
        wire.put_u32_le(CHECKPOINT);
        wire.put_u32_le(tags::FILE.as_u32());

        let cfg = FrameConfig {
            max_payload_size: 16,
        };
        let mut reader = FrameReader::with_config(Cursor::new(wire.to_vec()), cfg);
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
    }

    #[test]
    fn poll_frame_defers_on_would_block() {
        let mut wire = BytesMut::new();
        encode_frame(tags::PONG, b"", &mut wire).unwrap();
        let wire = wire.to_vec();

        // First part of the header arrives, then the transport would block,
        // then the rest of the frame shows up: the poll loop in miniature.
        let transport = SegmentedTransport::new(vec![
            Step::Data(wire[..6].to_vec()),
            Step::Block,
            Step::Data(wire[6..].to_vec()),
            Step::Block,
        ]);
        let mut reader = FrameReader::new(transport);

        assert!(reader.poll_frame().unwrap().is_none());
        let frame = reader.poll_frame().unwrap().expect("frame should complete");
        assert_eq!(frame.tag, tags::PONG);
    }

    #[test]
    fn poll_frame_surfaces_complete_frame_immediately() {
        let mut wire = BytesMut::new();
        encode_frame(tags::LOG1, b"ready", &mut wire).unwrap();

        let transport =
            SegmentedTransport::new(vec![Step::Data(wire.to_vec()), Step::Block, Step::Block]);
        let mut reader = FrameReader::new(transport);

        let frame = reader.poll_frame().unwrap().expect("frame should be ready");
        assert_eq!(frame.payload.as_ref(), b"ready");
        assert!(reader.poll_frame().unwrap().is_none());
    }

    #[test]
    fn interrupted_read_retries() {
        let mut wire = BytesMut::new();
        encode_frame(tags::LOG1, b"ok", &mut wire).unwrap();

        let reader = InterruptedThenData {
            state: 0,
            bytes: wire.to_vec(),
            pos: 0,
        };
        let mut framed = FrameReader::new(reader);
        let frame = framed.read_frame().unwrap();

        assert_eq!(frame.tag, tags::LOG1);
        assert_eq!(frame.payload.as_ref(), b"ok");
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    enum Step {
        Data(Vec<u8>),
        Block,
    }

    /// Scripted transport: serves data segments and `WouldBlock` pauses in
    /// order, the way a non-blocking socket behaves while the peer is
    /// mid-write.
    struct SegmentedTransport {
        steps: std::collections::VecDeque<Step>,
    }

    impl SegmentedTransport {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: steps.into(),
            }
        }
    }

    impl Read for SegmentedTransport {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.steps.front_mut() {
                None => Ok(0),
                Some(Step::Block) => {
                    self.steps.pop_front();
                    Err(std::io::Error::from(ErrorKind::WouldBlock))
                }
                Some(Step::Data(segment)) => {
                    let n = segment.len().min(buf.len());
                    buf[..n].copy_from_slice(&segment[..n]);
                    segment.drain(..n);
                    if segment.is_empty() {
                        self.steps.pop_front();
                    }
                    Ok(n)
                }
            }
        }
    }

    struct InterruptedThenData {
        state: u8,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.state == 0 {
                self.state = 1;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            if self.pos >= self.bytes.len() {
                return Ok(0);
            }
            let remaining = self.bytes.len() - self.pos;
            let n = remaining.min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }
}

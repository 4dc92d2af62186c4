use assetlink_frame::tags;
use assetlink_wire::{FourCc, WireBuffer};
use bytes::Bytes;
use tracing::{debug, error, info};

use crate::error::{ProtocolError, Result};
use crate::listener::{MessageListener, ProtocolContext};

/// Largest content slice carried by a single `FCHK` frame.
pub const MAX_CHUNK_SIZE: usize = 8 * 1024;

/// Trailing checkpoint of a `FILE` header payload.
pub const FILE_END_CHECKPOINT: u32 = 0xDEAD_BEE3;

/// Trailing checkpoint of an `FCHK` chunk payload.
pub const CHUNK_END_CHECKPOINT: u32 = 0xDEAD_BEE2;

struct PendingFile {
    path: String,
    contents: Vec<u8>,
    length: usize,
    received: usize,
}

/// Reassembles chunked file transfers and hands completed files to a
/// delivery callback.
///
/// One transfer is in flight per connection at a time: a `FILE` header
/// announces path and total length, then `FCHK` frames carry content at
/// explicit offsets. Delivery fires once the received byte count reaches
/// the announced length.
pub struct FileTransferListener {
    pending: Option<PendingFile>,
    pending_files: u32,
    deliver: Box<dyn FnMut(&str, Bytes) + Send>,
}

impl FileTransferListener {
    pub fn new(deliver: impl FnMut(&str, Bytes) + Send + 'static) -> Self {
        Self {
            pending: None,
            pending_files: 0,
            deliver: Box::new(deliver),
        }
    }

    /// Sender-reported count of files still queued behind the current one.
    pub fn pending_files(&self) -> u32 {
        self.pending_files
    }

    /// Path and progress of the in-flight transfer, if any.
    pub fn in_flight(&self) -> Option<(&str, usize, usize)> {
        self.pending
            .as_ref()
            .map(|p| (p.path.as_str(), p.received, p.length))
    }

    fn handle_header(&mut self, payload: &mut WireBuffer<'_>) -> Result<()> {
        self.pending_files = payload.read_u32()?;
        let path = payload.read_string()?;
        let length = payload.read_u32()? as usize;
        payload.read_checkpoint(FILE_END_CHECKPOINT)?;

        if let Some(stale) = self.pending.take() {
            error!(
                path = %stale.path,
                received = stale.received,
                expected = stale.length,
                "new file header arrived mid-transfer, dropping partial file"
            );
        }

        debug!(path = %path, bytes = length, pending = self.pending_files, "file transfer started");

        if length == 0 {
            (self.deliver)(&path, Bytes::new());
            return Ok(());
        }

        self.pending = Some(PendingFile {
            path,
            contents: vec![0; length],
            length,
            received: 0,
        });
        Ok(())
    }

    fn handle_chunk(&mut self, payload: &mut WireBuffer<'_>) -> Result<()> {
        self.pending_files = payload.read_u32()?;
        let offset = payload.read_u32()? as usize;
        let chunk = payload.read_blob()?;
        payload.read_checkpoint(CHUNK_END_CHECKPOINT)?;

        let Some(pending) = self.pending.as_mut() else {
            return Err(ProtocolError::TransferViolation(
                "content chunk arrived with no file header in flight".to_string(),
            ));
        };

        let end = offset
            .checked_add(chunk.len())
            .filter(|end| *end <= pending.length)
            .ok_or_else(|| {
                ProtocolError::TransferViolation(format!(
                    "chunk [{offset}, {}) overruns announced length {} for {}",
                    offset + chunk.len(),
                    pending.length,
                    pending.path
                ))
            })?;

        pending.contents[offset..end].copy_from_slice(chunk.as_ref());
        pending.received += chunk.len();

        if pending.received >= pending.length {
            let done = self
                .pending
                .take()
                .ok_or_else(|| ProtocolError::TransferViolation("transfer state lost".to_string()))?;
            info!(path = %done.path, bytes = done.length, "file transfer complete");
            (self.deliver)(&done.path, Bytes::from(done.contents));
        }
        Ok(())
    }
}

impl MessageListener for FileTransferListener {
    fn handle_message(
        &mut self,
        tag: FourCc,
        _ctx: &mut dyn ProtocolContext,
        payload: &mut WireBuffer<'_>,
    ) -> Result<bool> {
        if tag == tags::FILE {
            self.handle_header(payload)?;
            Ok(true)
        } else if tag == tags::FCHK {
            self.handle_chunk(payload)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::listener::ProtocolContext;

    struct NullContext;
    impl ProtocolContext for NullContext {
        fn connection_id(&self) -> u32 {
            1000
        }
        fn send_frame(&mut self, _tag: FourCc, _payload: &[u8]) -> Result<()> {
            Ok(())
        }
    }

    type Delivered = Arc<Mutex<Vec<(String, Bytes)>>>;

    fn listener_with_log() -> (FileTransferListener, Delivered) {
        let delivered: Delivered = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&delivered);
        let listener = FileTransferListener::new(move |path, contents| {
            log.lock()
                .expect("lock should not be poisoned")
                .push((path.to_string(), contents));
        });
        (listener, delivered)
    }

    fn header_payload(pending: u32, path: &str, length: u32) -> Vec<u8> {
        let mut buf = WireBuffer::new();
        buf.write_u32(pending).unwrap();
        let mut path_nul = path.as_bytes().to_vec();
        path_nul.push(0);
        buf.write_blob(&path_nul).unwrap();
        buf.write_u32(length).unwrap();
        buf.write_checkpoint(FILE_END_CHECKPOINT).unwrap();
        buf.into_bytes().to_vec()
    }

    fn chunk_payload(pending: u32, offset: u32, chunk: &[u8]) -> Vec<u8> {
        let mut buf = WireBuffer::new();
        buf.write_u32(pending).unwrap();
        buf.write_u32(offset).unwrap();
        buf.write_blob(chunk).unwrap();
        buf.write_checkpoint(CHUNK_END_CHECKPOINT).unwrap();
        buf.into_bytes().to_vec()
    }

    fn feed(listener: &mut FileTransferListener, tag: FourCc, payload: &[u8]) -> Result<bool> {
        let mut buf = WireBuffer::attach(payload);
        listener.handle_message(tag, &mut NullContext, &mut buf)
    }

    #[test]
    fn reassembles_chunks_by_offset() {
        let (mut listener, delivered) = listener_with_log();
        let contents: Vec<u8> = (0..20000u32).map(|i| (i % 251) as u8).collect();

        feed(
            &mut listener,
            tags::FILE,
            &header_payload(1, "assets/big.bin", contents.len() as u32),
        )
        .unwrap();
        assert_eq!(
            listener.in_flight(),
            Some(("assets/big.bin", 0, contents.len()))
        );

        let mut offset = 0;
        while offset < contents.len() {
            let end = (offset + MAX_CHUNK_SIZE).min(contents.len());
            feed(
                &mut listener,
                tags::FCHK,
                &chunk_payload(1, offset as u32, &contents[offset..end]),
            )
            .unwrap();
            offset = end;
        }

        let delivered = delivered.lock().expect("lock should not be poisoned");
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0, "assets/big.bin");
        assert_eq!(delivered[0].1.as_ref(), contents.as_slice());
        assert!(listener.in_flight().is_none());
    }

    #[test]
    fn zero_length_file_delivers_immediately() {
        let (mut listener, delivered) = listener_with_log();
        feed(
            &mut listener,
            tags::FILE,
            &header_payload(0, "assets/empty.txt", 0),
        )
        .unwrap();

        let delivered = delivered.lock().expect("lock should not be poisoned");
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0, "assets/empty.txt");
        assert!(delivered[0].1.is_empty());
        assert!(listener.in_flight().is_none());
    }

    #[test]
    fn new_header_drops_partial_transfer() {
        let (mut listener, delivered) = listener_with_log();
        feed(&mut listener, tags::FILE, &header_payload(2, "first.bin", 100)).unwrap();
        feed(&mut listener, tags::FCHK, &chunk_payload(2, 0, &[1u8; 40])).unwrap();

        feed(&mut listener, tags::FILE, &header_payload(1, "second.bin", 4)).unwrap();
        feed(&mut listener, tags::FCHK, &chunk_payload(1, 0, &[9, 9, 9, 9])).unwrap();

        let delivered = delivered.lock().expect("lock should not be poisoned");
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0, "second.bin");
    }

    #[test]
    fn chunk_without_header_is_a_violation() {
        let (mut listener, _) = listener_with_log();
        let err = feed(&mut listener, tags::FCHK, &chunk_payload(0, 0, &[1, 2, 3])).unwrap_err();
        assert!(matches!(err, ProtocolError::TransferViolation(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn chunk_past_announced_length_is_a_violation() {
        let (mut listener, delivered) = listener_with_log();
        feed(&mut listener, tags::FILE, &header_payload(1, "short.bin", 8)).unwrap();
        let err = feed(&mut listener, tags::FCHK, &chunk_payload(1, 4, &[0u8; 8])).unwrap_err();
        assert!(matches!(err, ProtocolError::TransferViolation(_)));
        assert!(delivered.lock().expect("lock should not be poisoned").is_empty());
    }

    #[test]
    fn ignores_unrelated_tags() {
        let (mut listener, _) = listener_with_log();
        assert!(!feed(&mut listener, tags::PING, &[]).unwrap());
    }

    #[test]
    fn tracks_pending_file_count_from_sender() {
        let (mut listener, _) = listener_with_log();
        feed(&mut listener, tags::FILE, &header_payload(3, "a.bin", 2)).unwrap();
        assert_eq!(listener.pending_files(), 3);
        feed(&mut listener, tags::FCHK, &chunk_payload(3, 0, &[1, 2])).unwrap();
        assert_eq!(listener.pending_files(), 3);
    }
}

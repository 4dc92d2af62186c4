use std::io::{Read, Write};
use std::net::TcpStream;

use assetlink_frame::{tags, Frame, FrameReader, FrameWriter};
use assetlink_wire::{FourCc, WireBuffer};
use tracing::{debug, warn};

use crate::error::{ProtocolError, Result};
use crate::file_transfer::{CHUNK_END_CHECKPOINT, FILE_END_CHECKPOINT, MAX_CHUNK_SIZE};
use crate::listener::{ControlListener, MessageListener, ProtocolContext};
use crate::registry::ConnectionRegistry;

/// Owns one asset protocol connection.
///
/// `process()` is driven from a single-threaded poll loop, once per
/// application tick or server poll cycle; nothing here is shared across
/// threads. The read and write halves are split (`try_clone` for sockets)
/// so listeners can reply while a received payload is still borrowed.
pub struct ProtocolHandler<R, W> {
    reader: FrameReader<R>,
    writer: FrameWriter<W>,
    listeners: Vec<Box<dyn MessageListener>>,
    connection_id: u32,
    peer: String,
}

struct HandlerContext<'a, W> {
    writer: &'a mut FrameWriter<W>,
    connection_id: u32,
}

impl<W: Write> ProtocolContext for HandlerContext<'_, W> {
    fn connection_id(&self) -> u32 {
        self.connection_id
    }

    fn send_frame(&mut self, tag: FourCc, payload: &[u8]) -> Result<()> {
        self.writer.send(tag, payload)?;
        Ok(())
    }
}

impl ProtocolHandler<TcpStream, TcpStream> {
    /// Wrap a connected TCP stream (inbound or outbound).
    ///
    /// The stream is switched to non-blocking so `process()` can defer when
    /// no complete frame has arrived yet.
    pub fn from_tcp(stream: TcpStream, registry: &ConnectionRegistry) -> Result<Self> {
        stream.set_nonblocking(true)?;
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let read_half = stream.try_clone()?;
        Ok(Self::from_parts(
            read_half,
            stream,
            registry.next_connection_id(),
            peer,
        ))
    }
}

impl<R: Read, W: Write> ProtocolHandler<R, W> {
    /// Build a handler from explicit read/write halves.
    ///
    /// The built-in control listener (`PING`/`PONG`/`LOG1`) is registered
    /// first so later registrations can override it.
    pub fn from_parts(reader: R, writer: W, connection_id: u32, peer: impl Into<String>) -> Self {
        let mut handler = Self {
            reader: FrameReader::new(reader),
            writer: FrameWriter::new(writer),
            listeners: Vec::new(),
            connection_id,
            peer: peer.into(),
        };
        handler.register_listener(Box::new(ControlListener));
        handler
    }

    /// The id assigned at construction; unique for the process lifetime.
    pub fn connection_id(&self) -> u32 {
        self.connection_id
    }

    /// Peer address string for diagnostics.
    pub fn description(&self) -> &str {
        &self.peer
    }

    /// Register a listener at the front of the chain.
    ///
    /// Dispatch is LIFO: the most recently registered listener is consulted
    /// first, so specialized listeners override earlier ones without
    /// modifying them.
    pub fn register_listener(&mut self, listener: Box<dyn MessageListener>) {
        self.listeners.push(listener);
    }

    /// Poll for one frame and dispatch it.
    ///
    /// Returns `Ok(false)` when no complete frame is buffered yet (poll
    /// again next tick). A frame nobody claims is logged and discarded —
    /// its length prefix already consumed it, so the stream stays aligned.
    /// Frame-level errors (desync, oversize) are fatal; the caller drops
    /// the connection.
    pub fn process(&mut self) -> Result<bool> {
        let Some(frame) = self.reader.poll_frame()? else {
            return Ok(false);
        };
        self.dispatch(frame)?;
        Ok(true)
    }

    fn dispatch(&mut self, frame: Frame) -> Result<()> {
        let mut payload = WireBuffer::attach(frame.payload.as_ref());
        let mut ctx = HandlerContext {
            writer: &mut self.writer,
            connection_id: self.connection_id,
        };

        let mut handled = false;
        let mut outcome = Ok(());
        for listener in self.listeners.iter_mut().rev() {
            match listener.handle_message(frame.tag, &mut ctx, &mut payload) {
                Ok(true) => {
                    handled = true;
                    break;
                }
                Ok(false) => continue,
                Err(err) => {
                    outcome = Err(err);
                    break;
                }
            }
        }
        outcome?;

        if !handled {
            warn!(
                connection = self.connection_id,
                tag = %frame.tag,
                bytes = frame.payload.len(),
                "unhandled message tag, discarding frame"
            );
        }
        Ok(())
    }

    /// Send an empty `PING` frame.
    pub fn send_ping(&mut self) -> Result<()> {
        self.writer.send(tags::PING, &[])?;
        Ok(())
    }

    /// Send an empty `PONG` frame.
    pub fn send_pong(&mut self) -> Result<()> {
        self.writer.send(tags::PONG, &[])?;
        Ok(())
    }

    /// Send one log line as a `LOG1` frame.
    pub fn send_log(&mut self, line: &str) -> Result<()> {
        self.send_string(tags::LOG1, line)
    }

    /// Send one command string as a `CMD1` frame.
    pub fn send_command(&mut self, command: &str) -> Result<()> {
        self.send_string(tags::CMD1, command)
    }

    fn send_string(&mut self, tag: FourCc, value: &str) -> Result<()> {
        let mut payload = WireBuffer::new();
        payload.write_string(value)?;
        self.writer.send(tag, payload.as_slice())?;
        Ok(())
    }

    /// Send an arbitrary pre-encoded payload under `tag`.
    pub fn send_custom(&mut self, tag: FourCc, payload: &[u8]) -> Result<()> {
        self.writer.send(tag, payload)?;
        Ok(())
    }

    /// Stream a file to the peer: one `FILE` header frame, then content in
    /// bounded `FCHK` chunks.
    ///
    /// The header carries the total content length so the receiver can
    /// preallocate before the first chunk arrives and report progress.
    /// Chunks are bounded at [`MAX_CHUNK_SIZE`] because many transports cap
    /// single-write sizes.
    pub fn send_file(&mut self, path: &str, contents: &[u8], pending_files: u32) -> Result<()> {
        if contents.len() > u32::MAX as usize {
            return Err(ProtocolError::TransferViolation(format!(
                "file {path} too large for a u32 content length ({} bytes)",
                contents.len()
            )));
        }

        debug!(
            connection = self.connection_id,
            path,
            bytes = contents.len(),
            pending_files,
            "sending file"
        );

        let mut header = WireBuffer::new();
        header.write_u32(pending_files)?;
        let mut path_nul = Vec::with_capacity(path.len() + 1);
        path_nul.extend_from_slice(path.as_bytes());
        path_nul.push(0);
        header.write_blob(&path_nul)?;
        header.write_u32(contents.len() as u32)?;
        header.write_checkpoint(FILE_END_CHECKPOINT)?;
        self.writer.send(tags::FILE, header.as_slice())?;

        let mut offset = 0usize;
        while offset < contents.len() {
            let chunk_len = MAX_CHUNK_SIZE.min(contents.len() - offset);
            let mut chunk = WireBuffer::with_capacity(chunk_len + 16);
            chunk.write_u32(pending_files)?;
            chunk.write_u32(offset as u32)?;
            chunk.write_blob(&contents[offset..offset + chunk_len])?;
            chunk.write_checkpoint(CHUNK_END_CHECKPOINT)?;
            self.writer.send(tags::FCHK, chunk.as_slice())?;
            offset += chunk_len;
        }

        Ok(())
    }

    /// Tear the handler apart, handing back the frame reader and writer.
    pub fn into_parts(self) -> (FrameReader<R>, FrameWriter<W>) {
        (self.reader, self.writer)
    }
}

use assetlink_frame::tags;
use assetlink_wire::{FourCc, WireBuffer};
use tracing::{debug, info};

use crate::error::Result;

/// The handler-side surface a listener may talk back through while a
/// message is being dispatched.
pub trait ProtocolContext {
    /// The id of the connection the message arrived on.
    fn connection_id(&self) -> u32;

    /// Send a complete frame to the peer.
    fn send_frame(&mut self, tag: FourCc, payload: &[u8]) -> Result<()>;
}

/// A pluggable message handler in a [`ProtocolHandler`]'s chain.
///
/// [`ProtocolHandler`]: crate::ProtocolHandler
pub trait MessageListener: Send {
    /// Handle one decoded message.
    ///
    /// Return `true` exactly when the listener consumed the semantic meaning
    /// of `tag`; the walk stops there. Return `false` to pass the message to
    /// the next (older) listener. A listener must only read `payload` for
    /// tags it claims — the cursor is shared across the walk.
    fn handle_message(
        &mut self,
        tag: FourCc,
        ctx: &mut dyn ProtocolContext,
        payload: &mut WireBuffer<'_>,
    ) -> Result<bool>;
}

/// The built-in control listener every handler starts with.
///
/// Registered first, so it sits at the bottom of the LIFO chain and any
/// later listener can override it without modifying it.
pub struct ControlListener;

impl MessageListener for ControlListener {
    fn handle_message(
        &mut self,
        tag: FourCc,
        ctx: &mut dyn ProtocolContext,
        payload: &mut WireBuffer<'_>,
    ) -> Result<bool> {
        match tag {
            t if t == tags::PING => {
                debug!(connection = ctx.connection_id(), "ping, replying pong");
                ctx.send_frame(tags::PONG, &[])?;
                Ok(true)
            }
            // No reply to a pong; replying would start a ping-pong loop.
            t if t == tags::PONG => {
                debug!(connection = ctx.connection_id(), "pong");
                Ok(true)
            }
            t if t == tags::LOG1 => {
                let mut line = payload.read_string()?;
                if line.ends_with('\n') {
                    line.pop();
                }
                info!(connection = ctx.connection_id(), remote = true, "{line}");
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Forwards `CMD1` command strings to a registered callback.
pub struct CommandListener {
    callback: Box<dyn FnMut(&str) + Send>,
}

impl CommandListener {
    pub fn new(callback: impl FnMut(&str) + Send + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }
}

impl MessageListener for CommandListener {
    fn handle_message(
        &mut self,
        tag: FourCc,
        _ctx: &mut dyn ProtocolContext,
        payload: &mut WireBuffer<'_>,
    ) -> Result<bool> {
        if tag != tags::CMD1 {
            return Ok(false);
        }
        let command = payload.read_string()?;
        (self.callback)(&command);
        Ok(true)
    }
}

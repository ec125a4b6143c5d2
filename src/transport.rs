//! Transport seam.
//!
//! The encrypted transport, its cryptographic handshake and the raw
//! capability advertisement live outside this crate. Sessions only need a
//! way to push a (wire code, payload) frame; framing, encryption and the
//! inbound event stream belong to the collaborator that owns the socket.

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{WireError, WireResult};

/// Outbound half of the transport collaborator.
pub trait Transport {
    /// Send a frame on the already-secured channel. Fails with
    /// [`WireError::NotWritable`] when the connection is gone.
    fn send_raw(&mut self, code: u64, payload: Bytes) -> WireResult<()>;
}

/// Channel-backed transport: frames land on the paired receiver in send
/// order. The receiver side plays the inbound event stream of the peer.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<(u64, Bytes)>,
}

impl ChannelTransport {
    pub fn new(tx: mpsc::UnboundedSender<(u64, Bytes)>) -> Self {
        Self { tx }
    }
}

impl Transport for ChannelTransport {
    fn send_raw(&mut self, code: u64, payload: Bytes) -> WireResult<()> {
        self.tx
            .send((code, payload))
            .map_err(|_| WireError::NotWritable)
    }
}

/// Inbound frame stream paired with a [`ChannelTransport`].
pub type FrameReceiver = mpsc::UnboundedReceiver<(u64, Bytes)>;

/// Build two transports wired back-to-back: frames sent on one side arrive
/// on the other side's receiver, in order.
pub fn duplex() -> ((ChannelTransport, FrameReceiver), (ChannelTransport, FrameReceiver)) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    (
        (ChannelTransport::new(a_tx), a_rx),
        (ChannelTransport::new(b_tx), b_rx),
    )
}

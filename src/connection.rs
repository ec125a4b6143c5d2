//! Per-connection session set.
//!
//! A `Connection` owns the transport's outbound half, the offset table
//! computed from the negotiated capability list, and one session per
//! negotiated capability. It routes inbound frames to the owning session by
//! offset range and forwards peer-fault errors to the connection error
//! channel; caller-misuse errors are returned synchronously and never touch
//! the channel.

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::capability::{allocate, Capability, OffsetTable};
use crate::config::ConnectionConfig;
use crate::error::{WireError, WireResult};
use crate::session::Session;
use crate::status::StatusMessage;
use crate::transport::Transport;

/// Sending half of the connection error channel. Fatal peer-behavior errors
/// land here; the collaborator owning the socket is expected to tear the
/// connection down on receipt.
pub type ErrorSender = mpsc::UnboundedSender<WireError>;

/// The wire sub-protocol state for one peer connection.
pub struct Connection<T: Transport> {
    transport: T,
    table: OffsetTable,
    sessions: Vec<Session>,
    error_tx: ErrorSender,
    max_payload: usize,
    closed: bool,
}

impl<T: Transport> Connection<T> {
    /// Build the session set for a negotiated capability list. Both peers
    /// call this with the identical list the transport negotiation
    /// produced, so they derive the same offset table independently.
    pub fn new(
        transport: T,
        negotiated: &[Capability],
        config: ConnectionConfig,
        error_tx: ErrorSender,
    ) -> Self {
        let table = allocate(negotiated);
        let sessions = table
            .entries()
            .iter()
            .map(|e| Session::new(e.capability, e.offset, &config))
            .collect();
        Self {
            transport,
            table,
            sessions,
            error_tx,
            max_payload: config.max_payload,
            closed: false,
        }
    }

    /// The connection's offset table.
    pub fn table(&self) -> &OffsetTable {
        &self.table
    }

    /// The session for a capability name, if negotiated.
    pub fn session(&self, name: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.capability().name() == name)
    }

    /// The negotiated version for a capability name.
    pub fn version(&self, name: &str) -> Option<u32> {
        self.session(name).map(|s| s.version())
    }

    /// The peer's handshake record for a capability name, once received.
    pub fn peer_status(&self, name: &str) -> Option<&StatusMessage> {
        self.session(name).and_then(|s| s.peer_status())
    }

    /// Whether the named session completed its status exchange.
    pub fn is_confirmed(&self, name: &str) -> bool {
        self.session(name)
            .map(|s| s.state().is_confirmed())
            .unwrap_or(false)
    }

    /// Register an ordinary-message listener on the named session.
    pub fn on_message<F>(&mut self, name: &str, listener: F) -> WireResult<()>
    where
        F: FnMut(u64, &Bytes) + Send + 'static,
    {
        let idx = self.index_of(name)?;
        self.sessions[idx].on_message(listener);
        Ok(())
    }

    /// Register a one-shot confirmation listener on the named session.
    pub fn once_confirmed<F>(&mut self, name: &str, listener: F) -> WireResult<()>
    where
        F: FnOnce(&StatusMessage) + Send + 'static,
    {
        let idx = self.index_of(name)?;
        self.sessions[idx].once_confirmed(listener);
        Ok(())
    }

    /// Send the local handshake record on the named session.
    ///
    /// A validation mismatch triggered here (the peer's status arrived
    /// first) is the peer's fault: it lands on the error channel and this
    /// call still returns `Ok`.
    pub fn send_status(&mut self, name: &str, status: StatusMessage) -> WireResult<()> {
        if self.closed {
            return Err(WireError::Closed);
        }
        let idx = self.index_of(name)?;
        match self.sessions[idx].send_status(&mut self.transport, status) {
            Err(e) if e.is_peer_fault() => {
                self.report(e);
                Ok(())
            }
            other => other,
        }
    }

    /// Send an ordinary message on the named session.
    pub fn send_message(&mut self, name: &str, local_code: u64, payload: Bytes) -> WireResult<()> {
        if self.closed {
            return Err(WireError::Closed);
        }
        let idx = self.index_of(name)?;
        self.sessions[idx].send_message(&mut self.transport, local_code, payload)
    }

    /// Process one inbound frame from the transport's event stream.
    ///
    /// Frames are expected in receipt order. Every failure on this path is
    /// a protocol violation by the peer and goes to the error channel.
    pub fn handle_inbound(&mut self, code: u64, payload: Bytes) {
        if self.closed {
            tracing::debug!(code, "Dropping inbound frame on closed connection");
            return;
        }

        if payload.len() > self.max_payload {
            self.report(WireError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_payload,
            });
            return;
        }

        let Some((capability, local_code)) = self.table.resolve(code) else {
            tracing::warn!(code, "Inbound code outside every negotiated range");
            self.report(WireError::UnknownCode(code));
            return;
        };

        let Some(idx) = self
            .sessions
            .iter()
            .position(|s| s.capability() == capability)
        else {
            return;
        };

        if let Err(e) = self.sessions[idx].handle_frame(local_code, payload) {
            self.report(e);
        }
    }

    /// Tear down every session synchronously. Listeners are dropped before
    /// anything else, so no callback fires after this point; subsequent
    /// sends fail with [`WireError::Closed`].
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        for session in &mut self.sessions {
            session.fail();
        }
        tracing::debug!("Connection closed");
    }

    fn index_of(&self, name: &str) -> WireResult<usize> {
        self.sessions
            .iter()
            .position(|s| s.capability().name() == name)
            .ok_or_else(|| WireError::UnknownCapability(name.to_string()))
    }

    fn report(&self, err: WireError) {
        tracing::warn!(error = %err, "Protocol violation");
        if self.error_tx.send(err).is_err() {
            tracing::warn!("Connection error channel closed");
        }
    }
}

impl<T: Transport> std::fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("sessions", &self.sessions)
            .field("closed", &self.closed)
            .finish()
    }
}

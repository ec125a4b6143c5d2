//! Per-capability session state machine.
//!
//! One session exists per negotiated capability on a connection. It owns the
//! capability's offset into the shared code space, enforces the mandatory
//! status exchange before any other traffic, validates outbound codes
//! against the negotiated version, and routes in-range inbound frames to its
//! dispatcher.

use std::collections::VecDeque;
use std::fmt;

use bytes::Bytes;

use crate::capability::{codes, Capability};
use crate::config::ConnectionConfig;
use crate::dispatch::Dispatcher;
use crate::error::{WireError, WireResult};
use crate::status::{validate_status, StatusMessage};
use crate::transport::Transport;

/// Handshake status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Status exchange not complete.
    #[default]
    Pending,
    /// Peer status validated; confirmation notification and buffered-frame
    /// drain in progress.
    Confirming,
    /// Status exchange succeeded; ordinary traffic admitted.
    Confirmed,
    /// Validation failed or the connection tore the session down. Terminal.
    Failed,
}

impl SessionState {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, SessionState::Confirmed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Pending => write!(f, "pending"),
            SessionState::Confirming => write!(f, "confirming"),
            SessionState::Confirmed => write!(f, "confirmed"),
            SessionState::Failed => write!(f, "failed"),
        }
    }
}

/// State for one negotiated capability on one connection.
pub struct Session {
    capability: Capability,
    offset: u64,
    state: SessionState,
    local_status: Option<StatusMessage>,
    peer_status: Option<StatusMessage>,
    /// Frames that arrived between the peer's status and confirmation,
    /// redelivered in order once the session confirms.
    pending: VecDeque<(u64, Bytes)>,
    max_pending: usize,
    max_payload: usize,
    dispatcher: Dispatcher,
}

impl Session {
    pub(crate) fn new(capability: Capability, offset: u64, config: &ConnectionConfig) -> Self {
        Self {
            capability,
            offset,
            state: SessionState::Pending,
            local_status: None,
            peer_status: None,
            pending: VecDeque::new(),
            max_pending: config.max_pending,
            max_payload: config.max_payload,
            dispatcher: Dispatcher::new(),
        }
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    /// The negotiated capability version.
    pub fn version(&self) -> u32 {
        self.capability.version()
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The peer's handshake record, once received.
    pub fn peer_status(&self) -> Option<&StatusMessage> {
        self.peer_status.as_ref()
    }

    /// Register a listener for ordinary messages on this session.
    pub fn on_message<F>(&mut self, listener: F)
    where
        F: FnMut(u64, &Bytes) + Send + 'static,
    {
        self.dispatcher.on_message(listener);
    }

    /// Register a one-shot listener for handshake confirmation.
    pub fn once_confirmed<F>(&mut self, listener: F)
    where
        F: FnOnce(&StatusMessage) + Send + 'static,
    {
        self.dispatcher.once_confirmed(listener);
    }

    /// Send the local handshake record. Permitted exactly once, before any
    /// other outbound traffic.
    pub fn send_status<T: Transport>(
        &mut self,
        transport: &mut T,
        status: StatusMessage,
    ) -> WireResult<()> {
        if self.state.is_failed() {
            return Err(WireError::Closed);
        }
        if self.local_status.is_some() || !matches!(self.state, SessionState::Pending) {
            return Err(WireError::StatusAlreadySent);
        }

        tracing::debug!(capability = %self.capability, status = %status, "Sending status");
        let payload = status.encode()?;
        transport.send_raw(self.offset + codes::STATUS, payload)?;
        self.local_status = Some(status);

        // If the peer's status beat ours, validation runs now.
        if self.peer_status.is_some() {
            self.confirm()?;
        }
        Ok(())
    }

    /// Send an ordinary message. Permitted only once the session confirmed;
    /// the wire code is the session offset plus `local_code`.
    pub fn send_message<T: Transport>(
        &mut self,
        transport: &mut T,
        local_code: u64,
        payload: Bytes,
    ) -> WireResult<()> {
        self.validate_send_code(local_code)?;
        if self.state.is_failed() {
            return Err(WireError::Closed);
        }
        if !self.state.is_confirmed() {
            return Err(WireError::NotConfirmed);
        }
        if payload.len() > self.max_payload {
            return Err(WireError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_payload,
            });
        }

        transport.send_raw(self.offset + local_code, payload)
    }

    /// Classify an outbound local code against the negotiated version.
    fn validate_send_code(&self, local_code: u64) -> WireResult<()> {
        if local_code == codes::STATUS {
            return Err(WireError::StatusViaOrdinarySend);
        }
        if local_code < self.capability.message_count() {
            return Ok(());
        }
        if local_code < self.capability.family_code_span() {
            return Err(WireError::CodeNotAllowed {
                code: local_code,
                version: self.capability.version(),
            });
        }
        Err(WireError::UnknownCode(local_code))
    }

    /// Process an inbound frame already mapped to this session's local code
    /// space. A returned error is a protocol violation: the session has
    /// moved to `Failed` and the caller forwards the error to the
    /// connection's error channel.
    pub(crate) fn handle_frame(&mut self, local_code: u64, payload: Bytes) -> WireResult<()> {
        match self.state {
            SessionState::Failed => {
                tracing::debug!(capability = %self.capability, code = local_code,
                    "Dropping frame on failed session");
                Ok(())
            }
            // The handshake record is received once per session; a second
            // STATUS frame at any point after it is a protocol violation.
            SessionState::Confirming | SessionState::Confirmed
                if local_code == codes::STATUS =>
            {
                self.fail();
                Err(WireError::DuplicateStatus)
            }
            SessionState::Confirmed => {
                self.dispatcher.dispatch(local_code, &payload);
                Ok(())
            }
            // Not observable from the connection: `confirm()` holds
            // `&mut self` for the whole confirming window.
            SessionState::Confirming => self.buffer_frame(local_code, payload),
            SessionState::Pending => self.handle_pending_frame(local_code, payload),
        }
    }

    fn handle_pending_frame(&mut self, local_code: u64, payload: Bytes) -> WireResult<()> {
        if self.peer_status.is_none() {
            // The first inbound frame must be the handshake.
            if local_code != codes::STATUS {
                self.fail();
                return Err(WireError::MessageBeforeStatus(local_code));
            }
            let status = match StatusMessage::decode(&payload) {
                Ok(status) => status,
                Err(e) => {
                    self.fail();
                    return Err(e);
                }
            };
            tracing::debug!(capability = %self.capability, status = %status,
                "Received peer status");
            self.peer_status = Some(status);
            if self.local_status.is_some() {
                return self.confirm();
            }
            return Ok(());
        }

        if local_code == codes::STATUS {
            self.fail();
            return Err(WireError::DuplicateStatus);
        }

        // Peer status seen but our side has not sent yet: hold the frame
        // until confirmation.
        self.buffer_frame(local_code, payload)
    }

    fn buffer_frame(&mut self, local_code: u64, payload: Bytes) -> WireResult<()> {
        if self.pending.len() >= self.max_pending {
            self.fail();
            return Err(WireError::PendingOverflow(self.max_pending));
        }
        self.pending.push_back((local_code, payload));
        Ok(())
    }

    /// Run the validator once both records are present, then notify
    /// listeners and drain any buffered frames in arrival order.
    fn confirm(&mut self) -> WireResult<()> {
        let (Some(local), Some(remote)) = (&self.local_status, &self.peer_status) else {
            return Ok(());
        };

        if let Err(e) = validate_status(local, remote) {
            tracing::warn!(capability = %self.capability, error = %e, "Status validation failed");
            self.fail();
            return Err(e);
        }

        self.state = SessionState::Confirming;
        let remote = remote.clone();
        self.dispatcher.notify_confirmed(&remote);
        while let Some((code, payload)) = self.pending.pop_front() {
            self.dispatcher.dispatch(code, &payload);
        }
        self.state = SessionState::Confirmed;
        tracing::debug!(capability = %self.capability, "Session confirmed");
        Ok(())
    }

    /// Terminal transition. Listeners are dropped first so nothing fires
    /// after teardown begins; buffered frames are discarded.
    pub(crate) fn fail(&mut self) {
        if self.state.is_failed() {
            return;
        }
        tracing::debug!(capability = %self.capability, from = %self.state,
            "Session state transition to failed");
        self.dispatcher.clear();
        self.pending.clear();
        self.state = SessionState::Failed;
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("capability", &self.capability)
            .field("offset", &self.offset)
            .field("state", &self.state)
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::encode_weight;
    use std::sync::{Arc, Mutex};

    /// Records frames instead of sending them anywhere.
    #[derive(Default)]
    struct RecordingTransport {
        sent: Vec<(u64, Bytes)>,
    }

    impl Transport for RecordingTransport {
        fn send_raw(&mut self, code: u64, payload: Bytes) -> WireResult<()> {
            self.sent.push((code, payload));
            Ok(())
        }
    }

    fn test_status(network_id: u64) -> StatusMessage {
        StatusMessage::new(network_id, encode_weight(1024), [9u8; 32], [3u8; 32])
    }

    fn confirmed_session(capability: Capability, offset: u64) -> (Session, RecordingTransport) {
        let mut session = Session::new(capability, offset, &ConnectionConfig::default());
        let mut transport = RecordingTransport::default();
        session.send_status(&mut transport, test_status(1)).unwrap();
        session
            .handle_frame(codes::STATUS, test_status(1).encode().unwrap())
            .unwrap();
        assert!(session.state().is_confirmed());
        (session, transport)
    }

    #[test]
    fn test_status_exchange_confirms() {
        let (session, transport) = confirmed_session(Capability::Ember63, 0);
        assert_eq!(session.version(), 63);
        assert_eq!(session.peer_status().unwrap().network_id, 1);
        // Status went out as wire code offset + 0.
        assert_eq!(transport.sent[0].0, 0);
    }

    #[test]
    fn test_status_sent_at_offset() {
        let mut session = Session::new(Capability::Glow1, 17, &ConnectionConfig::default());
        let mut transport = RecordingTransport::default();
        session.send_status(&mut transport, test_status(1)).unwrap();
        assert_eq!(transport.sent[0].0, 17);
    }

    #[test]
    fn test_double_send_status_fails() {
        let mut session = Session::new(Capability::Ember63, 0, &ConnectionConfig::default());
        let mut transport = RecordingTransport::default();
        session.send_status(&mut transport, test_status(1)).unwrap();
        let err = session
            .send_status(&mut transport, test_status(1))
            .unwrap_err();
        assert!(matches!(err, WireError::StatusAlreadySent));
    }

    #[test]
    fn test_send_before_confirmation_fails() {
        let mut session = Session::new(Capability::Ember63, 0, &ConnectionConfig::default());
        let mut transport = RecordingTransport::default();
        let err = session
            .send_message(&mut transport, codes::NEW_BLOCK_HASHES, Bytes::new())
            .unwrap_err();
        assert!(matches!(err, WireError::NotConfirmed));
        assert!(transport.sent.is_empty());
    }

    #[test]
    fn test_send_status_code_rejected_even_when_confirmed() {
        let (mut session, mut transport) = confirmed_session(Capability::Ember63, 0);
        let err = session
            .send_message(&mut transport, codes::STATUS, Bytes::new())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Please send status message through .sendStatus"
        );
    }

    #[test]
    fn test_send_code_not_allowed_for_version() {
        let (mut session, mut transport) = confirmed_session(Capability::Ember62, 0);
        let err = session
            .send_message(&mut transport, codes::GET_NODE_DATA, Bytes::new())
            .unwrap_err();
        assert_eq!(err.to_string(), "Code 0d not allowed with version 62");
        // The session is untouched by caller misuse.
        assert!(session.state().is_confirmed());
    }

    #[test]
    fn test_send_unknown_code() {
        let (mut session, mut transport) = confirmed_session(Capability::Ember63, 0);
        let err = session
            .send_message(&mut transport, 0x55, Bytes::new())
            .unwrap_err();
        assert_eq!(err.to_string(), "Unknown code 85");
    }

    #[test]
    fn test_send_applies_offset() {
        let (mut session, mut transport) = confirmed_session(Capability::Ember62, 21);
        session
            .send_message(&mut transport, codes::NEW_BLOCK, Bytes::from_static(b"blk"))
            .unwrap();
        assert_eq!(transport.sent.last().unwrap().0, 21 + codes::NEW_BLOCK);
    }

    #[test]
    fn test_first_frame_must_be_status() {
        let mut session = Session::new(Capability::Ember63, 0, &ConnectionConfig::default());
        let err = session
            .handle_frame(codes::NEW_BLOCK_HASHES, Bytes::new())
            .unwrap_err();
        assert!(matches!(err, WireError::MessageBeforeStatus(0x01)));
        assert!(session.state().is_failed());
    }

    #[test]
    fn test_malformed_status_fails_session() {
        let mut session = Session::new(Capability::Ember63, 0, &ConnectionConfig::default());
        let err = session
            .handle_frame(codes::STATUS, Bytes::from_static(b"junk"))
            .unwrap_err();
        assert!(matches!(err, WireError::MalformedStatus(_)));
        assert!(session.state().is_failed());
    }

    #[test]
    fn test_duplicate_status_fails_session() {
        let mut session = Session::new(Capability::Ember63, 0, &ConnectionConfig::default());
        session
            .handle_frame(codes::STATUS, test_status(1).encode().unwrap())
            .unwrap();
        let err = session
            .handle_frame(codes::STATUS, test_status(1).encode().unwrap())
            .unwrap_err();
        assert!(matches!(err, WireError::DuplicateStatus));
    }

    #[test]
    fn test_status_after_confirmation_fails_session() {
        let (mut session, _transport) = confirmed_session(Capability::Ember63, 0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        session.on_message(move |code, _| s.lock().unwrap().push(code));

        let err = session
            .handle_frame(codes::STATUS, test_status(1).encode().unwrap())
            .unwrap_err();
        assert!(matches!(err, WireError::DuplicateStatus));
        assert!(session.state().is_failed());
        // The reserved code never reaches ordinary listeners.
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_network_mismatch_fails_session() {
        let mut session = Session::new(Capability::Ember63, 0, &ConnectionConfig::default());
        let mut transport = RecordingTransport::default();
        session.send_status(&mut transport, test_status(1)).unwrap();
        let err = session
            .handle_frame(codes::STATUS, test_status(2).encode().unwrap())
            .unwrap_err();
        assert_eq!(err.to_string(), "NetworkId mismatch: 01 / 02");
        assert!(session.state().is_failed());
    }

    #[test]
    fn test_frames_buffered_until_confirmation() {
        // Peer status and two ordinary frames arrive before our status is
        // sent; both frames must be redelivered in order at confirmation.
        let mut session = Session::new(Capability::Ember63, 0, &ConnectionConfig::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let confirmed = Arc::new(Mutex::new(false));

        let s = seen.clone();
        session.on_message(move |code, payload| {
            s.lock().unwrap().push((code, payload.clone()));
        });
        let c = confirmed.clone();
        session.once_confirmed(move |_| *c.lock().unwrap() = true);

        session
            .handle_frame(codes::STATUS, test_status(1).encode().unwrap())
            .unwrap();
        session
            .handle_frame(codes::NEW_BLOCK_HASHES, Bytes::from_static(b"a"))
            .unwrap();
        session
            .handle_frame(codes::TRANSACTIONS, Bytes::from_static(b"b"))
            .unwrap();
        assert!(seen.lock().unwrap().is_empty());

        let mut transport = RecordingTransport::default();
        session.send_status(&mut transport, test_status(1)).unwrap();

        assert!(*confirmed.lock().unwrap());
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (codes::NEW_BLOCK_HASHES, Bytes::from_static(b"a")),
                (codes::TRANSACTIONS, Bytes::from_static(b"b")),
            ]
        );
    }

    #[test]
    fn test_pending_overflow_is_protocol_violation() {
        let config = ConnectionConfig::default().with_max_pending(1);
        let mut session = Session::new(Capability::Ember63, 0, &config);
        session
            .handle_frame(codes::STATUS, test_status(1).encode().unwrap())
            .unwrap();
        session
            .handle_frame(codes::NEW_BLOCK_HASHES, Bytes::new())
            .unwrap();
        let err = session
            .handle_frame(codes::TRANSACTIONS, Bytes::new())
            .unwrap_err();
        assert!(matches!(err, WireError::PendingOverflow(1)));
        assert!(session.state().is_failed());
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let config = ConnectionConfig::default().with_max_payload(4);
        let mut session = Session::new(Capability::Ember63, 0, &config);
        let mut transport = RecordingTransport::default();
        session.send_status(&mut transport, test_status(1)).unwrap();
        session
            .handle_frame(codes::STATUS, test_status(1).encode().unwrap())
            .unwrap();
        let err = session
            .send_message(&mut transport, codes::NEW_BLOCK, Bytes::from_static(b"too big"))
            .unwrap_err();
        assert!(matches!(err, WireError::PayloadTooLarge { size: 7, max: 4 }));
    }

    #[test]
    fn test_fail_silences_listeners_and_sends() {
        let (mut session, mut transport) = confirmed_session(Capability::Ember63, 0);
        let fired = Arc::new(Mutex::new(false));
        let f = fired.clone();
        session.on_message(move |_, _| *f.lock().unwrap() = true);

        session.fail();
        session
            .handle_frame(codes::NEW_BLOCK_HASHES, Bytes::new())
            .unwrap();
        assert!(!*fired.lock().unwrap());

        let err = session
            .send_message(&mut transport, codes::NEW_BLOCK_HASHES, Bytes::new())
            .unwrap_err();
        assert!(matches!(err, WireError::Closed));
    }
}

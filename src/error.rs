//! Wire sub-protocol error types.
//!
//! The `Display` form of the handshake and code-validation variants is part
//! of the protocol surface: peers and tooling match on these exact strings,
//! so they must not change.

use thiserror::Error;

/// Errors raised by the wire sub-protocol layer.
///
/// Two classes share this enum:
///
/// - peer-fault errors (mismatches, malformed or out-of-order inbound
///   frames, inbound unknown codes) are surfaced on the connection error
///   channel and are fatal to the session;
/// - caller-misuse errors (`CodeNotAllowed`, outbound `UnknownCode`, the
///   handshake-misuse variants) are returned synchronously to the caller and
///   never close the connection by themselves.
#[derive(Debug, Error)]
pub enum WireError {
    /// Peer is on a different network. Fields are preformatted
    /// minimum-two-digit lowercase hex.
    #[error("NetworkId mismatch: {local} / {remote}")]
    NetworkMismatch { local: String, remote: String },

    /// Peer has a different genesis block. Fields are the full 64-character
    /// lowercase hex of each hash.
    #[error("Genesis block mismatch: {local} / {remote}")]
    GenesisMismatch { local: String, remote: String },

    /// Local code is known to the capability family but not valid for the
    /// negotiated version.
    #[error("Code {code:02x} not allowed with version {version}")]
    CodeNotAllowed { code: u64, version: u32 },

    /// Code does not belong to any negotiated capability's range.
    #[error("Unknown code {0}")]
    UnknownCode(u64),

    /// The reserved handshake code was passed to the ordinary send path.
    #[error("Please send status message through .sendStatus")]
    StatusViaOrdinarySend,

    /// `send_status` called twice, or after the session left `Pending`.
    #[error("Status message already sent")]
    StatusAlreadySent,

    /// Ordinary send attempted before the handshake confirmed.
    #[error("Status exchange not complete")]
    NotConfirmed,

    /// Peer sent a second status message.
    #[error("Uncontrolled status message")]
    DuplicateStatus,

    /// Peer sent an ordinary message before its status message.
    #[error("Unexpected message before status: code {0}")]
    MessageBeforeStatus(u64),

    /// The first frame's payload did not decode as a status message.
    #[error("Malformed status message: {0}")]
    MalformedStatus(String),

    /// Too many frames buffered between status receipt and confirmation.
    #[error("Pending message queue overflow (limit {0})")]
    PendingOverflow(usize),

    /// Payload exceeds the configured maximum.
    #[error("Payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Failed to serialize an outbound payload.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// No session for the requested capability name on this connection.
    #[error("Capability not negotiated: {0}")]
    UnknownCapability(String),

    /// The underlying transport refused the frame.
    #[error("Transport not writable")]
    NotWritable,

    /// The connection has been torn down.
    #[error("Connection closed")]
    Closed,
}

impl WireError {
    /// Whether this error is the peer's fault and fatal to the session, as
    /// opposed to a local caller mistake.
    pub fn is_peer_fault(&self) -> bool {
        matches!(
            self,
            WireError::NetworkMismatch { .. }
                | WireError::GenesisMismatch { .. }
                | WireError::DuplicateStatus
                | WireError::MessageBeforeStatus(_)
                | WireError::MalformedStatus(_)
                | WireError::PendingOverflow(_)
        )
    }
}

/// Result type for wire sub-protocol operations.
pub type WireResult<T> = Result<T, WireError>;

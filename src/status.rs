//! Status message (handshake record) and its validation.
//!
//! The status message is the mandatory first message of every session. It
//! carries the chain-identity fields both peers compare before any other
//! traffic is admitted: network id and genesis hash decide acceptance; total
//! weight and best hash are recorded for the sync layer but never validated
//! here.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::codec;
use crate::error::{WireError, WireResult};

/// Chain-identity record exchanged as the first message of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    /// Network identifier; must match the peer's.
    pub network_id: u64,
    /// Total chain weight as a trimmed big-endian integer.
    pub total_weight: Vec<u8>,
    /// Hash of the sender's best known block.
    pub best_hash: [u8; 32],
    /// Hash of the genesis block; must match the peer's.
    pub genesis_hash: [u8; 32],
}

impl StatusMessage {
    pub fn new(
        network_id: u64,
        total_weight: Vec<u8>,
        best_hash: [u8; 32],
        genesis_hash: [u8; 32],
    ) -> Self {
        Self {
            network_id,
            total_weight,
            best_hash,
            genesis_hash,
        }
    }

    /// Encode for transmission as the handshake payload.
    pub(crate) fn encode(&self) -> WireResult<Bytes> {
        codec::serialize(self).map(Bytes::from)
    }

    /// Decode an inbound handshake payload.
    pub(crate) fn decode(bytes: &[u8]) -> WireResult<Self> {
        codec::deserialize(bytes).map_err(|e| match e {
            WireError::Serialization(msg) => WireError::MalformedStatus(msg),
            other => other,
        })
    }
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[networkId: {:02x}, weight: {}, bestHash: {}, genesisHash: {}]",
            self.network_id,
            hex_bytes(&self.total_weight),
            hex_hash(&self.best_hash),
            hex_hash(&self.genesis_hash)
        )
    }
}

/// Compare the local and remote handshake records.
///
/// Checks run in protocol order and the first failure wins:
/// 1. network id equality
/// 2. genesis hash equality
pub fn validate_status(local: &StatusMessage, remote: &StatusMessage) -> WireResult<()> {
    if local.network_id != remote.network_id {
        return Err(WireError::NetworkMismatch {
            local: format!("{:02x}", local.network_id),
            remote: format!("{:02x}", remote.network_id),
        });
    }

    if local.genesis_hash != remote.genesis_hash {
        return Err(WireError::GenesisMismatch {
            local: hex_hash(&local.genesis_hash),
            remote: hex_hash(&remote.genesis_hash),
        });
    }

    Ok(())
}

/// Encode an integer as the trimmed big-endian byte form used by the
/// `total_weight` field. Zero encodes to an empty vec.
pub fn encode_weight(value: u128) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    bytes[start..].to_vec()
}

fn hex_hash(bytes: &[u8; 32]) -> String {
    hex_bytes(bytes)
}

fn hex_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

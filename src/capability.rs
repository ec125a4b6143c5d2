//! Capability descriptors and message-code space allocation.
//!
//! A capability is a named, versioned sub-protocol multiplexed over a shared
//! connection. Each (name, version) pair owns a fixed number of message
//! codes; the allocator assigns every negotiated capability a contiguous,
//! disjoint slice of the connection's shared code space.

use std::fmt;

/// Message codes of the `ember` chain protocol, local to the capability's
/// code space. Codes 0x08-0x0c are reserved.
pub mod codes {
    /// Handshake message, reserved on every capability version.
    pub const STATUS: u64 = 0x00;
    pub const NEW_BLOCK_HASHES: u64 = 0x01;
    pub const TRANSACTIONS: u64 = 0x02;
    pub const GET_BLOCK_HEADERS: u64 = 0x03;
    pub const BLOCK_HEADERS: u64 = 0x04;
    pub const GET_BLOCK_BODIES: u64 = 0x05;
    pub const BLOCK_BODIES: u64 = 0x06;
    pub const NEW_BLOCK: u64 = 0x07;
    /// Version 63 and up.
    pub const GET_NODE_DATA: u64 = 0x0d;
    pub const NODE_DATA: u64 = 0x0e;
    pub const GET_RECEIPTS: u64 = 0x0f;
    pub const RECEIPTS: u64 = 0x10;
}

/// A supported capability version.
///
/// The set is closed: negotiation resolves the peer's advertisement against
/// these descriptors at connection setup, so the send/receive path never
/// branches on strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Chain sync protocol, version 62.
    Ember62,
    /// Chain sync protocol, version 63 (adds node-data and receipt codes).
    Ember63,
    /// Light client protocol, version 1.
    Glow1,
}

impl Capability {
    /// Every capability version this build supports.
    pub const ALL: [Capability; 3] = [Capability::Ember62, Capability::Ember63, Capability::Glow1];

    /// Protocol name, shared across versions.
    pub const fn name(self) -> &'static str {
        match self {
            Capability::Ember62 | Capability::Ember63 => "ember",
            Capability::Glow1 => "glow",
        }
    }

    /// Negotiated protocol version.
    pub const fn version(self) -> u32 {
        match self {
            Capability::Ember62 => 62,
            Capability::Ember63 => 63,
            Capability::Glow1 => 1,
        }
    }

    /// Number of message codes this version occupies, handshake included.
    pub const fn message_count(self) -> u64 {
        match self {
            Capability::Ember62 => 8,
            Capability::Ember63 => 17,
            Capability::Glow1 => 21,
        }
    }

    /// Largest code count across all supported versions of this
    /// capability's name. Codes below this bound but at or above the
    /// negotiated version's count are known to the family yet not allowed
    /// with that version.
    pub fn family_code_span(self) -> u64 {
        Capability::ALL
            .iter()
            .filter(|cap| cap.name() == self.name())
            .map(|cap| cap.message_count())
            .max()
            .unwrap_or(0)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name(), self.version())
    }
}

/// One negotiated capability with its assigned base offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableEntry {
    /// The negotiated capability version.
    pub capability: Capability,
    /// Base wire code; the capability owns
    /// `[offset, offset + message_count)`.
    pub offset: u64,
}

/// Offset assignments for every capability negotiated on one connection.
///
/// Both peers compute this table independently from the negotiation result;
/// the ranges are contiguous, pairwise disjoint and gapless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetTable {
    entries: Vec<TableEntry>,
}

/// Assign each negotiated capability a base offset, in negotiation order.
///
/// Offsets accumulate: each capability's offset is the sum of the code
/// counts of everything negotiated before it. The input must carry at most
/// one version per capability name; negotiation enforces that before this
/// point, so the function is total.
pub fn allocate(negotiated: &[Capability]) -> OffsetTable {
    debug_assert!(
        negotiated
            .iter()
            .all(|a| negotiated.iter().filter(|b| b.name() == a.name()).count() == 1),
        "negotiation must select one version per capability name"
    );

    let mut entries = Vec::with_capacity(negotiated.len());
    let mut offset = 0u64;
    for &capability in negotiated {
        entries.push(TableEntry { capability, offset });
        offset += capability.message_count();
    }
    OffsetTable { entries }
}

impl OffsetTable {
    /// Entries in negotiation order.
    pub fn entries(&self) -> &[TableEntry] {
        &self.entries
    }

    /// Base offset assigned to a capability, if negotiated.
    pub fn offset_of(&self, capability: Capability) -> Option<u64> {
        self.entries
            .iter()
            .find(|e| e.capability == capability)
            .map(|e| e.offset)
    }

    /// Map a wire code back to its capability and local code.
    ///
    /// Returns `None` when the code falls outside every negotiated range.
    pub fn resolve(&self, wire_code: u64) -> Option<(Capability, u64)> {
        self.entries
            .iter()
            .find(|e| wire_code >= e.offset && wire_code < e.offset + e.capability.message_count())
            .map(|e| (e.capability, wire_code - e.offset))
    }

    /// The negotiated version for a capability name, if any.
    pub fn by_name(&self, name: &str) -> Option<TableEntry> {
        self.entries
            .iter()
            .copied()
            .find(|e| e.capability.name() == name)
    }

    /// Total number of wire codes covered by the table.
    pub fn total_span(&self) -> u64 {
        self.entries
            .iter()
            .map(|e| e.capability.message_count())
            .sum()
    }
}

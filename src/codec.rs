//! Deterministic binary encoding for structured payloads.
//!
//! Both peers must derive identical bytes for identical values, so the
//! status payload uses bincode with a pinned configuration:
//! - fixed-size integer encoding
//! - little-endian byte order
//! - trailing bytes rejected on decode

use bincode::Options;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{WireError, WireResult};

fn config() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .reject_trailing_bytes()
}

/// Serialize a value with the pinned configuration.
pub fn serialize<T: Serialize>(value: &T) -> WireResult<Vec<u8>> {
    config()
        .serialize(value)
        .map_err(|e| WireError::Serialization(e.to_string()))
}

/// Deserialize a value, rejecting malformed input and trailing bytes.
pub fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> WireResult<T> {
    config()
        .deserialize(bytes)
        .map_err(|e| WireError::Serialization(e.to_string()))
}

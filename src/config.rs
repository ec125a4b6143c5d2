//! Connection configuration.

/// Maximum payload size in bytes (1 MiB).
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Default bound on frames buffered between status receipt and handshake
/// confirmation.
pub const DEFAULT_MAX_PENDING: usize = 16;

/// Per-connection tuning knobs for the wire sub-protocol layer.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Maximum frames buffered per session before confirmation completes.
    pub max_pending: usize,

    /// Maximum payload size accepted in either direction.
    pub max_payload: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_pending: DEFAULT_MAX_PENDING,
            max_payload: MAX_PAYLOAD_SIZE,
        }
    }
}

impl ConnectionConfig {
    /// Set the pre-confirmation buffer bound.
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    /// Set the maximum accepted payload size.
    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = ConnectionConfig::default()
            .with_max_pending(2)
            .with_max_payload(512);
        assert_eq!(config.max_pending, 2);
        assert_eq!(config.max_payload, 512);
    }
}

//! Capability-multiplexed wire sub-protocol layer for the Ember chain.
//!
//! Several independent sub-protocols ("capabilities") share one encrypted
//! peer connection. This crate sits between the secure transport and the
//! application layers of each capability:
//!
//! - it partitions the connection's message-code space among the negotiated
//!   capabilities, so codes never collide on the shared wire;
//! - it enforces the mandatory status handshake (network id and genesis
//!   hash must match) before any other traffic is admitted;
//! - it validates every outbound code against the negotiated capability
//!   version and routes every inbound frame to the owning session's
//!   listeners.
//!
//! # Architecture
//!
//! ```text
//! secure transport (negotiates capabilities, moves frames)
//!         │
//! Connection ── allocate() ──> OffsetTable
//!         │
//!         ├── Session "ember" (handshake state machine, code validation)
//!         │        └── Dispatcher (listeners, registration order)
//!         └── Session "glow"
//! ```
//!
//! The transport, its cryptography and the semantics of individual payloads
//! are external collaborators; payloads pass through this layer opaque,
//! except the status message itself.
//!
//! # Usage
//!
//! ```ignore
//! use ember_wire::{Capability, Connection, ConnectionConfig, StatusMessage};
//!
//! let mut conn = Connection::new(transport, &negotiated, ConnectionConfig::default(), error_tx);
//! conn.once_confirmed("ember", |peer| println!("peer status: {peer}"))?;
//! conn.send_status("ember", local_status)?;
//! // ... feed inbound frames:
//! conn.handle_inbound(code, payload);
//! ```

pub mod capability;
pub mod codec;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod session;
pub mod status;
pub mod transport;

// Re-export main types
pub use capability::{allocate, codes, Capability, OffsetTable, TableEntry};
pub use config::ConnectionConfig;
pub use connection::{Connection, ErrorSender};
pub use dispatch::Dispatcher;
pub use error::{WireError, WireResult};
pub use session::{Session, SessionState};
pub use status::{encode_weight, validate_status, StatusMessage};
pub use transport::{duplex, ChannelTransport, FrameReceiver, Transport};

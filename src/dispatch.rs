//! Message dispatch to registered listeners.

use bytes::Bytes;

use crate::status::StatusMessage;

/// Listener for ordinary messages, invoked with the local code and payload.
pub type MessageListener = Box<dyn FnMut(u64, &Bytes) + Send>;

/// One-shot listener for handshake confirmation, invoked with the peer's
/// status message.
pub type ConfirmedListener = Box<dyn FnOnce(&StatusMessage) + Send>;

/// Per-session listener registry.
///
/// Listeners run synchronously in registration order. A valid in-range code
/// with no listener registered is a silent no-op. Listener panics are not
/// isolated; they propagate to the caller driving the connection.
#[derive(Default)]
pub struct Dispatcher {
    message: Vec<MessageListener>,
    confirmed: Vec<ConfirmedListener>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for ordinary messages.
    pub fn on_message<F>(&mut self, listener: F)
    where
        F: FnMut(u64, &Bytes) + Send + 'static,
    {
        self.message.push(Box::new(listener));
    }

    /// Register a one-shot listener for handshake confirmation. Listeners
    /// registered after the session confirmed never fire.
    pub fn once_confirmed<F>(&mut self, listener: F)
    where
        F: FnOnce(&StatusMessage) + Send + 'static,
    {
        self.confirmed.push(Box::new(listener));
    }

    /// Deliver a decoded message to every registered listener.
    pub fn dispatch(&mut self, local_code: u64, payload: &Bytes) {
        for listener in &mut self.message {
            listener(local_code, payload);
        }
    }

    /// Fire and consume the confirmation listeners.
    pub fn notify_confirmed(&mut self, status: &StatusMessage) {
        for listener in self.confirmed.drain(..) {
            listener(status);
        }
    }

    /// Drop every listener. Nothing registered before this call can fire
    /// afterwards; used by connection teardown.
    pub fn clear(&mut self) {
        self.message.clear();
        self.confirmed.clear();
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("message_listeners", &self.message.len())
            .field("confirmed_listeners", &self.confirmed.len())
            .finish()
    }
}

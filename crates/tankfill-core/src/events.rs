//! Session lifecycle events.
//!
//! Readings travel over the [`ReadingBus`](crate::bus::ReadingBus); everything
//! else a UI wants to show about the connection (state changes, disconnect
//! cause, configuration warnings) is broadcast here.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use tankfill_types::SessionState;

/// Events emitted by a [`SensorSession`](crate::session::SensorSession).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum SessionEvent {
    /// The session moved to a new state.
    StateChanged { state: SessionState },
    /// A device was connected.
    Connected { device: String },
    /// The connection was torn down.
    Disconnected {
        device: Option<String>,
        reason: DisconnectReason,
    },
    /// The session is connected but cannot receive data.
    ConfigWarning { message: String },
}

/// Why a session disconnected. Informational only; teardown is identical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum DisconnectReason {
    /// The operator asked for it.
    UserRequested,
    /// The device dropped the link.
    LinkLost,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisconnectReason::UserRequested => write!(f, "user requested"),
            DisconnectReason::LinkLost => write!(f, "link lost"),
        }
    }
}

/// Sender for session events.
pub type EventSender = broadcast::Sender<SessionEvent>;

/// Receiver for session events.
pub type EventReceiver = broadcast::Receiver<SessionEvent>;

/// Broadcasts [`SessionEvent`]s to any number of receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a dispatcher with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Get a new receiver.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event. Having no receivers is not an error.
    pub fn send(&self, event: SessionEvent) {
        let _ = self.sender.send(event);
    }

    /// Number of live receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(64)
    }
}

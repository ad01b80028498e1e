/// Connection and read-receipt projection
///
/// No network calls of its own: the session updates connection state from
/// lifecycle notices, and read marks derive from message state.
use crate::model::Message;
use std::sync::atomic::{AtomicBool, Ordering};

/// Connection status surfaced to the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub reconnect_attempts: u32,
}

/// Glyph shown next to a message the current user authored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMark {
    /// Not the current user's message; no glyph
    None,
    /// Awaiting server acknowledgment
    Pending,
    /// Delivered, not yet read by the other party
    Sent,
    /// Read by the other party
    Read,
}

#[derive(Default)]
pub struct PresenceTracker {
    connected: AtomicBool,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// `reconnect_attempts` is taken from the connection manager at call
    /// time, so an in-progress outage reports live numbers
    pub fn status(&self, reconnect_attempts: u32) -> ConnectionStatus {
        ConnectionStatus {
            connected: self.connected.load(Ordering::SeqCst),
            reconnect_attempts,
        }
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Read/unread glyph for a message as seen by `current_user`
    pub fn read_mark(message: &Message, current_user: &str) -> ReadMark {
        if message.sender_id != current_user {
            ReadMark::None
        } else if message.pending {
            ReadMark::Pending
        } else if message.is_read {
            ReadMark::Read
        } else {
            ReadMark::Sent
        }
    }
}

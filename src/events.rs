//! Session lifecycle events
//!
//! Events are published on a broadcast channel by the session. Protocol code
//! never touches the channel directly; it records events and outbound writes
//! in [`Effects`] and the session flushes them once a chunk is processed.

use std::fmt;

/// Lifecycle notifications, see [`SessionEvent::name`] for the wire names
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Transport connected, negotiation starting
    SocketConnect,
    /// Negotiation finished, 3270 data stream active
    Connect,
    /// Raw bytes received from the transport
    Data(Vec<u8>),
    ScreenUpdate,
    KeyboardLock,
    KeyboardUnlock,
    SocketError(String),
    SocketClose,
    /// Session torn down and reset
    Close,
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SocketConnect => "socket-connect",
            Self::Connect => "connect",
            Self::Data(_) => "data",
            Self::ScreenUpdate => "screen-update",
            Self::KeyboardLock => "keyboard-lock",
            Self::KeyboardUnlock => "keyboard-unlock",
            Self::SocketError(_) => "socket-error",
            Self::SocketClose => "socket-close",
            Self::Close => "close",
        }
    }
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data(bytes) => write!(f, "data ({} bytes)", bytes.len()),
            Self::SocketError(err) => write!(f, "socket-error: {}", err),
            other => f.write_str(other.name()),
        }
    }
}

/// Writes and events produced while processing input
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Effects {
    pub outbound: Vec<Vec<u8>>,
    pub events: Vec<SessionEvent>,
}

impl Effects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, bytes: Vec<u8>) {
        log::debug!(
            "queueing write: {}",
            crate::protocol_common::telnet_base::hex_dump(&bytes)
        );
        self.outbound.push(bytes);
    }

    pub fn emit(&mut self, event: SessionEvent) {
        self.events.push(event);
    }

    pub fn is_empty(&self) -> bool {
        self.outbound.is_empty() && self.events.is_empty()
    }

    /// Take everything recorded so far, leaving this empty
    pub fn take(&mut self) -> Effects {
        std::mem::take(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(SessionEvent::SocketConnect.name(), "socket-connect");
        assert_eq!(SessionEvent::Data(vec![1]).name(), "data");
        assert_eq!(SessionEvent::ScreenUpdate.name(), "screen-update");
        assert_eq!(SessionEvent::KeyboardUnlock.to_string(), "keyboard-unlock");
        assert_eq!(SessionEvent::SocketError("reset".into()).to_string(), "socket-error: reset");
    }

    #[test]
    fn test_effects_take() {
        let mut effects = Effects::new();
        effects.write(vec![255, 251, 0]);
        effects.emit(SessionEvent::Connect);

        let taken = effects.take();
        assert!(effects.is_empty());
        assert_eq!(taken.outbound, vec![vec![255, 251, 0]]);
        assert_eq!(taken.events, vec![SessionEvent::Connect]);
    }
}

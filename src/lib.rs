/// PROTOCOL COMMON: Telnet codes and EBCDIC translation
/// Shared building blocks below the 3270 data stream
pub mod protocol_common;

/// LIB3270: IBM 3270 protocol implementation
/// Negotiation, framing, command dispatch, orders and the screen buffer
pub mod lib3270;

pub mod config;
pub mod error;
pub mod events;
pub mod gate;
pub mod protocol_state;

/// Session facade tying protocol, transport and events together
pub mod session;

/// Byte transports (TCP and in-memory)
pub mod transport;

// Re-exports for easy access
pub use config::SessionConfig;
pub use error::{ConfigError, DataStreamError, NegotiationError, Result, SessionError, WriteError};
pub use events::SessionEvent;
pub use lib3270::{AidKey, DeviceType, SessionState, TerminalModel};
pub use session::{Session, SessionBuilder, SessionSnapshot, SessionStatus};
pub use transport::{ChannelTransport, HostEnd, TcpTransport, Transport, TransportEvent, TransportLink};

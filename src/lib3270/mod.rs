//! Client side of the IBM 3270 protocol over Telnet (TN3270, RFC 1576) and
//! TN3270E (RFC 2355)
//!
//! # Architecture
//!
//! - [`codes`] - command, order, AID, WCC and TN3270E constants
//! - [`address`] - terminal models and 12/14-bit buffer addressing
//! - [`device`] - the supported device type names
//! - [`negotiation`] - Telnet and TN3270E negotiation state machine
//! - [`framer`] - splits the data stream into records on `IAC EOR`
//! - [`message`] - one inbound record and its TN3270E header
//! - [`dispatcher`] - executes write, read and structured field commands
//! - [`orders`] - order interpreter and handler registry
//! - [`field`] / [`screen`] - the field-oriented presentation space
//!
//! None of these modules perform I/O. Bytes go in, and outbound writes plus
//! lifecycle events come out through [`crate::events::Effects`].

pub mod address;
pub mod codes;
pub mod device;
pub mod dispatcher;
pub mod field;
pub mod framer;
pub mod message;
pub mod negotiation;
pub mod orders;
pub mod screen;

// Re-exports for easy access
pub use address::{decode_address, encode_address, TerminalModel};
pub use codes::{AidKey, CommandCode};
pub use device::DeviceType;
pub use dispatcher::{outbound_record, query_reply, CommandDispatcher};
pub use field::Field;
pub use framer::MessageFramer;
pub use message::{Message, MessageHeader};
pub use negotiation::{HostOption, HostOptions, Negotiator, SessionState};
pub use orders::{OrderHandler, OrderKind, OrderRegistry};
pub use screen::ScreenBuffer;

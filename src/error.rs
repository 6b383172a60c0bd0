//! Error types for TN3270R
//!
//! Errors are grouped by where they arise: configuration (fatal to session
//! construction), negotiation and data stream (fatal to the connection),
//! screen writes (rejected operation, session keeps running), and the
//! session facade itself.

use std::io;

use thiserror::Error;

/// Top-level error type for TN3270R operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("negotiation error: {0}")]
    Negotiation(#[from] NegotiationError),

    #[error("data stream error: {0}")]
    DataStream(#[from] DataStreamError),

    #[error("write rejected: {0}")]
    Write(#[from] WriteError),

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("session is not connected")]
    NotConnected,

    #[error("session is already connected")]
    AlreadyConnected,

    #[error("invalid function key PF{0}, expected 1-24")]
    InvalidFunctionKey(u8),
}

/// Invalid session configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("host is required")]
    MissingHost,

    #[error("invalid port {0}")]
    InvalidPort(u16),

    #[error("invalid device type '{0}'")]
    InvalidDeviceType(String),

    #[error("no code page translator registered for '{0}'")]
    UnknownCodePage(String),

    #[error("failed to read configuration: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Fatal Telnet/TN3270E negotiation failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    #[error("device type rejected: {reason} (code {code})")]
    DeviceTypeRejected { code: u8, reason: &'static str },

    #[error("unhandled negotiation state {0}")]
    UnhandledState(&'static str),
}

/// Fatal 3270 data stream failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DataStreamError {
    #[error("unhandled operation 0x{0:02x}")]
    UnhandledOperation(u8),

    #[error("invalid read partition suboption, partition 0x{partition:02x}")]
    InvalidReadPartition { partition: u8 },

    #[error("unhandled structured field 0x{0:02x}")]
    UnhandledStructuredField(u8),

    #[error("structured field truncated: need {expected} bytes, have {available}")]
    TruncatedStructuredField { expected: usize, available: usize },

    #[error("TN3270E header truncated: {0} bytes")]
    TruncatedHeader(usize),
}

/// Rejected `write_string` calls; the screen is left unchanged
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WriteError {
    #[error("field at address {address} is protected")]
    ProtectedField { address: u16 },

    #[error("not enough room in field at {address}: need {needed}, have {available}")]
    InsufficientRoom { address: u16, needed: usize, available: usize },

    #[error("no field at address {address}")]
    NoField { address: u16 },

    #[error("address {address} is a field attribute position")]
    AttributePosition { address: u16 },
}

/// Admission gate failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("timed out after {timeout_ms} ms waiting for the processing gate")]
    Timeout { timeout_ms: u64 },
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SessionError::from(WriteError::ProtectedField { address: 5 });
        assert_eq!(err.to_string(), "write rejected: field at address 5 is protected");

        let err = SessionError::from(GateError::Timeout { timeout_ms: 10 });
        assert!(err.to_string().contains("10 ms"));

        let err = DataStreamError::UnhandledOperation(0xAB);
        assert_eq!(err.to_string(), "unhandled operation 0xab");
    }

    #[test]
    fn test_config_error_conversion() {
        let err: SessionError = ConfigError::InvalidDeviceType("IBM-3279".into()).into();
        assert!(matches!(err, SessionError::Config(ConfigError::InvalidDeviceType(_))));
    }
}

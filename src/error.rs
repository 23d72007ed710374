//! # Error Types
//!
//! Custom error types for the RS-485 link using `thiserror`.

use thiserror::Error;

/// Main error type for the RS-485 link
#[derive(Debug, Error)]
pub enum Rs485Error {
    /// Frame protocol errors (bad delimiters, checksum mismatch, truncated frame)
    #[error("Frame protocol error: {0}")]
    Protocol(String),

    /// Command id outside the 0-31 event range
    #[error("Invalid command id {0} (must be 0-31)")]
    InvalidCommand(u8),

    /// A read was requested for an empty set of commands
    #[error("Empty command set")]
    EmptySubscription,

    /// Payload longer than the one-byte length field can describe
    #[error("Payload size {0} exceeds maximum 255")]
    PayloadTooLarge(usize),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Serial port errors
    #[error("Serial port error: {0}")]
    Serial(String),

    /// No serial device could be opened
    #[error("Serial port not found (tried: {0})")]
    SerialPortNotFound(String),

    /// The receiver task has stopped, no further packets will arrive
    #[error("RS-485 link closed")]
    LinkClosed,

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the RS-485 link
pub type Result<T> = std::result::Result<T, Rs485Error>;

//! Error types for scalelink.

use std::io;
use thiserror::Error;

/// Result type for scalelink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for scalelink operations.
#[derive(Debug, Error)]
pub enum Error {
    /// No system serial port with this name exists.
    #[error("Serial port not found: {0}")]
    PortNotFound(String),

    /// The port exists but could not be opened (busy, permissions, ...).
    #[error("Failed to open serial port {port}: {reason}")]
    PortOpenFailed {
        /// Port name.
        port: String,
        /// Reason reported by the driver.
        reason: String,
    },

    /// An exchange was requested on a port that is not open.
    #[error("Serial port not open: {0}")]
    PortNotOpen(String),

    /// The registry does not track a port with this name.
    #[error("Serial port not managed: {0}")]
    PortNotManaged(String),

    /// Unknown command/operation code.
    #[error("Invalid operation code: {0}")]
    InvalidOperation(String),

    /// Fewer bytes than the smallest valid frame.
    #[error("Frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Minimum frame length.
        expected: usize,
        /// Received length.
        actual: usize,
    },

    /// Frame is not delimited by STX/ETX.
    #[error("Malformed frame: {0}")]
    FrameMalformed(String),

    /// XOR checksum mismatch (strict checksum policy only).
    #[error("Checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch {
        /// Checksum computed over the covered range.
        expected: u8,
        /// Checksum carried by the frame.
        actual: u8,
    },

    /// Weight payload does not have the width of the protocol variant.
    #[error("Invalid payload width: expected {expected} bytes, got {actual}")]
    InvalidPayloadWidth {
        /// Width required by the protocol variant.
        expected: usize,
        /// Received width.
        actual: usize,
    },

    /// Decimal-position marker outside `'0'..='6'`.
    #[error("Invalid decimal marker: {0:#04x}")]
    InvalidDecimalMarker(u8),

    /// Sign or digit field of the weight payload is not decodable.
    #[error("Invalid weight payload: {0}")]
    InvalidPayload(String),

    /// Hex string could not be parsed.
    #[error("Invalid hex string: {0}")]
    InvalidHex(String),

    /// I/O error on an open port.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial driver error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The cache collaborator rejected a write.
    #[error("Cache error: {0}")]
    Cache(String),
}

impl Error {
    /// Whether this error is a transient link failure.
    ///
    /// The listener closes its session and reconnects on these; the
    /// synchronous request path surfaces them to the caller.
    pub fn is_io_failure(&self) -> bool {
        match self {
            Self::Io(_) => true,
            #[cfg(feature = "native")]
            Self::Serial(_) => true,
            _ => false,
        }
    }
}

//! Scale command catalog.

use crate::error::{Error, Result};
use crate::protocol::frame::{CommandFrame, FrameLayout, to_hex};
use std::fmt;

/// Commands understood by the scale.
///
/// Each command has an ASCII operation code (sent as the frame's command
/// byte) and a numeric code used by callers that address commands by number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ScaleCommand {
    /// Handshake (`A`).
    Handshake = b'A',
    /// Read gross weight (`B`).
    ReadGross = b'B',
    /// Read tare weight (`C`).
    ReadTare = b'C',
    /// Read net weight (`D`).
    ReadNet = b'D',
    /// Zero the scale (`E`).
    Zero = b'E',
    /// Tare the current load (`F`).
    Tare = b'F',
    /// Calibrate (`G`).
    Calibrate = b'G',
    /// Read status (`H`).
    ReadStatus = b'H',
}

impl ScaleCommand {
    /// Every command, in numeric-code order.
    pub const ALL: [Self; 8] = [
        Self::Handshake,
        Self::ReadGross,
        Self::ReadTare,
        Self::ReadNet,
        Self::Zero,
        Self::Tare,
        Self::Calibrate,
        Self::ReadStatus,
    ];

    /// Command byte sent on the wire.
    pub fn op_code(self) -> u8 {
        self as u8
    }

    /// Numeric code (1-based position in the catalog).
    pub fn numeric_code(self) -> u8 {
        self.op_code() - b'A' + 1
    }

    /// Human-readable description.
    pub fn description(self) -> &'static str {
        match self {
            Self::Handshake => "handshake",
            Self::ReadGross => "read gross weight",
            Self::ReadTare => "read tare weight",
            Self::ReadNet => "read net weight",
            Self::Zero => "zero",
            Self::Tare => "tare",
            Self::Calibrate => "calibrate",
            Self::ReadStatus => "read status",
        }
    }

    /// Look up a command by its wire byte.
    pub fn from_op_code(op_code: u8) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.op_code() == op_code.to_ascii_uppercase())
            .ok_or_else(|| Error::InvalidOperation(format!("{:?}", char::from(op_code))))
    }

    /// Look up a command by its numeric code.
    pub fn from_numeric_code(code: u8) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.numeric_code() == code)
            .ok_or_else(|| Error::InvalidOperation(code.to_string()))
    }

    /// Look up a command from user input: a single letter or a number.
    pub fn from_code(code: &str) -> Result<Self> {
        let code = code.trim();
        if let Ok(n) = code.parse::<u8>() {
            return Self::from_numeric_code(n);
        }
        match code.as_bytes() {
            [b] if b.is_ascii_alphabetic() => Self::from_op_code(*b),
            _ => Err(Error::InvalidOperation(code.to_string())),
        }
    }

    /// Pre-built command frame for this command.
    pub fn canned_frame(self, address: u8, layout: FrameLayout) -> Vec<u8> {
        CommandFrame::new(self.op_code())
            .with_address(address)
            .build(layout)
    }

    /// Pre-built command frame as an upper-case hex string.
    pub fn canned_hex(self, address: u8, layout: FrameLayout) -> String {
        to_hex(&self.canned_frame(address, layout))
    }
}

impl fmt::Display for ScaleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", char::from(self.op_code()), self.description())
    }
}

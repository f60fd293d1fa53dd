//! STX/ETX frame codec.
//!
//! ## Frame Format
//!
//! ```text
//! Addressed:
//! +-----+---------+-----+-----------+-------+-------+-----+
//! | STX | Address | CMD |  Payload  | XOR_H | XOR_L | ETX |
//! +-----+---------+-----+-----------+-------+-------+-----+
//! |  1  |    1    |  1  |  N bytes  |   1   |   1   |  1  |
//! +-----+---------+-----+-----------+-------+-------+-----+
//!
//! Unaddressed:
//! +-----+-----+-----------+-------+-------+-----+
//! | STX | CMD |  Payload  | XOR_H | XOR_L | ETX |
//! +-----+-----+-----------+-------+-------+-----+
//! ```
//!
//! The checksum covers everything between STX and the checksum characters
//! (address or command through the last payload byte) and is carried as two
//! ASCII hex digits, see [`crate::protocol::xor`].

use crate::error::{Error, Result};
use crate::protocol::weight::WeightReading;
use crate::protocol::xor::{checksum_ascii, decode_checksum, encode_checksum, xor_fold};
use log::{trace, warn};

/// Start-of-text byte.
pub const STX: u8 = 0x02;

/// End-of-text byte.
pub const ETX: u8 = 0x03;

/// Device address used when none is configured.
pub const DEFAULT_ADDRESS: u8 = b'A';

/// Bytes after the payload: two checksum characters and ETX.
const TRAILER_LEN: usize = 3;

/// Wire layout of a frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum FrameLayout {
    /// `STX, address, command, payload, xor, ETX`.
    #[default]
    Addressed,
    /// `STX, command, payload, xor, ETX`.
    Unaddressed,
}

impl FrameLayout {
    /// Bytes before the payload (STX, optional address, command).
    pub fn header_len(self) -> usize {
        match self {
            Self::Addressed => 3,
            Self::Unaddressed => 2,
        }
    }

    /// Smallest structurally valid frame (empty payload).
    pub fn min_frame_len(self) -> usize {
        self.header_len() + TRAILER_LEN
    }

    /// Whether frames carry an address byte.
    pub fn is_addressed(self) -> bool {
        matches!(self, Self::Addressed)
    }

    /// Parse a layout name (`addressed` / `unaddressed`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "addressed" => Some(Self::Addressed),
            "unaddressed" => Some(Self::Unaddressed),
            _ => None,
        }
    }
}

impl std::fmt::Display for FrameLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Addressed => write!(f, "addressed"),
            Self::Unaddressed => write!(f, "unaddressed"),
        }
    }
}

/// What to do when a frame's checksum does not match its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum ChecksumPolicy {
    /// Log a warning and keep the frame.
    #[default]
    Lenient,
    /// Reject the frame with [`Error::ChecksumMismatch`].
    Strict,
}

/// A protocol variant: frame layout plus fixed payload width.
///
/// Selected once at configuration time and consumed by both the frame codec
/// and the weight decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProtocolVariant {
    /// Header layout.
    pub layout: FrameLayout,
    /// Weight payload width in bytes (8 or 14 on known devices).
    pub payload_width: usize,
}

impl ProtocolVariant {
    /// Addressed frames with the 14-byte payload (20-byte frames).
    pub const ADDRESSED_14: Self = Self {
        layout: FrameLayout::Addressed,
        payload_width: 14,
    };

    /// Unaddressed frames with the 8-byte payload (13-byte frames).
    pub const UNADDRESSED_8: Self = Self {
        layout: FrameLayout::Unaddressed,
        payload_width: 8,
    };

    /// Create a variant.
    pub fn new(layout: FrameLayout, payload_width: usize) -> Self {
        Self {
            layout,
            payload_width,
        }
    }

    /// Full length of a weight response frame.
    pub fn frame_len(&self) -> usize {
        self.layout.header_len() + self.payload_width + TRAILER_LEN
    }

    /// Parse a weight response frame.
    ///
    /// Fails with [`Error::FrameTooShort`] below [`Self::frame_len`], then
    /// applies the structural checks of [`Frame::parse`]. A longer payload is
    /// left for the weight decoder to reject.
    pub fn decode_frame(&self, data: &[u8]) -> Result<Frame> {
        let expected = self.frame_len();
        if data.len() < expected {
            return Err(Error::FrameTooShort {
                expected,
                actual: data.len(),
            });
        }
        Frame::parse(data, self.layout)
    }

    /// Decode a response frame all the way to a weight reading.
    pub fn decode_reading(&self, data: &[u8], policy: ChecksumPolicy) -> Result<WeightReading> {
        let frame = self.decode_frame(data)?;
        frame.verify(policy)?;
        WeightReading::decode(&frame.payload, self.payload_width)
    }
}

impl Default for ProtocolVariant {
    fn default() -> Self {
        Self::ADDRESSED_14
    }
}

/// Frame builder.
///
/// Commands carry no payload; a payload is only set when producing response
/// frames (simulators, fixtures).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    address: u8,
    command: u8,
    payload: Vec<u8>,
}

impl CommandFrame {
    /// Create a command frame for the default device address.
    pub fn new(command: u8) -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            command,
            payload: Vec::new(),
        }
    }

    /// Set the device address (ignored by unaddressed layouts).
    #[must_use]
    pub fn with_address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    /// Set the payload placed between the command byte and the checksum.
    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Device address.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Command byte.
    pub fn command(&self) -> u8 {
        self.command
    }

    /// Build the complete frame data.
    pub fn build(&self, layout: FrameLayout) -> Vec<u8> {
        let mut buf = Vec::with_capacity(layout.min_frame_len() + self.payload.len());
        buf.push(STX);
        if layout.is_addressed() {
            buf.push(self.address);
        }
        buf.push(self.command);
        buf.extend_from_slice(&self.payload);

        let checksum = checksum_ascii(&buf[1..]);
        buf.extend_from_slice(&checksum);
        buf.push(ETX);
        buf
    }
}

/// Build a command frame.
///
/// `address` is used only by [`FrameLayout::Addressed`]; `None` selects
/// [`DEFAULT_ADDRESS`].
pub fn encode_command(address: Option<u8>, command: u8, layout: FrameLayout) -> Vec<u8> {
    CommandFrame::new(command)
        .with_address(address.unwrap_or(DEFAULT_ADDRESS))
        .build(layout)
}

/// A parsed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Device address (addressed layout only).
    pub address: Option<u8>,
    /// Command byte.
    pub command: u8,
    /// Payload between the command byte and the checksum.
    pub payload: Vec<u8>,
    /// XOR of the covered range, recomputed locally.
    pub computed_checksum: u8,
    /// The two checksum characters carried by the frame.
    pub carried_checksum: [u8; 2],
}

impl Frame {
    /// Parse a frame from raw data.
    ///
    /// Structural errors (too short, missing STX/ETX) fail. A checksum
    /// mismatch does not: it is recorded and checked by [`Frame::verify`].
    pub fn parse(data: &[u8], layout: FrameLayout) -> Result<Self> {
        let min = layout.min_frame_len();
        if data.len() < min {
            return Err(Error::FrameTooShort {
                expected: min,
                actual: data.len(),
            });
        }
        if data[0] != STX {
            return Err(Error::FrameMalformed(format!(
                "expected STX (0x02) at start, got {:#04x}",
                data[0]
            )));
        }
        let last = data[data.len() - 1];
        if last != ETX {
            return Err(Error::FrameMalformed(format!(
                "expected ETX (0x03) at end, got {last:#04x}"
            )));
        }

        let checksum_at = data.len() - TRAILER_LEN;
        let covered = &data[1..checksum_at];
        let (address, command) = match layout {
            FrameLayout::Addressed => (Some(data[1]), data[2]),
            FrameLayout::Unaddressed => (None, data[1]),
        };
        let frame = Self {
            address,
            command,
            payload: data[layout.header_len()..checksum_at].to_vec(),
            computed_checksum: xor_fold(covered),
            carried_checksum: [data[checksum_at], data[checksum_at + 1]],
        };
        trace!(
            "Parsed frame: address={:?} command={:#04x} payload={:02X?}",
            frame.address, frame.command, frame.payload
        );
        Ok(frame)
    }

    /// Whether the carried checksum matches the covered bytes.
    pub fn checksum_ok(&self) -> bool {
        encode_checksum(self.computed_checksum) == self.carried_checksum
    }

    /// Apply a checksum policy to this frame.
    pub fn verify(&self, policy: ChecksumPolicy) -> Result<()> {
        if self.checksum_ok() {
            return Ok(());
        }
        let [hi, lo] = self.carried_checksum;
        match policy {
            ChecksumPolicy::Lenient => {
                warn!(
                    "Checksum mismatch: frame carries {:?}, computed {:02X}",
                    String::from_utf8_lossy(&self.carried_checksum),
                    self.computed_checksum
                );
                Ok(())
            },
            ChecksumPolicy::Strict => Err(Error::ChecksumMismatch {
                expected: self.computed_checksum,
                actual: decode_checksum(hi, lo).unwrap_or(0),
            }),
        }
    }
}

/// Parse a whitespace-separated hex string such as `"02 41 42 30 33 03"`.
pub fn parse_hex(s: &str) -> Result<Vec<u8>> {
    let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(&compact).map_err(|e| Error::InvalidHex(format!("{s:?}: {e}")))
}

/// Format bytes as upper-case, space-separated hex.
pub fn to_hex(data: &[u8]) -> String {
    let encoded = hex::encode_upper(data);
    let mut out = String::with_capacity(encoded.len() + data.len());
    for (i, c) in encoded.chars().enumerate() {
        if i > 0 && i % 2 == 0 {
            out.push(' ');
        }
        out.push(c);
    }
    out
}

//! Weight payload decoding.
//!
//! ## Payload Format
//!
//! ```text
//! 8-byte payload:
//! +------+-------------+--------+
//! | Sign |   Digits    | Marker |
//! +------+-------------+--------+
//! |  1   |      6      |   1    |
//! +------+-------------+--------+
//!
//! 14-byte payload:
//! +------+-------------+------+--------+----------+--------+
//! | Sign |   Digits    | Unit | Status | Reserved | Marker |
//! +------+-------------+------+--------+----------+--------+
//! |  1   |      6      |  2   |   1    |    3     |   1    |
//! +------+-------------+------+--------+----------+--------+
//! ```
//!
//! The digit field is blank- or zero-padded. The marker is an ASCII digit
//! giving how many of the trailing digits sit after the decimal point.

use crate::error::{Error, Result};
use std::fmt;

/// Width of the numeric digit field.
pub const DIGIT_FIELD_LEN: usize = 6;

/// Largest valid decimal-position marker.
pub const MAX_DECIMAL_POSITION: u8 = 6;

/// Weight unit reported by the scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum WeightUnit {
    /// Kilograms.
    #[cfg_attr(feature = "serde", serde(rename = "kg"))]
    Kilogram,
    /// Metric tonnes.
    #[cfg_attr(feature = "serde", serde(rename = "t"))]
    Tonne,
    /// Unit field present but not recognized.
    Unknown,
}

impl WeightUnit {
    fn from_field(field: &[u8]) -> Self {
        match field {
            b"kg" | b"KG" | b"Kg" => Self::Kilogram,
            b"t " | b" t" | b"T " | b" T" => Self::Tonne,
            _ => Self::Unknown,
        }
    }

    /// Short name (`kg`, `t`, `unknown`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Kilogram => "kg",
            Self::Tonne => "t",
            Self::Unknown => "unknown",
        }
    }
}

/// Whether the reading had settled when it was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum WeightStatus {
    /// Motion has stopped.
    Stable,
    /// The load is still moving.
    Unstable,
    /// Status flag present but not recognized.
    Unknown,
}

impl WeightStatus {
    fn from_flag(flag: u8) -> Self {
        match flag {
            b'S' | b's' => Self::Stable,
            b'U' | b'u' => Self::Unstable,
            _ => Self::Unknown,
        }
    }

    /// Short name (`stable`, `unstable`, `unknown`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::Unstable => "unstable",
            Self::Unknown => "unknown",
        }
    }
}

/// A decoded weight reading.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WeightReading {
    /// Canonical signed decimal string, e.g. `"123.4"` or `"-7"`.
    pub weight: String,
    /// Unit, when the payload variant carries one.
    pub unit: Option<WeightUnit>,
    /// Stability, when the payload variant carries it.
    pub status: Option<WeightStatus>,
}

impl WeightReading {
    /// Decode a weight payload of the given width.
    pub fn decode(payload: &[u8], width: usize) -> Result<Self> {
        if payload.len() != width || width < DIGIT_FIELD_LEN + 2 {
            return Err(Error::InvalidPayloadWidth {
                expected: width,
                actual: payload.len(),
            });
        }

        let negative = match payload[0] {
            b'+' | b' ' => false,
            b'-' => true,
            other => {
                return Err(Error::InvalidPayload(format!(
                    "invalid sign byte {other:#04x}"
                )));
            },
        };

        let marker = payload[width - 1];
        let decimals = marker.wrapping_sub(b'0');
        if decimals > MAX_DECIMAL_POSITION {
            return Err(Error::InvalidDecimalMarker(marker));
        }

        let digits = &payload[1..=DIGIT_FIELD_LEN];
        let weight = format_weight(negative, digits, usize::from(decimals))?;

        let (unit, status) = if width >= 14 {
            (
                Some(WeightUnit::from_field(&payload[7..9])),
                Some(WeightStatus::from_flag(payload[9])),
            )
        } else {
            (None, None)
        };

        Ok(Self {
            weight,
            unit,
            status,
        })
    }
}

impl fmt::Display for WeightReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.weight)?;
        if let Some(unit) = self.unit.filter(|u| *u != WeightUnit::Unknown) {
            write!(f, " {}", unit.as_str())?;
        }
        Ok(())
    }
}

/// Decode a weight payload into its canonical numeric string.
pub fn decode_weight(payload: &[u8], width: usize) -> Result<String> {
    WeightReading::decode(payload, width).map(|reading| reading.weight)
}

/// Render sign, digit field and decimal position as a canonical number.
///
/// A zero marker renders an integer. A marker inside the digit string places
/// the point; a marker reaching past it leaves the digits whole and only adds
/// the fractional part. The fractional part keeps at least one digit (`-5.0`)
/// and drops further trailing zeros (`120.5`).
fn format_weight(negative: bool, field: &[u8], decimals: usize) -> Result<String> {
    let text = std::str::from_utf8(field)
        .map_err(|_| Error::InvalidPayload("digit field is not ASCII".into()))?
        .trim_matches(' ');
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidPayload(format!(
            "digit field {:?} is not numeric",
            String::from_utf8_lossy(field)
        )));
    }

    let (int_part, frac_part) = if decimals < text.len() {
        text.split_at(text.len() - decimals)
    } else {
        (text, "")
    };
    let int_part = int_part.trim_start_matches('0');
    let int_part = if int_part.is_empty() { "0" } else { int_part };

    let mut out = String::with_capacity(text.len() + 3);
    if decimals > 0 {
        let frac = frac_part.trim_end_matches('0');
        let frac = if frac.is_empty() { "0" } else { frac };
        let is_zero = int_part == "0" && frac == "0";
        if negative && !is_zero {
            out.push('-');
        }
        out.push_str(int_part);
        out.push('.');
        out.push_str(frac);
    } else {
        if negative && int_part != "0" {
            out.push('-');
        }
        out.push_str(int_part);
    }
    Ok(out)
}

//! Wire protocol: frame codec, checksum, command catalog and weight decoder.

pub mod command;
pub mod frame;
pub mod weight;
pub mod xor;

// Re-export common types
pub use command::ScaleCommand;
pub use frame::{
    ChecksumPolicy, CommandFrame, DEFAULT_ADDRESS, ETX, Frame, FrameLayout, ProtocolVariant, STX,
    encode_command, parse_hex, to_hex,
};
pub use weight::{WeightReading, WeightStatus, WeightUnit, decode_weight};

//! # scalelink
//!
//! A library for talking to industrial weighing scales over serial lines.
//!
//! This crate provides:
//!
//! - The STX/ETX frame codec with its ASCII-hex XOR checksum
//! - The fixed-width weight payload decoder (8- and 14-byte variants)
//! - The scale command catalog (handshake, gross/tare/net, zero, tare, ...)
//! - Port sessions with serialized request/response exchanges
//! - Background listeners that publish readings and reconnect on failure
//! - A port registry owning every session and listener
//!
//! ## Features
//!
//! - `native` (default): host serial ports via the `serialport` crate
//! - `serde`: Serialization support for configuration and readings
//!
//! ## Example
//!
//! ```rust,no_run
//! use scalelink::{ChecksumPolicy, FrameLayout, ProtocolVariant, ScaleCommand};
//!
//! fn main() -> scalelink::Result<()> {
//!     // Build the "read gross weight" command frame.
//!     let frame = ScaleCommand::ReadGross.canned_frame(b'A', FrameLayout::Addressed);
//!     assert_eq!(scalelink::protocol::to_hex(&frame), "02 41 42 30 33 03");
//!
//!     // Decode a response captured from the wire.
//!     let response = scalelink::protocol::parse_hex(
//!         "02 41 42 2B 30 30 31 32 33 34 6B 67 53 20 20 20 32 36 31 03",
//!     )?;
//!     let reading = ProtocolVariant::ADDRESSED_14.decode_reading(&response, ChecksumPolicy::Lenient)?;
//!     println!("{reading}");
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod device;
pub mod error;
pub mod listener;
pub mod port;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod sink;

#[cfg(feature = "native")]
pub use port::{NativeDriver, NativePort};
pub use {
    device::{DetectedPort, format_port_list},
    error::{Error, Result},
    listener::{Decoding, ListenerConfig, ListenerState, PortListener},
    port::{Port, PortDriver, PortInfo, SerialConfig},
    protocol::{
        ChecksumPolicy, CommandFrame, Frame, FrameLayout, ProtocolVariant, ScaleCommand,
        WeightReading, WeightStatus, WeightUnit, decode_weight, encode_command,
    },
    registry::{PortRegistry, RegistryConfig},
    session::{ExchangeConfig, PortSession},
    sink::{CacheSink, MemoryCache, PortMappings, UNKNOWN_CACHE_KEY},
};

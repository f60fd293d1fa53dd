//! Offline frame encoding and decoding.

use {
    anyhow::Result,
    console::style,
    scalelink::{
        RegistryConfig, ScaleCommand,
        protocol::{self, DEFAULT_ADDRESS},
    },
};

/// Print the command frame for an operation code.
pub(crate) fn cmd_encode(op: &str, registry: &RegistryConfig, json: bool) -> Result<()> {
    let command = ScaleCommand::from_code(op)?;
    let address = registry.address.unwrap_or(DEFAULT_ADDRESS);
    let frame = command.canned_hex(address, registry.variant.layout);

    if json {
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "command": char::from(command.op_code()).to_string(),
                "code": command.numeric_code(),
                "description": command.description(),
                "layout": registry.variant.layout.to_string(),
                "frame": frame,
            }
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        eprintln!("{}", style(command).cyan());
        println!("{frame}");
    }
    Ok(())
}

/// Decode a response frame given as hex and print the reading.
pub(crate) fn cmd_decode(hex: &str, registry: &RegistryConfig, json: bool) -> Result<()> {
    let data = protocol::parse_hex(hex)?;
    let frame = registry.variant.decode_frame(&data)?;
    let checksum_ok = frame.checksum_ok();
    let reading = registry
        .variant
        .decode_reading(&data, registry.checksum_policy)?;

    if json {
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "command": char::from(frame.command).to_string(),
                "checksum_ok": checksum_ok,
                "reading": reading,
            }
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        eprintln!(
            "{} {}",
            style("Reading:").cyan(),
            style(&reading).green().bold()
        );
        println!("{}", reading.weight);
    }
    Ok(())
}

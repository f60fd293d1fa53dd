//! One-shot reading commands.

use {
    crate::CliError,
    anyhow::{Context, Result},
    console::style,
    log::debug,
    scalelink::{NativeDriver, PortSession, RegistryConfig, ScaleCommand, WeightReading},
    std::sync::Arc,
};

fn open_session(port: &str, registry: &RegistryConfig) -> Result<PortSession> {
    let session = PortSession::new(Arc::new(NativeDriver), registry.serial.for_port(port))
        .with_exchange(registry.exchange);
    session
        .reopen()
        .with_context(|| format!("failed to open {port}"))?;
    Ok(session)
}

fn print_reading(port: &str, reading: &WeightReading, json: bool) -> Result<()> {
    if json {
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "port": port,
                "reading": reading,
            }
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        let status = reading
            .status
            .map(|s| format!(" ({})", s.as_str()))
            .unwrap_or_default();
        eprintln!(
            "{} {}{}",
            style(format!("{port}:")).cyan(),
            style(reading).green().bold(),
            style(status).dim()
        );
        println!("{}", reading.weight);
    }
    Ok(())
}

/// Send one command and print the decoded weight.
pub(crate) fn cmd_read(port: &str, op: &str, registry: &RegistryConfig, json: bool) -> Result<()> {
    let command = ScaleCommand::from_code(op)?;
    let session = open_session(port, registry)?;
    debug!("Sending {command} to {port}");

    let result = session.request(
        command,
        registry.address,
        registry.variant,
        registry.checksum_policy,
    );
    session.close()?;

    let reading = result.with_context(|| format!("{command} on {port} failed"))?;
    print_reading(port, &reading, json)
}

/// Wait for one frame the scale sends unprompted and print it.
pub(crate) fn cmd_poll(port: &str, registry: &RegistryConfig, json: bool) -> Result<()> {
    let session = open_session(port, registry)?;
    let frame = session.read_frame(registry.variant.frame_len());
    session.close()?;

    let frame = frame?;
    if frame.is_empty() {
        return Err(CliError::Device(format!("no data received from {port}")).into());
    }
    let reading = registry
        .variant
        .decode_reading(&frame, registry.checksum_policy)
        .with_context(|| format!("invalid frame from {port}"))?;
    print_reading(port, &reading, json)
}

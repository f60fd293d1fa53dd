//! Port listing command implementation.

use {
    anyhow::Result,
    console::style,
    scalelink::{NativeDriver, device},
};

/// List ports command implementation.
pub(crate) fn cmd_list_ports(json: bool) -> Result<()> {
    let detected = device::detect_ports();

    if json {
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "ports": detected,
            }
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    eprintln!("{}", style("Available serial ports:").bold().underlined());

    if detected.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
        return Ok(());
    }

    for line in device::format_port_list(&detected) {
        eprintln!("  {} {}", style("*").green(), line);
    }

    // Show auto-detection result
    if let Ok(auto_port) = device::auto_detect_port_with(&NativeDriver) {
        eprintln!(
            "\n{} Suggested port: {}",
            style("->").green().bold(),
            style(&auto_port.name).cyan().bold()
        );
    }

    Ok(())
}

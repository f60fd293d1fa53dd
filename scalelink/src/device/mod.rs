//! Serial port discovery.
//!
//! Scales are usually wired through a USB-to-UART adapter; USB identity
//! helps users pick the right port among several.

use {
    crate::{
        error::{Error, Result},
        port::{PortDriver, PortInfo},
    },
    log::{debug, info, trace},
};

/// A discovered serial port.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DetectedPort {
    /// Port name/path (e.g., "/dev/ttyUSB0" or "COM3").
    pub name: String,
    /// USB Vendor ID (if available).
    pub vid: Option<u16>,
    /// USB Product ID (if available).
    pub pid: Option<u16>,
    /// Device manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Device product string (if available).
    pub product: Option<String>,
    /// Serial number (if available).
    pub serial: Option<String>,
}

impl DetectedPort {
    /// Whether the port sits behind a USB adapter.
    pub fn is_usb(&self) -> bool {
        self.vid.is_some() && self.pid.is_some()
    }
}

impl From<PortInfo> for DetectedPort {
    fn from(info: PortInfo) -> Self {
        if let (Some(vid), Some(pid)) = (info.vid, info.pid) {
            trace!("Found USB port: {} (VID: {vid:04X}, PID: {pid:04X})", info.name);
        }
        Self {
            name: info.name,
            vid: info.vid,
            pid: info.pid,
            manufacturer: info.manufacturer,
            product: info.product,
            serial: info.serial_number,
        }
    }
}

/// Enumerate ports through `driver`. Enumeration failures yield an empty list.
pub fn detect_ports_with(driver: &dyn PortDriver) -> Vec<DetectedPort> {
    match driver.list_ports() {
        Ok(ports) => ports.into_iter().map(DetectedPort::from).collect(),
        Err(e) => {
            debug!("Failed to enumerate serial ports: {e}");
            Vec::new()
        },
    }
}

/// Enumerate the host's serial ports.
#[cfg(feature = "native")]
pub fn detect_ports() -> Vec<DetectedPort> {
    detect_ports_with(&crate::port::NativeDriver)
}

/// Pick a single port: the first USB-attached one, else the first port.
pub fn auto_detect_port_with(driver: &dyn PortDriver) -> Result<DetectedPort> {
    let ports = detect_ports_with(driver);

    if let Some(port) = ports.iter().find(|p| p.is_usb()) {
        info!("Auto-detected USB port: {}", port.name);
        return Ok(port.clone());
    }

    if let Some(port) = ports.into_iter().next() {
        info!("Using first available port: {}", port.name);
        return Ok(port);
    }

    Err(Error::PortNotFound("no serial ports available".into()))
}

/// Format a list of detected ports for display.
pub fn format_port_list(ports: &[DetectedPort]) -> Vec<String> {
    ports
        .iter()
        .map(|port| {
            let usb_info = match (port.vid, port.pid) {
                (Some(vid), Some(pid)) => format!(" [VID:{vid:04X} PID:{pid:04X}]"),
                _ => String::new(),
            };

            let product_info = port
                .product
                .as_ref()
                .map(|p| format!(" - {p}"))
                .unwrap_or_default();

            format!("{}{}{}", port.name, usb_info, product_info)
        })
        .collect()
}

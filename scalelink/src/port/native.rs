//! Native serial port implementation using the `serialport` crate.

use {
    crate::{
        error::{Error, Result},
        port::{
            DataBits, FlowControl, Parity, Port, PortDriver, PortInfo, SerialConfig, StopBits,
        },
    },
    log::{debug, trace},
    std::io::{self, Read, Write},
};

/// Native serial port implementation.
pub struct NativePort {
    port: Option<Box<dyn serialport::SerialPort>>,
    name: String,
}

impl NativePort {
    /// Open a serial port with the given configuration.
    ///
    /// `serialport` applies one timeout to both directions; the larger of the
    /// configured read and write timeouts is used.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let timeout = config
            .read_timeout
            .max(config.write_timeout);
        let port = serialport::new(&config.port_name, config.baud_rate)
            .timeout(timeout)
            .data_bits(config.data_bits.into())
            .parity(config.parity.into())
            .stop_bits(config.stop_bits.into())
            .flow_control(config.flow_control.into())
            .open()
            .map_err(|e| open_error(&config.port_name, e))?;

        debug!(
            "Opened {} at {} baud (timeout {:?})",
            config.port_name, config.baud_rate, timeout
        );

        Ok(Self {
            port: Some(port),
            name: config.port_name.clone(),
        })
    }
}

fn open_error(port: &str, err: serialport::Error) -> Error {
    match err.kind() {
        serialport::ErrorKind::NoDevice
        | serialport::ErrorKind::Io(io::ErrorKind::NotFound) => {
            Error::PortNotFound(port.to_string())
        },
        _ => Error::PortOpenFailed {
            port: port.to_string(),
            reason: err.to_string(),
        },
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "port closed")
}

impl Port for NativePort {
    fn name(&self) -> &str {
        &self.name
    }

    fn bytes_to_read(&mut self) -> Result<usize> {
        match self.port {
            Some(ref mut p) => Ok(usize::try_from(p.bytes_to_read()?).unwrap_or(usize::MAX)),
            None => Err(closed().into()),
        }
    }

    fn set_rts(&mut self, level: bool) -> Result<()> {
        trace!("Setting RTS to {level}");
        if let Some(ref mut p) = self.port {
            p.write_request_to_send(level)?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the handle closes the descriptor.
        self.port.take();
        Ok(())
    }
}

impl Read for NativePort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port
            .as_mut()
            .ok_or_else(closed)
            .and_then(|p| p.read(buf))
    }
}

impl Write for NativePort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port
            .as_mut()
            .ok_or_else(closed)
            .and_then(|p| p.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port
            .as_mut()
            .ok_or_else(closed)
            .and_then(Write::flush)
    }
}

/// Driver for the host's serial ports.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeDriver;

impl PortDriver for NativeDriver {
    fn list_ports(&self) -> Result<Vec<PortInfo>> {
        let ports = serialport::available_ports().map_err(Error::Serial)?;

        Ok(ports
            .into_iter()
            .map(|p| match p.port_type {
                serialport::SerialPortType::UsbPort(info) => PortInfo {
                    name: p.port_name,
                    vid: Some(info.vid),
                    pid: Some(info.pid),
                    manufacturer: info.manufacturer,
                    product: info.product,
                    serial_number: info.serial_number,
                },
                _ => PortInfo::named(p.port_name),
            })
            .collect())
    }

    fn open(&self, config: &SerialConfig) -> Result<Box<dyn Port>> {
        Ok(Box::new(NativePort::open(config)?))
    }
}

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => Self::Five,
            DataBits::Six => Self::Six,
            DataBits::Seven => Self::Seven,
            DataBits::Eight => Self::Eight,
        }
    }
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => Self::None,
            Parity::Odd => Self::Odd,
            Parity::Even => Self::Even,
        }
    }
}

impl From<StopBits> for serialport::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => Self::One,
            StopBits::Two => Self::Two,
        }
    }
}

impl From<FlowControl> for serialport::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => Self::None,
            FlowControl::Hardware => Self::Hardware,
            FlowControl::Software => Self::Software,
        }
    }
}

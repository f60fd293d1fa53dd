//! One open serial port and the exchanges performed on it.
//!
//! A [`PortSession`] owns at most one port handle. The handle sits behind a
//! mutex that doubles as the exchange lock: a foreground
//! [`write_and_read`](PortSession::write_and_read) and a listener tick on the
//! same port never interleave. The open flag lives outside that lock, so
//! [`is_open`](PortSession::is_open) answers while an exchange is running.

use {
    crate::{
        error::{Error, Result},
        port::{Port, PortDriver, SerialConfig},
        protocol::{
            ChecksumPolicy, ProtocolVariant, ScaleCommand, WeightReading, encode_command, to_hex,
        },
    },
    log::{debug, info, trace, warn},
    std::{
        io::{ErrorKind, Read},
        sync::{
            Arc, Mutex, MutexGuard, PoisonError,
            atomic::{AtomicBool, Ordering},
        },
        thread,
        time::{Duration, Instant},
    },
};

/// Default wait between writing a command and draining the response.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Request/response exchange timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExchangeConfig {
    /// Sleep after a successful write so the device can answer.
    pub settle_delay: Duration,
    /// Upper bound on the drain loop; `None` drains until the input is empty.
    pub max_wait: Option<Duration>,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            max_wait: None,
        }
    }
}

/// A serial port session.
pub struct PortSession {
    config: SerialConfig,
    exchange: ExchangeConfig,
    driver: Arc<dyn PortDriver>,
    port: Mutex<Option<Box<dyn Port>>>,
    open: AtomicBool,
}

impl std::fmt::Debug for PortSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortSession")
            .field("port", &self.config.port_name)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl PortSession {
    /// Create a closed session for `config.port_name`.
    pub fn new(driver: Arc<dyn PortDriver>, config: SerialConfig) -> Self {
        Self {
            config,
            exchange: ExchangeConfig::default(),
            driver,
            port: Mutex::new(None),
            open: AtomicBool::new(false),
        }
    }

    /// Set the exchange timing.
    #[must_use]
    pub fn with_exchange(mut self, exchange: ExchangeConfig) -> Self {
        self.exchange = exchange;
        self
    }

    /// Create a session and open it.
    pub fn open(driver: Arc<dyn PortDriver>, config: SerialConfig) -> Result<Self> {
        let session = Self::new(driver, config);
        session.reopen()?;
        Ok(session)
    }

    /// Port name.
    pub fn name(&self) -> &str {
        &self.config.port_name
    }

    /// Line settings used when (re)opening.
    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    /// Exchange timing.
    pub fn exchange(&self) -> &ExchangeConfig {
        &self.exchange
    }

    fn lock(&self) -> MutexGuard<'_, Option<Box<dyn Port>>> {
        self.port
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Open the port if it is not open already.
    ///
    /// Fails with [`Error::PortNotFound`] when no such system port exists and
    /// with [`Error::PortOpenFailed`] when the driver refuses to open it.
    pub fn reopen(&self) -> Result<()> {
        let mut guard = self.lock();
        if guard.is_some() {
            return Ok(());
        }

        let name = self.name();
        if !self.driver.port_exists(name)? {
            return Err(Error::PortNotFound(name.to_string()));
        }

        let mut port = self.driver.open(&self.config)?;
        if let Err(e) = port.set_rts(true) {
            warn!("Failed to set RTS on {name}: {e}");
        }

        info!("Opened {name} at {} baud", self.config.baud_rate);
        *guard = Some(port);
        self.open.store(true, Ordering::Release);
        Ok(())
    }

    /// Whether the port is open. Never waits on an exchange.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Close the port. Closing a closed session does nothing.
    pub fn close(&self) -> Result<()> {
        let mut guard = self.lock();
        self.open.store(false, Ordering::Release);
        let Some(mut port) = guard.take() else {
            return Ok(());
        };
        drop(guard);
        info!("Closing {}", self.name());
        port.close()
    }

    /// Write `data`. Returns 0 when the port is not open.
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        let mut guard = self.lock();
        let Some(port) = guard.as_mut() else {
            return Ok(0);
        };
        trace!("TX {}: {}", self.name(), to_hex(data));
        port.write_all_bytes(data)?;
        Ok(data.len())
    }

    /// Read into `buf`. Returns 0 when the port is not open or nothing arrived
    /// before the read timeout.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut guard = self.lock();
        let Some(port) = guard.as_mut() else {
            return Ok(0);
        };
        match port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Write a command, wait for the device to settle, then drain every byte
    /// currently available.
    ///
    /// The result may be empty when the device did not answer; frame decoding
    /// rejects that later.
    pub fn write_and_read(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut guard = self.lock();
        let port = guard
            .as_mut()
            .ok_or_else(|| Error::PortNotOpen(self.name().to_string()))?;

        trace!("TX {}: {}", self.name(), to_hex(data));
        port.write_all_bytes(data)?;
        if !data.is_empty() {
            thread::sleep(self.exchange.settle_delay);
        }

        let started = Instant::now();
        let mut response = Vec::new();
        loop {
            let available = port.bytes_to_read()?;
            if available == 0 {
                break;
            }
            let mut chunk = vec![0u8; available];
            match port.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => response.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::TimedOut => break,
                Err(e) => return Err(e.into()),
            }
            if self
                .exchange
                .max_wait
                .is_some_and(|limit| started.elapsed() >= limit)
            {
                debug!("{}: drain stopped after {:?}", self.name(), started.elapsed());
                break;
            }
        }

        trace!("RX {}: {}", self.name(), to_hex(&response));
        Ok(response)
    }

    /// Blocking read of up to `len` bytes.
    ///
    /// Stops early when the port times out, so the result may be short.
    pub fn read_frame(&self, len: usize) -> Result<Vec<u8>> {
        let mut guard = self.lock();
        let port = guard
            .as_mut()
            .ok_or_else(|| Error::PortNotOpen(self.name().to_string()))?;
        let frame = fill(&mut **port, len)?;
        trace!("RX {}: {}", self.name(), to_hex(&frame));
        Ok(frame)
    }

    /// Read one frame if any bytes are waiting, without blocking otherwise.
    pub fn poll_frame(&self, len: usize) -> Result<Option<Vec<u8>>> {
        let mut guard = self.lock();
        let port = guard
            .as_mut()
            .ok_or_else(|| Error::PortNotOpen(self.name().to_string()))?;
        if port.bytes_to_read()? == 0 {
            return Ok(None);
        }
        let frame = fill(&mut **port, len)?;
        trace!("RX {}: {}", self.name(), to_hex(&frame));
        Ok(Some(frame))
    }

    /// Send `command` and decode the weight in the response.
    pub fn request(
        &self,
        command: ScaleCommand,
        address: Option<u8>,
        variant: ProtocolVariant,
        policy: ChecksumPolicy,
    ) -> Result<WeightReading> {
        debug!("{}: sending {command}", self.name());
        let frame = encode_command(address, command.op_code(), variant.layout);
        let response = self.write_and_read(&frame)?;
        variant.decode_reading(&response, policy)
    }
}

fn fill(port: &mut dyn Port, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        match port.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::TimedOut => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => {},
            Err(e) => return Err(e.into()),
        }
    }
    buf.truncate(filled);
    Ok(buf)
}

//! Port registry: the owner of every session and listener.
//!
//! The registry tracks ports by system name, opens sessions on demand and
//! attaches one [`PortListener`] to each open port. The registry lock guards
//! only the map of tracked ports. Session calls and listener joins run on
//! cloned entry handles after it is released, and opening or closing one
//! port is serialized by that port's own lifecycle lock, so a slow device
//! never blocks other ports.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::{collections::HashMap, sync::Arc};
//! use scalelink::{MemoryCache, PortRegistry, RegistryConfig};
//!
//! fn main() -> scalelink::Result<()> {
//!     let cache = Arc::new(MemoryCache::new());
//!     let mut mappings = HashMap::new();
//!     mappings.insert("COM3".to_string(), "scale1".to_string());
//!
//!     let registry = PortRegistry::native(RegistryConfig::default(), cache.clone(), Arc::new(mappings));
//!     registry.add_port("COM3");
//!     registry.open_port("COM3")?;
//!
//!     let reading = registry.execute("COM3", "B", None)?;
//!     println!("gross: {reading}");
//!     println!("cached: {:?}", cache.get("scale1"));
//!
//!     registry.shutdown();
//!     Ok(())
//! }
//! ```

use {
    crate::{
        error::{Error, Result},
        listener::{Decoding, ListenerConfig, ListenerState, PortListener},
        port::{PortDriver, SerialConfig},
        protocol::{ChecksumPolicy, ProtocolVariant, ScaleCommand, WeightReading},
        session::{ExchangeConfig, PortSession},
        sink::{CacheSink, PortMappings},
    },
    log::{debug, error, info, warn},
    std::{
        collections::{BTreeMap, btree_map},
        mem,
        sync::{Arc, Mutex, MutexGuard, PoisonError},
    },
};

/// Everything the registry needs to open and poll a port.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RegistryConfig {
    /// Line settings; the port name is replaced per port.
    pub serial: SerialConfig,
    /// Request/response timing.
    pub exchange: ExchangeConfig,
    /// Listener timing.
    pub listener: ListenerConfig,
    /// Frame shape and payload width.
    pub variant: ProtocolVariant,
    /// Checksum handling.
    pub checksum_policy: ChecksumPolicy,
    /// Device address for commands; `None` uses the protocol default.
    pub address: Option<u8>,
}

impl RegistryConfig {
    fn decoding(&self) -> Decoding {
        Decoding {
            variant: self.variant,
            policy: self.checksum_policy,
        }
    }
}

/// One tracked port.
///
/// The listener slot's mutex is the port's lifecycle lock: opening and
/// closing the port both hold it, so at most one listener ever runs against
/// the session.
struct PortEntry {
    session: Arc<PortSession>,
    listener: Mutex<Option<PortListener>>,
}

impl PortEntry {
    fn listener(&self) -> MutexGuard<'_, Option<PortListener>> {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Tracks ports, their sessions and their listeners.
pub struct PortRegistry {
    config: RegistryConfig,
    driver: Arc<dyn PortDriver>,
    sink: Arc<dyn CacheSink>,
    mappings: Arc<dyn PortMappings>,
    ports: Mutex<BTreeMap<String, Arc<PortEntry>>>,
}

impl PortRegistry {
    /// Create an empty registry.
    pub fn new(
        config: RegistryConfig,
        driver: Arc<dyn PortDriver>,
        sink: Arc<dyn CacheSink>,
        mappings: Arc<dyn PortMappings>,
    ) -> Self {
        Self {
            config,
            driver,
            sink,
            mappings,
            ports: Mutex::new(BTreeMap::new()),
        }
    }

    /// Create a registry over the host's serial ports.
    #[cfg(feature = "native")]
    pub fn native(
        config: RegistryConfig,
        sink: Arc<dyn CacheSink>,
        mappings: Arc<dyn PortMappings>,
    ) -> Self {
        Self::new(config, Arc::new(crate::port::NativeDriver), sink, mappings)
    }

    /// Registry configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Arc<PortEntry>>> {
        self.ports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn entry(&self, name: &str) -> Option<Arc<PortEntry>> {
        self.lock()
            .get(name)
            .cloned()
    }

    fn new_entry(&self, name: &str) -> Arc<PortEntry> {
        debug!("Tracking {name}");
        let session = PortSession::new(Arc::clone(&self.driver), self.config.serial.for_port(name))
            .with_exchange(self.config.exchange);
        Arc::new(PortEntry {
            session: Arc::new(session),
            listener: Mutex::new(None),
        })
    }

    /// Entry for `name`, tracking it first if such a system port exists.
    fn track(&self, name: &str) -> Option<Arc<PortEntry>> {
        if let Some(entry) = self.entry(name) {
            return Some(entry);
        }
        // Enumeration runs without the registry lock.
        match self.driver.port_exists(name) {
            Ok(true) => Some(Arc::clone(
                self.lock()
                    .entry(name.to_string())
                    .or_insert_with(|| self.new_entry(name)),
            )),
            Ok(false) => {
                debug!("Not tracking {name}: no such port");
                None
            },
            Err(e) => {
                warn!("Not tracking {name}: port enumeration failed: {e}");
                None
            },
        }
    }

    fn session(&self, name: &str) -> Result<Arc<PortSession>> {
        self.entry(name)
            .map(|entry| Arc::clone(&entry.session))
            .ok_or_else(|| Error::PortNotManaged(name.to_string()))
    }

    /// Start tracking `name` if such a system port exists.
    ///
    /// Returns `true` when the port is tracked afterwards, including when it
    /// already was.
    pub fn add_port(&self, name: &str) -> bool {
        self.track(name).is_some()
    }

    /// Track every system port that currently exists. Returns the newly
    /// tracked names.
    pub fn add_all_ports(&self) -> Vec<String> {
        let available = match self.driver.list_ports() {
            Ok(available) => available,
            Err(e) => {
                warn!("Port enumeration failed: {e}");
                return Vec::new();
            },
        };

        let mut ports = self.lock();
        let mut added = Vec::new();
        for info in available {
            if let btree_map::Entry::Vacant(slot) = ports.entry(info.name.clone()) {
                slot.insert(self.new_entry(&info.name));
                added.push(info.name);
            }
        }
        added
    }

    /// Names of every tracked port, sorted.
    pub fn tracked_ports(&self) -> Vec<String> {
        self.lock()
            .keys()
            .cloned()
            .collect()
    }

    /// Cache key readings from `name` are published under.
    pub fn cache_key(&self, name: &str) -> String {
        self.mappings.cache_key_for(name)
    }

    /// Open `name` and start its listener.
    ///
    /// Untracked ports are added first. Opening an open port does nothing.
    pub fn open_port(&self, name: &str) -> Result<()> {
        let entry = self
            .track(name)
            .ok_or_else(|| Error::PortNotFound(name.to_string()))?;
        let mut listener = entry.listener();

        if listener.is_some() && entry.session.is_open() {
            debug!("{name} already open");
            return Ok(());
        }

        entry.session.reopen()?;
        if listener.is_none() {
            let started = PortListener::start(
                Arc::clone(&entry.session),
                self.cache_key(name),
                Arc::clone(&self.sink),
                self.config.decoding(),
                self.config.listener,
            );
            match started {
                Ok(started) => *listener = Some(started),
                Err(e) => {
                    if let Err(close_err) = entry.session.close() {
                        debug!("Closing {name} after listener failure: {close_err}");
                    }
                    return Err(e);
                },
            }
        }
        info!("Opened {name}");
        Ok(())
    }

    /// Whether `name` is tracked and open. Never waits on an exchange.
    pub fn is_port_open(&self, name: &str) -> bool {
        self.entry(name)
            .is_some_and(|entry| entry.session.is_open())
    }

    /// State of the listener attached to `name`, if any.
    pub fn listener_state(&self, name: &str) -> Option<ListenerState> {
        let entry = self.entry(name)?;
        let listener = entry.listener();
        listener
            .as_ref()
            .map(PortListener::state)
    }

    /// Stop the listener of `name`, then close its session.
    ///
    /// The port stays tracked. Closing a tracked port that is not open does
    /// nothing; an untracked name fails with [`Error::PortNotManaged`].
    pub fn close_port(&self, name: &str) -> Result<()> {
        let entry = self
            .entry(name)
            .ok_or_else(|| Error::PortNotManaged(name.to_string()))?;
        let mut listener = entry.listener();
        if let Some(mut running) = listener.take() {
            running.stop();
        }
        entry.session.close()
    }

    /// Write raw bytes to `name`. Returns 0 when the port is not open.
    pub fn write(&self, name: &str, data: &[u8]) -> Result<usize> {
        self.session(name)?.write(data)
    }

    /// Read raw bytes from `name`. Returns 0 when the port is not open.
    pub fn read(&self, name: &str, buf: &mut [u8]) -> Result<usize> {
        self.session(name)?.read(buf)
    }

    /// Write then drain the response on `name`.
    pub fn write_and_read(&self, name: &str, data: &[u8]) -> Result<Vec<u8>> {
        self.session(name)?.write_and_read(data)
    }

    /// Read one frame from `name` without sending anything and decode it.
    pub fn read_weight_once(&self, name: &str) -> Result<String> {
        let frame_len = self.config.variant.frame_len();
        let frame = self.session(name)?.read_frame(frame_len)?;
        self.config
            .variant
            .decode_reading(&frame, self.config.checksum_policy)
            .map(|reading| reading.weight)
    }

    /// Send the command named by `code` (letter or number) to `name` and
    /// decode the response.
    pub fn execute(&self, name: &str, code: &str, address: Option<u8>) -> Result<WeightReading> {
        let command = ScaleCommand::from_code(code)?;
        self.session(name)?.request(
            command,
            address.or(self.config.address),
            self.config.variant,
            self.config.checksum_policy,
        )
    }

    /// Close every tracked port. Failures are logged and skipped.
    pub fn close_all_ports(&self) {
        for name in self.tracked_ports() {
            if let Err(e) = self.close_port(&name) {
                error!("Failed to close {name}: {e}");
            }
        }
    }

    /// Close every port and forget all of them.
    pub fn shutdown(&self) {
        self.close_all_ports();
        let entries = mem::take(&mut *self.lock());
        drop(entries);
        info!("Port registry shut down");
    }
}

impl std::fmt::Debug for PortRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortRegistry")
            .field("ports", &self.tracked_ports())
            .finish_non_exhaustive()
    }
}

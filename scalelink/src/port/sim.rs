//! Simulated scale driver for tests.
//!
//! All handles opened from one [`SimDriver`] share its state, so a test can
//! keep the driver, hand a clone to the code under test and then inject
//! inbound bytes, canned responses or failures while it runs.

use {
    crate::{
        error::{Error, Result},
        port::{Port, PortDriver, PortInfo, SerialConfig},
    },
    std::{
        collections::{HashMap, VecDeque},
        io::{self, Read, Write},
        sync::{Arc, Mutex, MutexGuard},
    },
};

#[derive(Default)]
struct SimState {
    ports: Vec<PortInfo>,
    list_fails: bool,
    inbound: HashMap<String, VecDeque<u8>>,
    responses: HashMap<String, Vec<(Vec<u8>, Vec<u8>)>>,
    written: HashMap<String, Vec<Vec<u8>>>,
    read_failures: HashMap<String, usize>,
    write_failures: HashMap<String, usize>,
    open_failures: HashMap<String, usize>,
    opens: HashMap<String, usize>,
    rts: HashMap<String, bool>,
}

fn take_failure(counter: &mut HashMap<String, usize>, name: &str) -> bool {
    match counter.get_mut(name) {
        Some(n) if *n > 0 => {
            *n -= 1;
            true
        },
        _ => false,
    }
}

#[derive(Clone, Default)]
pub(crate) struct SimDriver {
    state: Arc<Mutex<SimState>>,
}

impl SimDriver {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Driver with plain named ports present.
    pub(crate) fn with_ports(names: &[&str]) -> Self {
        let driver = Self::new();
        for name in names {
            driver.add_port(PortInfo::named(*name));
        }
        driver
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub(crate) fn add_port(&self, info: PortInfo) {
        self.state().ports.push(info);
    }

    pub(crate) fn remove_port(&self, name: &str) {
        self.state().ports.retain(|p| p.name != name);
    }

    pub(crate) fn fail_listing(&self, fail: bool) {
        self.state().list_fails = fail;
    }

    /// Queue bytes as if the scale had sent them.
    pub(crate) fn push_inbound(&self, name: &str, bytes: &[u8]) {
        self.state()
            .inbound
            .entry(name.to_string())
            .or_default()
            .extend(bytes);
    }

    pub(crate) fn inbound_len(&self, name: &str) -> usize {
        self.state()
            .inbound
            .get(name)
            .map_or(0, VecDeque::len)
    }

    /// Answer `request` with `response` whenever it is written to `name`.
    pub(crate) fn respond_to(&self, name: &str, request: &[u8], response: &[u8]) {
        self.state()
            .responses
            .entry(name.to_string())
            .or_default()
            .push((request.to_vec(), response.to_vec()));
    }

    pub(crate) fn fail_reads(&self, name: &str, count: usize) {
        self.state()
            .read_failures
            .insert(name.to_string(), count);
    }

    pub(crate) fn fail_writes(&self, name: &str, count: usize) {
        self.state()
            .write_failures
            .insert(name.to_string(), count);
    }

    pub(crate) fn fail_opens(&self, name: &str, count: usize) {
        self.state()
            .open_failures
            .insert(name.to_string(), count);
    }

    pub(crate) fn written(&self, name: &str) -> Vec<Vec<u8>> {
        self.state()
            .written
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn open_count(&self, name: &str) -> usize {
        self.state()
            .opens
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn rts(&self, name: &str) -> Option<bool> {
        self.state().rts.get(name).copied()
    }
}

impl PortDriver for SimDriver {
    fn list_ports(&self) -> Result<Vec<PortInfo>> {
        let state = self.state();
        if state.list_fails {
            return Err(io::Error::other("enumeration failed").into());
        }
        Ok(state.ports.clone())
    }

    fn open(&self, config: &SerialConfig) -> Result<Box<dyn Port>> {
        let name = config.port_name.clone();
        let mut state = self.state();
        if !state.ports.iter().any(|p| p.name == name) {
            return Err(Error::PortNotFound(name));
        }
        if take_failure(&mut state.open_failures, &name) {
            return Err(Error::PortOpenFailed {
                port: name,
                reason: "port busy".into(),
            });
        }
        *state.opens.entry(name.clone()).or_default() += 1;
        drop(state);

        Ok(Box::new(SimPort {
            name,
            state: Arc::clone(&self.state),
            open: true,
        }))
    }
}

pub(crate) struct SimPort {
    name: String,
    state: Arc<Mutex<SimState>>,
    open: bool,
}

impl SimPort {
    fn state(&self) -> io::Result<MutexGuard<'_, SimState>> {
        if !self.open {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "port closed"));
        }
        Ok(self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner))
    }
}

impl Port for SimPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn bytes_to_read(&mut self) -> Result<usize> {
        let mut state = self.state()?;
        if take_failure(&mut state.read_failures, &self.name) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged").into());
        }
        Ok(state
            .inbound
            .get(&self.name)
            .map_or(0, VecDeque::len))
    }

    fn set_rts(&mut self, level: bool) -> Result<()> {
        let name = self.name.clone();
        self.state()?.rts.insert(name, level);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }
}

impl Read for SimPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let name = self.name.clone();
        let mut state = self.state()?;
        if take_failure(&mut state.read_failures, &name) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        let queue = state.inbound.entry(name).or_default();
        if queue.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out"));
        }
        let n = buf.len().min(queue.len());
        for (slot, byte) in buf.iter_mut().zip(queue.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for SimPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let name = self.name.clone();
        let mut state = self.state()?;
        if take_failure(&mut state.write_failures, &name) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        state
            .written
            .entry(name.clone())
            .or_default()
            .push(buf.to_vec());
        let reply = state
            .responses
            .get(&name)
            .and_then(|rules| rules.iter().find(|(req, _)| req == buf))
            .map(|(_, resp)| resp.clone());
        if let Some(reply) = reply {
            state.inbound.entry(name).or_default().extend(reply);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.state().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_unknown_port() {
        let driver = SimDriver::new();
        assert!(matches!(
            driver.open(&SerialConfig::new("COM1")),
            Err(Error::PortNotFound(_))
        ));
    }

    #[test]
    fn test_canned_response_and_read() {
        let driver = SimDriver::with_ports(&["COM1"]);
        driver.respond_to("COM1", b"ping", b"pong");
        let mut port = driver
            .open(&SerialConfig::new("COM1"))
            .unwrap();

        port.write_all_bytes(b"ping").unwrap();
        assert_eq!(port.bytes_to_read().unwrap(), 4);
        let mut buf = [0u8; 8];
        assert_eq!(port.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"pong");
        assert_eq!(
            port.read(&mut buf)
                .unwrap_err()
                .kind(),
            io::ErrorKind::TimedOut
        );
        assert_eq!(driver.written("COM1"), vec![b"ping".to_vec()]);
    }

    #[test]
    fn test_closed_port_rejects_io() {
        let driver = SimDriver::with_ports(&["COM1"]);
        let mut port = driver
            .open(&SerialConfig::new("COM1"))
            .unwrap();
        port.close().unwrap();
        assert!(port.write(b"x").is_err());
        assert!(port.bytes_to_read().is_err());
    }
}

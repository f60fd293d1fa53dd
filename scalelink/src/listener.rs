//! Background polling of one port.
//!
//! A [`PortListener`] runs on its own thread with a periodic timer and a
//! cancellation channel. Each tick reads a frame if bytes are waiting,
//! decodes it and publishes the weight to the cache; an I/O failure closes
//! the session and the listener keeps trying to reopen it after a backoff.
//!
//! ```text
//!            io failure
//!   Polling -----------> Reconnecting
//!      ^                      |
//!      +----- reopen ok ------+
//!
//!   stop() from either state -> Stopped
//! ```

use {
    crate::{
        error::{Error, Result},
        protocol::{ChecksumPolicy, ProtocolVariant},
        session::PortSession,
        sink::CacheSink,
    },
    crossbeam_channel::{Receiver, RecvTimeoutError, Sender, select, tick},
    log::{debug, info, warn},
    std::{
        sync::{Arc, Mutex, PoisonError},
        thread::{self, JoinHandle},
        time::Duration,
    },
};

/// Default period between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default wait before each reopen attempt.
pub const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_millis(1000);

/// Listener timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ListenerConfig {
    /// Period of the polling tick.
    pub poll_interval: Duration,
    /// Wait before each reopen attempt while reconnecting.
    pub reconnect_backoff: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            reconnect_backoff: DEFAULT_RECONNECT_BACKOFF,
        }
    }
}

/// Listener state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// Port open, checking for data on every tick.
    Polling,
    /// Port closed after an I/O failure, reopening after each backoff.
    Reconnecting,
    /// Terminal.
    Stopped,
}

/// What a listener decodes and where it publishes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Decoding {
    /// Frame shape and payload width.
    pub variant: ProtocolVariant,
    /// Checksum handling.
    pub policy: ChecksumPolicy,
}

type SharedState = Arc<Mutex<ListenerState>>;

fn load(state: &SharedState) -> ListenerState {
    *state
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

fn store(state: &SharedState, value: ListenerState) {
    *state
        .lock()
        .unwrap_or_else(PoisonError::into_inner) = value;
}

/// A running port listener.
pub struct PortListener {
    session: Arc<PortSession>,
    cache_key: String,
    state: SharedState,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PortListener {
    /// Start polling `session`, publishing readings under `cache_key`.
    ///
    /// The session should already be open; if it is not, the listener starts
    /// in [`ListenerState::Reconnecting`].
    pub fn start(
        session: Arc<PortSession>,
        cache_key: impl Into<String>,
        sink: Arc<dyn CacheSink>,
        decoding: Decoding,
        config: ListenerConfig,
    ) -> Result<Self> {
        let cache_key = cache_key.into();
        let initial = if session.is_open() {
            ListenerState::Polling
        } else {
            ListenerState::Reconnecting
        };
        let state = Arc::new(Mutex::new(initial));
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(0);

        let worker = Worker {
            session: Arc::clone(&session),
            cache_key: cache_key.clone(),
            sink,
            decoding,
            config,
            state: Arc::clone(&state),
        };
        let handle = thread::Builder::new()
            .name(format!("listener-{}", session.name()))
            .spawn(move || worker.run(&stop_rx))?;

        info!(
            "Listening on {} every {:?} (cache key {cache_key:?})",
            session.name(),
            config.poll_interval
        );

        Ok(Self {
            session,
            cache_key,
            state,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Port this listener polls.
    pub fn port_name(&self) -> &str {
        self.session.name()
    }

    /// Cache key readings are published under.
    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    /// Current state.
    pub fn state(&self) -> ListenerState {
        load(&self.state)
    }

    /// Stop polling and close the session.
    ///
    /// Blocks until an in-flight tick has finished; no tick runs afterwards.
    /// Calling it again does nothing.
    pub fn stop(&mut self) {
        // Dropping the sender disconnects the worker's stop channel.
        let Some(stop_tx) = self.stop_tx.take() else {
            return;
        };
        drop(stop_tx);

        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("Listener thread for {} panicked", self.port_name());
        }
        if let Err(e) = self.session.close() {
            warn!("Failed to close {}: {e}", self.port_name());
        }
        store(&self.state, ListenerState::Stopped);
        info!("Stopped listening on {}", self.port_name());
    }
}

impl Drop for PortListener {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for PortListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortListener")
            .field("port", &self.port_name())
            .field("cache_key", &self.cache_key)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

struct Worker {
    session: Arc<PortSession>,
    cache_key: String,
    sink: Arc<dyn CacheSink>,
    decoding: Decoding,
    config: ListenerConfig,
    state: SharedState,
}

impl Worker {
    fn run(&self, stop_rx: &Receiver<()>) {
        let ticker = tick(self.config.poll_interval);
        loop {
            match load(&self.state) {
                ListenerState::Polling => select! {
                    recv(stop_rx) -> _ => break,
                    recv(ticker) -> _ => self.tick(),
                },
                ListenerState::Reconnecting => {
                    match stop_rx.recv_timeout(self.config.reconnect_backoff) {
                        Err(RecvTimeoutError::Timeout) => self.reconnect(),
                        _ => break,
                    }
                },
                ListenerState::Stopped => break,
            }
        }
        debug!("Listener loop for {} exited", self.session.name());
    }

    fn tick(&self) {
        let frame_len = self.decoding.variant.frame_len();
        let frame = match self.session.poll_frame(frame_len) {
            Ok(Some(frame)) => frame,
            Ok(None) => return,
            Err(e) if e.is_io_failure() || matches!(e, Error::PortNotOpen(_)) => {
                warn!("I/O failure on {}: {e}; reconnecting", self.session.name());
                if let Err(e) = self.session.close() {
                    debug!("Closing {} after failure: {e}", self.session.name());
                }
                store(&self.state, ListenerState::Reconnecting);
                return;
            },
            Err(e) => {
                warn!("Poll on {} failed: {e}", self.session.name());
                return;
            },
        };

        match self
            .decoding
            .variant
            .decode_reading(&frame, self.decoding.policy)
        {
            Ok(reading) => {
                debug!("{}: {reading}", self.session.name());
                if let Err(e) = self.sink.set(&self.cache_key, &reading.weight) {
                    warn!("Failed to publish reading for {}: {e}", self.session.name());
                }
            },
            Err(e) => warn!("Discarding frame from {}: {e}", self.session.name()),
        }
    }

    fn reconnect(&self) {
        match self.session.reopen() {
            Ok(()) => {
                info!("Reconnected {}", self.session.name());
                store(&self.state, ListenerState::Polling);
            },
            Err(e) => warn!("Reconnect to {} failed: {e}", self.session.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::SerialConfig;
    use crate::port::sim::SimDriver;
    use crate::protocol::{CommandFrame, FrameLayout};
    use crate::sink::MemoryCache;
    use std::time::Instant;

    fn fast() -> ListenerConfig {
        ListenerConfig {
            poll_interval: Duration::from_millis(5),
            reconnect_backoff: Duration::from_millis(20),
        }
    }

    fn weight_frame(payload: &[u8]) -> Vec<u8> {
        CommandFrame::new(b'B')
            .with_payload(payload)
            .build(FrameLayout::Addressed)
    }

    fn open_session(driver: &SimDriver, name: &str) -> Arc<PortSession> {
        Arc::new(PortSession::open(Arc::new(driver.clone()), SerialConfig::new(name)).unwrap())
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn test_publishes_decoded_reading() {
        let driver = SimDriver::with_ports(&["COM3"]);
        let cache = Arc::new(MemoryCache::new());
        let mut listener = PortListener::start(
            open_session(&driver, "COM3"),
            "scale1",
            cache.clone(),
            Decoding::default(),
            fast(),
        )
        .unwrap();
        assert_eq!(listener.state(), ListenerState::Polling);

        driver.push_inbound("COM3", &weight_frame(b"+001234      0"));
        assert!(wait_until(|| cache.get("scale1").is_some()));
        assert_eq!(cache.get("scale1").as_deref(), Some("1234"));

        listener.stop();
        assert_eq!(listener.state(), ListenerState::Stopped);
    }

    #[test]
    fn test_decode_failure_keeps_polling() {
        let driver = SimDriver::with_ports(&["COM3"]);
        let cache = Arc::new(MemoryCache::new());
        let listener = PortListener::start(
            open_session(&driver, "COM3"),
            "scale1",
            cache.clone(),
            Decoding::default(),
            fast(),
        )
        .unwrap();

        let mut garbage = weight_frame(b"+001234      0");
        garbage[0] = b'X';
        driver.push_inbound("COM3", &garbage);
        assert!(wait_until(|| driver.inbound_len("COM3") == 0));
        assert_eq!(listener.state(), ListenerState::Polling);
        assert_eq!(cache.get("scale1"), None);

        driver.push_inbound("COM3", &weight_frame(b"-000050      1"));
        assert!(wait_until(|| cache.get("scale1").is_some()));
        assert_eq!(cache.get("scale1").as_deref(), Some("-5.0"));
    }

    #[test]
    fn test_reconnects_after_io_failure() {
        let driver = SimDriver::with_ports(&["COM3"]);
        let cache = Arc::new(MemoryCache::new());
        let session = open_session(&driver, "COM3");
        let listener = PortListener::start(
            Arc::clone(&session),
            "scale1",
            cache.clone(),
            Decoding::default(),
            ListenerConfig {
                poll_interval: Duration::from_millis(5),
                reconnect_backoff: Duration::from_millis(200),
            },
        )
        .unwrap();

        // Unplug: the next poll fails and the port disappears until replugged.
        driver.remove_port("COM3");
        driver.fail_reads("COM3", 1);
        assert!(wait_until(|| listener.state() == ListenerState::Reconnecting));
        assert!(!session.is_open());

        driver.add_port(crate::port::PortInfo::named("COM3"));
        assert!(wait_until(|| listener.state() == ListenerState::Polling));
        assert!(session.is_open());
        assert_eq!(driver.open_count("COM3"), 2);

        driver.push_inbound("COM3", &weight_frame(b"+000750      0"));
        assert!(wait_until(|| cache.get("scale1").is_some()));
        assert_eq!(cache.get("scale1").as_deref(), Some("750"));
    }

    #[test]
    fn test_starts_reconnecting_when_session_closed() {
        let driver = SimDriver::with_ports(&["COM3"]);
        driver.fail_opens("COM3", 2);
        let session = Arc::new(PortSession::new(
            Arc::new(driver.clone()),
            SerialConfig::new("COM3"),
        ));
        let listener = PortListener::start(
            Arc::clone(&session),
            "scale1",
            Arc::new(MemoryCache::new()),
            Decoding::default(),
            fast(),
        )
        .unwrap();
        assert_ne!(listener.state(), ListenerState::Stopped);
        assert!(wait_until(|| listener.state() == ListenerState::Polling));
        assert_eq!(driver.open_count("COM3"), 1);
    }

    #[test]
    fn test_stop_is_idempotent_and_final() {
        let driver = SimDriver::with_ports(&["COM3"]);
        let cache = Arc::new(MemoryCache::new());
        let session = open_session(&driver, "COM3");
        let mut listener = PortListener::start(
            Arc::clone(&session),
            "scale1",
            cache.clone(),
            Decoding::default(),
            fast(),
        )
        .unwrap();

        listener.stop();
        listener.stop();
        assert_eq!(listener.state(), ListenerState::Stopped);
        assert!(!session.is_open());

        // Nothing consumes or publishes once stopped.
        driver.push_inbound("COM3", &weight_frame(b"+001234      0"));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(driver.inbound_len("COM3"), 20);
        assert_eq!(cache.get("scale1"), None);
    }

    #[test]
    fn test_stop_while_reconnecting() {
        let driver = SimDriver::new();
        let session = Arc::new(PortSession::new(
            Arc::new(driver.clone()),
            SerialConfig::new("COM3"),
        ));
        let mut listener = PortListener::start(
            session,
            "scale1",
            Arc::new(MemoryCache::new()),
            Decoding::default(),
            ListenerConfig {
                poll_interval: Duration::from_millis(5),
                reconnect_backoff: Duration::from_secs(30),
            },
        )
        .unwrap();
        assert_eq!(listener.state(), ListenerState::Reconnecting);

        let started = Instant::now();
        listener.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(listener.state(), ListenerState::Stopped);
        assert_eq!(listener.cache_key(), "scale1");
        assert_eq!(listener.port_name(), "COM3");
    }
}

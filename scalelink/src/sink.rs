//! Collaborators the listener publishes through.
//!
//! The cache and the port-name mapping live outside this crate (a key-value
//! store and the deployment profile). They are reached only through the
//! [`CacheSink`] and [`PortMappings`] traits; [`MemoryCache`] is the
//! in-process cache used by the CLI and the tests.

use {
    crate::error::{Error, Result},
    std::{
        collections::HashMap,
        sync::{PoisonError, RwLock},
    },
};

/// Cache key used for ports without a configured mapping.
pub const UNKNOWN_CACHE_KEY: &str = "unknown";

/// Key-value store receiving decoded readings.
pub trait CacheSink: Send + Sync {
    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Source of system-port-name to cache-key mappings.
pub trait PortMappings: Send + Sync {
    /// Current mapping from system port name to cache key.
    fn port_mappings(&self) -> HashMap<String, String>;

    /// Cache key for one port, or [`UNKNOWN_CACHE_KEY`] when unmapped.
    fn cache_key_for(&self, port: &str) -> String {
        self.port_mappings()
            .remove(port)
            .unwrap_or_else(|| UNKNOWN_CACHE_KEY.to_string())
    }
}

impl PortMappings for HashMap<String, String> {
    fn port_mappings(&self) -> HashMap<String, String> {
        self.clone()
    }
}

/// Thread-safe in-memory cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent value stored under `key`.
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Snapshot of every entry.
    pub fn entries(&self) -> HashMap<String, String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CacheSink for MemoryCache {
    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .map_err(|e| Error::Cache(e.to_string()))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

//! Continuous listening on one or more ports.

use {
    crate::{CliError, install_interrupt_handler, was_interrupted},
    anyhow::Result,
    console::style,
    log::{info, warn},
    scalelink::{CacheSink, MemoryCache, PortRegistry, RegistryConfig},
    std::{collections::HashMap, sync::Arc, thread, time::Duration},
};

/// How often the main thread checks for Ctrl-C.
const INTERRUPT_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Cache that prints every value change.
struct ConsoleSink {
    cache: MemoryCache,
    json: bool,
}

impl ConsoleSink {
    fn new(json: bool) -> Self {
        Self {
            cache: MemoryCache::new(),
            json,
        }
    }

    fn render(&self, key: &str, value: &str) -> String {
        if self.json {
            serde_json::json!({ "key": key, "weight": value }).to_string()
        } else {
            format!("{}: {}", style(key).cyan(), style(value).green().bold())
        }
    }
}

impl CacheSink for ConsoleSink {
    fn set(&self, key: &str, value: &str) -> scalelink::Result<()> {
        let changed = self.cache.get(key).as_deref() != Some(value);
        self.cache.set(key, value)?;
        if changed {
            println!("{}", self.render(key, value));
        }
        Ok(())
    }
}

/// Listen on `ports` until Ctrl-C, printing readings as they change.
pub(crate) fn cmd_listen(
    ports: &[String],
    registry: RegistryConfig,
    mappings: HashMap<String, String>,
    json: bool,
) -> Result<()> {
    if ports.is_empty() {
        return Err(CliError::Usage(
            "no ports to listen on; pass ports, use --port or add a [ports] table".into(),
        )
        .into());
    }

    install_interrupt_handler();

    let sink = Arc::new(ConsoleSink::new(json));
    let registry = PortRegistry::native(registry, sink, Arc::new(mappings));

    let mut opened = 0;
    for port in ports {
        match registry.open_port(port) {
            Ok(()) => {
                opened += 1;
                if !json {
                    eprintln!(
                        "{} Listening on {} as {}",
                        style("*").green(),
                        style(port).cyan(),
                        style(registry.cache_key(port)).bold()
                    );
                }
            },
            Err(e) => warn!("{port}: {e}"),
        }
    }

    if opened == 0 {
        registry.shutdown();
        return Err(CliError::Device("none of the requested ports could be opened".into()).into());
    }

    if !json {
        eprintln!("{}", style("Press Ctrl-C to stop").dim());
    }

    while !was_interrupted() {
        thread::sleep(INTERRUPT_CHECK_INTERVAL);
    }

    info!("Stopping listeners");
    registry.shutdown();
    Err(CliError::Cancelled("interrupted".into()).into())
}

//! scalelink CLI - Command-line tool for weighing scales on serial lines.
//!
//! ## Features
//!
//! - List serial ports with USB identity
//! - Send scale commands and print the decoded weight
//! - Listen to one or more scales until interrupted
//! - Encode command frames and decode captured responses offline
//! - Shell completion generation
//! - Environment variable and TOML configuration support

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use log::debug;
use scalelink::{ChecksumPolicy, FrameLayout, ProtocolVariant, RegistryConfig};
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

mod commands;
mod config;

use config::{Config, check_width, parse_address};

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Whether Ctrl-C was pressed.
pub(crate) fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

/// Route Ctrl-C to [`was_interrupted`] instead of terminating the process.
pub(crate) fn install_interrupt_handler() {
    if let Err(e) = ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::Relaxed)) {
        debug!("Could not install Ctrl-C handler: {e}");
    }
}

/// Errors with a dedicated exit code.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Invalid invocation (exit 2).
    #[error("{0}")]
    Usage(String),
    /// Invalid configuration value (exit 3).
    #[error("{0}")]
    Config(String),
    /// Port missing or unusable (exit 4).
    #[error("{0}")]
    Device(String),
    /// Interrupted by the user (exit 130).
    #[error("{0}")]
    Cancelled(String),
}

/// scalelink - Talk to STX/ETX weighing scales over serial lines.
///
/// Environment variables:
///   SCALELINK_PORT   - Default serial port
///   SCALELINK_BAUD   - Default baud rate (default: 9600)
#[derive(Parser)]
#[command(name = "scalelink")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub(crate) struct Cli {
    /// Serial port to use.
    #[arg(short, long, global = true, env = "SCALELINK_PORT")]
    port: Option<String>,

    /// Baud rate.
    #[arg(long, global = true, env = "SCALELINK_BAUD")]
    baud: Option<u32>,

    /// Frame layout.
    #[arg(long, global = true, value_enum)]
    layout: Option<Layout>,

    /// Weight payload width in bytes (8 or 14).
    #[arg(long, global = true, value_parser = parse_width)]
    width: Option<usize>,

    /// Device address (single ASCII character, addressed layout only).
    #[arg(long, global = true, value_parser = parse_address)]
    address: Option<u8>,

    /// Reject frames whose checksum does not match.
    #[arg(long, global = true)]
    strict_checksum: bool,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Frame layouts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Layout {
    /// `STX, address, command, payload, checksum, ETX`.
    Addressed,
    /// `STX, command, payload, checksum, ETX`.
    Unaddressed,
}

impl From<Layout> for FrameLayout {
    fn from(layout: Layout) -> Self {
        match layout {
            Layout::Addressed => FrameLayout::Addressed,
            Layout::Unaddressed => FrameLayout::Unaddressed,
        }
    }
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Send one command to the scale and print the decoded weight.
    Read {
        /// Operation code: letter (A-H) or number (1-8).
        #[arg(long, default_value = "B")]
        op: String,

        /// Output the reading as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Read one frame the scale sends on its own, without sending anything.
    Poll {
        /// Output the reading as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Listen to scales and print readings until Ctrl-C.
    Listen {
        /// Ports to listen on (default: --port, then every port in [ports]).
        ports: Vec<String>,

        /// Output readings as JSON lines to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Print the command frame for an operation code.
    Encode {
        /// Operation code: letter (A-H) or number (1-8).
        #[arg(long)]
        op: String,

        /// Output as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Decode a response frame given as hex.
    Decode {
        /// Frame bytes, e.g. "02 41 42 2B ... 03".
        hex: String,

        /// Output as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type.
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_width(s: &str) -> Result<usize, String> {
    let width = s
        .parse::<usize>()
        .map_err(|e| format!("invalid width '{s}': {e}"))?;
    check_width(width)
}

impl Cli {
    /// Library configuration: file values overridden by flags and environment.
    fn registry_config(&self, config: &Config) -> Result<RegistryConfig> {
        let mut registry = config.registry_config()?;
        if let Some(baud) = self.baud {
            registry.serial.baud_rate = baud;
        }
        if self.layout.is_some() || self.width.is_some() {
            registry.variant = ProtocolVariant::new(
                self.layout
                    .map_or(registry.variant.layout, FrameLayout::from),
                self.width
                    .unwrap_or(registry.variant.payload_width),
            );
        }
        if self.address.is_some() {
            registry.address = self.address;
        }
        if self.strict_checksum {
            registry.checksum_policy = ChecksumPolicy::Strict;
        }
        Ok(registry)
    }

    /// Port from the flag/environment, then the config file.
    fn port(&self, config: &Config) -> Result<String> {
        self.port
            .clone()
            .or_else(|| config.serial.port.clone())
            .ok_or_else(|| {
                CliError::Usage(
                    "no serial port given; use --port, SCALELINK_PORT or [serial] port".into(),
                )
                .into()
            })
    }
}

/// Map an error to the process exit code.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return match cli_err {
            CliError::Usage(_) => 2,
            CliError::Config(_) => 3,
            CliError::Device(_) => 4,
            CliError::Cancelled(_) => 130,
        };
    }
    match err.downcast_ref::<scalelink::Error>() {
        Some(
            scalelink::Error::InvalidOperation(_)
            | scalelink::Error::InvalidHex(_)
            | scalelink::Error::PortNotManaged(_),
        ) => 2,
        Some(
            scalelink::Error::PortNotFound(_)
            | scalelink::Error::PortOpenFailed { .. }
            | scalelink::Error::PortNotOpen(_),
        ) => 4,
        _ => 1,
    }
}

fn init_logging(cli: &Cli) {
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    // Load configuration
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::ListPorts { json } => commands::ports::cmd_list_ports(*json),
        Commands::Read { op, json } => {
            let registry = cli.registry_config(&config)?;
            commands::read::cmd_read(&cli.port(&config)?, op, &registry, *json)
        },
        Commands::Poll { json } => {
            let registry = cli.registry_config(&config)?;
            commands::read::cmd_poll(&cli.port(&config)?, &registry, *json)
        },
        Commands::Listen { ports, json } => {
            let registry = cli.registry_config(&config)?;
            let ports = if !ports.is_empty() {
                ports.clone()
            } else if let Some(port) = cli.port.clone().or_else(|| config.serial.port.clone()) {
                vec![port]
            } else {
                config.ports.keys().cloned().collect()
            };
            commands::listen::cmd_listen(&ports, registry, config.port_mappings(), *json)
        },
        Commands::Encode { op, json } => {
            let registry = cli.registry_config(&config)?;
            commands::codec::cmd_encode(op, &registry, *json)
        },
        Commands::Decode { hex, json } => {
            let registry = cli.registry_config(&config)?;
            commands::codec::cmd_decode(hex, &registry, *json)
        },
        Commands::Completions { shell } => {
            commands::completions::cmd_completions(*shell);
            Ok(())
        },
    }
}

fn main() {
    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();
    init_logging(&cli);

    debug!(
        "scalelink v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    if let Err(err) = run(&cli) {
        eprintln!("{} {err:#}", style("Error:").red().bold());
        std::process::exit(exit_code_for(&err));
    }
}

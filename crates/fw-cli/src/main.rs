//! CLI entry point for filewatcher.
//!
//! One binary runs any of the three tiers:
//!
//! # Usage
//!
//! ```bash
//! filewatcher [OPTIONS] <COMMAND>
//!
//! # Store per-node inventories, persisted to a snapshot
//! filewatcher storage --address 127.0.0.1:12000 --data-path storage.json
//!
//! # Watch a directory and report it as node "web-1"
//! filewatcher node --dir /srv/data --id web-1
//!
//! # Serve the aggregated inventory on GET /list
//! filewatcher master --address 127.0.0.1:8080
//! ```
//!
//! Settings come from `filewatcher.json` (or `--config`); flags override the
//! file, and anything still unset falls back to the built-in defaults.

#![deny(clippy::all)]
#![warn(missing_docs)]

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use fw_core::{AddressDefaults, Config, ConfigError, Service};
use fw_master::MasterServer;
use fw_storage::StorageServer;
use fw_watcher::NodeService;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// CLI ARGUMENT TYPES
// =============================================================================

/// Propagates file existence across watched nodes to a central inventory.
#[derive(Parser)]
#[command(name = "filewatcher", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    command: Commands,

    /// Configuration file.
    ///
    /// A missing or malformed file is reported and defaults are used instead.
    #[arg(
        short,
        long,
        global = true,
        env = "FILEWATCHER_CONFIG",
        default_value = "filewatcher.json"
    )]
    config: Utf8PathBuf,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Watch a directory and report its changes to storage.
    Node {
        /// Directory to watch.
        #[arg(short, long)]
        dir: Option<Utf8PathBuf>,

        /// Identifier to report under.
        #[arg(long)]
        id: Option<String>,

        /// Storage tier address.
        #[arg(long)]
        storage_address: Option<String>,
    },

    /// Run the storage tier.
    Storage {
        /// Address to listen on.
        #[arg(short, long)]
        address: Option<String>,

        /// Snapshot file (in-memory only when unset).
        #[arg(long)]
        data_path: Option<Utf8PathBuf>,
    },

    /// Serve the aggregated inventory.
    Master {
        /// Address to listen on.
        #[arg(short, long)]
        address: Option<String>,

        /// Storage tier address.
        #[arg(long)]
        storage_address: Option<String>,
    },
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Initializes the tracing subscriber for logging.
///
/// Respects the `RUST_LOG` environment variable if set. Otherwise, uses
/// `debug` level if `--verbose` is set, or `info` level by default.
/// Noisy crates like `hyper` and `mio` are filtered to `warn` level.
fn init_tracing(verbose: bool, no_color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "info" };
        EnvFilter::new(format!(
            "{level},hyper=warn,hyper_util=warn,reqwest=warn,mio=warn,notify=warn"
        ))
    });

    // Check if colors should be disabled (flag or NO_COLOR env var)
    let use_ansi = !no_color && std::env::var("NO_COLOR").is_err();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_ansi(use_ansi))
        .with(filter)
        .init();
}

/// Loads the configuration file, falling back to defaults on any error.
fn load_config(path: &Utf8Path) -> Config {
    match Config::load(path) {
        Ok(config) => {
            info!(path = %path, "Loaded configuration");
            config
        }
        Err(ConfigError::Missing(_)) => {
            info!(path = %path, "No configuration file, using defaults");
            Config::default()
        }
        Err(error) => {
            warn!(error = %error, "Using default configuration instead");
            Config::default()
        }
    }
}

/// Copies the flags given on the command line over the loaded configuration.
fn apply_overrides(config: &mut Config, command: &Commands) {
    match command {
        Commands::Node {
            dir,
            id,
            storage_address,
        } => {
            override_with(&mut config.node.dir, dir.as_ref());
            override_with(&mut config.node.id, id.as_ref());
            override_with(&mut config.node.storage_address, storage_address.as_ref());
        }
        Commands::Storage { address, data_path } => {
            override_with(&mut config.storage.address, address.as_ref());
            override_with(&mut config.storage.data_path, data_path.as_ref());
        }
        Commands::Master {
            address,
            storage_address,
        } => {
            override_with(&mut config.master.address, address.as_ref());
            override_with(&mut config.master.storage_address, storage_address.as_ref());
        }
    }
}

fn override_with<T: Clone>(slot: &mut Option<T>, flag: Option<&T>) {
    if let Some(value) = flag {
        *slot = Some(value.clone());
    }
}

/// Waits for Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() -> color_eyre::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received Ctrl-C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl-C, shutting down");
    }

    Ok(())
}

// =============================================================================
// COMMAND HANDLERS
// =============================================================================

/// Runs a node until a signal arrives or the watcher ends on its own.
async fn run_node(config: Config, defaults: &AddressDefaults) -> color_eyre::Result<()> {
    let mut node = NodeService::new(config.node);
    node.configure(defaults);
    node.run().await?;

    tokio::select! {
        result = node.finished() => {
            result?;
            info!("Watcher ended");
            return Ok(());
        }
        signal = shutdown_signal() => signal?,
    }

    node.stop();
    node.finished().await?;
    Ok(())
}

/// Runs the storage tier until a signal arrives.
async fn run_storage(config: Config, defaults: &AddressDefaults) -> color_eyre::Result<()> {
    let mut storage = StorageServer::new(config.storage);
    storage.configure(defaults);
    storage.run().await?;

    shutdown_signal().await?;
    storage.shutdown().await;
    Ok(())
}

/// Runs the master until a signal arrives.
async fn run_master(config: Config, defaults: &AddressDefaults) -> color_eyre::Result<()> {
    let mut master = MasterServer::new(config.master);
    master.configure(defaults);
    master.run().await?;

    shutdown_signal().await?;
    master.shutdown().await;
    Ok(())
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Application entry point.
#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // 1. Install color-eyre FIRST (before any potential panics)
    color_eyre::install()?;

    // 2. Parse CLI arguments
    let cli = Cli::parse();

    // 3. Initialize tracing (handles --no-color for log output)
    init_tracing(cli.verbose, cli.no_color);

    // 4. Merge file, flags and defaults
    let mut config = load_config(&cli.config);
    apply_overrides(&mut config, &cli.command);
    let defaults = AddressDefaults::default();

    // 5. Route to appropriate command
    match cli.command {
        Commands::Node { .. } => run_node(config, &defaults).await,
        Commands::Storage { .. } => run_storage(config, &defaults).await,
        Commands::Master { .. } => run_master(config, &defaults).await,
    }
}

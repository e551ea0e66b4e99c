//! Configuration structures for filewatcher.
//!
//! This module provides configuration types for every tier:
//!
//! - [`NodeConfig`] - Watched directory, node identity and delivery settings
//! - [`StorageConfig`] - Storage listener address and snapshot file
//! - [`MasterConfig`] - Query listener and storage backend addresses
//! - [`Config`] - Root configuration combining all sections
//!
//! Address fields are optional. A missing (or empty) address is filled from an
//! explicit [`AddressDefaults`] value by the `fill_defaults` methods; values
//! already present are never overwritten.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default address of the master query endpoint.
const MASTER_ADDRESS: &str = "127.0.0.1:8080";

/// Default address of the storage tier.
const STORAGE_ADDRESS: &str = "127.0.0.1:12000";

/// Default identifier reported by a node when none is configured.
const NODE_ID: &str = "default";

/// The documented fallback addresses used when a configuration leaves an
/// address unset.
///
/// # Examples
///
/// ```
/// use fw_core::AddressDefaults;
///
/// let defaults = AddressDefaults::default();
/// assert_eq!(defaults.master_address, "127.0.0.1:8080");
/// assert_eq!(defaults.storage_address, "127.0.0.1:12000");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressDefaults {
    /// Address the master listens on for `GET /list`.
    pub master_address: String,
    /// Address of the storage tier.
    pub storage_address: String,
}

impl Default for AddressDefaults {
    fn default() -> Self {
        Self {
            master_address: MASTER_ADDRESS.to_owned(),
            storage_address: STORAGE_ADDRESS.to_owned(),
        }
    }
}

/// Stores `default` into `slot` when the slot is unset or empty.
fn fill(slot: &mut Option<String>, default: &str) {
    if slot.as_deref().is_none_or(str::is_empty) {
        *slot = Some(default.to_owned());
    }
}

/// Configuration for a watching node.
///
/// # Examples
///
/// ```
/// use fw_core::{AddressDefaults, NodeConfig};
///
/// let mut config = NodeConfig::default();
/// config.fill_defaults(&AddressDefaults::default());
/// assert_eq!(config.id.as_deref(), Some("default"));
/// assert_eq!(config.queue_capacity, 10);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeConfig {
    /// Identifier under which this node's files are stored.
    pub id: Option<String>,

    /// Root directory to watch.
    pub dir: Option<Utf8PathBuf>,

    /// Address of the storage tier receiving operation batches.
    pub storage_address: Option<String>,

    /// Capacity of the batcher's input queue.
    pub queue_capacity: usize,

    /// Delay before a failed delivery is retried, in milliseconds.
    pub retry_delay_ms: u64,

    /// Timeout for one delivery request, in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: None,
            dir: None,
            storage_address: None,
            queue_capacity: 10,
            retry_delay_ms: 1000,
            request_timeout_ms: 5000,
        }
    }
}

impl NodeConfig {
    /// Fills the unset fields with defaults.
    pub fn fill_defaults(&mut self, defaults: &AddressDefaults) {
        fill(&mut self.id, NODE_ID);
        fill(&mut self.storage_address, &defaults.storage_address);
        if self.dir.as_ref().is_none_or(|dir| dir.as_str().is_empty()) {
            self.dir = Some(Utf8PathBuf::from("."));
        }
    }
}

/// Configuration for the storage tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StorageConfig {
    /// Address to listen on.
    pub address: Option<String>,

    /// Snapshot file. `None` keeps the store in memory only.
    pub data_path: Option<Utf8PathBuf>,
}

impl StorageConfig {
    /// Fills the unset address with the default storage address.
    pub fn fill_defaults(&mut self, defaults: &AddressDefaults) {
        fill(&mut self.address, &defaults.storage_address);
    }
}

/// Configuration for the master aggregator.
///
/// # Examples
///
/// ```
/// use fw_core::{AddressDefaults, MasterConfig};
///
/// let mut config = MasterConfig {
///     address: Some("localhost:12345".to_owned()),
///     ..MasterConfig::default()
/// };
/// config.fill_defaults(&AddressDefaults::default());
///
/// assert_eq!(config.address.as_deref(), Some("localhost:12345"));
/// assert_eq!(config.storage_address.as_deref(), Some("127.0.0.1:12000"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MasterConfig {
    /// Address the query endpoint listens on.
    pub address: Option<String>,

    /// Address of the storage tier to list from.
    pub storage_address: Option<String>,

    /// Timeout for one listing call, in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            address: None,
            storage_address: None,
            request_timeout_ms: 2000,
        }
    }
}

impl MasterConfig {
    /// Fills the unset addresses with defaults.
    pub fn fill_defaults(&mut self, defaults: &AddressDefaults) {
        fill(&mut self.address, &defaults.master_address);
        fill(&mut self.storage_address, &defaults.storage_address);
    }
}

/// Root configuration for filewatcher.
///
/// Combines all tier configurations into a single structure loaded from one
/// JSON file. Every field is optional in the file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Node configuration.
    pub node: NodeConfig,

    /// Storage configuration.
    pub storage: StorageConfig,

    /// Master configuration.
    pub master: MasterConfig,
}

impl Config {
    /// Loads a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] if the file does not exist,
    /// [`ConfigError::Io`] if it cannot be read and [`ConfigError::Parse`] if
    /// it is not valid JSON for this structure.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        Self::from_json(&content)
    }

    /// Parses a configuration from a JSON string.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Fills unset fields of every section.
    pub fn fill_defaults(&mut self, defaults: &AddressDefaults) {
        self.node.fill_defaults(defaults);
        self.storage.fill_defaults(defaults);
        self.master.fill_defaults(defaults);
    }
}

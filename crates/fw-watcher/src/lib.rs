//! Directory watching and batch delivery for filewatcher nodes.
//!
//! This crate turns a directory tree into a stream of root-relative
//! [`Operation`](fw_core::Operation)s and delivers them to the storage tier.
//!
//! # Overview
//!
//! - [`DirectoryWatcher`] validates a root, inventories it once, then reports
//!   live Create/Remove changes as singleton batches
//! - [`OperationBatcher`] coalesces batches from any number of producers and
//!   keeps at most one delivery in flight, retrying failed deliveries
//! - [`StorageSink`] posts batches to the storage tier over HTTP
//! - [`NodeService`] wires the three together behind the
//!   [`Service`](fw_core::Service) lifecycle
//!
//! # Architecture
//!
//! ```text
//! DirectoryWatcher ──(scan + live batches)──► OperationBatcher ──(one at a time)──► StorageSink
//! ```
//!
//! # Crate Dependencies
//!
//! ```text
//! fw-cli ──► fw-watcher ──► fw-core
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use fw_core::{AddressDefaults, NodeConfig, Service};
//! use fw_watcher::NodeService;
//!
//! # async fn example() -> Result<(), fw_watcher::WatchError> {
//! let mut node = NodeService::new(NodeConfig {
//!     id: Some("node-1".to_owned()),
//!     dir: Some("/srv/data".into()),
//!     ..NodeConfig::default()
//! });
//! node.configure(&AddressDefaults::default());
//! node.run().await?;
//!
//! tokio::signal::ctrl_c().await.ok();
//! node.stop();
//! node.finished().await
//! # }
//! ```
//!
//! # Error Handling
//!
//! ```
//! use fw_watcher::WatchError;
//!
//! fn handle_watch_error(err: &WatchError) {
//!     if err.is_fatal() {
//!         tracing::error!(error = %err, "Node cannot run");
//!     } else {
//!         tracing::warn!(error = %err, "Skipping");
//!     }
//! }
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod batcher;
pub mod error;
pub mod node;
pub mod path;
pub mod sink;
pub mod watcher;

// Re-export error types
pub use error::{DeliveryError, WatchError};

// Re-export pipeline types
pub use batcher::{BatchSink, OperationBatcher};
pub use node::NodeService;
pub use sink::StorageSink;
pub use watcher::{DirectoryWatcher, ScanReport, StopHandle};
